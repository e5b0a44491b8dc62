//! The byte carrier between a prepared call and its reply.
//!
//! Framing (TCP record marking, UDP retransmission) is the transport's
//! business. A transport that gives up on a call reports
//! [`Error::NoReply`](crate::error::Error::NoReply), which callers treat the
//! same as an explicit authentication rejection.

use crate::error::Result;

/// Sends one call body and returns the matching reply body.
pub trait Transport {
    fn exchange(&mut self, call: &[u8]) -> Result<Vec<u8>>;
}

impl<F> Transport for F
where
    F: FnMut(&[u8]) -> Result<Vec<u8>>,
{
    fn exchange(&mut self, call: &[u8]) -> Result<Vec<u8>> {
        self(call)
    }
}
