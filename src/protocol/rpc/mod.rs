//! RPC call orchestration as specified in RFC 5531 (previously RFC 1057).
//!
//! This module builds authenticated call messages and validates the replies
//! answering them:
//!
//! 1. Transaction id allocation
//! 2. Header serialization and securing through the active flavor
//! 3. Reply decoding, verifier checks and result unwrapping
//! 4. `RPCSEC_GSS` context negotiation and destruction
//!
//! Message framing and delivery belong to the [`Transport`] the caller
//! provides.

mod client;
mod transport;

pub use client::{PreparedCall, RpcClient, NULL_PROC};
pub use transport::Transport;
