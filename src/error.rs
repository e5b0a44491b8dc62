//! Crate-wide error type.
//!
//! Errors fall into four groups: encoding failures (never retried),
//! credential/verifier failures (reported by the peer or detected locally),
//! context lifecycle failures, and RPC-level rejections. Every failure of
//! `prepare_call`/`process_reply` surfaces as one of these; none is swallowed.

use crate::xdr;
use crate::xdr::rpc::{accept_stat, auth_stat, mismatch_info};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The call or reply could not be encoded or decoded.
    #[error("XDR error: {0}")]
    Xdr(#[from] xdr::Error),

    /// A credential field exceeds its protocol limit.
    #[error("{field} too long: {len} > {max}")]
    TooLong { field: &'static str, len: usize, max: usize },

    /// The server's reply verifier does not authenticate the reply.
    #[error("bad reply verifier")]
    BadReplyVerifier,

    /// The sequence number inside a protected body is not the one sent.
    #[error("sequence number mismatch: expected {expected}, got {got}")]
    SequenceMismatch { expected: u32, got: u32 },

    /// The MIC over an integrity protected body did not verify.
    #[error("integrity checksum verification failed")]
    IntegrityCheckFailed,

    /// The server has no credentials for the caller (`RPCSEC_GSS_CREDPROBLEM`).
    #[error("server reported a GSS credential problem")]
    CredentialProblem,

    /// The server does not recognise the context (`RPCSEC_GSS_CTXPROBLEM`).
    #[error("server reported a GSS context problem")]
    ContextProblem,

    /// The server refused the credential (`AUTH_BADCRED`/`AUTH_REJECTEDCRED`).
    #[error("credential rejected by server: {0:?}")]
    BadCredential(auth_stat),

    /// Any other authentication failure reported by the server.
    #[error("authentication rejected by server: {0:?}")]
    AuthRejected(auth_stat),

    /// The peer claimed the context complete while the client still needs another step.
    #[error("server completed the GSS context before the client")]
    UnexpectedComplete,

    /// A data call was attempted without an established context.
    #[error("GSS context is not established")]
    NotEstablished,

    /// The context has issued every sequence number it may use.
    #[error("GSS sequence numbers exhausted")]
    SequenceExhausted,

    /// Opaque failure reported by the GSS provider.
    #[error("GSS provider failure: {0:#}")]
    Provider(anyhow::Error),

    /// The reply does not answer the call it was matched with.
    #[error("reply xid {got} does not match call xid {expected}")]
    XidMismatch { expected: u32, got: u32 },

    /// The message is a call where a reply was expected.
    #[error("message is not an RPC reply")]
    NotAReply,

    /// The server does not speak RPC version 2.
    #[error("RPC version mismatch, server supports {}..={}", .0.low, .0.high)]
    RpcMismatch(mismatch_info),

    /// The server accepted the call but did not execute it.
    #[error("call accepted with status {0:?}")]
    Accepted(accept_stat),

    /// The transport gave up waiting for a reply.
    #[error("no reply received")]
    NoReply,
}

impl Error {
    /// Whether this failure tears down the GSS context it occurred on.
    ///
    /// Per-reply failures (bad verifier, sequence or checksum mismatch) only
    /// fail the call they belong to.
    pub fn invalidates_context(&self) -> bool {
        matches!(
            self,
            Error::CredentialProblem
                | Error::ContextProblem
                | Error::BadCredential(_)
                | Error::UnexpectedComplete
                | Error::SequenceExhausted
                | Error::Provider(_)
        )
    }

    /// Whether the caller must treat the outcome as "timeout or explicit
    /// authentication rejection". A replayed or stale sequence number may
    /// produce either, and both mean the call did not happen.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(
            self,
            Error::NoReply
                | Error::BadCredential(_)
                | Error::CredentialProblem
                | Error::ContextProblem
                | Error::AuthRejected(_)
        )
    }
}

impl From<auth_stat> for Error {
    fn from(stat: auth_stat) -> Self {
        match stat {
            auth_stat::AUTH_BADCRED | auth_stat::AUTH_REJECTEDCRED => Error::BadCredential(stat),
            auth_stat::RPCSEC_GSS_CREDPROBLEM => Error::CredentialProblem,
            auth_stat::RPCSEC_GSS_CTXPROBLEM => Error::ContextProblem,
            other => Error::AuthRejected(other),
        }
    }
}
