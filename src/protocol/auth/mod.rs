//! Per-call RPC security flavors.
//!
//! Every call carries a credential and a verifier, and every reply returns a
//! verifier of its own (RFC 5531 section 8). A [`SecurityFlavor`] builds the
//! former, checks the latter and optionally transforms argument and result
//! bodies. The flavor is chosen once, when the client is set up:
//!
//! - [`AuthNone`]: empty credential and verifier, identity `0:0`.
//! - [`AuthSys`]: the `AUTH_SYS` uid/gid credential of RFC 5531 appendix A.
//! - [`AuthGss`]: `RPCSEC_GSS` (RFC 2203) on top of an injected [`GssProvider`].

use std::fmt;

use crate::error::{Error, Result};
use crate::xdr::rpc::{auth_flavor, opaque_auth};
use crate::xdr::Packer;

pub mod gss;
mod none;
mod sys;

pub use gss::{AuthGss, ContextState, GssProvider, InitStatus, InitStep, Service};
pub use none::AuthNone;
pub use sys::AuthSys;

/// Credential sent with a call.
pub type Credential = opaque_auth;
/// Verifier sent with a call or returned with a reply.
pub type Verifier = opaque_auth;

/// Identity a flavor presents to the server.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Identity {
    pub uid: u32,
    pub gid: u32,
}

/// What a call was secured with, kept until its reply has been processed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CallSecurity {
    /// GSS sequence number bound into the credential, data calls only
    pub seq: Option<u32>,
    /// Protection applied to the arguments and expected on the results
    pub service: Service,
    /// Context instance that issued the credential
    pub generation: u64,
}

/// A fully assembled call body and the security state needed to open its reply.
#[derive(Clone, Debug)]
pub struct SecuredCall {
    pub body: Vec<u8>,
    pub security: CallSecurity,
}

/// Capability shared by all security flavors.
///
/// `make_credential` may only mutate the GSS sequence counter;
/// `make_verifier` must be a pure function of the header bytes it is given,
/// which are exactly the bytes transmitted from the xid through the credential.
///
/// `make_credential`, `make_verifier` and `wrap_args` are building blocks of
/// [`secure_call`](Self::secure_call). Each is atomic on its own but not as a
/// sequence: calls assembled from them directly may interleave with other
/// callers of a shared context. Use `secure_call` to send anything.
pub trait SecurityFlavor: Send + Sync + fmt::Debug {
    /// Flavor tag used in credentials and verifiers.
    fn flavor(&self) -> auth_flavor;

    /// Identity presented to the server.
    fn identity(&self) -> Identity;

    /// Builds the credential of the next data call. Not atomic with the
    /// verifier and argument protection of that call.
    fn make_credential(&self) -> Result<(Credential, CallSecurity)>;

    /// Builds the call verifier over the serialized header through the credential.
    fn make_verifier(&self, header: &[u8]) -> Result<Verifier>;

    /// Applies the call's protection to the procedure arguments.
    fn wrap_args(&self, _call: &CallSecurity, args: &[u8]) -> Result<Vec<u8>> {
        Ok(args.to_vec())
    }

    /// Checks the verifier the server returned with a successful reply.
    fn check_reply_verifier(&self, call: &CallSecurity, verf: &Verifier) -> Result<()>;

    /// Removes the call's protection from the reply results.
    fn unwrap_results(&self, _call: &CallSecurity, results: &[u8]) -> Result<Vec<u8>> {
        Ok(results.to_vec())
    }

    /// Appends credential, verifier and protected arguments to `header`.
    ///
    /// The credential is finalized before the verifier is computed, and both
    /// before the arguments are transformed. Flavors with shared state must
    /// perform the whole sequence under one lock.
    fn secure_call(&self, mut header: Packer, args: &[u8]) -> Result<SecuredCall> {
        let (cred, security) = self.make_credential()?;
        debug_assert_eq!(cred.flavor, self.flavor());
        header.pack(&cred)?;
        let verf = self.make_verifier(header.as_bytes())?;
        header.pack(&verf)?;
        let args = self.wrap_args(&security, args)?;
        header.append(&args);
        Ok(SecuredCall { body: header.into_inner(), security })
    }

    /// Whether a context must be negotiated before the first call.
    fn needs_handshake(&self) -> bool {
        false
    }

    /// Whether data calls can be secured right now.
    fn is_ready(&self) -> bool {
        true
    }

    /// Starts or continues context negotiation.
    ///
    /// Returns the token to send as the `opaque` argument of the next
    /// context-creation call, or `None` once no more exchanges are needed.
    fn handshake_token(&self) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    /// Appends a context-creation credential, its verifier and the encoded
    /// token to `header`. Only the negotiation driver sends these.
    fn secure_handshake(&self, _header: Packer, _token: &[u8]) -> Result<SecuredCall> {
        Err(Error::NotEstablished)
    }

    /// Feeds the results of a context-creation call back into the flavor.
    fn complete_handshake(&self, _verf: &Verifier, _results: &[u8]) -> Result<()> {
        Ok(())
    }

    /// Builds a context destruction call, if the flavor has a context.
    fn secure_destroy(&self, _header: Packer) -> Result<Option<SecuredCall>> {
        Ok(None)
    }

    /// Drops any negotiated context.
    fn invalidate(&self) {}

    /// Drops the context that secured `call`, if it is still the current one.
    fn invalidate_call(&self, _call: &CallSecurity) {
        self.invalidate();
    }
}
