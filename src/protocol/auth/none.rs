//! `AUTH_NONE`: calls without authentication.

use crate::error::{Error, Result};
use crate::xdr::rpc::{auth_flavor, opaque_auth};

use super::{CallSecurity, Credential, Identity, SecurityFlavor, Verifier};

/// The null flavor. Credential and verifier are both empty.
#[derive(Copy, Clone, Debug, Default)]
pub struct AuthNone;

impl SecurityFlavor for AuthNone {
    fn flavor(&self) -> auth_flavor {
        auth_flavor::AUTH_NONE
    }

    fn identity(&self) -> Identity {
        Identity::default()
    }

    fn make_credential(&self) -> Result<(Credential, CallSecurity)> {
        Ok((opaque_auth::none(), CallSecurity::default()))
    }

    fn make_verifier(&self, _header: &[u8]) -> Result<Verifier> {
        Ok(opaque_auth::none())
    }

    fn check_reply_verifier(&self, _call: &CallSecurity, verf: &Verifier) -> Result<()> {
        match verf.flavor {
            auth_flavor::AUTH_NONE => Ok(()),
            _ => Err(Error::BadReplyVerifier),
        }
    }
}
