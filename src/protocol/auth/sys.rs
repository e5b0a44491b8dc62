//! `AUTH_SYS` (formerly `AUTH_UNIX`) as described in RFC 5531 appendix A.
//!
//! The credential carries the caller's uid, gid and supplementary groups in
//! the clear. The verifier is empty and bodies are never transformed.

use std::time::{SystemTime, UNIX_EPOCH};

use smallvec::SmallVec;
use tracing::trace;

use crate::error::{Error, Result};
use crate::xdr::rpc::{auth_flavor, authsys_parms, opaque_auth, MAX_AUTH_BYTES};
use crate::xdr::Packer;

use super::{CallSecurity, Credential, Identity, SecurityFlavor, Verifier};

/// Longest machine name an `AUTH_SYS` credential may carry.
pub const MAX_MACHINE_NAME_LEN: usize = 255;
/// Largest supplementary group list an `AUTH_SYS` credential may carry.
pub const NGRPS: usize = 16;

/// Unix-style uid/gid credentials.
#[derive(Clone, Debug)]
pub struct AuthSys {
    stamp: i32,
    machine_name: String,
    uid: u32,
    gid: u32,
    gids: SmallVec<[u32; NGRPS]>,
}

impl AuthSys {
    /// Validates the credential limits up front, so that building a
    /// credential later can only fail on encoding.
    pub fn new(machine_name: impl Into<String>, uid: u32, gid: u32, gids: &[u32]) -> Result<Self> {
        let machine_name = machine_name.into();
        if machine_name.len() > MAX_MACHINE_NAME_LEN {
            return Err(Error::TooLong {
                field: "machine name",
                len: machine_name.len(),
                max: MAX_MACHINE_NAME_LEN,
            });
        }
        if gids.len() > NGRPS {
            return Err(Error::TooLong { field: "group list", len: gids.len(), max: NGRPS });
        }
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            // Truncated to 32 bits on the wire.
            .map(|d| d.as_secs() as i32)
            .unwrap_or_default();

        Ok(Self { stamp, machine_name, uid, gid, gids: SmallVec::from_slice(gids) })
    }

    /// Replaces the stamp, which otherwise defaults to the creation time.
    pub fn with_stamp(mut self, stamp: i32) -> Self {
        self.stamp = stamp;
        self
    }

    pub fn machine_name(&self) -> &str {
        &self.machine_name
    }

    pub fn gids(&self) -> &[u32] {
        &self.gids
    }

    /// The wire form of the credential body.
    pub fn parms(&self) -> authsys_parms {
        authsys_parms {
            stamp: self.stamp,
            machinename: self.machine_name.clone(),
            uid: self.uid,
            gid: self.gid,
            gids: self.gids.to_vec(),
        }
    }
}

impl SecurityFlavor for AuthSys {
    fn flavor(&self) -> auth_flavor {
        auth_flavor::AUTH_SYS
    }

    fn identity(&self) -> Identity {
        Identity { uid: self.uid, gid: self.gid }
    }

    fn make_credential(&self) -> Result<(Credential, CallSecurity)> {
        let mut body = Packer::with_capacity(MAX_AUTH_BYTES);
        body.pack_int(self.stamp)?;
        body.pack_string(&self.machine_name)?;
        body.pack_uint(self.uid)?;
        body.pack_uint(self.gid)?;
        body.pack_array(&self.gids, |p, gid| p.pack_uint(*gid))?;
        trace!("AUTH_SYS credential {}:{} on {}", self.uid, self.gid, self.machine_name);

        Ok((opaque_auth::new(auth_flavor::AUTH_SYS, body.into_inner()), CallSecurity::default()))
    }

    fn make_verifier(&self, _header: &[u8]) -> Result<Verifier> {
        Ok(opaque_auth::none())
    }

    /// Servers answer with a null verifier, or with `AUTH_SHORT` when they
    /// hand out a shorthand credential.
    fn check_reply_verifier(&self, _call: &CallSecurity, verf: &Verifier) -> Result<()> {
        match verf.flavor {
            auth_flavor::AUTH_NONE | auth_flavor::AUTH_SHORT => Ok(()),
            _ => Err(Error::BadReplyVerifier),
        }
    }
}
