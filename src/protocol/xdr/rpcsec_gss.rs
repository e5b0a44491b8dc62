//! RPCSEC_GSS protocol structures as defined in RFC 2203.
//!
//! An `RPCSEC_GSS` credential carries the control procedure, the per-context
//! sequence number, the requested service level and the server-assigned
//! context handle. Context creation replies carry `rpc_gss_init_res`, and
//! integrity and privacy protected bodies are wrapped in `rpc_gss_integ_data`
//! and `rpc_gss_priv_data` respectively.

// Keep RFC naming conventions
#![allow(non_camel_case_types)]

use std::io::{Read, Write};

use num_derive::{FromPrimitive, ToPrimitive};

use super::*;

/// The only credential version defined by RFC 2203.
pub const RPCSEC_GSS_VERSION: u32 = 1;

/// Sequence numbers at or above this value must never be sent.
pub const MAXSEQ: u32 = 0x8000_0000;

/// GSS-API major status: the step completed.
pub const GSS_S_COMPLETE: u32 = 0;
/// GSS-API major status: another token exchange is needed.
pub const GSS_S_CONTINUE_NEEDED: u32 = 1;

/// Control procedure carried in every `RPCSEC_GSS` credential.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum rpc_gss_proc_t {
    #[default]
    RPCSEC_GSS_DATA = 0,
    RPCSEC_GSS_INIT = 1,
    RPCSEC_GSS_CONTINUE_INIT = 2,
    RPCSEC_GSS_DESTROY = 3,
}
impl SerializeEnum for rpc_gss_proc_t {}
impl DeserializeEnum for rpc_gss_proc_t {}

/// Protection applied to call arguments and reply results.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum rpc_gss_service_t {
    /// Authentication only, bodies travel in the clear
    #[default]
    rpc_gss_svc_none = 1,
    /// Bodies are checksummed with a MIC
    rpc_gss_svc_integrity = 2,
    /// Bodies are sealed with GSS wrap
    rpc_gss_svc_privacy = 3,
}
impl SerializeEnum for rpc_gss_service_t {}
impl DeserializeEnum for rpc_gss_service_t {}

/// Version 1 credential body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct rpc_gss_cred_vers_1_t {
    /// Control procedure
    pub gss_proc: rpc_gss_proc_t,
    /// Sequence number, zero during context creation
    pub seq_num: u32,
    /// Service used
    pub service: rpc_gss_service_t,
    /// Server-assigned context handle, empty in the first INIT call
    pub handle: Vec<u8>,
}
DeserializeStruct!(rpc_gss_cred_vers_1_t, gss_proc, seq_num, service, handle);
SerializeStruct!(rpc_gss_cred_vers_1_t, gss_proc, seq_num, service, handle);

/// Credential union discriminated by the RPCSEC_GSS version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum rpc_gss_cred_t {
    RPCSEC_GSS_VERS_1(rpc_gss_cred_vers_1_t),
}

impl Default for rpc_gss_cred_t {
    fn default() -> rpc_gss_cred_t {
        rpc_gss_cred_t::RPCSEC_GSS_VERS_1(rpc_gss_cred_vers_1_t::default())
    }
}

impl Serialize for rpc_gss_cred_t {
    fn serialize<W: Write>(&self, dest: &mut W) -> Result<()> {
        match self {
            rpc_gss_cred_t::RPCSEC_GSS_VERS_1(v) => {
                RPCSEC_GSS_VERSION.serialize(dest)?;
                v.serialize(dest)
            }
        }
    }
}

impl Deserialize for rpc_gss_cred_t {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> Result<()> {
        match deserialize::<u32>(src)? {
            RPCSEC_GSS_VERSION => *self = rpc_gss_cred_t::RPCSEC_GSS_VERS_1(deserialize(src)?),
            version => {
                return Err(Error::Corrupt(format!("unsupported RPCSEC_GSS version {version}")))
            }
        }
        Ok(())
    }
}

/// Result of an INIT or CONTINUE_INIT call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct rpc_gss_init_res {
    /// Context handle the client must present from now on
    pub handle: Vec<u8>,
    /// GSS-API major status of the server's accept step
    pub gss_major: u32,
    /// GSS-API minor status of the server's accept step
    pub gss_minor: u32,
    /// Size of the server's replay window
    pub seq_window: u32,
    /// Token to feed to the client's next init step
    pub gss_token: Vec<u8>,
}
DeserializeStruct!(rpc_gss_init_res, handle, gss_major, gss_minor, seq_window, gss_token);
SerializeStruct!(rpc_gss_init_res, handle, gss_major, gss_minor, seq_window, gss_token);

/// Integrity protected body: `uint seq_num` plus arguments, then a MIC over them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct rpc_gss_integ_data {
    pub databody_integ: Vec<u8>,
    pub checksum: Vec<u8>,
}
DeserializeStruct!(rpc_gss_integ_data, databody_integ, checksum);
SerializeStruct!(rpc_gss_integ_data, databody_integ, checksum);

/// Privacy protected body: the sealed `uint seq_num` plus arguments.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct rpc_gss_priv_data {
    pub databody_priv: Vec<u8>,
}
DeserializeStruct!(rpc_gss_priv_data, databody_priv);
SerializeStruct!(rpc_gss_priv_data, databody_priv);
