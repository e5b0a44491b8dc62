//! Protocol module implements the security layer of ONC RPC clients.
//!
//! This module contains three main components:
//!
//! - `xdr`: External Data Representation (XDR) for serialization and deserialization
//!   of data structures according to RFC 4506, including the RPC and RPCSEC_GSS
//!   wire structures.
//!
//! - `auth`: The per-call security flavors `AUTH_NONE`, `AUTH_SYS` and
//!   `RPCSEC_GSS` (RFC 2203), behind one capability trait.
//!
//! - `rpc`: Remote Procedure Call (RPC) client orchestration: building secured calls
//!   and validating their replies as defined in RFC 5531.

pub mod auth;
pub mod rpc;
pub mod xdr;
