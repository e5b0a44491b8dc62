//! rpcsec - the security and wire-encoding layer of an ONC RPC client
//!
//! This library secures each remote procedure call and its reply. It encodes
//! call headers with XDR, attaches the credential and verifier of the chosen
//! security flavor, protects arguments and results under `RPCSEC_GSS`, and
//! validates every reply before handing its results back.
//!
//! ## Supported Features
//!
//! - XDR codec for the RFC 4506 primitive and composite types
//! - `AUTH_NONE` and `AUTH_SYS` credentials
//! - `RPCSEC_GSS` context negotiation, sequence numbering and the
//!   none/integrity/privacy services, on top of an injected GSS-API provider
//! - Transport independent: the client produces and consumes byte buffers
//!
//! ## Main Components
//!
//! - `protocol`: XDR encoding, the security flavors and the RPC client.
//!
//! - `config`: Selection of a security flavor at connection setup.
//!
//! - `error`: The error type shared by every layer.
//!
//! ## Standards Compliance
//!
//! This implementation follows these RFCs:
//! - RFC 5531: RPC: Remote Procedure Call Protocol Specification Version 2 (obsoletes RFC 1831)
//! - RFC 4506: XDR: External Data Representation Standard (obsoletes RFC 1832)
//! - RFC 2203: RPCSEC_GSS Protocol Specification
//!
//! ## Usage
//!
//! Build a flavor from a `config::SecurityConfig`, wrap it in an `rpc::RpcClient`
//! and pass any `rpc::Transport` to `RpcClient::call`.

pub mod config;
pub mod error;
pub mod protocol;

pub use protocol::{auth, rpc, xdr};
