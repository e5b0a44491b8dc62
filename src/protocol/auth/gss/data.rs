//! Data protection of `RPCSEC_GSS` call arguments and reply results
//! (RFC 2203 section 5.3.2).
//!
//! Both services bind the sequence number into the protected body:
//!
//! ```text
//! integrity:  opaque databody_integ<> = uint seq_num ++ procedure data
//!             opaque checksum<>       = MIC(databody_integ)
//! privacy:    opaque databody_priv<>  = wrap(uint seq_num ++ procedure data)
//! ```

use tracing::warn;

use crate::error::{Error, Result};
use crate::xdr::rpcsec_gss::{rpc_gss_integ_data, rpc_gss_priv_data};
use crate::xdr::{self, Packer, Unpacker};

use super::provider::GssProvider;
use super::Service;

fn databody(seq: u32, data: &[u8]) -> Result<Vec<u8>> {
    let mut body = Packer::with_capacity(data.len() + 4);
    body.pack_uint(seq)?;
    body.append(data);
    Ok(body.into_inner())
}

/// Checks the sequence number a server bound into a result body and strips it.
fn strip_sequence(seq: u32, body: &[u8]) -> Result<Vec<u8>> {
    let mut unpacker = Unpacker::new(body);
    let got = unpacker.unpack_uint()?;
    if got != seq {
        warn!("reply bound to sequence {got}, expected {seq}");
        return Err(Error::SequenceMismatch { expected: seq, got });
    }
    Ok(unpacker.take_remaining().to_vec())
}

/// Protects call arguments.
pub(super) fn wrap<P: GssProvider>(
    provider: &P,
    context: &mut P::Context,
    service: Service,
    seq: u32,
    args: &[u8],
) -> Result<Vec<u8>> {
    match service {
        Service::None => Ok(args.to_vec()),
        Service::Integrity => {
            let databody_integ = databody(seq, args)?;
            let checksum = provider.get_mic(context, &databody_integ).map_err(Error::Provider)?;
            Ok(xdr::to_bytes(&rpc_gss_integ_data { databody_integ, checksum })?)
        }
        Service::Privacy => {
            let databody_priv =
                provider.wrap(context, &databody(seq, args)?).map_err(Error::Provider)?;
            Ok(xdr::to_bytes(&rpc_gss_priv_data { databody_priv })?)
        }
    }
}

/// Verifies and opens reply results.
pub(super) fn unwrap<P: GssProvider>(
    provider: &P,
    context: &mut P::Context,
    service: Service,
    seq: u32,
    results: &[u8],
) -> Result<Vec<u8>> {
    match service {
        Service::None => Ok(results.to_vec()),
        Service::Integrity => {
            let data = xdr::from_bytes::<rpc_gss_integ_data>(results)?;
            provider.verify_mic(context, &data.databody_integ, &data.checksum).map_err(|e| {
                warn!("result checksum rejected: {e:#}");
                Error::IntegrityCheckFailed
            })?;
            strip_sequence(seq, &data.databody_integ)
        }
        Service::Privacy => {
            let data = xdr::from_bytes::<rpc_gss_priv_data>(results)?;
            let body = provider.unwrap(context, &data.databody_priv).map_err(|e| {
                warn!("sealed results rejected: {e:#}");
                Error::IntegrityCheckFailed
            })?;
            strip_sequence(seq, &body)
        }
    }
}
