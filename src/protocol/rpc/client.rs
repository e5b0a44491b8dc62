//! Secure call orchestration.
//!
//! [`RpcClient`] turns a procedure number and encoded arguments into a
//! complete RPC call message, and a raw reply message back into the
//! procedure's results. It performs no I/O of its own: the [`Transport`]
//! helpers only chain the two halves around a caller-supplied carrier.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, trace, warn};
use tracing_attributes::instrument;

use crate::error::{Error, Result};
use crate::protocol::auth::{CallSecurity, SecurityFlavor, Verifier};
use crate::xdr::rpc::{
    accept_body, rejected_reply, reply_body, rpc_body, rpc_msg, CALL, RPC_VERSION,
};
use crate::xdr::{self, Packer, Unpacker};

use super::transport::Transport;

/// The null procedure every RPC program implements; context creation and
/// destruction calls are addressed to it.
pub const NULL_PROC: u32 = 0;

/// Initial capacity of a call buffer
const DEFAULT_CALL_BUFFER_CAPACITY: usize = 512;

/// A call ready for the transport, with what is needed to open its reply.
#[derive(Clone, Debug)]
pub struct PreparedCall {
    xid: u32,
    proc: u32,
    security: CallSecurity,
    body: Vec<u8>,
}

impl PreparedCall {
    pub fn xid(&self) -> u32 {
        self.xid
    }

    pub fn proc(&self) -> u32 {
        self.proc
    }

    /// GSS sequence number bound into the credential, if any.
    pub fn seq(&self) -> Option<u32> {
        self.security.seq
    }

    pub fn security(&self) -> &CallSecurity {
        &self.security
    }

    /// The complete call message.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

/// Client side of one RPC program version, secured by one flavor.
///
/// The client is shared freely between threads. Transaction ids come from
/// an atomic counter that wraps around; the flavor serializes whatever
/// state it keeps. Context negotiation runs one at a time: callers that find
/// the context not yet established wait for the running negotiation.
#[derive(Debug)]
pub struct RpcClient {
    program: u32,
    version: u32,
    xid: AtomicU32,
    security: Arc<dyn SecurityFlavor>,
    negotiation: Mutex<()>,
}

impl RpcClient {
    pub fn new(program: u32, version: u32, security: Arc<dyn SecurityFlavor>) -> Self {
        Self { program, version, xid: AtomicU32::new(1), security, negotiation: Mutex::new(()) }
    }

    /// Starts transaction ids at `xid` instead of 1.
    pub fn with_initial_xid(self, xid: u32) -> Self {
        self.xid.store(xid, Ordering::Relaxed);
        self
    }

    pub fn program(&self) -> u32 {
        self.program
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn security(&self) -> &Arc<dyn SecurityFlavor> {
        &self.security
    }

    fn next_xid(&self) -> u32 {
        // fetch_add wraps on overflow
        self.xid.fetch_add(1, Ordering::Relaxed)
    }

    /// Builds a complete call message for `proc` carrying already encoded `args`.
    ///
    /// The header is serialized field by field up to the procedure number;
    /// the flavor then appends the credential, a verifier computed over the
    /// bytes written so far and the (possibly protected) arguments.
    ///
    /// Fails with [`Error::NotEstablished`] while a context is being negotiated.
    pub fn prepare_call(&self, proc: u32, args: &[u8]) -> Result<PreparedCall> {
        let xid = self.next_xid();
        let header = self.call_header(xid, proc, args.len())?;
        let secured = self.security.secure_call(header, args).map_err(|e| self.fail(e))?;
        debug!(
            "prepared call xid {} prog {} vers {} proc {} flavor {:?} seq {:?}",
            xid,
            self.program,
            self.version,
            proc,
            self.security.flavor(),
            secured.security.seq
        );
        Ok(PreparedCall { xid, proc, security: secured.security, body: secured.body })
    }

    fn call_header(&self, xid: u32, proc: u32, args_len: usize) -> Result<Packer> {
        let mut header = Packer::with_capacity(DEFAULT_CALL_BUFFER_CAPACITY + args_len);
        header.pack_uint(xid)?;
        header.pack_uint(CALL)?;
        header.pack_uint(RPC_VERSION)?;
        header.pack_uint(self.program)?;
        header.pack_uint(self.version)?;
        header.pack_uint(proc)?;
        Ok(header)
    }

    /// Context creation call carrying `token`.
    fn prepare_handshake(&self, token: &[u8]) -> Result<PreparedCall> {
        let xid = self.next_xid();
        let args = xdr::to_bytes(token)?;
        let header = self.call_header(xid, NULL_PROC, args.len())?;
        let secured = self.security.secure_handshake(header, &args)?;
        debug!("prepared context creation call xid {} ({} token bytes)", xid, token.len());
        Ok(PreparedCall { xid, proc: NULL_PROC, security: secured.security, body: secured.body })
    }

    /// Validates a reply message against the call it answers and returns the
    /// procedure results.
    pub fn process_reply(&self, call: &PreparedCall, reply: &[u8]) -> Result<Vec<u8>> {
        self.open_reply(call, reply).map(|(_, results)| results)
    }

    /// Decodes a reply, checks its verifier and removes the call's protection
    /// from the results.
    ///
    /// 1. The xid must match the call and the message must be a reply
    /// 2. Denied replies map to their authentication or version error
    /// 3. Accepted replies with a non-success status fail before any
    ///    verifier check, as servers do not sign them
    /// 4. The verifier is checked by the flavor, then the results unwrapped
    ///
    /// Errors that invalidate the security context tear it down here, unless
    /// a newer context has replaced the one that secured `call`.
    fn open_reply(&self, call: &PreparedCall, reply: &[u8]) -> Result<(Verifier, Vec<u8>)> {
        self.decode_reply(call, reply).map_err(|e| self.fail_call(call, e))
    }

    fn decode_reply(&self, call: &PreparedCall, reply: &[u8]) -> Result<(Verifier, Vec<u8>)> {
        let mut unpacker = Unpacker::new(reply);
        let msg = unpacker.unpack::<rpc_msg>()?;
        if msg.xid != call.xid {
            return Err(Error::XidMismatch { expected: call.xid, got: msg.xid });
        }
        let accepted = match msg.body {
            rpc_body::CALL(_) => return Err(Error::NotAReply),
            rpc_body::REPLY(reply_body::MSG_DENIED(rejected_reply::RPC_MISMATCH(info))) => {
                warn!("xid {} denied: RPC version mismatch {}..={}", call.xid, info.low, info.high);
                return Err(Error::RpcMismatch(info));
            }
            rpc_body::REPLY(reply_body::MSG_DENIED(rejected_reply::AUTH_ERROR(stat))) => {
                warn!("xid {} denied: {:?}", call.xid, stat);
                return Err(stat.into());
            }
            rpc_body::REPLY(reply_body::MSG_ACCEPTED(accepted)) => accepted,
        };
        if !matches!(accepted.reply_data, accept_body::SUCCESS) {
            debug!("xid {} accepted with {:?}", call.xid, accepted.reply_data);
            return Err(Error::Accepted(accepted.reply_data.stat()));
        }

        self.security.check_reply_verifier(&call.security, &accepted.verf)?;
        let results = self.security.unwrap_results(&call.security, unpacker.take_remaining())?;
        trace!("xid {} returned {} bytes of results", call.xid, results.len());
        Ok((accepted.verf, results))
    }

    /// Tears the security context down if `e` calls for it.
    fn fail(&self, e: Error) -> Error {
        if e.invalidates_context() {
            warn!("invalidating {:?} context: {}", self.security.flavor(), e);
            self.security.invalidate();
        }
        e
    }

    fn fail_call(&self, call: &PreparedCall, e: Error) -> Error {
        if e.invalidates_context() {
            warn!("xid {} invalidates its {:?} context: {}", call.xid, self.security.flavor(), e);
            self.security.invalidate_call(&call.security);
        }
        e
    }

    /// Negotiates the security context, if the flavor has one.
    ///
    /// Each round trip is a null-procedure call whose arguments are the
    /// flavor's next token as variable-length opaque data. A failed
    /// negotiation leaves the context torn down.
    #[instrument(skip_all, fields(prog = self.program, vers = self.version))]
    pub fn establish(&self, transport: &mut impl Transport) -> Result<()> {
        let _negotiation = self.negotiation.lock().unwrap_or_else(PoisonError::into_inner);
        self.establish_locked(transport)
    }

    fn establish_locked(&self, transport: &mut impl Transport) -> Result<()> {
        let outcome = self.negotiate(transport);
        if let Err(e) = &outcome {
            warn!("context negotiation failed: {}", e);
            self.security.invalidate();
        }
        outcome
    }

    fn negotiate(&self, transport: &mut impl Transport) -> Result<()> {
        while let Some(token) = self.security.handshake_token()? {
            let call = self.prepare_handshake(&token)?;
            let reply = transport.exchange(call.body())?;
            let (verf, results) = self.open_reply(&call, &reply)?;
            self.security.complete_handshake(&verf, &results)?;
        }
        Ok(())
    }

    /// Prepares a call, hands it to `transport` and processes the reply.
    ///
    /// A flavor that has never negotiated its context does so first; callers
    /// arriving meanwhile wait for that negotiation instead of sending data
    /// under an unfinished context. After the context has been torn down,
    /// calls fail with [`Error::NotEstablished`] until
    /// [`establish`](Self::establish) is run again.
    pub fn call(&self, transport: &mut impl Transport, proc: u32, args: &[u8]) -> Result<Vec<u8>> {
        if !self.security.is_ready() {
            let _negotiation = self.negotiation.lock().unwrap_or_else(PoisonError::into_inner);
            if self.security.needs_handshake() {
                self.establish_locked(transport)?;
            }
        }
        let call = self.prepare_call(proc, args)?;
        let reply = transport.exchange(call.body())?;
        self.process_reply(&call, &reply)
    }

    /// Asks the server to discard the security context, then tears it down
    /// locally whatever the outcome.
    #[instrument(skip_all, fields(prog = self.program, vers = self.version))]
    pub fn destroy(&self, transport: &mut impl Transport) -> Result<()> {
        let outcome = self.send_destroy(transport);
        self.security.invalidate();
        outcome
    }

    fn send_destroy(&self, transport: &mut impl Transport) -> Result<()> {
        let xid = self.next_xid();
        let header = self.call_header(xid, NULL_PROC, 0)?;

        let Some(secured) = self.security.secure_destroy(header)? else {
            return Ok(());
        };
        debug!("destroying context with xid {} seq {:?}", xid, secured.security.seq);
        let call =
            PreparedCall { xid, proc: NULL_PROC, security: secured.security, body: secured.body };
        let reply = transport.exchange(call.body())?;
        self.decode_reply(&call, &reply).map(drop)
    }
}
