//! Shared harness: a mock GSS-API mechanism and an in-memory `RPCSEC_GSS` server.
#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Mutex;

use anyhow::{anyhow, bail, ensure};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use rpcsec::auth::{GssProvider, InitStatus, InitStep};
use rpcsec::error::{Error, Result};
use rpcsec::xdr::rpc::{
    accept_body, auth_error_reply, auth_flavor, auth_stat, make_accepted_error_reply,
    make_success_reply, opaque_auth, reply_body, rpc_body, rpc_msg, CALL, RPC_VERSION,
};
use rpcsec::xdr::rpcsec_gss::{
    rpc_gss_cred_t, rpc_gss_init_res, rpc_gss_integ_data, rpc_gss_priv_data, rpc_gss_proc_t,
    rpc_gss_service_t, GSS_S_COMPLETE, GSS_S_CONTINUE_NEEDED,
};
use rpcsec::xdr::{self, Packer, Unpacker};

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_KEY: &[u8] = b"mock session key";
pub const HANDLE: &[u8] = b"ctx-0001";
pub const WINDOW: u32 = 128;

pub fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn mic(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn check_mic(key: &[u8], data: &[u8], token: &[u8]) -> anyhow::Result<()> {
    let mut mac = HmacSha256::new_from_slice(key)?;
    mac.update(data);
    mac.verify_slice(token).map_err(|_| anyhow!("MIC mismatch"))
}

/// Seals as `tag || data ^ key`, where tag is a MIC over the plaintext.
fn seal(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut sealed = mic(key, data);
    sealed.extend(data.iter().zip(key.iter().cycle()).map(|(d, k)| d ^ k));
    sealed
}

fn open(key: &[u8], sealed: &[u8]) -> anyhow::Result<Vec<u8>> {
    ensure!(sealed.len() >= 32, "sealed token too short");
    let (tag, body) = sealed.split_at(32);
    let data: Vec<u8> = body.iter().zip(key.iter().cycle()).map(|(d, k)| d ^ k).collect();
    check_mic(key, &data, tag)?;
    Ok(data)
}

/// Client side mechanism. The session key is the last token received from
/// the server.
pub struct MockProvider {
    /// Server tokens needed before the client side completes
    pub rounds: usize,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self { rounds: 1 }
    }
}

#[derive(Debug, Default)]
pub struct MockContext {
    key: Vec<u8>,
    seen: usize,
}

impl GssProvider for MockProvider {
    type Name = String;
    type Context = MockContext;

    fn import_target_name(&self, principal: &str) -> anyhow::Result<String> {
        ensure!(principal.contains('@'), "not a host based service name: {principal}");
        Ok(principal.to_string())
    }

    fn init_context(
        &self,
        target: &String,
        input_token: &[u8],
        context: Option<MockContext>,
    ) -> anyhow::Result<InitStep<MockContext>> {
        let mut context = context.unwrap_or_default();
        if !input_token.is_empty() {
            context.seen += 1;
            context.key = input_token.to_vec();
        }
        let status = if context.seen >= self.rounds {
            InitStatus::Complete
        } else {
            InitStatus::ContinueNeeded
        };
        let output_token = format!("{target}#{}", context.seen).into_bytes();
        Ok(InitStep { status, output_token, context })
    }

    fn get_mic(&self, context: &mut MockContext, data: &[u8]) -> anyhow::Result<Vec<u8>> {
        ensure!(!context.key.is_empty(), "context has no key");
        Ok(mic(&context.key, data))
    }

    fn verify_mic(
        &self,
        context: &mut MockContext,
        data: &[u8],
        token: &[u8],
    ) -> anyhow::Result<()> {
        check_mic(&context.key, data, token)
    }

    fn wrap(&self, context: &mut MockContext, data: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(seal(&context.key, data))
    }

    fn unwrap(&self, context: &mut MockContext, sealed: &[u8]) -> anyhow::Result<Vec<u8>> {
        open(&context.key, sealed)
    }
}

/// Misbehaviours the server can be told to exhibit.
#[derive(Clone, Debug, Default)]
pub struct Faults {
    /// Flip byte 0 of the result checksum for this sequence number
    pub corrupt_checksum_seq: Option<u32>,
    /// Bind this many more than the call's sequence number into results
    pub result_seq_offset: u32,
    /// Answer data calls with `RPCSEC_GSS_CTXPROBLEM`
    pub context_problem: bool,
    /// Sign the INIT reply over the wrong window
    pub bad_init_verifier: bool,
}

#[derive(Default)]
struct ServerState {
    rounds_seen: usize,
    creations: usize,
    established: bool,
    destroyed: bool,
    sequences: BTreeSet<u32>,
    faults: Faults,
}

/// In-memory `RPCSEC_GSS` server echoing the arguments of every data call.
pub struct GssServer {
    /// Context creation calls needed before the server completes
    rounds: usize,
    state: Mutex<ServerState>,
}

impl Default for GssServer {
    fn default() -> Self {
        Self::new(1)
    }
}

struct ParsedCall<'a> {
    xid: u32,
    header: &'a [u8],
    cred: opaque_auth,
    verf: opaque_auth,
    args: &'a [u8],
}

fn parse_call(call: &[u8]) -> Result<ParsedCall<'_>> {
    let mut unpacker = Unpacker::new(call);
    let xid = unpacker.unpack_uint()?;
    assert_eq!(unpacker.unpack_uint()?, CALL);
    assert_eq!(unpacker.unpack_uint()?, RPC_VERSION);
    let _prog = unpacker.unpack_uint()?;
    let _vers = unpacker.unpack_uint()?;
    let _proc = unpacker.unpack_uint()?;
    let cred = unpacker.unpack::<opaque_auth>()?;
    let header = unpacker.consumed();
    let verf = unpacker.unpack::<opaque_auth>()?;
    Ok(ParsedCall { xid, header, cred, verf, args: unpacker.take_remaining() })
}

fn with_results(msg: &rpc_msg, results: &[u8]) -> Result<Vec<u8>> {
    let mut reply = xdr::to_bytes(msg)?;
    reply.extend_from_slice(results);
    Ok(reply)
}

impl GssServer {
    pub fn new(rounds: usize) -> Self {
        Self { rounds, state: Mutex::new(ServerState::default()) }
    }

    pub fn set_faults(&self, faults: Faults) {
        self.state.lock().unwrap().faults = faults;
    }

    /// Sequence numbers of the data calls accepted so far.
    pub fn sequences(&self) -> Vec<u32> {
        self.state.lock().unwrap().sequences.iter().copied().collect()
    }

    /// Context creation calls received so far.
    pub fn context_creations(&self) -> usize {
        self.state.lock().unwrap().creations
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().unwrap().destroyed
    }

    /// A transport delivering calls to this server.
    pub fn transport(&self) -> impl FnMut(&[u8]) -> Result<Vec<u8>> + '_ {
        move |call: &[u8]| self.handle(call)
    }

    /// Answers one call. Replayed sequence numbers are silently dropped.
    pub fn handle(&self, call: &[u8]) -> Result<Vec<u8>> {
        let call = parse_call(call)?;
        assert_eq!(call.cred.flavor, auth_flavor::RPCSEC_GSS);
        let rpc_gss_cred_t::RPCSEC_GSS_VERS_1(cred) = xdr::from_bytes(&call.cred.body)?;
        let mut state = self.state.lock().unwrap();

        match cred.gss_proc {
            rpc_gss_proc_t::RPCSEC_GSS_INIT | rpc_gss_proc_t::RPCSEC_GSS_CONTINUE_INIT => {
                assert_eq!(cred.seq_num, 0);
                assert_eq!(call.verf, opaque_auth::none());
                let _token = xdr::from_bytes::<Vec<u8>>(call.args)?;
                if cred.gss_proc == rpc_gss_proc_t::RPCSEC_GSS_INIT {
                    state.rounds_seen = 0;
                    state.sequences.clear();
                }
                state.rounds_seen += 1;
                state.creations += 1;
                let (res, verf) = if state.rounds_seen >= self.rounds {
                    state.established = true;
                    let window = if state.faults.bad_init_verifier { WINDOW + 1 } else { WINDOW };
                    let verf = opaque_auth::new(
                        auth_flavor::RPCSEC_GSS,
                        mic(SESSION_KEY, &xdr::to_bytes(&window)?),
                    );
                    let res = rpc_gss_init_res {
                        handle: HANDLE.to_vec(),
                        gss_major: GSS_S_COMPLETE,
                        gss_minor: 0,
                        seq_window: WINDOW,
                        gss_token: SESSION_KEY.to_vec(),
                    };
                    (res, verf)
                } else {
                    let res = rpc_gss_init_res {
                        handle: HANDLE.to_vec(),
                        gss_major: GSS_S_CONTINUE_NEEDED,
                        gss_minor: 0,
                        seq_window: 0,
                        gss_token: b"server continue".to_vec(),
                    };
                    (res, opaque_auth::none())
                };
                with_results(&make_success_reply(call.xid, verf), &xdr::to_bytes(&res)?)
            }
            rpc_gss_proc_t::RPCSEC_GSS_DATA | rpc_gss_proc_t::RPCSEC_GSS_DESTROY => {
                if !state.established || cred.handle != HANDLE {
                    return with_results(
                        &auth_error_reply(call.xid, auth_stat::RPCSEC_GSS_CREDPROBLEM),
                        &[],
                    );
                }
                if !state.sequences.insert(cred.seq_num) {
                    return Err(Error::NoReply);
                }
                if state.faults.context_problem {
                    return with_results(
                        &auth_error_reply(call.xid, auth_stat::RPCSEC_GSS_CTXPROBLEM),
                        &[],
                    );
                }
                if call.verf.flavor != auth_flavor::RPCSEC_GSS
                    || check_mic(SESSION_KEY, call.header, &call.verf.body).is_err()
                {
                    return with_results(
                        &auth_error_reply(call.xid, auth_stat::RPCSEC_GSS_CREDPROBLEM),
                        &[],
                    );
                }
                let seq = cred.seq_num;
                let seq_mic = mic(SESSION_KEY, &xdr::to_bytes(&seq)?);
                let verf = opaque_auth::new(auth_flavor::RPCSEC_GSS, seq_mic);

                if cred.gss_proc == rpc_gss_proc_t::RPCSEC_GSS_DESTROY {
                    assert!(call.args.is_empty());
                    state.established = false;
                    state.destroyed = true;
                    return with_results(&make_success_reply(call.xid, verf), &[]);
                }

                let Ok(args) = unwrap_args(cred.service, seq, call.args) else {
                    return with_results(
                        &make_accepted_error_reply(call.xid, accept_body::GARBAGE_ARGS),
                        &[],
                    );
                };
                let bound_seq = seq + state.faults.result_seq_offset;
                let results = wrap_results(cred.service, bound_seq, &args, &state.faults, seq)?;
                with_results(&make_success_reply(call.xid, verf), &results)
            }
        }
    }
}

fn unwrap_args(service: rpc_gss_service_t, seq: u32, args: &[u8]) -> anyhow::Result<Vec<u8>> {
    let body = match service {
        rpc_gss_service_t::rpc_gss_svc_none => return Ok(args.to_vec()),
        rpc_gss_service_t::rpc_gss_svc_integrity => {
            let data = xdr::from_bytes::<rpc_gss_integ_data>(args)?;
            check_mic(SESSION_KEY, &data.databody_integ, &data.checksum)?;
            data.databody_integ
        }
        rpc_gss_service_t::rpc_gss_svc_privacy => {
            let data = xdr::from_bytes::<rpc_gss_priv_data>(args)?;
            open(SESSION_KEY, &data.databody_priv)?
        }
    };
    let mut unpacker = Unpacker::new(&body);
    if unpacker.unpack_uint()? != seq {
        bail!("arguments bound to another sequence number");
    }
    Ok(unpacker.take_remaining().to_vec())
}

fn wrap_results(
    service: rpc_gss_service_t,
    bound_seq: u32,
    results: &[u8],
    faults: &Faults,
    seq: u32,
) -> Result<Vec<u8>> {
    let mut body = Packer::new();
    body.pack_uint(bound_seq)?;
    body.append(results);
    let body = body.into_inner();
    match service {
        rpc_gss_service_t::rpc_gss_svc_none => Ok(results.to_vec()),
        rpc_gss_service_t::rpc_gss_svc_integrity => {
            let mut checksum = mic(SESSION_KEY, &body);
            if faults.corrupt_checksum_seq == Some(seq) {
                checksum[0] ^= 0xff;
            }
            Ok(xdr::to_bytes(&rpc_gss_integ_data { databody_integ: body, checksum })?)
        }
        rpc_gss_service_t::rpc_gss_svc_privacy => {
            Ok(xdr::to_bytes(&rpc_gss_priv_data { databody_priv: seal(SESSION_KEY, &body) })?)
        }
    }
}

/// Splits a reply into its verifier and results.
pub fn split_reply(reply: &[u8]) -> (opaque_auth, Vec<u8>) {
    let mut unpacker = Unpacker::new(reply);
    let msg = unpacker.unpack::<rpc_msg>().expect("decode reply");
    let rpc_body::REPLY(reply_body::MSG_ACCEPTED(accepted)) = msg.body else {
        panic!("not an accepted reply");
    };
    (accepted.verf, unpacker.take_remaining().to_vec())
}

/// Replaces the verifier of an accepted reply.
pub fn splice_verifier(reply: &[u8], verf: opaque_auth) -> Vec<u8> {
    let mut unpacker = Unpacker::new(reply);
    let mut msg = unpacker.unpack::<rpc_msg>().expect("decode reply");
    let rpc_body::REPLY(reply_body::MSG_ACCEPTED(accepted)) = &mut msg.body else {
        panic!("not an accepted reply");
    };
    accepted.verf = verf;
    with_results(&msg, unpacker.take_remaining()).expect("encode reply")
}
