//! `RPCSEC_GSS` context state machine.
//!
//! ```text
//!                 Start                 InitReply (both sides complete)
//! Uninitialized ---------> Negotiating ----------------------------------> Established
//!       ^                   |   ^  InitReply (continue needed)                   |
//!       |                   |   +--------+                                       |
//!       +-------------------+------------+------------ Teardown -----------------+
//! ```
//!
//! While negotiating, credentials carry `RPCSEC_GSS_INIT` or
//! `RPCSEC_GSS_CONTINUE_INIT` with sequence number zero and bodies are never
//! transformed. Once established, every data call takes the next sequence
//! number, starting at 1. The counter never wraps: reaching [`MAXSEQ`]
//! tears the context down.

use anyhow::anyhow;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::xdr::rpc::{auth_flavor, opaque_auth};
use crate::xdr::rpcsec_gss::{
    rpc_gss_cred_vers_1_t, rpc_gss_init_res, rpc_gss_proc_t, rpc_gss_service_t,
    GSS_S_COMPLETE, GSS_S_CONTINUE_NEEDED, MAXSEQ,
};
use crate::xdr;

use super::provider::{GssProvider, InitStatus};
use super::Service;
use crate::protocol::auth::CallSecurity;

/// Lifecycle state of a security context.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ContextState {
    #[default]
    Uninitialized,
    Negotiating,
    Established,
}

/// Inputs of the state machine.
pub(super) enum Event<'a> {
    /// Begin negotiation with an empty input token.
    Start,
    /// The server answered an INIT or CONTINUE_INIT call.
    InitReply { res: &'a rpc_gss_init_res, verf: &'a opaque_auth },
    /// Drop the context.
    Teardown,
}

/// State owned by one `AuthGss` instance.
pub(super) struct SecurityContext<C> {
    state: ContextState,
    /// Last sequence number issued
    seq: u32,
    service: Service,
    handle: Vec<u8>,
    window: u32,
    /// Bumped every time negotiation starts, so replies can be matched to the
    /// context that issued their credential
    generation: u64,
    crypto: Option<C>,
    client_status: Option<InitStatus>,
    pending_token: Option<Vec<u8>>,
    init_proc: rpc_gss_proc_t,
    torn_down: bool,
}

impl<C> SecurityContext<C> {
    pub fn new(service: Service) -> Self {
        Self {
            state: ContextState::Uninitialized,
            seq: 0,
            service,
            handle: Vec::new(),
            window: 0,
            generation: 0,
            crypto: None,
            client_status: None,
            pending_token: None,
            init_proc: rpc_gss_proc_t::RPCSEC_GSS_INIT,
            torn_down: false,
        }
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn sequence(&self) -> u32 {
        self.seq
    }

    pub fn service(&self) -> Service {
        self.service
    }

    pub fn set_service(&mut self, service: Service) {
        self.service = service;
    }

    pub fn handle(&self) -> &[u8] {
        &self.handle
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the context was never negotiated nor torn down.
    pub fn is_fresh(&self) -> bool {
        self.state == ContextState::Uninitialized && !self.torn_down
    }

    pub fn take_pending_token(&mut self) -> Option<Vec<u8>> {
        self.pending_token.take()
    }

    /// Crypto context of an established context that issued `call`.
    pub fn crypto_for(&mut self, call: &CallSecurity) -> Result<&mut C> {
        if call.generation != self.generation {
            return Err(Error::NotEstablished);
        }
        self.established_crypto()
    }

    pub fn established_crypto(&mut self) -> Result<&mut C> {
        match self.state {
            ContextState::Established => self.crypto.as_mut().ok_or(Error::NotEstablished),
            _ => Err(Error::NotEstablished),
        }
    }

    /// The single transition function of the state machine.
    pub fn step<P>(&mut self, provider: &P, target: &P::Name, event: Event<'_>) -> Result<()>
    where
        P: GssProvider<Context = C>,
    {
        match (self.state, event) {
            (_, Event::Teardown) => {
                self.teardown();
                Ok(())
            }
            (ContextState::Uninitialized, Event::Start) => {
                let step = provider.init_context(target, &[], None).map_err(Error::Provider)?;
                self.generation += 1;
                self.seq = 0;
                self.handle.clear();
                self.init_proc = rpc_gss_proc_t::RPCSEC_GSS_INIT;
                self.crypto = Some(step.context);
                self.client_status = Some(step.status);
                self.pending_token = Some(step.output_token);
                self.state = ContextState::Negotiating;
                debug!("GSS context {} negotiating ({:?})", self.generation, step.status);
                Ok(())
            }
            (ContextState::Negotiating, Event::InitReply { res, verf }) => {
                self.accept_init_reply(provider, target, res, verf)
            }
            (state, Event::Start) => {
                Err(Error::Provider(anyhow!("cannot start negotiation in state {state:?}")))
            }
            (state, Event::InitReply { .. }) => {
                Err(Error::Provider(anyhow!("unexpected context creation reply in state {state:?}")))
            }
        }
    }

    fn accept_init_reply<P>(
        &mut self,
        provider: &P,
        target: &P::Name,
        res: &rpc_gss_init_res,
        verf: &opaque_auth,
    ) -> Result<()>
    where
        P: GssProvider<Context = C>,
    {
        let server_complete = match res.gss_major {
            GSS_S_COMPLETE => true,
            GSS_S_CONTINUE_NEEDED => false,
            major => {
                return Err(Error::Provider(anyhow!(
                    "server failed to accept context: major {major:#x}, minor {:#x}",
                    res.gss_minor
                )))
            }
        };
        self.handle = res.handle.clone();

        match self.client_status {
            Some(InitStatus::ContinueNeeded) => {
                if server_complete && res.gss_token.is_empty() {
                    return Err(Error::UnexpectedComplete);
                }
                let step = provider
                    .init_context(target, &res.gss_token, self.crypto.take())
                    .map_err(Error::Provider)?;
                self.crypto = Some(step.context);
                self.client_status = Some(step.status);
                if !server_complete {
                    self.pending_token = Some(step.output_token);
                    self.init_proc = rpc_gss_proc_t::RPCSEC_GSS_CONTINUE_INIT;
                    debug!("GSS context {} continues negotiation", self.generation);
                    return Ok(());
                }
                if step.status != InitStatus::Complete {
                    return Err(Error::UnexpectedComplete);
                }
            }
            Some(InitStatus::Complete) if !server_complete => {
                warn!("server wants another context token after the client completed");
                return Err(Error::ContextProblem);
            }
            Some(InitStatus::Complete) => {}
            None => return Err(Error::Provider(anyhow!("negotiation state lost"))),
        }

        // The final INIT reply is verified by a MIC over the sequence window.
        if verf.flavor != auth_flavor::RPCSEC_GSS {
            return Err(Error::BadReplyVerifier);
        }
        let window = xdr::to_bytes(&res.seq_window)?;
        let crypto = self.crypto.as_mut().ok_or(Error::NotEstablished)?;
        provider.verify_mic(crypto, &window, &verf.body).map_err(|e| {
            warn!("context creation verifier rejected: {e:#}");
            Error::BadReplyVerifier
        })?;

        self.window = res.seq_window;
        self.seq = 0;
        self.client_status = None;
        self.pending_token = None;
        self.state = ContextState::Established;
        debug!("GSS context {} established, window {}", self.generation, self.window);
        Ok(())
    }

    fn teardown(&mut self) {
        if self.state != ContextState::Uninitialized {
            debug!("GSS context {} torn down after sequence {}", self.generation, self.seq);
        }
        self.state = ContextState::Uninitialized;
        self.seq = 0;
        self.handle.clear();
        self.window = 0;
        self.crypto = None;
        self.client_status = None;
        self.pending_token = None;
        self.torn_down = true;
    }

    /// Takes the next sequence number. Numbers are consumed even if the
    /// call fails afterwards.
    fn next_sequence(&mut self) -> Result<u32> {
        let next = self.seq + 1;
        if next >= MAXSEQ {
            warn!("GSS context {} ran out of sequence numbers", self.generation);
            self.teardown();
            return Err(Error::SequenceExhausted);
        }
        self.seq = next;
        Ok(next)
    }

    /// Credential of the next context creation call. Only valid while
    /// negotiating; the arguments of such a call are never transformed.
    pub fn init_credential(&self) -> Result<(rpc_gss_cred_vers_1_t, CallSecurity)> {
        if self.state != ContextState::Negotiating {
            return Err(Error::NotEstablished);
        }
        Ok((
            rpc_gss_cred_vers_1_t {
                gss_proc: self.init_proc,
                seq_num: 0,
                service: rpc_gss_service_t::rpc_gss_svc_none,
                handle: self.handle.clone(),
            },
            CallSecurity { seq: None, service: Service::None, generation: self.generation },
        ))
    }

    /// Credential of the next data call. Fails unless the context is
    /// established, so no data call ever leaves under a creation credential.
    pub fn data_credential(&mut self) -> Result<(rpc_gss_cred_vers_1_t, CallSecurity)> {
        if self.state != ContextState::Established {
            return Err(Error::NotEstablished);
        }
        let seq = self.next_sequence()?;
        Ok((
            rpc_gss_cred_vers_1_t {
                gss_proc: rpc_gss_proc_t::RPCSEC_GSS_DATA,
                seq_num: seq,
                service: self.service.into(),
                handle: self.handle.clone(),
            },
            CallSecurity { seq: Some(seq), service: self.service, generation: self.generation },
        ))
    }

    /// Credential of a context destruction call. Its void arguments and
    /// results are never transformed.
    pub fn destroy_credential(&mut self) -> Result<(rpc_gss_cred_vers_1_t, CallSecurity)> {
        if self.state != ContextState::Established {
            return Err(Error::NotEstablished);
        }
        let seq = self.next_sequence()?;
        Ok((
            rpc_gss_cred_vers_1_t {
                gss_proc: rpc_gss_proc_t::RPCSEC_GSS_DESTROY,
                seq_num: seq,
                service: self.service.into(),
                handle: self.handle.clone(),
            },
            CallSecurity { seq: Some(seq), service: Service::None, generation: self.generation },
        ))
    }

    #[cfg(test)]
    pub fn force_sequence(&mut self, seq: u32) {
        self.seq = seq;
    }
}
