//! `RPCSEC_GSS` (RFC 2203).
//!
//! [`AuthGss`] negotiates a security context through null-procedure calls,
//! then protects every data call with a sequence number bound into the
//! credential, a MIC verifier over the call header and, depending on the
//! service, integrity or privacy protection of arguments and results.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::xdr::rpc::{auth_flavor, opaque_auth};
use crate::xdr::rpcsec_gss::{
    rpc_gss_cred_t, rpc_gss_cred_vers_1_t, rpc_gss_init_res, rpc_gss_service_t,
};
use crate::xdr::{self, Packer};

use super::{CallSecurity, Credential, Identity, SecuredCall, SecurityFlavor, Verifier};

mod context;
mod data;
mod provider;

use context::{Event, SecurityContext};
pub use context::ContextState;
pub use provider::{GssProvider, InitStatus, InitStep};

/// Protection applied to procedure arguments and results.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Service {
    /// Authentication only
    #[default]
    None,
    Integrity,
    Privacy,
}

impl From<Service> for rpc_gss_service_t {
    fn from(service: Service) -> Self {
        match service {
            Service::None => rpc_gss_service_t::rpc_gss_svc_none,
            Service::Integrity => rpc_gss_service_t::rpc_gss_svc_integrity,
            Service::Privacy => rpc_gss_service_t::rpc_gss_svc_privacy,
        }
    }
}

impl From<rpc_gss_service_t> for Service {
    fn from(service: rpc_gss_service_t) -> Self {
        match service {
            rpc_gss_service_t::rpc_gss_svc_none => Service::None,
            rpc_gss_service_t::rpc_gss_svc_integrity => Service::Integrity,
            rpc_gss_service_t::rpc_gss_svc_privacy => Service::Privacy,
        }
    }
}

fn encode_credential(cred: rpc_gss_cred_vers_1_t) -> Result<Credential> {
    let body = xdr::to_bytes(&rpc_gss_cred_t::RPCSEC_GSS_VERS_1(cred))?;
    Ok(opaque_auth::new(auth_flavor::RPCSEC_GSS, body))
}

/// `RPCSEC_GSS` security flavor over an injected GSS-API provider.
///
/// The context is shared by every call made through this instance. The
/// sequence number is assigned, the header signed and the arguments wrapped
/// under one lock, so sequence numbers leave in the order they are issued.
pub struct AuthGss<P: GssProvider> {
    provider: P,
    target: P::Name,
    principal: String,
    identity: Identity,
    context: Mutex<SecurityContext<P::Context>>,
}

impl<P: GssProvider> AuthGss<P> {
    /// Imports `principal` (e.g. `nfs@server.example.com`) as the target name.
    /// No traffic happens until the context is established.
    pub fn new(provider: P, principal: &str, service: Service) -> Result<Self> {
        let target = provider.import_target_name(principal).map_err(Error::Provider)?;
        Ok(Self {
            provider,
            target,
            principal: principal.to_string(),
            identity: Identity::default(),
            context: Mutex::new(SecurityContext::new(service)),
        })
    }

    /// Sets the identity reported by [`SecurityFlavor::identity`]. The server
    /// derives the real identity from the context.
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn state(&self) -> ContextState {
        self.lock().state()
    }

    /// Sequence number of the last data call.
    pub fn sequence(&self) -> u32 {
        self.lock().sequence()
    }

    pub fn service(&self) -> Service {
        self.lock().service()
    }

    /// Changes the service of subsequent data calls.
    pub fn set_service(&self, service: Service) {
        self.lock().set_service(service);
    }

    /// Handle assigned by the server, empty before negotiation.
    pub fn handle(&self) -> Vec<u8> {
        self.lock().handle().to_vec()
    }

    /// Sequence window announced by the server.
    pub fn window(&self) -> u32 {
        self.lock().window()
    }

    fn lock(&self) -> MutexGuard<'_, SecurityContext<P::Context>> {
        self.context.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn verifier(
        &self,
        context: &mut SecurityContext<P::Context>,
        security: &CallSecurity,
        header: &[u8],
    ) -> Result<Verifier> {
        if security.seq.is_none() {
            // Context creation calls carry a null verifier.
            return Ok(opaque_auth::none());
        }
        let crypto = context.crypto_for(security)?;
        let mic = self.provider.get_mic(crypto, header).map_err(Error::Provider)?;
        Ok(opaque_auth::new(auth_flavor::RPCSEC_GSS, mic))
    }

    fn seal_locked(
        &self,
        context: &mut SecurityContext<P::Context>,
        call: &CallSecurity,
        mut header: Packer,
        cred: rpc_gss_cred_vers_1_t,
        args: &[u8],
    ) -> Result<SecuredCall> {
        trace!("RPCSEC_GSS {:?} seq {}", cred.gss_proc, cred.seq_num);
        header.pack(&encode_credential(cred)?)?;
        let verf = self.verifier(context, call, header.as_bytes())?;
        header.pack(&verf)?;
        let args = match call.seq {
            Some(seq) => {
                data::wrap(&self.provider, context.crypto_for(call)?, call.service, seq, args)?
            }
            None => args.to_vec(),
        };
        header.append(&args);
        Ok(SecuredCall { body: header.into_inner(), security: *call })
    }
}

impl<P: GssProvider> fmt::Debug for AuthGss<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let context = self.lock();
        f.debug_struct("AuthGss")
            .field("principal", &self.principal)
            .field("state", &context.state())
            .field("service", &context.service())
            .field("seq", &context.sequence())
            .finish()
    }
}

impl<P: GssProvider> SecurityFlavor for AuthGss<P> {
    fn flavor(&self) -> auth_flavor {
        auth_flavor::RPCSEC_GSS
    }

    fn identity(&self) -> Identity {
        self.identity
    }

    /// Takes a sequence number under the lock, then releases it. Only
    /// [`secure_call`](SecurityFlavor::secure_call) keeps credential, verifier
    /// and wrapping under one lock.
    fn make_credential(&self) -> Result<(Credential, CallSecurity)> {
        let (cred, security) = self.lock().data_credential()?;
        Ok((encode_credential(cred)?, security))
    }

    fn make_verifier(&self, header: &[u8]) -> Result<Verifier> {
        let mut context = self.lock();
        match context.state() {
            ContextState::Established => {
                let mic = self
                    .provider
                    .get_mic(context.established_crypto()?, header)
                    .map_err(Error::Provider)?;
                Ok(opaque_auth::new(auth_flavor::RPCSEC_GSS, mic))
            }
            _ => Ok(opaque_auth::none()),
        }
    }

    fn wrap_args(&self, call: &CallSecurity, args: &[u8]) -> Result<Vec<u8>> {
        match call.seq {
            Some(seq) => {
                let mut context = self.lock();
                data::wrap(&self.provider, context.crypto_for(call)?, call.service, seq, args)
            }
            None => Ok(args.to_vec()),
        }
    }

    /// Data replies carry a MIC over the XDR-encoded sequence number of the call.
    fn check_reply_verifier(&self, call: &CallSecurity, verf: &Verifier) -> Result<()> {
        let Some(seq) = call.seq else {
            // Checked against the sequence window once negotiation completes.
            return Ok(());
        };
        if verf.flavor != auth_flavor::RPCSEC_GSS {
            warn!("reply verifier flavor {:?} on an RPCSEC_GSS call", verf.flavor);
            return Err(Error::BadReplyVerifier);
        }
        let mut context = self.lock();
        let crypto = context.crypto_for(call)?;
        self.provider.verify_mic(crypto, &xdr::to_bytes(&seq)?, &verf.body).map_err(|e| {
            warn!("reply verifier for sequence {seq} rejected: {e:#}");
            Error::BadReplyVerifier
        })
    }

    fn unwrap_results(&self, call: &CallSecurity, results: &[u8]) -> Result<Vec<u8>> {
        match call.seq {
            Some(seq) => {
                let mut context = self.lock();
                data::unwrap(&self.provider, context.crypto_for(call)?, call.service, seq, results)
            }
            None => Ok(results.to_vec()),
        }
    }

    fn secure_call(&self, header: Packer, args: &[u8]) -> Result<SecuredCall> {
        let mut context = self.lock();
        let (cred, security) = context.data_credential()?;
        self.seal_locked(&mut context, &security, header, cred, args)
    }

    fn needs_handshake(&self) -> bool {
        self.lock().is_fresh()
    }

    fn is_ready(&self) -> bool {
        self.lock().state() == ContextState::Established
    }

    fn handshake_token(&self) -> Result<Option<Vec<u8>>> {
        let mut context = self.lock();
        match context.state() {
            ContextState::Uninitialized => {
                debug!("negotiating RPCSEC_GSS context with {}", self.principal);
                context.step(&self.provider, &self.target, Event::Start)?;
                Ok(context.take_pending_token())
            }
            // A token is pending only until its reply has been fed back.
            ContextState::Negotiating => {
                context.take_pending_token().map(Some).ok_or(Error::NotEstablished)
            }
            ContextState::Established => Ok(None),
        }
    }

    fn secure_handshake(&self, header: Packer, token: &[u8]) -> Result<SecuredCall> {
        let mut context = self.lock();
        let (cred, security) = context.init_credential()?;
        self.seal_locked(&mut context, &security, header, cred, token)
    }

    fn complete_handshake(&self, verf: &Verifier, results: &[u8]) -> Result<()> {
        let res = xdr::from_bytes::<rpc_gss_init_res>(results)?;
        let mut context = self.lock();
        let outcome = context.step(&self.provider, &self.target, Event::InitReply { res: &res, verf });
        if let Err(e) = &outcome {
            warn!("RPCSEC_GSS negotiation with {} failed: {e}", self.principal);
            // Teardown cannot fail.
            let _ = context.step(&self.provider, &self.target, Event::Teardown);
        }
        outcome
    }

    fn secure_destroy(&self, header: Packer) -> Result<Option<SecuredCall>> {
        let mut context = self.lock();
        if context.state() != ContextState::Established {
            return Ok(None);
        }
        let (cred, security) = context.destroy_credential()?;
        self.seal_locked(&mut context, &security, header, cred, &[]).map(Some)
    }

    fn invalidate(&self) {
        let mut context = self.lock();
        // Teardown cannot fail.
        let _ = context.step(&self.provider, &self.target, Event::Teardown);
    }

    fn invalidate_call(&self, call: &CallSecurity) {
        let mut context = self.lock();
        if call.generation != context.generation() {
            debug!(
                "ignoring failure of context {} while context {} is current",
                call.generation,
                context.generation()
            );
            return;
        }
        let _ = context.step(&self.provider, &self.target, Event::Teardown);
    }
}
