//! The GSS-API mechanism consumed by `RPCSEC_GSS`.
//!
//! Context negotiation, MIC generation and sealing are the business of an
//! existing GSS-API/Kerberos implementation. This trait is the only surface
//! the RPC layer uses; any status other than "complete" or "continue needed"
//! is reported as an error and is fatal for the context.

/// Outcome of a successful init step.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InitStatus {
    /// The client side of the context is ready.
    Complete,
    /// The peer's next token is required.
    ContinueNeeded,
}

/// Result of [`GssProvider::init_context`].
#[derive(Debug)]
pub struct InitStep<C> {
    pub status: InitStatus,
    /// Token to send to the server, possibly empty
    pub output_token: Vec<u8>,
    /// Context to pass to the next step and, once complete, to the
    /// per-message operations
    pub context: C,
}

/// GSS-API capability injected into [`AuthGss`](super::AuthGss).
pub trait GssProvider: Send + Sync {
    /// Imported target principal.
    type Name: Send + Sync;
    /// Mechanism security context.
    type Context: Send;

    /// Imports a principal such as `nfs@server.example.com`.
    fn import_target_name(&self, principal: &str) -> anyhow::Result<Self::Name>;

    /// Runs one step of context initiation.
    ///
    /// The first step receives an empty input token and no context.
    fn init_context(
        &self,
        target: &Self::Name,
        input_token: &[u8],
        context: Option<Self::Context>,
    ) -> anyhow::Result<InitStep<Self::Context>>;

    /// Computes a MIC token over `data`.
    fn get_mic(&self, context: &mut Self::Context, data: &[u8]) -> anyhow::Result<Vec<u8>>;

    /// Verifies a MIC token over `data`.
    fn verify_mic(&self, context: &mut Self::Context, data: &[u8], token: &[u8])
        -> anyhow::Result<()>;

    /// Seals `data` with confidentiality.
    fn wrap(&self, context: &mut Self::Context, data: &[u8]) -> anyhow::Result<Vec<u8>>;

    /// Opens a sealed token.
    fn unwrap(&self, context: &mut Self::Context, sealed: &[u8]) -> anyhow::Result<Vec<u8>>;
}
