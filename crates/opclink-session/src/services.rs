//! Collaborator seams.
//!
//! The lifecycle talks to the outside world only through these traits:
//! a transport that moves requests and responses, an identity provider,
//! a crypto provider for the handshake signatures, the subscription
//! manager, and user-supplied session initializers. Production wires in
//! real implementations; tests wire in scripted ones.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use opclink_core::{
    ServiceError, Session, SessionConfig, StatusCode,
    types::{
        EndpointDescription, IdentityToken, Response, SecurityPolicy, ServiceRequest,
        SignatureData,
    },
};

/// Properties of the secure channel the session rides on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureChannelInfo {
    /// Negotiated security policy.
    pub security_policy: SecurityPolicy,
    /// Certificate of the remote endpoint (DER). Empty when the policy
    /// is [`SecurityPolicy::None`].
    pub remote_certificate: Bytes,
}

/// The transport the session lifecycle issues requests through.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and await its response.
    async fn send_request(&self, request: ServiceRequest) -> Result<Response, ServiceError>;

    /// Wait until a secure channel is available and describe it.
    async fn wait_for_channel(&self) -> Result<SecureChannelInfo, ServiceError>;

    /// Resolves the next time the channel transitions from open to
    /// closed. Each call waits for a subsequent closure.
    async fn channel_closed(&self);

    /// Force the channel closed. The closure surfaces through
    /// [`Transport::channel_closed`] like any other drop.
    async fn force_close(&self);
}

/// Supplies the user identity presented during activation.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Produce an identity token and, where the identity owns a key, a
    /// signature proving possession of it.
    async fn identity_token(
        &self,
        endpoint: &EndpointDescription,
        server_nonce: &Bytes,
    ) -> Result<(IdentityToken, SignatureData), ServiceError>;
}

/// Signs and verifies the handshake signatures.
///
/// Key material stays behind this seam; the lifecycle only ever handles
/// certificates and produced signatures.
pub trait CryptoProvider: Send + Sync {
    /// Sign `data` with the client's private key under `policy`'s
    /// asymmetric signature algorithm.
    fn sign(&self, policy: SecurityPolicy, data: &[u8]) -> Result<Bytes, ServiceError>;

    /// Verify `signature` over `data` against the public key in
    /// `certificate` under `policy`'s asymmetric signature algorithm.
    fn verify(
        &self,
        policy: SecurityPolicy,
        certificate: &Bytes,
        data: &[u8],
        signature: &SignatureData,
    ) -> Result<(), ServiceError>;
}

/// The subscription engine's view of session recovery.
#[async_trait]
pub trait SubscriptionManager: Send + Sync {
    /// Snapshot of the subscription ids currently considered live.
    async fn subscription_ids(&self) -> Vec<u32>;

    /// A subscription failed to transfer and has been dropped from the
    /// live set server-side.
    async fn transfer_failed(&self, subscription_id: u32, status: StatusCode);
}

/// User-supplied post-connect initialization.
///
/// All registered initializers run concurrently after every (re)connect;
/// the session only becomes active once all of them succeed.
#[async_trait]
pub trait SessionInitializer: Send + Sync {
    /// Initialize against the given session.
    async fn initialize(
        &self,
        transport: Arc<dyn Transport>,
        session: Arc<Session>,
    ) -> Result<(), ServiceError>;
}

/// Observer of session availability.
pub trait SessionActivityListener: Send + Sync {
    /// The session became usable.
    fn on_session_active(&self, session: &Session);

    /// The session stopped being usable (channel drop, close, fault).
    fn on_session_inactive(&self, session: &Session);
}

/// Everything the lifecycle needs to do its job.
#[derive(Clone)]
pub struct SessionServices {
    /// Transport the requests go through.
    pub transport: Arc<dyn Transport>,
    /// Identity provider consulted at every (re)activation.
    pub identity: Arc<dyn IdentityProvider>,
    /// Handshake signature crypto.
    pub crypto: Arc<dyn CryptoProvider>,
    /// Subscription engine.
    pub subscriptions: Arc<dyn SubscriptionManager>,
    /// Post-connect initializers, run concurrently.
    pub initializers: Vec<Arc<dyn SessionInitializer>>,
    /// Session configuration.
    pub config: SessionConfig,
}
