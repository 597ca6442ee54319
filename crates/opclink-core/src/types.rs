//! Service boundary types.
//!
//! The request and response messages the session layer exchanges with a
//! transport, plus the supporting identifiers and security descriptors.
//! Byte layout is the transport's concern; these types only fix the
//! fields the session lifecycle reads and writes.

use std::time::Duration;

use bytes::Bytes;

use crate::status::StatusCode;

/// An OPC UA node identifier.
///
/// Sessions are identified by two of these: the session id (diagnostics)
/// and the authentication token (sent with every request on the session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum NodeId {
    /// The null node id.
    #[default]
    Null,
    /// Numeric identifier.
    Numeric {
        /// Namespace index.
        namespace: u16,
        /// Identifier value.
        id: u32,
    },
    /// String identifier.
    String {
        /// Namespace index.
        namespace: u16,
        /// Identifier value.
        id: String,
    },
    /// Opaque (byte string) identifier. Servers commonly issue
    /// authentication tokens in this form.
    Opaque {
        /// Namespace index.
        namespace: u16,
        /// Identifier value.
        id: Bytes,
    },
}

/// An asymmetric signature together with the algorithm that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignatureData {
    /// URI of the signature algorithm, absent for the empty signature.
    pub algorithm: Option<String>,
    /// Signature bytes.
    pub signature: Bytes,
}

impl SignatureData {
    /// The empty signature, used when the security policy is
    /// [`SecurityPolicy::None`].
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Negotiated security policy of an endpoint or secure channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityPolicy {
    /// No security.
    None,
    /// Basic256Sha256.
    Basic256Sha256,
    /// Aes128-Sha256-RsaOaep.
    Aes128Sha256RsaOaep,
    /// Aes256-Sha256-RsaPss.
    Aes256Sha256RsaPss,
}

impl SecurityPolicy {
    /// Policy URI as registered with the OPC Foundation.
    pub fn uri(self) -> &'static str {
        match self {
            Self::None => "http://opcfoundation.org/UA/SecurityPolicy#None",
            Self::Basic256Sha256 => "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256",
            Self::Aes128Sha256RsaOaep => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes128_Sha256_RsaOaep"
            },
            Self::Aes256Sha256RsaPss => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes256_Sha256_RsaPss"
            },
        }
    }

    /// URI of the asymmetric signature algorithm this policy prescribes.
    /// `None` when the policy requires no signatures.
    pub fn signature_algorithm_uri(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Basic256Sha256 | Self::Aes128Sha256RsaOaep => {
                Some("http://www.w3.org/2001/04/xmldsig-more#rsa-sha256")
            },
            Self::Aes256Sha256RsaPss => {
                Some("http://opcfoundation.org/UA/security/rsa-pss-sha2-256")
            },
        }
    }
}

/// Application metadata sent in CreateSession and published by servers in
/// their endpoint descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApplicationDescription {
    /// Globally unique application URI.
    pub application_uri: String,
    /// Product URI.
    pub product_uri: String,
    /// Display name.
    pub application_name: String,
    /// URI of the gateway server fronting this application, if any.
    pub gateway_server_uri: Option<String>,
}

/// A server endpoint the client connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescription {
    /// Endpoint URL.
    pub endpoint_url: String,
    /// Security policy negotiated for this endpoint.
    pub security_policy: SecurityPolicy,
    /// Server application description.
    pub server: ApplicationDescription,
    /// Server certificate pinned at endpoint discovery time (DER).
    /// Empty when the policy is [`SecurityPolicy::None`].
    pub server_certificate: Bytes,
}

impl Default for EndpointDescription {
    fn default() -> Self {
        Self {
            endpoint_url: String::new(),
            security_policy: SecurityPolicy::None,
            server: ApplicationDescription::default(),
            server_certificate: Bytes::new(),
        }
    }
}

/// User identity presented during session activation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IdentityToken {
    /// Anonymous access.
    #[default]
    Anonymous,
    /// Username/password credentials.
    UserName {
        /// User name.
        user_name: String,
        /// Password, already encrypted per the endpoint's user token
        /// policy where the policy requires it.
        password: Bytes,
        /// URI of the algorithm the password is encrypted with, if any.
        encryption_algorithm: Option<String>,
    },
    /// X509 certificate identity.
    X509 {
        /// Certificate (DER).
        certificate_data: Bytes,
    },
}

/// Header common to every service request issued on a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeader {
    /// Authentication token of the session the request runs on, or
    /// [`NodeId::Null`] for requests outside any session.
    pub auth_token: NodeId,
    /// Timeout hint for this request.
    pub timeout: Duration,
}

/// A request together with its header, ready for a transport to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRequest {
    /// Request header.
    pub header: RequestHeader,
    /// Request body.
    pub body: Request,
}

/// Service request bodies the session lifecycle issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Create a session.
    CreateSession(CreateSessionRequest),
    /// Activate a session.
    ActivateSession(ActivateSessionRequest),
    /// Transfer subscriptions onto a session.
    TransferSubscriptions(TransferSubscriptionsRequest),
    /// Close a session.
    CloseSession(CloseSessionRequest),
}

/// Service response bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Response to [`Request::CreateSession`].
    CreateSession(CreateSessionResponse),
    /// Response to [`Request::ActivateSession`].
    ActivateSession(ActivateSessionResponse),
    /// Response to [`Request::TransferSubscriptions`].
    TransferSubscriptions(TransferSubscriptionsResponse),
    /// Response to [`Request::CloseSession`].
    CloseSession(CloseSessionResponse),
}

/// CreateSession request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSessionRequest {
    /// Description of this client application.
    pub client_description: ApplicationDescription,
    /// Application URI of the server, set only when connecting through a
    /// gateway.
    pub server_uri: Option<String>,
    /// Endpoint URL the session is created against.
    pub endpoint_url: String,
    /// Human-readable session name.
    pub session_name: String,
    /// Fresh client nonce (at least 32 bytes of entropy).
    pub client_nonce: Bytes,
    /// Client application certificate (DER).
    pub client_certificate: Bytes,
    /// Requested session timeout.
    pub requested_session_timeout: Duration,
    /// Maximum response size the client accepts, 0 for no limit.
    pub max_response_message_size: u32,
}

/// CreateSession response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSessionResponse {
    /// Server-assigned session id.
    pub session_id: NodeId,
    /// Authentication token for subsequent requests on the session.
    pub authentication_token: NodeId,
    /// Session timeout granted by the server.
    pub revised_session_timeout: Duration,
    /// Server nonce for the first activation.
    pub server_nonce: Bytes,
    /// Server application certificate (DER).
    pub server_certificate: Bytes,
    /// Server signature over the client certificate concatenated with
    /// the client nonce.
    pub server_signature: SignatureData,
    /// Maximum request size the server accepts, 0 for no limit.
    pub max_request_message_size: u32,
}

/// ActivateSession request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateSessionRequest {
    /// Client signature over the server certificate concatenated with
    /// the server nonce.
    pub client_signature: SignatureData,
    /// Requested locales, in preference order.
    pub locale_ids: Vec<String>,
    /// User identity.
    pub user_identity_token: IdentityToken,
    /// Signature proving possession of the identity's key, empty for
    /// identities without one.
    pub user_token_signature: SignatureData,
}

/// ActivateSession response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateSessionResponse {
    /// Fresh server nonce for the next activation.
    pub server_nonce: Bytes,
}

/// TransferSubscriptions request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSubscriptionsRequest {
    /// Ids of the subscriptions to transfer.
    pub subscription_ids: Vec<u32>,
    /// Ask the server to resend current values after the transfer.
    pub send_initial_values: bool,
}

/// Per-subscription transfer outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    /// Transfer status for this subscription.
    pub status: StatusCode,
    /// Sequence numbers still available for republish.
    pub available_sequence_numbers: Vec<u32>,
}

/// TransferSubscriptions response. Results are positional, matching the
/// request's subscription id order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSubscriptionsResponse {
    /// One result per requested subscription id.
    pub results: Vec<TransferResult>,
}

/// CloseSession request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseSessionRequest {
    /// Also delete the session's subscriptions server-side.
    pub delete_subscriptions: bool,
}

/// CloseSession response. Carries no fields the client inspects.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CloseSessionResponse {}
