//! Session configuration.

use std::time::Duration;

use bytes::Bytes;

use crate::types::{ApplicationDescription, EndpointDescription};

/// Session timeout requested from the server.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for requests issued by the session lifecycle itself
/// (create, activate, transfer). Deliberately longer than a typical
/// operational request timeout so slow servers can still connect.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(16);

/// Time allowed for a graceful CloseSession before giving up. Closing
/// must always make forward progress, so this is short.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Session name sent to the server. A name is generated when unset.
    pub session_name: Option<String>,
    /// Requested session timeout.
    pub session_timeout: Duration,
    /// Timeout for lifecycle requests.
    pub request_timeout: Duration,
    /// Maximum response size the client accepts, 0 for no limit.
    pub max_response_message_size: u32,
    /// Locales requested at activation, in preference order.
    pub locale_ids: Vec<String>,
    /// Description of this client application.
    pub application: ApplicationDescription,
    /// Endpoint the session is created against.
    pub endpoint: EndpointDescription,
    /// Client application certificate (DER). Empty when the endpoint's
    /// security policy is `None`.
    pub client_certificate: Bytes,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_name: None,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_response_message_size: 0,
            locale_ids: Vec::new(),
            application: ApplicationDescription::default(),
            endpoint: EndpointDescription::default(),
            client_certificate: Bytes::new(),
        }
    }
}
