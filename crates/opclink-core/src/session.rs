//! The session record.

use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use bytes::Bytes;

use crate::types::NodeId;

/// An established session.
///
/// Constructed once activation succeeds and immutable afterwards, except
/// for the server nonce, which the server rotates on every successful
/// (re)activation.
#[derive(Debug)]
pub struct Session {
    session_id: NodeId,
    authentication_token: NodeId,
    session_name: String,
    session_timeout: Duration,
    max_request_message_size: u32,
    server_certificate: Bytes,
    server_nonce: Mutex<Bytes>,
}

impl Session {
    /// Construct a session from the fields negotiated during creation.
    pub fn new(
        session_id: NodeId,
        authentication_token: NodeId,
        session_name: String,
        session_timeout: Duration,
        max_request_message_size: u32,
        server_certificate: Bytes,
        server_nonce: Bytes,
    ) -> Self {
        Self {
            session_id,
            authentication_token,
            session_name,
            session_timeout,
            max_request_message_size,
            server_certificate,
            server_nonce: Mutex::new(server_nonce),
        }
    }

    /// Server-assigned session id.
    pub fn session_id(&self) -> &NodeId {
        &self.session_id
    }

    /// Authentication token sent with every request on this session.
    pub fn authentication_token(&self) -> &NodeId {
        &self.authentication_token
    }

    /// Session name supplied at creation.
    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    /// Session timeout granted by the server.
    pub fn session_timeout(&self) -> Duration {
        self.session_timeout
    }

    /// Maximum request size the server accepts, 0 for no limit.
    pub fn max_request_message_size(&self) -> u32 {
        self.max_request_message_size
    }

    /// Server application certificate (DER).
    pub fn server_certificate(&self) -> &Bytes {
        &self.server_certificate
    }

    /// Most recent server nonce. Input to the client signature on the
    /// next (re)activation.
    pub fn server_nonce(&self) -> Bytes {
        self.server_nonce.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replace the server nonce after a successful (re)activation.
    pub fn set_server_nonce(&self, nonce: Bytes) {
        *self.server_nonce.lock().unwrap_or_else(PoisonError::into_inner) = nonce;
    }
}
