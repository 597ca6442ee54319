//! Lifecycle events.

use std::sync::Arc;

use opclink_core::{ServiceError, Session, types::CreateSessionResponse};

use crate::future::{ClosePromise, SessionPromise};

/// Events driving the session lifecycle.
///
/// Two kinds: external stimuli (a caller requesting create/close, the
/// transport reporting the channel dropped) and completion notifications
/// emitted by the actions the state machine scheduled. Events are
/// delivered strictly one at a time, in arrival order.
#[derive(Debug)]
pub enum SessionEvent {
    /// A caller requested a session. The promise resolves to the session
    /// once one is established, or to the failure that prevented it.
    CreateRequested {
        /// Promise handed to the caller.
        promise: SessionPromise,
    },

    /// A caller requested the session be closed.
    CloseRequested {
        /// Promise resolving once the close has completed.
        promise: ClosePromise,
    },

    /// CreateSession round trip succeeded, server response verified.
    CreateOk {
        /// Verified server response.
        response: CreateSessionResponse,
    },

    /// CreateSession failed (transport error or verification failure).
    CreateErr {
        /// What went wrong.
        error: ServiceError,
    },

    /// First activation succeeded; the session now exists.
    ActivateOk {
        /// The freshly activated session.
        session: Arc<Session>,
    },

    /// First activation failed.
    ActivateErr {
        /// What went wrong.
        error: ServiceError,
    },

    /// An existing session was re-activated on a new channel.
    ReactivateOk {
        /// The re-activated session.
        session: Arc<Session>,
    },

    /// Re-activation failed. Carries the session so a transient failure
    /// can be retried against the same credentials.
    ReactivateErr {
        /// What went wrong.
        error: ServiceError,
        /// The session the re-activation was attempted for.
        session: Arc<Session>,
    },

    /// Subscription transfer completed (including partially-failed
    /// transfers, which are a success at this level).
    TransferOk {
        /// The session the subscriptions were transferred to.
        session: Arc<Session>,
    },

    /// Subscription transfer failed at the request level.
    TransferErr {
        /// What went wrong.
        error: ServiceError,
        /// The session the transfer was attempted on. Still valid
        /// server-side, so a preempting close can target it.
        session: Arc<Session>,
    },

    /// Every session initializer completed successfully.
    InitializeOk {
        /// The initialized session.
        session: Arc<Session>,
    },

    /// A session initializer failed.
    InitializeErr {
        /// The first failure observed.
        error: ServiceError,
        /// The session that failed to initialize.
        session: Arc<Session>,
    },

    /// The underlying secure channel dropped.
    ChannelInactive,

    /// CloseSession completed (or was given up on - closing always makes
    /// forward progress).
    CloseOk,
}

impl SessionEvent {
    /// Short name for transition logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateRequested { .. } => "CreateRequested",
            Self::CloseRequested { .. } => "CloseRequested",
            Self::CreateOk { .. } => "CreateOk",
            Self::CreateErr { .. } => "CreateErr",
            Self::ActivateOk { .. } => "ActivateOk",
            Self::ActivateErr { .. } => "ActivateErr",
            Self::ReactivateOk { .. } => "ReactivateOk",
            Self::ReactivateErr { .. } => "ReactivateErr",
            Self::TransferOk { .. } => "TransferOk",
            Self::TransferErr { .. } => "TransferErr",
            Self::InitializeOk { .. } => "InitializeOk",
            Self::InitializeErr { .. } => "InitializeErr",
            Self::ChannelInactive => "ChannelInactive",
            Self::CloseOk => "CloseOk",
        }
    }
}
