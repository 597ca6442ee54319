//! Session lifecycle state machine.
//!
//! Pure transition logic in the action pattern: [`SessionState::execute`]
//! consumes the current state and one event, and returns the next state
//! plus actions for the driver to run. No I/O, no suspension, no clocks -
//! which keeps every transition unit-testable in isolation.
//!
//! # State machine
//!
//! ```text
//!            CreateRequested          CreateOk              ActivateOk
//! ┌──────────┐ ───────────> ┌────────┐ ──────> ┌──────────┐ ──────> ┌────────────┐
//! │ Inactive │              │Creating│         │Activating│         │Transferring│
//! └──────────┘ <─────────── └────────┘         └──────────┘         └────────────┘
//!      ^          *Err on first attempt                                   │ TransferOk
//!      │                                                                  v
//!      │  CloseOk ┌───────┐                    ┌────────┐ InitializeOk ┌────────────┐
//!      └───────── │Closing│ <── (any state)    │ Active │ <─────────── │Initializing│
//!                 └───────┘                    └────────┘              └────────────┘
//!                                                   │ ChannelInactive
//!                                                   v
//!                 ┌──────────┐  *Err  ┌────────────┐ ──ActivateOk──> Retransferring
//!                 │Recreating│ <───── │Reactivating│ ──ReactivateOk─> Active
//!                 └──────────┘ ─────> └────────────┘      ... ─> Reinitializing ─> Active
//!                   backoff 1s,2s,4s,8s,16s cap
//! ```
//!
//! Events not named in a state's transitions leave the state unchanged
//! and schedule nothing (self-loop). That rule is also what makes stale
//! action completions harmless: a completion arriving after the machine
//! has moved on is evaluated against the current state and ignored.

use std::{sync::Arc, time::Duration};

use opclink_core::{
    ServiceError, Session, StatusCode,
    types::{CreateSessionResponse, NodeId},
};

use crate::{
    event::SessionEvent,
    future::{
        ClosePromise, CloseFuture, SessionFuture, SessionPromise, close_promise,
        failed_session_future, session_closed_error, session_promise,
    },
};

/// First backoff delay after a failed recreate attempt.
pub const INITIAL_RECREATE_DELAY: Duration = Duration::from_secs(1);

/// Backoff cap. Delays double per failure up to this value.
pub const MAX_RECREATE_DELAY: Duration = Duration::from_secs(16);

/// Identifies the session a CloseSession request targets.
///
/// A close can be scheduled before a full [`Session`] exists - a stale
/// CreateSession success absorbed by [`SessionState::Closing`] only has
/// the response to go on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseTarget {
    /// Session id, for logs.
    pub session_id: NodeId,
    /// Authentication token the request is issued under.
    pub auth_token: NodeId,
}

impl From<&CreateSessionResponse> for CloseTarget {
    fn from(response: &CreateSessionResponse) -> Self {
        Self {
            session_id: response.session_id.clone(),
            auth_token: response.authentication_token.clone(),
        }
    }
}

impl From<&Session> for CloseTarget {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.session_id().clone(),
            auth_token: session.authentication_token().clone(),
        }
    }
}

/// Actions returned by the state machine for the driver to execute.
///
/// Each network-touching action runs as its own task and re-enters the
/// machine by emitting exactly one completion event. The chaining actions
/// only await an already-shared future and resolve a promise; they never
/// touch the network.
#[derive(Debug)]
pub enum Action {
    /// Send a CreateSession request.
    CreateSession,

    /// Send a CreateSession request after a backoff delay.
    ScheduleCreateSession {
        /// How long to wait before sending.
        delay: Duration,
    },

    /// Activate the session described by a CreateSession response.
    ActivateSession {
        /// The verified CreateSession response.
        response: CreateSessionResponse,
    },

    /// Re-activate an existing session on the current channel.
    ReactivateSession {
        /// Session whose credentials to re-activate with.
        session: Arc<Session>,
    },

    /// Transfer known subscriptions onto the session.
    TransferSubscriptions {
        /// Target session.
        session: Arc<Session>,
    },

    /// Run all registered session initializers.
    RunInitializers {
        /// Session to initialize.
        session: Arc<Session>,
    },

    /// Send a CloseSession request.
    CloseSession {
        /// Session being closed.
        target: CloseTarget,
    },

    /// Emit [`SessionEvent::CloseOk`] without a network round trip.
    /// Used when there is no live session to tell the server about.
    EmitCloseOk,

    /// Resolve `promise` with whatever `onto` resolves to. Coalesces a
    /// late create request onto the in-flight attempt.
    ChainSessionFuture {
        /// Promise of the late caller.
        promise: SessionPromise,
        /// Future of the in-flight attempt.
        onto: SessionFuture,
    },

    /// Resolve `promise` when `onto` resolves. Coalesces a second close
    /// request onto the in-flight close.
    ChainCloseFuture {
        /// Promise of the late caller.
        promise: ClosePromise,
        /// Future of the in-flight close.
        onto: CloseFuture,
    },

    /// Fail `promise` with "session closed" once `after` resolves. Used
    /// for create requests that arrive while the machine is closing.
    FailAfterClose {
        /// Promise of the late caller.
        promise: SessionPromise,
        /// Future of the in-flight close.
        after: CloseFuture,
    },
}

/// Discriminant-only view of the state, for diagnostics and the status
/// watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No session, none in progress.
    Inactive,
    /// CreateSession in flight.
    Creating,
    /// First ActivateSession in flight.
    Activating,
    /// Initial subscription transfer in flight.
    Transferring,
    /// Session initializers running (first time).
    Initializing,
    /// Session fully usable.
    Active,
    /// Re-activation in flight after a channel drop or recreate.
    Reactivating,
    /// Subscription transfer in flight after re-activation.
    Retransferring,
    /// Session initializers running (after recovery).
    Reinitializing,
    /// Waiting out a backoff delay before the next create attempt.
    Recreating,
    /// CloseSession in flight or pending.
    Closing,
}

/// Session lifecycle state.
///
/// Exactly one instance is live per lifecycle; transitioning consumes the
/// old state's payload. Every pending state owns the promise its waiters
/// are parked on, so completion and failure are always routed to exactly
/// the callers that coalesced onto that attempt.
#[derive(Debug)]
pub enum SessionState {
    /// Terminal/idle state.
    Inactive {
        /// Pre-failed future so late chaining always has something to
        /// resolve against.
        session_future: SessionFuture,
    },
    /// CreateSession request in flight.
    Creating {
        /// Promise of the session being established.
        promise: SessionPromise,
    },
    /// ActivateSession request in flight.
    Activating {
        /// Promise of the session being established.
        promise: SessionPromise,
    },
    /// Initial subscription transfer in flight.
    Transferring {
        /// Promise of the session being established.
        promise: SessionPromise,
    },
    /// Session initializers running for the first time.
    Initializing {
        /// Promise of the session being established.
        promise: SessionPromise,
    },
    /// Session fully usable.
    Active {
        /// Completed future, for coalescing late create requests.
        session_future: SessionFuture,
        /// The live session.
        session: Arc<Session>,
    },
    /// Re-activation in flight.
    Reactivating {
        /// Promise of the recovered session.
        promise: SessionPromise,
    },
    /// Post-recovery subscription transfer in flight.
    Retransferring {
        /// Promise of the recovered session.
        promise: SessionPromise,
    },
    /// Post-recovery initializers running.
    Reinitializing {
        /// Promise of the recovered session.
        promise: SessionPromise,
    },
    /// Backing off before the next CreateSession attempt.
    Recreating {
        /// Promise of the recovered session.
        promise: SessionPromise,
        /// Delay before the next attempt if this one fails too.
        delay: Duration,
    },
    /// Close in flight; absorbs whatever operation was interrupted.
    Closing {
        /// Promise still owed a session, if the close preempted a
        /// pending attempt. Failed with "session closed" on completion.
        session_promise: Option<SessionPromise>,
        /// Promise resolving once the close completes.
        close_promise: ClosePromise,
    },
}

impl SessionState {
    /// The initial state.
    pub fn inactive() -> Self {
        Self::Inactive {
            session_future: failed_session_future(ServiceError::new(
                StatusCode::BAD_SESSION_CLOSED,
                "no session active",
            )),
        }
    }

    /// Discriminant-only view for diagnostics.
    pub fn status(&self) -> SessionStatus {
        match self {
            Self::Inactive { .. } => SessionStatus::Inactive,
            Self::Creating { .. } => SessionStatus::Creating,
            Self::Activating { .. } => SessionStatus::Activating,
            Self::Transferring { .. } => SessionStatus::Transferring,
            Self::Initializing { .. } => SessionStatus::Initializing,
            Self::Active { .. } => SessionStatus::Active,
            Self::Reactivating { .. } => SessionStatus::Reactivating,
            Self::Retransferring { .. } => SessionStatus::Retransferring,
            Self::Reinitializing { .. } => SessionStatus::Reinitializing,
            Self::Recreating { .. } => SessionStatus::Recreating,
            Self::Closing { .. } => SessionStatus::Closing,
        }
    }

    /// The live session, when there is one.
    pub fn active_session(&self) -> Option<&Arc<Session>> {
        match self {
            Self::Active { session, .. } => Some(session),
            _ => None,
        }
    }

    /// Process one event.
    ///
    /// Total over (state, event): unhandled combinations self-loop and
    /// schedule nothing. Never blocks; promise resolution here is a
    /// non-blocking channel send.
    #[allow(clippy::too_many_lines)]
    pub fn execute(self, event: SessionEvent) -> (Self, Vec<Action>) {
        use SessionEvent as E;

        match (self, event) {
            // ---- Inactive ----
            (Self::Inactive { .. }, E::CreateRequested { promise }) => {
                (Self::Creating { promise }, vec![Action::CreateSession])
            },
            (state @ Self::Inactive { .. }, E::CloseRequested { promise }) => {
                // Nothing to close
                promise.complete(());
                (state, Vec::new())
            },

            // ---- Creating ----
            (Self::Creating { promise }, E::CreateOk { response }) => {
                (Self::Activating { promise }, vec![Action::ActivateSession { response }])
            },
            (Self::Creating { promise }, E::CreateErr { error }) => {
                (Self::fail_to_inactive(promise, error), Vec::new())
            },

            // ---- Activating ----
            (Self::Activating { promise }, E::ActivateOk { session }) => {
                (Self::Transferring { promise }, vec![Action::TransferSubscriptions { session }])
            },
            (Self::Activating { promise }, E::ActivateErr { error }) => {
                (Self::fail_to_inactive(promise, error), Vec::new())
            },
            (Self::Activating { promise }, E::ChannelInactive) => {
                let error =
                    ServiceError::new(StatusCode::BAD_CONNECTION_CLOSED, "connection closed");
                (Self::fail_to_inactive(promise, error), Vec::new())
            },

            // ---- Transferring ----
            (Self::Transferring { promise }, E::TransferOk { session }) => {
                (Self::Initializing { promise }, vec![Action::RunInitializers { session }])
            },
            (Self::Transferring { promise }, E::TransferErr { error, .. }) => {
                (Self::fail_to_inactive(promise, error), Vec::new())
            },

            // ---- Initializing ----
            (Self::Initializing { promise }, E::InitializeOk { session }) => {
                Self::complete_to_active(promise, session)
            },
            (Self::Initializing { promise }, E::InitializeErr { error, session }) => {
                // The session exists but is unusable; tear it down
                // server-side while surfacing the real failure.
                let target = CloseTarget::from(session.as_ref());
                promise.complete(Err(error));
                (
                    Self::Closing { session_promise: None, close_promise: close_promise() },
                    vec![Action::CloseSession { target }],
                )
            },

            // ---- Active ----
            (state @ Self::Active { .. }, E::CreateRequested { promise }) => {
                if let Self::Active { session, .. } = &state {
                    promise.complete(Ok(Arc::clone(session)));
                }
                (state, Vec::new())
            },
            (Self::Active { session, .. }, E::CloseRequested { promise }) => {
                let target = CloseTarget::from(session.as_ref());
                (
                    Self::Closing { session_promise: None, close_promise: promise },
                    vec![Action::CloseSession { target }],
                )
            },
            (Self::Active { session, .. }, E::ChannelInactive) => {
                (
                    Self::Reactivating { promise: session_promise() },
                    vec![Action::ReactivateSession { session }],
                )
            },

            // ---- Reactivating ----
            // Fed by two action families: ReactivateSession (existing
            // session, new channel) and ActivateSession (session just
            // recreated by the backoff loop).
            (Self::Reactivating { promise }, E::ReactivateOk { session }) => {
                Self::complete_to_active(promise, session)
            },
            (Self::Reactivating { promise }, E::ReactivateErr { error, session }) => {
                if error.is_transient() {
                    // Same promise: waiters ride out the retry.
                    (
                        Self::Reactivating { promise },
                        vec![Action::ReactivateSession { session }],
                    )
                } else {
                    (
                        Self::Recreating { promise, delay: INITIAL_RECREATE_DELAY },
                        vec![Action::CreateSession],
                    )
                }
            },
            (Self::Reactivating { promise }, E::ActivateOk { session }) => {
                (
                    Self::Retransferring { promise },
                    vec![Action::TransferSubscriptions { session }],
                )
            },
            (Self::Reactivating { promise }, E::ActivateErr { error }) => {
                Self::fail_to_recreating(promise, error)
            },

            // ---- Retransferring ----
            (Self::Retransferring { promise }, E::TransferOk { session }) => {
                (Self::Reinitializing { promise }, vec![Action::RunInitializers { session }])
            },
            (Self::Retransferring { promise }, E::TransferErr { error, .. }) => {
                Self::fail_to_recreating(promise, error)
            },

            // ---- Reinitializing ----
            (Self::Reinitializing { promise }, E::InitializeOk { session }) => {
                Self::complete_to_active(promise, session)
            },
            (Self::Reinitializing { promise }, E::InitializeErr { error, .. }) => {
                // Post-recovery initializer failure: the server-side
                // session state is suspect after a reconnect, so recreate
                // from scratch instead of closing.
                Self::fail_to_recreating(promise, error)
            },

            // ---- Recreating ----
            (Self::Recreating { promise, .. }, E::CreateOk { response }) => {
                (Self::Reactivating { promise }, vec![Action::ActivateSession { response }])
            },
            (Self::Recreating { promise, delay }, E::CreateErr { error }) => {
                promise.complete(Err(error));
                let next_delay = (delay * 2).min(MAX_RECREATE_DELAY);
                (
                    Self::Recreating { promise: session_promise(), delay: next_delay },
                    vec![Action::ScheduleCreateSession { delay }],
                )
            },

            // ---- Closing: absorb whatever was in flight ----
            (Self::Closing { session_promise, close_promise }, E::CreateRequested { promise }) => {
                let after = close_promise.future();
                (
                    Self::Closing { session_promise, close_promise },
                    vec![Action::FailAfterClose { promise, after }],
                )
            },
            (Self::Closing { session_promise, close_promise }, E::CloseRequested { promise }) => {
                let onto = close_promise.future();
                (
                    Self::Closing { session_promise, close_promise },
                    vec![Action::ChainCloseFuture { promise, onto }],
                )
            },
            // The in-flight operation produced a session after all: now
            // there is something to tell the server to dispose of.
            (state @ Self::Closing { .. }, E::CreateOk { response }) => {
                let target = CloseTarget::from(&response);
                (state, vec![Action::CloseSession { target }])
            },
            (
                state @ Self::Closing { .. },
                E::ActivateOk { session }
                | E::ReactivateOk { session }
                | E::TransferOk { session }
                | E::InitializeOk { session }
                | E::TransferErr { session, .. },
            ) => {
                let target = CloseTarget::from(session.as_ref());
                (state, vec![Action::CloseSession { target }])
            },
            // The in-flight operation failed: no session to dispose of.
            (
                state @ Self::Closing { .. },
                E::CreateErr { .. }
                | E::ActivateErr { .. }
                | E::ReactivateErr { .. }
                | E::InitializeErr { .. },
            ) => (state, vec![Action::EmitCloseOk]),
            (Self::Closing { session_promise, close_promise }, E::CloseOk) => {
                if let Some(promise) = session_promise {
                    promise.complete(Err(session_closed_error()));
                }
                close_promise.complete(());
                (
                    Self::Inactive { session_future: failed_session_future(session_closed_error()) },
                    Vec::new(),
                )
            },

            // ---- Shared: coalescing and preemption in pending states ----
            (state, E::CreateRequested { promise }) => {
                // Late create while an attempt is in flight: same outcome,
                // no second request.
                let onto = state.pending_future();
                (state, vec![Action::ChainSessionFuture { promise, onto }])
            },
            (state, E::CloseRequested { promise }) => {
                // Preemption: enter Closing and absorb whatever completes.
                let session_promise = state.into_pending_promise();
                (Self::Closing { session_promise, close_promise: promise }, Vec::new())
            },

            // ---- Everything else self-loops ----
            (state, _event) => (state, Vec::new()),
        }
    }

    /// Fail the pending promise and return to Inactive, keeping the
    /// failed future available for late chaining.
    fn fail_to_inactive(promise: SessionPromise, error: ServiceError) -> Self {
        let session_future = promise.future();
        promise.complete(Err(error));
        Self::Inactive { session_future }
    }

    /// Fail the pending promise and enter the backoff loop with a fresh
    /// promise and an immediate first attempt.
    fn fail_to_recreating(promise: SessionPromise, error: ServiceError) -> (Self, Vec<Action>) {
        promise.complete(Err(error));
        (
            Self::Recreating { promise: session_promise(), delay: INITIAL_RECREATE_DELAY },
            vec![Action::CreateSession],
        )
    }

    /// Complete the pending promise and enter Active.
    fn complete_to_active(promise: SessionPromise, session: Arc<Session>) -> (Self, Vec<Action>) {
        let session_future = promise.future();
        promise.complete(Ok(Arc::clone(&session)));
        (Self::Active { session_future, session }, Vec::new())
    }

    /// Future late create requests chain onto in this state.
    fn pending_future(&self) -> SessionFuture {
        match self {
            Self::Inactive { session_future } | Self::Active { session_future, .. } => {
                session_future.clone()
            },
            Self::Creating { promise }
            | Self::Activating { promise }
            | Self::Transferring { promise }
            | Self::Initializing { promise }
            | Self::Reactivating { promise }
            | Self::Retransferring { promise }
            | Self::Reinitializing { promise }
            | Self::Recreating { promise, .. } => promise.future(),
            // Closing has a dedicated CreateRequested arm; this branch
            // is never reached through execute.
            Self::Closing { .. } => failed_session_future(session_closed_error()),
        }
    }

    /// Surrender the pending promise, if this state holds one, for
    /// hand-off into Closing.
    fn into_pending_promise(self) -> Option<SessionPromise> {
        match self {
            Self::Creating { promise }
            | Self::Activating { promise }
            | Self::Transferring { promise }
            | Self::Initializing { promise }
            | Self::Reactivating { promise }
            | Self::Retransferring { promise }
            | Self::Reinitializing { promise }
            | Self::Recreating { promise, .. } => Some(promise),
            Self::Inactive { .. } | Self::Active { .. } | Self::Closing { .. } => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bytes::Bytes;
    use futures::FutureExt;
    use futures::executor::block_on;
    use opclink_core::types::NodeId;
    use proptest::prelude::*;

    use super::*;

    fn session() -> Arc<Session> {
        Arc::new(Session::new(
            NodeId::Numeric { namespace: 1, id: 7 },
            NodeId::Opaque { namespace: 0, id: Bytes::from_static(b"auth") },
            "test".to_string(),
            Duration::from_secs(120),
            0,
            Bytes::new(),
            Bytes::from_static(b"nonce"),
        ))
    }

    fn response() -> CreateSessionResponse {
        CreateSessionResponse {
            session_id: NodeId::Numeric { namespace: 1, id: 7 },
            authentication_token: NodeId::Opaque {
                namespace: 0,
                id: Bytes::from_static(b"auth"),
            },
            revised_session_timeout: Duration::from_secs(120),
            server_nonce: Bytes::from_static(b"nonce"),
            server_certificate: Bytes::new(),
            server_signature: opclink_core::types::SignatureData::empty(),
            max_request_message_size: 0,
        }
    }

    fn error(status: StatusCode) -> ServiceError {
        ServiceError::new(status, "test failure")
    }

    #[test]
    fn create_from_inactive_schedules_one_request() {
        let (state, actions) = SessionState::inactive()
            .execute(SessionEvent::CreateRequested { promise: session_promise() });

        assert_eq!(state.status(), SessionStatus::Creating);
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], Action::CreateSession));
    }

    #[test]
    fn happy_path_reaches_active_and_resolves_future() {
        let promise = session_promise();
        let future = promise.future();

        let state = SessionState::Creating { promise };
        let (state, actions) = state.execute(SessionEvent::CreateOk { response: response() });
        assert_eq!(state.status(), SessionStatus::Activating);
        assert!(matches!(actions[0], Action::ActivateSession { .. }));

        let (state, actions) = state.execute(SessionEvent::ActivateOk { session: session() });
        assert_eq!(state.status(), SessionStatus::Transferring);
        assert!(matches!(actions[0], Action::TransferSubscriptions { .. }));

        let (state, actions) = state.execute(SessionEvent::TransferOk { session: session() });
        assert_eq!(state.status(), SessionStatus::Initializing);
        assert!(matches!(actions[0], Action::RunInitializers { .. }));

        let live = session();
        let (state, actions) =
            state.execute(SessionEvent::InitializeOk { session: Arc::clone(&live) });
        assert_eq!(state.status(), SessionStatus::Active);
        assert!(actions.is_empty());

        let resolved = block_on(future).unwrap();
        assert!(Arc::ptr_eq(&resolved, &live));
    }

    #[test]
    fn create_failure_fails_future_and_returns_to_inactive() {
        let promise = session_promise();
        let future = promise.future();

        let (state, actions) = SessionState::Creating { promise }
            .execute(SessionEvent::CreateErr { error: error(StatusCode::BAD_TIMEOUT) });

        assert_eq!(state.status(), SessionStatus::Inactive);
        assert!(actions.is_empty());
        assert_eq!(block_on(future).unwrap_err().status, StatusCode::BAD_TIMEOUT);
    }

    #[test]
    fn create_while_creating_chains_instead_of_requesting() {
        let state = SessionState::Creating { promise: session_promise() };
        let late = session_promise();

        let (state, actions) = state.execute(SessionEvent::CreateRequested { promise: late });

        assert_eq!(state.status(), SessionStatus::Creating);
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], Action::ChainSessionFuture { .. }));
    }

    #[test]
    fn create_while_active_resolves_immediately() {
        let live = session();
        let state = SessionState::Active {
            session_future: SessionFuture::ready(Ok(Arc::clone(&live))),
            session: Arc::clone(&live),
        };

        let late = session_promise();
        let late_future = late.future();
        let (state, actions) = state.execute(SessionEvent::CreateRequested { promise: late });

        assert_eq!(state.status(), SessionStatus::Active);
        assert!(actions.is_empty());
        assert!(Arc::ptr_eq(&block_on(late_future).unwrap(), &live));
    }

    #[test]
    fn channel_drop_while_activating_fails_with_connection_closed() {
        let promise = session_promise();
        let future = promise.future();

        let (state, _) =
            SessionState::Activating { promise }.execute(SessionEvent::ChannelInactive);

        assert_eq!(state.status(), SessionStatus::Inactive);
        assert_eq!(block_on(future).unwrap_err().status, StatusCode::BAD_CONNECTION_CLOSED);
    }

    #[test]
    fn initializer_failure_tears_down_and_surfaces_real_error() {
        let promise = session_promise();
        let future = promise.future();

        let (state, actions) = SessionState::Initializing { promise }.execute(
            SessionEvent::InitializeErr {
                error: error(StatusCode::BAD_INTERNAL_ERROR),
                session: session(),
            },
        );

        assert_eq!(state.status(), SessionStatus::Closing);
        assert!(matches!(actions[0], Action::CloseSession { .. }));
        assert_eq!(block_on(future).unwrap_err().status, StatusCode::BAD_INTERNAL_ERROR);
    }

    #[test]
    fn channel_drop_while_active_starts_reactivation() {
        let live = session();
        let state = SessionState::Active {
            session_future: SessionFuture::ready(Ok(Arc::clone(&live))),
            session: live,
        };

        let (state, actions) = state.execute(SessionEvent::ChannelInactive);

        assert_eq!(state.status(), SessionStatus::Reactivating);
        assert!(matches!(actions[0], Action::ReactivateSession { .. }));
    }

    #[test]
    fn transient_reactivate_failure_retries_on_same_promise() {
        let promise = session_promise();
        let future = promise.future();

        let (state, actions) = SessionState::Reactivating { promise }.execute(
            SessionEvent::ReactivateErr {
                error: error(StatusCode::BAD_TIMEOUT),
                session: session(),
            },
        );

        assert_eq!(state.status(), SessionStatus::Reactivating);
        assert!(matches!(actions[0], Action::ReactivateSession { .. }));
        // Waiters are still parked, not failed
        assert!(future.now_or_never().is_none());
    }

    #[test]
    fn fatal_reactivate_failure_enters_recreate_keeping_promise() {
        let promise = session_promise();
        let future = promise.future();

        let (state, actions) = SessionState::Reactivating { promise }.execute(
            SessionEvent::ReactivateErr {
                error: error(StatusCode::BAD_SESSION_ID_INVALID),
                session: session(),
            },
        );

        match state {
            SessionState::Recreating { delay, .. } => assert_eq!(delay, INITIAL_RECREATE_DELAY),
            other => panic!("expected Recreating, got {other:?}"),
        }
        assert!(matches!(actions[0], Action::CreateSession));
        assert!(future.now_or_never().is_none());
    }

    #[test]
    fn recovery_path_runs_transfer_and_initializers() {
        let state = SessionState::Reactivating { promise: session_promise() };

        let (state, actions) = state.execute(SessionEvent::ActivateOk { session: session() });
        assert_eq!(state.status(), SessionStatus::Retransferring);
        assert!(matches!(actions[0], Action::TransferSubscriptions { .. }));

        let (state, actions) = state.execute(SessionEvent::TransferOk { session: session() });
        assert_eq!(state.status(), SessionStatus::Reinitializing);
        assert!(matches!(actions[0], Action::RunInitializers { .. }));

        let (state, actions) = state.execute(SessionEvent::InitializeOk { session: session() });
        assert_eq!(state.status(), SessionStatus::Active);
        assert!(actions.is_empty());
    }

    #[test]
    fn recreate_backoff_doubles_and_caps() {
        let mut state =
            SessionState::Recreating { promise: session_promise(), delay: INITIAL_RECREATE_DELAY };
        let mut slept = Vec::new();

        for _ in 0..7 {
            let (next, actions) = state
                .execute(SessionEvent::CreateErr { error: error(StatusCode::BAD_TIMEOUT) });
            match &actions[0] {
                Action::ScheduleCreateSession { delay } => slept.push(delay.as_secs()),
                other => panic!("expected ScheduleCreateSession, got {other:?}"),
            }
            state = next;
        }

        assert_eq!(slept, vec![1, 2, 4, 8, 16, 16, 16]);
    }

    #[test]
    fn recreate_success_resumes_through_reactivating() {
        let state =
            SessionState::Recreating { promise: session_promise(), delay: Duration::from_secs(4) };

        let (state, actions) = state.execute(SessionEvent::CreateOk { response: response() });

        assert_eq!(state.status(), SessionStatus::Reactivating);
        assert!(matches!(actions[0], Action::ActivateSession { .. }));
    }

    #[test]
    fn close_from_pending_state_absorbs_in_flight_success() {
        // Close preempts a create in flight
        let state = SessionState::Creating { promise: session_promise() };
        let close = close_promise();
        let close_future = close.future();

        let (state, actions) = state.execute(SessionEvent::CloseRequested { promise: close });
        assert_eq!(state.status(), SessionStatus::Closing);
        assert!(actions.is_empty());

        // The stale create success arrives: close against its session
        let (state, actions) = state.execute(SessionEvent::CreateOk { response: response() });
        assert_eq!(state.status(), SessionStatus::Closing);
        match &actions[0] {
            Action::CloseSession { target } => {
                assert_eq!(target.session_id, NodeId::Numeric { namespace: 1, id: 7 });
            },
            other => panic!("expected CloseSession, got {other:?}"),
        }

        let (state, actions) = state.execute(SessionEvent::CloseOk);
        assert_eq!(state.status(), SessionStatus::Inactive);
        assert!(actions.is_empty());
        block_on(close_future);
    }

    #[test]
    fn close_absorbs_in_flight_failure_without_round_trip() {
        let promise = session_promise();
        let session_future = promise.future();
        let state = SessionState::Creating { promise };

        let (state, _) =
            state.execute(SessionEvent::CloseRequested { promise: close_promise() });
        let (state, actions) = state
            .execute(SessionEvent::CreateErr { error: error(StatusCode::BAD_TIMEOUT) });

        assert_eq!(state.status(), SessionStatus::Closing);
        assert!(matches!(actions[0], Action::EmitCloseOk));

        let (_, _) = state.execute(SessionEvent::CloseOk);
        assert_eq!(
            block_on(session_future).unwrap_err().status,
            StatusCode::BAD_SESSION_CLOSED
        );
    }

    #[test]
    fn second_close_chains_onto_first() {
        let state = SessionState::Closing {
            session_promise: None,
            close_promise: close_promise(),
        };

        let (state, actions) =
            state.execute(SessionEvent::CloseRequested { promise: close_promise() });

        assert_eq!(state.status(), SessionStatus::Closing);
        assert!(matches!(actions[0], Action::ChainCloseFuture { .. }));
    }

    #[test]
    fn create_while_closing_fails_after_close() {
        let state = SessionState::Closing {
            session_promise: None,
            close_promise: close_promise(),
        };

        let (state, actions) =
            state.execute(SessionEvent::CreateRequested { promise: session_promise() });

        assert_eq!(state.status(), SessionStatus::Closing);
        assert!(matches!(actions[0], Action::FailAfterClose { .. }));
    }

    #[test]
    fn close_while_inactive_completes_immediately() {
        let close = close_promise();
        let close_future = close.future();

        let (state, actions) =
            SessionState::inactive().execute(SessionEvent::CloseRequested { promise: close });

        assert_eq!(state.status(), SessionStatus::Inactive);
        assert!(actions.is_empty());
        block_on(close_future);
    }

    #[test]
    fn unexpected_completions_self_loop() {
        // Stale completions against states that never scheduled them
        let cases: Vec<(SessionState, SessionEvent)> = vec![
            (SessionState::inactive(), SessionEvent::CreateOk { response: response() }),
            (SessionState::inactive(), SessionEvent::ChannelInactive),
            (
                SessionState::Creating { promise: session_promise() },
                SessionEvent::ActivateOk { session: session() },
            ),
            (
                SessionState::Creating { promise: session_promise() },
                SessionEvent::CloseOk,
            ),
            (
                SessionState::Transferring { promise: session_promise() },
                SessionEvent::ChannelInactive,
            ),
            (
                SessionState::Recreating {
                    promise: session_promise(),
                    delay: INITIAL_RECREATE_DELAY,
                },
                SessionEvent::ReactivateOk { session: session() },
            ),
            (
                SessionState::Closing {
                    session_promise: None,
                    close_promise: close_promise(),
                },
                SessionEvent::ChannelInactive,
            ),
        ];

        for (state, event) in cases {
            let before = state.status();
            let (after, actions) = state.execute(event);
            assert_eq!(after.status(), before);
            assert!(actions.is_empty(), "self-loop must schedule nothing");
        }
    }

    proptest! {
        /// Backoff never exceeds the cap, for any number of consecutive
        /// create failures.
        #[test]
        fn backoff_never_exceeds_cap(failures in 1usize..40) {
            let mut state = SessionState::Recreating {
                promise: session_promise(),
                delay: INITIAL_RECREATE_DELAY,
            };

            for _ in 0..failures {
                let (next, actions) = state.execute(SessionEvent::CreateErr {
                    error: error(StatusCode::BAD_TIMEOUT),
                });
                match &actions[0] {
                    Action::ScheduleCreateSession { delay } => {
                        prop_assert!(*delay <= MAX_RECREATE_DELAY);
                    },
                    other => prop_assert!(false, "unexpected action {:?}", other),
                }
                state = next;
            }

            match state {
                SessionState::Recreating { delay, .. } => {
                    prop_assert!(delay <= MAX_RECREATE_DELAY);
                },
                other => prop_assert!(false, "unexpected state {:?}", other),
            }
        }
    }
}
