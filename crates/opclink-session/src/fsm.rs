//! Session lifecycle driver.
//!
//! Owns the state machine and serializes event delivery: events are
//! queued on an unbounded channel and processed strictly one at a time,
//! in arrival order. Actions returned by a transition are spawned as
//! tasks; each re-enters the machine by sending its completion event
//! back onto the same queue, so no action ever calls into the machine
//! synchronously.

use std::{
    future::Future,
    sync::{Arc, Mutex, PoisonError},
};

use opclink_core::{Session, StatusCode};
use tokio::sync::{mpsc, watch};

use crate::{
    actions,
    event::SessionEvent,
    future::{CloseFuture, SessionFuture, close_promise, session_closed_error, session_promise},
    services::{SessionActivityListener, SessionServices, Transport},
    state::{Action, SessionState, SessionStatus},
};

type Listeners = Arc<Mutex<Vec<Arc<dyn SessionActivityListener>>>>;

/// Handle to a running session lifecycle.
///
/// Spawning starts the driver task plus two permanent watchers: one
/// translating channel drops into [`SessionEvent::ChannelInactive`], one
/// reacting to session-invalidating service faults by forcing the
/// channel closed (which then surfaces as a drop like any other).
/// Dropping the handle aborts all three.
pub struct SessionFsm {
    events: mpsc::UnboundedSender<SessionEvent>,
    status: watch::Receiver<SessionStatus>,
    listeners: Listeners,
    tasks: Vec<tokio::task::AbortHandle>,
}

impl SessionFsm {
    /// Start a session lifecycle.
    ///
    /// `faults` is the stream of service-fault status codes observed on
    /// requests outside this module; faults that invalidate the session
    /// or secure channel trigger a forced reconnect while the session is
    /// active, and are ignored otherwise.
    pub fn spawn(
        services: SessionServices,
        faults: mpsc::UnboundedReceiver<StatusCode>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SessionStatus::Inactive);
        let listeners: Listeners = Arc::new(Mutex::new(Vec::new()));

        let channel_watch = tokio::spawn(watch_channel(
            Arc::clone(&services.transport),
            events_tx.clone(),
        ));
        let fault_watch = tokio::spawn(watch_faults(
            Arc::clone(&services.transport),
            faults,
            status_rx.clone(),
        ));
        let driver = tokio::spawn(run(
            services,
            events_rx,
            events_tx.clone(),
            status_tx,
            Arc::clone(&listeners),
        ));

        Self {
            events: events_tx,
            status: status_rx,
            listeners,
            tasks: vec![
                driver.abort_handle(),
                channel_watch.abort_handle(),
                fault_watch.abort_handle(),
            ],
        }
    }

    /// Request a session.
    ///
    /// Idempotent while an attempt is in flight: every caller's future
    /// resolves to the same outcome and at most one CreateSession request
    /// is issued.
    pub fn create_session(&self) -> SessionFuture {
        let promise = session_promise();
        let future = promise.future();
        // A failed send drops the promise, which resolves the future to
        // the abandoned error.
        let _ = self.events.send(SessionEvent::CreateRequested { promise });
        future
    }

    /// Request the session be closed.
    ///
    /// Always succeeds eventually; any pending session future resolves to
    /// a "session closed" error.
    pub fn close_session(&self) -> CloseFuture {
        let promise = close_promise();
        let future = promise.future();
        let _ = self.events.send(SessionEvent::CloseRequested { promise });
        future
    }

    /// Current lifecycle status.
    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Watch lifecycle status changes.
    pub fn status_stream(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Register an activity listener, notified when the session becomes
    /// usable or stops being usable.
    pub fn add_activity_listener(&self, listener: Arc<dyn SessionActivityListener>) {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner).push(listener);
    }

    /// Deregister a previously registered activity listener.
    pub fn remove_activity_listener(&self, listener: &Arc<dyn SessionActivityListener>) {
        let target = Arc::as_ptr(listener).cast::<()>();
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|registered| !std::ptr::eq(Arc::as_ptr(registered).cast::<()>(), target));
    }
}

impl Drop for SessionFsm {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// The driver loop: one event fully processed before the next.
async fn run(
    services: SessionServices,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    status: watch::Sender<SessionStatus>,
    listeners: Listeners,
) {
    let mut state = SessionState::inactive();

    while let Some(event) = events.recv().await {
        let previous = state.status();
        let previous_session = state.active_session().map(Arc::clone);
        let event_name = event.name();

        let (next, actions) = state.execute(event);
        let current = next.status();

        if current == previous {
            tracing::trace!("session state {current:?} on {event_name}");
        } else {
            tracing::debug!("session state {previous:?} -> {current:?} on {event_name}");
            let _ = status.send(current);
            notify_activity(&listeners, previous_session.as_deref(), next.active_session());
        }

        state = next;

        for action in actions {
            dispatch(&services, &events_tx, action);
        }
    }
}

/// Tell activity listeners about Active entry and exit.
fn notify_activity(
    listeners: &Listeners,
    previous: Option<&Session>,
    current: Option<&Arc<Session>>,
) {
    // Snapshot so user callbacks run without the registry lock held
    let snapshot: Vec<_> =
        listeners.lock().unwrap_or_else(PoisonError::into_inner).clone();

    if let Some(session) = previous {
        for listener in &snapshot {
            listener.on_session_inactive(session);
        }
    }
    if let Some(session) = current {
        for listener in &snapshot {
            listener.on_session_active(session);
        }
    }
}

/// Execute one action. Network-touching actions become tasks that report
/// back through the event queue; chaining actions only move promise
/// resolutions around.
fn dispatch(
    services: &SessionServices,
    events: &mpsc::UnboundedSender<SessionEvent>,
    action: Action,
) {
    match action {
        Action::CreateSession => {
            spawn_action(events.clone(), actions::create_session(services.clone()));
        },
        Action::ScheduleCreateSession { delay } => {
            let services = services.clone();
            let events = events.clone();
            tokio::spawn(async move {
                tracing::debug!("retrying session creation in {delay:?}");
                tokio::time::sleep(delay).await;
                let _ = events.send(actions::create_session(services).await);
            });
        },
        Action::ActivateSession { response } => {
            spawn_action(events.clone(), actions::activate_session(services.clone(), response));
        },
        Action::ReactivateSession { session } => {
            spawn_action(events.clone(), actions::reactivate_session(services.clone(), session));
        },
        Action::TransferSubscriptions { session } => {
            spawn_action(
                events.clone(),
                actions::transfer_subscriptions(services.clone(), session),
            );
        },
        Action::RunInitializers { session } => {
            spawn_action(events.clone(), actions::run_initializers(services.clone(), session));
        },
        Action::CloseSession { target } => {
            spawn_action(events.clone(), actions::close_session(services.clone(), target));
        },
        Action::EmitCloseOk => {
            let _ = events.send(SessionEvent::CloseOk);
        },
        Action::ChainSessionFuture { promise, onto } => {
            tokio::spawn(async move {
                promise.complete(onto.await);
            });
        },
        Action::ChainCloseFuture { promise, onto } => {
            tokio::spawn(async move {
                onto.await;
                promise.complete(());
            });
        },
        Action::FailAfterClose { promise, after } => {
            tokio::spawn(async move {
                after.await;
                promise.complete(Err(session_closed_error()));
            });
        },
    }
}

fn spawn_action(
    events: mpsc::UnboundedSender<SessionEvent>,
    action: impl Future<Output = SessionEvent> + Send + 'static,
) {
    tokio::spawn(async move {
        let _ = events.send(action.await);
    });
}

/// Translate channel drops into lifecycle events.
async fn watch_channel(
    transport: Arc<dyn Transport>,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    loop {
        transport.channel_closed().await;
        tracing::debug!("secure channel closed");
        if events.send(SessionEvent::ChannelInactive).is_err() {
            break;
        }
    }
}

/// React to session-invalidating service faults by forcing the channel
/// closed. Only relevant while the session is active; the drop then
/// surfaces through the channel watcher and drives reactivation.
async fn watch_faults(
    transport: Arc<dyn Transport>,
    mut faults: mpsc::UnboundedReceiver<StatusCode>,
    status: watch::Receiver<SessionStatus>,
) {
    while let Some(fault) = faults.recv().await {
        if !fault.is_session_error() && !fault.is_secure_channel_error() {
            continue;
        }
        if *status.borrow() != SessionStatus::Active {
            continue;
        }
        tracing::debug!("service fault {fault} invalidates the session, closing channel");
        transport.force_close().await;
    }
}
