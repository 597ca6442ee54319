//! Session lifecycle
//!
//! Event-driven state machine managing an OPC UA client session: create,
//! activate, transfer subscriptions, run initializers, survive channel
//! drops by reactivating, recreate from scratch with exponential backoff
//! when recovery fails, and close on demand from any state.
//!
//! # Architecture
//!
//! The transition logic is a pure state machine ([`SessionState`]): it
//! consumes events and returns actions, performing no I/O itself. The
//! driver ([`SessionFsm`]) serializes events through a queue, runs each
//! action as a task, and feeds completions back in as events. Callers
//! only see two operations - [`SessionFsm::create_session`] and
//! [`SessionFsm::close_session`] - whose shared futures coalesce
//! concurrent calls onto a single in-flight attempt.
//!
//! # Components
//!
//! - [`SessionState`] / [`SessionEvent`] / [`Action`]: the pure machine
//! - [`SessionFsm`]: driver and caller-facing handle
//! - [`SessionServices`]: collaborator bundle (transport, identity,
//!   crypto, subscriptions, initializers)
//! - [`SessionFuture`] / [`CloseFuture`]: shared single-assignment
//!   futures

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod actions;
pub mod event;
pub mod fsm;
pub mod future;
pub mod services;
pub mod signature;
pub mod state;

pub use event::SessionEvent;
pub use fsm::SessionFsm;
pub use future::{CloseFuture, SessionFuture, SessionResult};
pub use services::{
    CryptoProvider, IdentityProvider, SecureChannelInfo, SessionActivityListener,
    SessionInitializer, SessionServices, SubscriptionManager, Transport,
};
pub use state::{Action, SessionState, SessionStatus};
