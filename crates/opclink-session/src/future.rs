//! Single-assignment promises with shared, cloneable futures.
//!
//! The lifecycle guarantees that concurrent `create_session()` calls
//! resolve to the same outcome without issuing duplicate requests. That
//! needs a promise that is completed exactly once and a future that any
//! number of waiters can clone and await. [`Promise`] wraps a oneshot
//! channel whose receiver is made [`Shared`]; the promise itself keeps a
//! handle to the shared future so later callers can be chained onto an
//! in-flight operation.

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures::{
    FutureExt,
    channel::oneshot,
    future::{BoxFuture, Shared},
};
use opclink_core::{ServiceError, Session, StatusCode};

/// Outcome of a session establishment attempt.
pub type SessionResult = Result<Arc<Session>, ServiceError>;

/// Promise of a [`SessionResult`].
pub type SessionPromise = Promise<SessionResult>;

/// Cloneable future of a [`SessionResult`].
pub type SessionFuture = SharedFuture<SessionResult>;

/// Promise of close completion. Closing always succeeds, so there is no
/// error branch.
pub type ClosePromise = Promise<()>;

/// Cloneable future of close completion.
pub type CloseFuture = SharedFuture<()>;

/// A single-assignment promise whose future can be awaited by any number
/// of clones.
pub struct Promise<T: Clone> {
    tx: oneshot::Sender<T>,
    future: SharedFuture<T>,
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Create a promise.
    ///
    /// If the promise is dropped without being completed, waiters resolve
    /// to `abandoned` instead of hanging forever.
    pub fn new(abandoned: T) -> Self {
        let (tx, rx) = oneshot::channel();
        let future = async move { rx.await.unwrap_or(abandoned) }.boxed().shared();
        Self { tx, future: SharedFuture(future) }
    }

    /// Resolve the promise. Waiters that already dropped their future are
    /// simply not notified.
    pub fn complete(self, value: T) {
        let _ = self.tx.send(value);
    }

    /// A future resolving when the promise is completed. Cloneable;
    /// every clone observes the same value.
    pub fn future(&self) -> SharedFuture<T> {
        self.future.clone()
    }
}

impl<T: Clone> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise").finish_non_exhaustive()
    }
}

/// A cloneable future of a single value.
pub struct SharedFuture<T: Clone>(Shared<BoxFuture<'static, T>>);

impl<T: Clone + Send + 'static> SharedFuture<T> {
    /// A future that is already resolved.
    pub fn ready(value: T) -> Self {
        Self(futures::future::ready(value).boxed().shared())
    }
}

impl<T: Clone> Clone for SharedFuture<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: Clone> Future for SharedFuture<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        self.0.poll_unpin(cx)
    }
}

impl<T: Clone> fmt::Debug for SharedFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedFuture").finish_non_exhaustive()
    }
}

/// The error a session future resolves to when no session is (or will
/// be) available.
pub fn session_closed_error() -> ServiceError {
    ServiceError::new(StatusCode::BAD_SESSION_CLOSED, "session closed")
}

/// A fresh session promise. Abandonment surfaces as an internal error so
/// waiters never hang on a dropped lifecycle.
pub fn session_promise() -> SessionPromise {
    Promise::new(Err(ServiceError::new(
        StatusCode::BAD_UNEXPECTED_ERROR,
        "session lifecycle shut down",
    )))
}

/// A fresh close promise.
pub fn close_promise() -> ClosePromise {
    Promise::new(())
}

/// A session future that is already failed.
pub fn failed_session_future(error: ServiceError) -> SessionFuture {
    SharedFuture::ready(Err(error))
}
