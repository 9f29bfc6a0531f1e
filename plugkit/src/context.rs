//! Context implementation for request-scoped data and cancellation
//!
//! A Context carries a cancellation signal, an optional deadline and
//! request-scoped values across async boundaries. Child contexts observe
//! their parent's cancellation; cancelling a child never affects the parent.

use crate::error::PlugkitError;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};
use tokio::time;

/// Why a context stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Cancelled,
    DeadlineExceeded,
}

/// Context carries request-scoped values like cancellation signals, timeouts, and metadata
/// Pass this as the first parameter to every async handler method
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    deadline: Option<Instant>,
    timeout: Option<Duration>,
    values: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
    parent: Option<Context>,
    done: watch::Receiver<Option<CancelReason>>,
    done_tx: Arc<watch::Sender<Option<CancelReason>>>,
}

impl Context {
    pub fn new() -> Self {
        Self::build(None, None, None)
    }

    fn build(parent: Option<Context>, deadline: Option<Instant>, timeout: Option<Duration>) -> Self {
        let inherited = parent.as_ref().and_then(Context::reason);
        let (done_tx, done_rx) = watch::channel(inherited);
        Self {
            inner: Arc::new(ContextInner {
                deadline,
                timeout,
                values: RwLock::new(HashMap::new()),
                parent,
                done: done_rx,
                done_tx: Arc::new(done_tx),
            }),
        }
    }

    /// Derives a context that is cancelled whenever `self` is.
    pub fn child(&self) -> Self {
        let child = Self::build(Some(self.clone()), self.inner.deadline, self.inner.timeout);
        child.cancel_on(self);
        child
    }

    /// Derives a child context that expires after `timeout`. An earlier
    /// parent deadline still applies.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        let effective = match self.inner.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };
        let child = Self::build(Some(self.clone()), Some(effective), Some(timeout));
        child.cancel_on(self);

        let tx = child.inner.done_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = time::sleep_until(deadline.into()) => {
                    tx.send_if_modified(|reason| {
                        if reason.is_none() {
                            *reason = Some(CancelReason::DeadlineExceeded);
                            true
                        } else {
                            false
                        }
                    });
                }
                _ = tx.closed() => {}
            }
        });
        child
    }

    /// Propagates cancellation from `other` into this context.
    pub fn cancel_on(&self, other: &Context) {
        let tx = self.inner.done_tx.clone();
        let mut source = other.done();
        tokio::spawn(async move {
            tokio::select! {
                result = source.wait_for(Option::is_some) => {
                    if let Ok(reason) = result {
                        let reason = *reason;
                        tx.send_if_modified(|current| {
                            if current.is_none() {
                                *current = reason;
                                true
                            } else {
                                false
                            }
                        });
                    }
                }
                _ = tx.closed() => {}
            }
        });
    }

    pub async fn with_value<T: Send + Sync + 'static>(self, key: &str, value: T) -> Self {
        let mut values = self.inner.values.write().await;
        values.insert(key.to_string(), Arc::new(value));
        drop(values);
        self
    }

    /// Looks up a value on this context, then on its ancestors.
    pub async fn get_value<T>(&self, key: &str) -> Option<T>
    where
        T: Send + Sync + Clone + 'static,
    {
        let mut current = Some(self.clone());
        while let Some(ctx) = current {
            let found = {
                let values = ctx.inner.values.read().await;
                values.get(key).cloned()
            };
            if let Some(value) = found {
                return value.downcast_ref::<T>().cloned();
            }
            current = ctx.inner.parent.clone();
        }
        None
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.done.borrow().is_some()
    }

    pub fn reason(&self) -> Option<CancelReason> {
        *self.inner.done.borrow()
    }

    /// The error matching the cancellation reason, if any.
    pub fn err(&self) -> Option<PlugkitError> {
        self.reason().map(|reason| match reason {
            CancelReason::Cancelled => PlugkitError::Cancelled,
            CancelReason::DeadlineExceeded => {
                PlugkitError::TimedOut(self.inner.timeout.unwrap_or_default())
            }
        })
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Returns a channel that flips once work done on behalf of this
    /// context should stop
    pub fn done(&self) -> watch::Receiver<Option<CancelReason>> {
        self.inner.done.clone()
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn cancelled(&self) {
        let mut rx = self.done();
        let _ = rx.wait_for(Option::is_some).await;
    }

    pub fn cancel(&self) {
        self.inner.done_tx.send_if_modified(|reason| {
            if reason.is_none() {
                *reason = Some(CancelReason::Cancelled);
                true
            } else {
                false
            }
        });
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("deadline", &self.inner.deadline)
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn context_stores_and_retrieves_values() {
        let ctx = Context::new();
        let ctx = ctx.with_value("api_key", "secret123".to_string()).await;

        let value: Option<String> = ctx.get_value("api_key").await;
        assert_eq!(value, Some("secret123".to_string()));
    }

    #[tokio::test]
    async fn child_sees_parent_values() {
        let parent = Context::new().with_value("region", 7_u32).await;
        let child = parent.child();

        assert_eq!(child.get_value::<u32>("region").await, Some(7));
        assert_eq!(child.get_value::<String>("region").await, None);
    }

    #[tokio::test]
    async fn context_timeout_cancels() {
        let ctx = Context::new().with_timeout(Duration::from_millis(50));

        assert!(!ctx.is_cancelled());

        sleep(Duration::from_millis(120)).await;

        assert!(ctx.is_cancelled());
        assert_eq!(ctx.reason(), Some(CancelReason::DeadlineExceeded));
        assert!(matches!(ctx.err(), Some(PlugkitError::TimedOut(_))));
    }

    #[tokio::test]
    async fn context_manual_cancel() {
        let ctx = Context::new();

        assert!(!ctx.is_cancelled());

        ctx.cancel();

        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.err(), Some(PlugkitError::Cancelled)));
    }

    #[tokio::test]
    async fn parent_cancellation_reaches_child() {
        let parent = Context::new();
        let child = parent.child();

        parent.cancel();
        tokio::time::timeout(Duration::from_secs(1), child.cancelled())
            .await
            .expect("child should observe cancellation");

        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn child_cancellation_does_not_reach_parent() {
        let parent = Context::new();
        let child = parent.child();

        child.cancel();
        sleep(Duration::from_millis(10)).await;

        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn context_deadline() {
        let ctx = Context::new();
        assert!(ctx.deadline().is_none());

        let ctx_with_timeout = ctx.with_timeout(Duration::from_secs(1));
        assert!(ctx_with_timeout.deadline().is_some());
    }
}
