use crate::bag::Bag;
use crate::errors::{Result, TaskError};
use crate::policy::Policy;
use crate::task::Task;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::debug;

/// Fire-and-forget callback invoked once per observed task error. Spawned
/// off the join loop; it never affects the group outcome.
pub type ErrorHandler = Arc<dyn Fn(Group, TaskError) + Send + Sync>;

/// Converts an intercepted panic payload, plus a backtrace captured at the
/// interception point, into the error reported for the panicking task.
pub type PanicHandler = Arc<dyn Fn(Box<dyn Any + Send>, Backtrace) -> TaskError + Send + Sync>;

/// Completion signal emitted exactly once per dispatched task. `Some`
/// carries a panic payload no handler claimed; the join loop re-raises it.
type DoneSignal = Option<Box<dyn Any + Send>>;

/// A batch of concurrently dispatched tasks plus shared state and chaining
/// configuration.
///
/// `Group` is a cheap handle; clones refer to the same underlying group, so
/// it can be captured by tasks and handed across spawn boundaries freely.
/// Tasks are added while the group is idle, then [`exec`](Group::exec)
/// dispatches all of them at once, joins on completion, aggregates errors,
/// and on success hands the [`Bag`] forward to the next group in the chain.
#[derive(Clone)]
pub struct Group {
    inner: Arc<Inner>,
}

struct Inner {
    tasks: Mutex<Vec<Task>>,
    bag: Bag,
    next: Mutex<Option<Group>>,
    error_handler: RwLock<Option<ErrorHandler>>,
    panic_handler: RwLock<Option<PanicHandler>>,
    policy: RwLock<Option<Policy>>,
}

impl Group {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                tasks: Mutex::new(Vec::new()),
                bag: Bag::new(),
                next: Mutex::new(None),
                error_handler: RwLock::new(None),
                panic_handler: RwLock::new(None),
                policy: RwLock::new(None),
            }),
        }
    }

    /// Appends a task. Dispatch order is insertion order; completion order
    /// is not. Supported only before `exec`; the list lock keeps an
    /// accidental concurrent call from corrupting the list.
    pub fn add(&self, task: Task) {
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
    }

    /// Links the group that runs after this one succeeds. The caller owns
    /// the chain; this group only invokes its successor.
    pub fn set_next(&self, next: Group) {
        *self
            .inner
            .next
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(next);
    }

    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(Group, TaskError) + Send + Sync + 'static,
    {
        *self
            .inner
            .error_handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
    }

    pub fn set_panic_handler<F>(&self, handler: F)
    where
        F: Fn(Box<dyn Any + Send>, Backtrace) -> TaskError + Send + Sync + 'static,
    {
        *self
            .inner
            .panic_handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
    }

    pub fn set_policy(&self, policy: Policy) {
        *self
            .inner
            .policy
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(policy);
    }

    pub fn policy(&self) -> Option<Policy> {
        *self
            .inner
            .policy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The group's state bag, for direct access. Tasks usually go through
    /// [`get`](Group::get)/[`set`](Group::set) instead.
    pub fn bag(&self) -> &Bag {
        &self.inner.bag
    }

    /// Stores a value in the bag. A value that serializes to JSON null
    /// unsets the key instead.
    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.inner.bag.set(key, value);
        Ok(())
    }

    /// Reads a value from the bag, falling back to `default` when the key
    /// is unset or the stored value does not decode as `T`. Callers never
    /// need a presence check for optional configuration-style values.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.inner.bag.get(key) {
            Some(value) => serde_json::from_value(value).unwrap_or(default),
            None => default,
        }
    }

    /// Removes a key from the bag. Equivalent to `set(key, Value::Null)`.
    pub fn unset(&self, key: &str) {
        self.inner.bag.set(key, Value::Null);
    }

    /// Runs every task in this group concurrently, joins on all of them,
    /// and on success hands the bag forward and recurses into the next
    /// group. Returns `Ok(())` on full success through the chain, or the
    /// first error surfaced by the failing stage.
    ///
    /// "First" means arrival order at the join loop, not insertion order;
    /// with several failing tasks the retained error is race-dependent.
    /// Every dispatched task runs to completion even after a sibling has
    /// failed — there is no cancellation.
    ///
    /// One tokio task is spawned per added task with no pooling or
    /// throttling, which is a deliberate tradeoff for I/O-bound or
    /// short-lived work; a group with 10k tasks spawns 10k tokio tasks.
    ///
    /// A panicking task re-raises its panic here unless a panic handler is
    /// configured to downgrade it to an error.
    pub fn exec(&self) -> BoxFuture<'static, Result<()>> {
        let group = self.clone();
        Box::pin(async move { group.run().await })
    }

    async fn run(self) -> Result<()> {
        let tasks: Vec<Task> = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        debug!(tasks = tasks.len(), "dispatching group");

        let mut first_err = if tasks.is_empty() {
            None
        } else {
            self.dispatch_and_join(tasks).await
        };

        if let Some(policy) = self.policy() {
            if !policy.contains(Policy::HALT_ON_ANY_ERROR) {
                if let Some(err) = first_err.take() {
                    debug!(%err, "halt-on-error disabled, continuing past failure");
                }
            }
        }

        if let Some(err) = first_err {
            return Err(err);
        }

        let next = self
            .inner
            .next
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match next {
            Some(next) => {
                self.hand_off(&next);
                next.exec().await
            }
            None => Ok(()),
        }
    }

    /// Spawns every task and drives the join loop until each one has
    /// signaled completion. Returns the first error observed, if any.
    async fn dispatch_and_join(&self, tasks: Vec<Task>) -> Option<TaskError> {
        let total = tasks.len();
        let (err_tx, mut err_rx) = mpsc::unbounded_channel::<TaskError>();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<DoneSignal>();

        for task in tasks {
            let group = self.clone();
            let panic_handler = self.panic_handler();
            let err_tx = err_tx.clone();
            let done_tx = done_tx.clone();

            tokio::spawn(async move {
                let outcome = AssertUnwindSafe(task.call(group)).catch_unwind().await;
                let signal = match outcome {
                    Ok(Ok(())) => None,
                    Ok(Err(err)) => {
                        let _ = err_tx.send(err);
                        None
                    }
                    Err(payload) => match panic_handler {
                        Some(handler) => {
                            // The panicking frames are already unwound; the
                            // backtrace marks the interception point.
                            let backtrace = Backtrace::force_capture();
                            let _ = err_tx.send(handler(payload, backtrace));
                            None
                        }
                        None => Some(payload),
                    },
                };
                // A task's error, if any, is sent before its completion
                // signal. Exactly one signal per task.
                let _ = done_tx.send(signal);
            });
        }
        drop(err_tx);
        drop(done_tx);

        let mut first_err: Option<TaskError> = None;
        let mut completed = 0usize;
        while completed < total {
            tokio::select! {
                Some(signal) = done_rx.recv() => match signal {
                    Some(payload) => std::panic::resume_unwind(payload),
                    None => completed += 1,
                },
                Some(err) = err_rx.recv() => self.observe_error(err, &mut first_err),
                else => break,
            }
        }

        // Completion signals can outrun their errors across the two
        // channels; anything still pending is already buffered, so a
        // non-blocking drain picks it up.
        while let Ok(err) = err_rx.try_recv() {
            self.observe_error(err, &mut first_err);
        }

        first_err
    }

    /// Reports an error to the handler (spawned, never blocking the join
    /// loop) and retains it as the group outcome if it arrived first.
    fn observe_error(&self, err: TaskError, first_err: &mut Option<TaskError>) {
        debug!(%err, "task error observed");
        if let Some(handler) = self.error_handler() {
            let group = self.clone();
            let err = err.clone();
            tokio::spawn(async move { handler(group, err) });
        }
        if first_err.is_none() {
            *first_err = Some(err);
        }
    }

    /// Success handoff to the next group: handlers are inherited where the
    /// successor has none of its own, then its bag absorbs ours.
    fn hand_off(&self, next: &Group) {
        {
            let mut handler = next
                .inner
                .error_handler
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if handler.is_none() {
                *handler = self.error_handler();
            }
        }
        {
            let mut handler = next
                .inner
                .panic_handler
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if handler.is_none() {
                *handler = self.panic_handler();
            }
        }
        next.inner.bag.absorb(&self.inner.bag);
        debug!("chaining into next group");
    }

    fn error_handler(&self) -> Option<ErrorHandler> {
        self.inner
            .error_handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn panic_handler(&self) -> Option<PanicHandler> {
        self.inner
            .panic_handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for Group {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field(
                "tasks",
                &self
                    .inner
                    .tasks
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .len(),
            )
            .field("bag", &self.inner.bag)
            .field("policy", &self.policy())
            .finish_non_exhaustive()
    }
}
