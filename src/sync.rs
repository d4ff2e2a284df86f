//! A deferred value that may be settled and observed from any thread.
//!
//! The transition out of `Unsettled` and the queue append/drain happen under
//! one `Mutex`, so two racing settlements have exactly one winner and an
//! observer can never be appended to a queue that was already drained.
//! Callbacks run after the lock is released.
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{wait::Settled, Error, Status};

type Callback<X> = Box<dyn FnOnce(Arc<X>) + Send>;

enum State<T, E> {
    Unsettled {
        on_success: Vec<Callback<T>>,
        on_failure: Vec<Callback<E>>,
    },
    Succeeded(Arc<T>),
    Failed(Arc<E>),
}

impl<T, E> State<T, E> {
    fn status(&self) -> Status {
        match self {
            State::Unsettled { .. } => Status::Unsettled,
            State::Succeeded(_) => Status::Succeeded,
            State::Failed(_) => Status::Failed,
        }
    }
}

// Callbacks never run under the lock, so a poisoned record is still
// consistent.
fn lock<T, E>(cell: &Mutex<State<T, E>>) -> MutexGuard<'_, State<T, E>> {
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}

fn settle<T, E>(cell: &Mutex<State<T, E>>, outcome: Result<T, E>) {
    let mut state = lock(cell);
    let (on_success, on_failure) = match &mut *state {
        State::Unsettled {
            on_success,
            on_failure,
        } => (mem::take(on_success), mem::take(on_failure)),
        settled => {
            log::debug!("ignoring settlement, deferred already {}", settled.status());
            return;
        }
    };
    match outcome {
        Ok(value) => {
            let value = Arc::new(value);
            *state = State::Succeeded(value.clone());
            drop(state);
            drop(on_failure);
            log::trace!("deferred succeeded, draining {} observer(s)", on_success.len());
            for callback in on_success {
                callback(value.clone());
            }
        }
        Err(reason) => {
            let reason = Arc::new(reason);
            *state = State::Failed(reason.clone());
            drop(state);
            drop(on_success);
            log::trace!("deferred failed, draining {} observer(s)", on_failure.len());
            for callback in on_failure {
                callback(reason.clone());
            }
        }
    }
}

/// Thread-safe counterpart of [`crate::Deferred`].
///
/// Clones share the same record.
///
/// # Examples
///
/// ```
/// use deferred::{Status, SyncDeferred};
/// use futures::executor::block_on;
/// use std::thread;
///
/// let d = SyncDeferred::<String, String>::new(|resolve, _| {
///     thread::spawn(move || resolve.resolve(String::from("🍓")));
///     Ok(())
/// });
/// let value = block_on(d.settled()).unwrap();
/// assert_eq!(*value, "🍓");
/// assert_eq!(d.status(), Status::Succeeded);
/// ```
pub struct SyncDeferred<T, E> {
    state: Arc<Mutex<State<T, E>>>,
}

/// Settles its [`SyncDeferred`] as succeeded. Can be sent to other threads.
pub struct Resolve<T, E> {
    state: Arc<Mutex<State<T, E>>>,
}

/// Settles its [`SyncDeferred`] as failed. Can be sent to other threads.
pub struct Reject<T, E> {
    state: Arc<Mutex<State<T, E>>>,
}

impl<T, E> SyncDeferred<T, E> {
    /// Creates the deferred value and runs `executor` on the calling thread.
    ///
    /// An `Err` returned by the executor fails the value with that reason,
    /// unless it was already settled.
    pub fn new<F>(executor: F) -> Self
    where
        F: FnOnce(Resolve<T, E>, Reject<T, E>) -> Result<(), E>,
    {
        let deferred = Self::unsettled();
        if let Err(reason) = executor(deferred.resolver(), deferred.rejecter()) {
            log::trace!("executor returned an error");
            settle(&deferred.state, Err(reason));
        }
        deferred
    }

    /// Like [`SyncDeferred::new`], but a panicking executor fails the value
    /// with [`Error::ExecutorPanicked`].
    pub fn catching<F>(executor: F) -> Self
    where
        F: FnOnce(Resolve<T, E>, Reject<T, E>) -> Result<(), E>,
        E: From<Error>,
    {
        let deferred = Self::unsettled();
        let (resolve, reject) = (deferred.resolver(), deferred.rejecter());
        match panic::catch_unwind(AssertUnwindSafe(move || executor(resolve, reject))) {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => settle(&deferred.state, Err(reason)),
            Err(payload) => {
                let err = Error::from_panic(payload);
                log::debug!("{err}");
                settle(&deferred.state, Err(E::from(err)));
            }
        }
        deferred
    }

    fn unsettled() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::Unsettled {
                on_success: vec![],
                on_failure: vec![],
            })),
        }
    }

    fn resolver(&self) -> Resolve<T, E> {
        Resolve {
            state: self.state.clone(),
        }
    }

    fn rejecter(&self) -> Reject<T, E> {
        Reject {
            state: self.state.clone(),
        }
    }

    /// Registers an observer pair; see [`crate::Deferred::observe`].
    ///
    /// Queued callbacks run on whichever thread settles the value.
    pub fn observe<S, F>(&self, on_success: S, on_failure: F)
    where
        S: FnOnce(&T) + Send + 'static,
        F: FnOnce(&E) + Send + 'static,
    {
        self.observe_shared(
            move |value: Arc<T>| on_success(&*value),
            move |reason: Arc<E>| on_failure(&*reason),
        )
    }

    pub(crate) fn observe_shared<S, F>(&self, on_success: S, on_failure: F)
    where
        S: FnOnce(Arc<T>) + Send + 'static,
        F: FnOnce(Arc<E>) + Send + 'static,
    {
        let settled = {
            let mut state = lock(&self.state);
            log::debug!("current state: {}", state.status());
            match &mut *state {
                State::Unsettled {
                    on_success: successes,
                    on_failure: failures,
                } => {
                    successes.push(Box::new(on_success));
                    failures.push(Box::new(on_failure));
                    log::trace!("queued observer pair #{}", successes.len());
                    return;
                }
                State::Succeeded(value) => Ok(value.clone()),
                State::Failed(reason) => Err(reason.clone()),
            }
        };
        match settled {
            Ok(value) => on_success(value),
            Err(reason) => on_failure(reason),
        }
    }

    /// A future that completes once this value settles.
    pub fn settled(&self) -> Settled<T, E>
    where
        T: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        Settled::new(self)
    }

    pub fn status(&self) -> Status {
        lock(&self.state).status()
    }

    pub fn value(&self) -> Option<Arc<T>> {
        match &*lock(&self.state) {
            State::Succeeded(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn reason(&self) -> Option<Arc<E>> {
        match &*lock(&self.state) {
            State::Failed(reason) => Some(reason.clone()),
            _ => None,
        }
    }
}

impl<T, E> Clone for SyncDeferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T, E> fmt::Debug for SyncDeferred<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncDeferred")
            .field("status", &self.status())
            .finish()
    }
}

impl<T, E> Resolve<T, E> {
    /// Settles as succeeded with `value`. Does nothing if already settled.
    pub fn resolve(&self, value: T) {
        settle(&self.state, Ok(value));
    }
}

impl<T, E> Reject<T, E> {
    /// Settles as failed with `reason`. Does nothing if already settled.
    pub fn reject(&self, reason: E) {
        settle(&self.state, Err(reason));
    }
}

impl<T, E> Clone for Resolve<T, E> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T, E> Clone for Reject<T, E> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Resolve<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolve").finish_non_exhaustive()
    }
}

impl<T, E> fmt::Debug for Reject<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reject").finish_non_exhaustive()
    }
}
