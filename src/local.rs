//! A deferred value for a single thread of control.
//!
//! Everything lives behind an `Rc<RefCell<..>>` shared by the [`Deferred`]
//! and its two completion handles. No callback is ever run while the cell is
//! borrowed, so observers are free to call back into the same deferred.
use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::{Error, Status};

type Callback<X> = Box<dyn FnOnce(&X)>;

enum State<T, E> {
    Unsettled {
        on_success: Vec<Callback<T>>,
        on_failure: Vec<Callback<E>>,
    },
    Succeeded(Rc<T>),
    Failed(Rc<E>),
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

impl<T, E> fmt::Debug for State<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Unsettled {
                on_success,
                on_failure,
            } => f
                .debug_struct("Unsettled")
                .field("on_success", &on_success.len())
                .field("on_failure", &on_failure.len())
                .finish(),
            settled => f.write_str(&settled.status().to_string()),
        }
    }
}

/// Moves the record out of `Unsettled` and drains the matching queue.
///
/// A record that is already settled is left alone.
fn settle<T, E>(cell: &RefCell<State<T, E>>, outcome: Result<T, E>) {
    let mut state = cell.borrow_mut();
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
            let value = Rc::new(value);
            *state = State::Succeeded(value.clone());
            drop(state);
            drop(on_failure);
            log::trace!("deferred succeeded, draining {} observer(s)", on_success.len());
            for callback in on_success {
                callback(&value);
            }
        }
        Err(reason) => {
            let reason = Rc::new(reason);
            *state = State::Failed(reason.clone());
            drop(state);
            drop(on_success);
            log::trace!("deferred failed, draining {} observer(s)", on_failure.len());
            for callback in on_failure {
                callback(&reason);
            }
        }
    }
}

/// A value that is settled at most once, either as a success `T` or a
/// failure `E`.
///
/// # Examples
///
/// ```
/// use deferred::Deferred;
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let later = Rc::new(RefCell::new(None));
/// let slot = later.clone();
/// let d = Deferred::<i32, String>::new(move |resolve, _| {
///     *slot.borrow_mut() = Some(resolve);
///     Ok(())
/// });
///
/// let seen = Rc::new(RefCell::new(None));
/// let sink = seen.clone();
/// d.observe(move |v| *sink.borrow_mut() = Some(*v), |_| unreachable!());
/// assert_eq!(*seen.borrow(), None);
///
/// later.borrow_mut().take().unwrap().resolve(42);
/// assert_eq!(*seen.borrow(), Some(42));
/// ```
pub struct Deferred<T, E> {
    state: Rc<RefCell<State<T, E>>>,
}

/// Settles its [`Deferred`] as succeeded.
pub struct Resolve<T, E> {
    state: Rc<RefCell<State<T, E>>>,
}

/// Settles its [`Deferred`] as failed.
pub struct Reject<T, E> {
    state: Rc<RefCell<State<T, E>>>,
}

impl<T, E> Deferred<T, E> {
    /// Creates the deferred value and runs `executor` right away.
    ///
    /// An `Err` returned by the executor fails the value with that very
    /// reason, unless the executor already settled it.
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

    /// Like [`Deferred::new`], but a panicking executor fails the value with
    /// [`Error::ExecutorPanicked`] instead of unwinding into the caller.
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
            state: Rc::new(RefCell::new(State::Unsettled {
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

    /// Registers an observer pair.
    ///
    /// While unsettled both callbacks are queued and exactly one of them will
    /// run at settlement. Once settled, the matching callback runs before
    /// this returns.
    pub fn observe<S, F>(&self, on_success: S, on_failure: F)
    where
        S: FnOnce(&T) + 'static,
        F: FnOnce(&E) + 'static,
    {
        let settled = {
            let mut state = self.state.borrow_mut();
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
            Ok(value) => on_success(&value),
            Err(reason) => on_failure(&reason),
        }
    }

    pub fn status(&self) -> Status {
        self.state.borrow().status()
    }

    /// The success value, if settled as succeeded.
    pub fn value(&self) -> Option<Rc<T>> {
        match &*self.state.borrow() {
            State::Succeeded(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// The failure reason, if settled as failed.
    pub fn reason(&self) -> Option<Rc<E>> {
        match &*self.state.borrow() {
            State::Failed(reason) => Some(reason.clone()),
            _ => None,
        }
    }
}

impl<T, E> fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("state", &*self.state.borrow())
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
