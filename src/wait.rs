use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use crate::SyncDeferred;

/// Waits for a [`SyncDeferred`] to settle. Clones wait on the same value.
///
/// # Examples
///
/// ```
/// use deferred::SyncDeferred;
/// use futures::executor::block_on;
/// use std::thread;
///
/// let d = SyncDeferred::<(), String>::new(|_, reject| {
///     thread::spawn(move || reject.reject(String::from("💥")));
///     Ok(())
/// });
/// let first = d.settled();
/// let second = first.clone();
/// let task = thread::spawn(move || block_on(second));
/// assert_eq!(*block_on(first).unwrap_err(), "💥");
/// assert!(task.join().expect("The task thread has panicked").is_err());
/// ```
pub struct Settled<T, E> {
    slot: Arc<Mutex<Slot<T, E>>>,
}

struct Slot<T, E> {
    outcome: Option<Result<Arc<T>, Arc<E>>>,
    // Every clone that polled while unsettled needs its own wake-up.
    wakers: Vec<Waker>,
}

fn lock<T, E>(slot: &Mutex<Slot<T, E>>) -> MutexGuard<'_, Slot<T, E>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

fn fill<T, E>(slot: &Mutex<Slot<T, E>>, outcome: Result<Arc<T>, Arc<E>>) {
    let wakers = {
        let mut slot = lock(slot);
        slot.outcome = Some(outcome);
        std::mem::take(&mut slot.wakers)
    };
    for waker in wakers {
        waker.wake()
    }
}

impl<T, E> Settled<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    pub(crate) fn new(deferred: &SyncDeferred<T, E>) -> Self {
        let slot = Arc::new(Mutex::new(Slot {
            outcome: None,
            wakers: vec![],
        }));
        let on_success = slot.clone();
        let on_failure = slot.clone();
        deferred.observe_shared(
            move |value| fill(&on_success, Ok(value)),
            move |reason| fill(&on_failure, Err(reason)),
        );
        Self { slot }
    }
}

impl<T, E> Clone for Settled<T, E> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<T, E> Future for Settled<T, E> {
    type Output = Result<Arc<T>, Arc<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = lock(&self.slot);
        if let Some(outcome) = &slot.outcome {
            return Poll::Ready(outcome.clone());
        }
        if !slot.wakers.iter().any(|waker| waker.will_wake(cx.waker())) {
            slot.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}
