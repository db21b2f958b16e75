use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll, Waker};

use thiserror::Error;

use crate::spawn::{Spawn, ThreadSpawner};

/// Where a promise is in its lifecycle. A promise leaves [`State::Pending`]
/// at most once and never moves between the two terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Pending,
    Fulfilled,
    Rejected,
}

/// Error from the blocking and awaiting adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WaitError {
    /// Every [`Settler`] was dropped while the promise was still pending, so
    /// it can never settle.
    #[error("every settler was dropped before the promise settled")]
    Abandoned,
}

type FulfillListener<T> = Box<dyn FnOnce(T) + Send>;
type RejectListener<E> = Box<dyn FnOnce(E) + Send>;

struct Inner<T, E> {
    outcome: Option<Result<T, E>>,
    on_fulfilled: Vec<FulfillListener<T>>,
    on_rejected: Vec<RejectListener<E>>,
    wakers: Vec<Waker>,
    settlers: usize,
}

struct Shared<T, E> {
    inner: Mutex<Inner<T, E>>,
    settled: Condvar,
}

/// A single-assignment container that is settled exactly once, to either a
/// value of `T` or a failure of `E`, and delivers that outcome to every
/// registered listener.
///
/// Cloning the handle is cheap; all clones observe the same settlement.
///
/// # Examples
///
/// ```
/// use promise_cell::{Promise, State};
/// use std::{thread, time::Duration};
///
/// let promise: Promise<u32, String> = Promise::new(|settler| {
///     thread::sleep(Duration::from_millis(10));
///     settler.fulfill(21);
/// });
/// assert_eq!(promise.then(|v| v * 2).wait(), Ok(Ok(42)));
/// ```
pub struct Promise<T, E> {
    shared: Arc<Shared<T, E>>,
}

/// The producer half of a promise: the fulfill/reject capability pair.
///
/// Both methods consume nothing and may be called from any thread; the first
/// settlement wins and every later call on any clone is a silent no-op.
pub struct Settler<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Promise {
            shared: self.shared.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise").field("state", &self.state()).finish()
    }
}

impl<T, E> fmt::Debug for Settler<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settler").finish_non_exhaustive()
    }
}

impl<T, E> Promise<T, E> {
    /// Creates a pending promise together with its [`Settler`].
    ///
    /// This is the building block the combinators use; most producer code
    /// wants [`Promise::new`] instead.
    pub fn pending() -> (Self, Settler<T, E>) {
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                outcome: None,
                on_fulfilled: Vec::new(),
                on_rejected: Vec::new(),
                wakers: Vec::new(),
                settlers: 1,
            }),
            settled: Condvar::new(),
        });
        (
            Promise {
                shared: shared.clone(),
            },
            Settler { shared },
        )
    }

    /// Read-only view of the current state.
    pub fn state(&self) -> State {
        match self.shared.inner.lock().unwrap().outcome {
            None => State::Pending,
            Some(Ok(_)) => State::Fulfilled,
            Some(Err(_)) => State::Rejected,
        }
    }
}

impl<T: Clone, E: Clone> Promise<T, E> {
    /// Read-only view of the terminal outcome, `None` while pending.
    pub fn outcome(&self) -> Option<Result<T, E>> {
        self.shared.inner.lock().unwrap().outcome.clone()
    }

    /// Registers a listener pair. Exactly one of the two callbacks runs
    /// exactly once with the terminal outcome: immediately, on the calling
    /// thread, if the promise is already settled, otherwise later on the
    /// thread that settles it. Listeners registered while pending run in
    /// registration order.
    pub fn on_settled<F, R>(&self, on_fulfilled: F, on_rejected: R)
    where
        F: FnOnce(T) + Send + 'static,
        R: FnOnce(E) + Send + 'static,
    {
        let mut inner = self.shared.inner.lock().unwrap();
        match inner.outcome.clone() {
            Some(outcome) => {
                drop(inner);
                match outcome {
                    Ok(value) => on_fulfilled(value),
                    Err(error) => on_rejected(error),
                }
            }
            None => {
                inner.on_fulfilled.push(Box::new(on_fulfilled));
                inner.on_rejected.push(Box::new(on_rejected));
            }
        }
    }

    /// Blocks the calling thread until the promise settles and returns the
    /// outcome, or [`WaitError::Abandoned`] if it never can.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_cell::Promise;
    /// use std::thread;
    ///
    /// let (promise, settler) = Promise::<String, ()>::pending();
    /// thread::spawn(move || settler.fulfill("ready".into()));
    /// assert_eq!(promise.wait(), Ok(Ok("ready".to_string())));
    /// ```
    pub fn wait(&self) -> Result<Result<T, E>, WaitError> {
        let mut inner = self.shared.inner.lock().unwrap();
        loop {
            if let Some(outcome) = &inner.outcome {
                return Ok(outcome.clone());
            }
            if inner.settlers == 0 {
                return Err(WaitError::Abandoned);
            }
            inner = self.shared.settled.wait(inner).unwrap();
        }
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Constructs a promise from a producer. The executor is scheduled on
    /// the default [`ThreadSpawner`] and runs concurrently with the caller;
    /// the promise is returned immediately, still pending.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_cell::Promise;
    ///
    /// let promise: Promise<u32, String> = Promise::new(|settler| {
    ///     match "17".parse() {
    ///         Ok(n) => settler.fulfill(n),
    ///         Err(_) => settler.reject("not a number".into()),
    ///     }
    /// });
    /// assert_eq!(promise.wait(), Ok(Ok(17)));
    /// ```
    pub fn new<F>(executor: F) -> Self
    where
        F: FnOnce(Settler<T, E>) + Send + 'static,
    {
        Self::spawn_on(&ThreadSpawner, executor)
    }

    /// Like [`Promise::new`], but the executor runs on the given scheduler.
    pub fn spawn_on<S, F>(spawner: &S, executor: F) -> Self
    where
        S: Spawn + ?Sized,
        F: FnOnce(Settler<T, E>) + Send + 'static,
    {
        let (promise, settler) = Self::pending();
        spawner.spawn(Box::new(move || executor(settler)));
        promise
    }

    /// Eagerly fulfilled promise. Settled before this returns; there is no
    /// observable pending window.
    pub fn resolve(value: T) -> Self {
        let promise = Promise::new(move |settler| settler.fulfill(value));
        let _ = promise
            .wait()
            .expect("eager executor settles before dropping its settler");
        promise
    }

    /// Eagerly rejected promise. Settled before this returns.
    pub fn reject(error: E) -> Self {
        let promise = Promise::new(move |settler: Settler<T, E>| settler.reject(error));
        let _ = promise
            .wait()
            .expect("eager executor settles before dropping its settler");
        promise
    }

    /// Blocks until `other` settles, then returns a fresh promise holding a
    /// copy of its terminal outcome.
    ///
    /// # Panics
    ///
    /// Panics if `other` is abandoned, since it then has no terminal outcome
    /// to copy. That is a producer-side bug, not a recoverable failure.
    pub fn from_promise(other: &Promise<T, E>) -> Self {
        let outcome = other
            .wait()
            .expect("source promise was abandoned before it settled");
        let (promise, settler) = Promise::pending();
        match outcome {
            Ok(value) => settler.fulfill(value),
            Err(error) => settler.reject(error),
        }
        promise
    }
}

impl<T: Clone, E: Clone> Settler<T, E> {
    /// Settles the promise with a value. No-op if already settled.
    pub fn fulfill(&self, value: T) {
        self.settle(Ok(value));
    }

    /// Settles the promise with a failure. No-op if already settled.
    pub fn reject(&self, error: E) {
        self.settle(Err(error));
    }

    fn settle(&self, outcome: Result<T, E>) {
        let mut inner = self.shared.inner.lock().unwrap();
        if inner.outcome.is_some() {
            // First writer won; this call loses silently.
            return;
        }
        let fulfilled = mem::take(&mut inner.on_fulfilled);
        let rejected = mem::take(&mut inner.on_rejected);
        let wakers = mem::take(&mut inner.wakers);
        inner.outcome = Some(outcome.clone());
        drop(inner);
        self.shared.settled.notify_all();
        // Listeners run outside the lock so they may settle other promises
        // (or drop settlers) without deadlocking.
        match outcome {
            Ok(value) => {
                drop(rejected);
                for listener in fulfilled {
                    listener(value.clone());
                }
            }
            Err(error) => {
                drop(fulfilled);
                for listener in rejected {
                    listener(error.clone());
                }
            }
        }
        for waker in wakers {
            waker.wake();
        }
    }
}

impl<T, E> Clone for Settler<T, E> {
    fn clone(&self) -> Self {
        self.shared.inner.lock().unwrap().settlers += 1;
        Settler {
            shared: self.shared.clone(),
        }
    }
}

impl<T, E> Drop for Settler<T, E> {
    /// Dropping the last settler of a pending promise abandons it: waiters
    /// are woken with [`WaitError::Abandoned`] and the queued listeners are
    /// released unrun.
    fn drop(&mut self) {
        let mut inner = self.shared.inner.lock().unwrap();
        inner.settlers -= 1;
        if inner.settlers > 0 || inner.outcome.is_some() {
            return;
        }
        let fulfilled = mem::take(&mut inner.on_fulfilled);
        let rejected = mem::take(&mut inner.on_rejected);
        let wakers = mem::take(&mut inner.wakers);
        drop(inner);
        self.shared.settled.notify_all();
        drop(fulfilled);
        drop(rejected);
        for waker in wakers {
            waker.wake();
        }
    }
}

impl<T: Clone, E: Clone> Future for Promise<T, E> {
    type Output = Result<Result<T, E>, WaitError>;

    /// A promise can be awaited directly.
    ///
    /// ```
    /// use promise_cell::Promise;
    /// use futures::executor::block_on;
    /// use std::thread;
    ///
    /// let (promise, settler) = Promise::<u32, ()>::pending();
    /// let task = thread::spawn(move || block_on(async { promise.await }));
    /// settler.fulfill(5);
    /// assert_eq!(task.join().unwrap(), Ok(Ok(5)));
    /// ```
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.shared.inner.lock().unwrap();
        if let Some(outcome) = &inner.outcome {
            return Poll::Ready(Ok(outcome.clone()));
        }
        if inner.settlers == 0 {
            return Poll::Ready(Err(WaitError::Abandoned));
        }
        // Every waiting task keeps its own waker; waking only the most
        // recent one loses tasks when several await the same promise.
        inner.wakers.push(cx.waker().clone());
        Poll::Pending
    }
}
