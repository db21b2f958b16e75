//! Composition over the settlement core: every combinator builds a fresh
//! promise and wires its settler to the sources through
//! [`Promise::on_settled`]; none of them reaches into another promise's
//! internals.

use std::sync::{Arc, Mutex};

use crate::promise::Promise;

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Sequential transform. Returns a promise that fulfills with
    /// `on_fulfilled(value)` once this one fulfills, or rejects with this
    /// one's failure, untouched. A source may carry any number of
    /// independent chains; each receives the same outcome.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_cell::Promise;
    ///
    /// let p = Promise::<u32, String>::resolve(10).then(|v| v + 1).then(|v| v * 2);
    /// assert_eq!(p.wait(), Ok(Ok(22)));
    /// ```
    pub fn then<U, F>(&self, on_fulfilled: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.chain(on_fulfilled, None)
    }

    /// [`then`](Promise::then) with a rejection observer. The observer sees
    /// the failure exactly once; the returned promise still rejects with it.
    pub fn then_catch<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
        R: FnOnce(E) + Send + 'static,
    {
        self.chain(on_fulfilled, Some(Box::new(on_rejected)))
    }

    /// Observes a rejection without altering it: the returned promise
    /// settles exactly like this one. Values pass through untouched.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_cell::{Promise, State};
    ///
    /// let p = Promise::<u32, String>::reject("boom".into())
    ///     .catch(|e| eprintln!("failed: {e}"));
    /// assert_eq!(p.state(), State::Rejected);
    /// ```
    pub fn catch<R>(&self, on_rejected: R) -> Promise<T, E>
    where
        R: FnOnce(E) + Send + 'static,
    {
        self.then_catch(|value| value, on_rejected)
    }

    fn chain<U, F>(
        &self,
        on_fulfilled: F,
        on_rejected: Option<Box<dyn FnOnce(E) + Send>>,
    ) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let (chained, settler) = Promise::pending();
        let reject_settler = settler.clone();
        self.on_settled(
            move |value| settler.fulfill(on_fulfilled(value)),
            move |error: E| {
                reject_settler.reject(error.clone());
                if let Some(observer) = on_rejected {
                    observer(error);
                }
            },
        );
        chained
    }

    /// Synchronization barrier: fulfills with every source's value, in input
    /// order, once all sources fulfill. The first rejection observed rejects
    /// the result; the remaining sources still run to completion but their
    /// outcomes no longer matter here. An empty input fulfills immediately
    /// with an empty vec.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_cell::Promise;
    ///
    /// let sources = vec![
    ///     Promise::<u32, String>::resolve(1),
    ///     Promise::resolve(2),
    ///     Promise::resolve(3),
    /// ];
    /// assert_eq!(Promise::all(sources).wait(), Ok(Ok(vec![1, 2, 3])));
    /// ```
    pub fn all(promises: Vec<Promise<T, E>>) -> Promise<Vec<T>, E> {
        let (result, settler) = Promise::pending();
        if promises.is_empty() {
            settler.fulfill(Vec::new());
            return result;
        }
        let total = promises.len();
        let gathered = Arc::new(Mutex::new(Gathered {
            slots: vec![None; total],
            filled: 0,
        }));
        for (index, promise) in promises.iter().enumerate() {
            let gathered = gathered.clone();
            let fulfill_settler = settler.clone();
            let reject_settler = settler.clone();
            promise.on_settled(
                move |value| {
                    let mut state = gathered.lock().unwrap();
                    state.slots[index] = Some(value);
                    state.filled += 1;
                    if state.filled < total {
                        return;
                    }
                    let values = state
                        .slots
                        .iter_mut()
                        .map(|slot| slot.take().expect("fulfilled source left an empty slot"))
                        .collect();
                    drop(state);
                    fulfill_settler.fulfill(values);
                },
                move |error| reject_settler.reject(error),
            );
        }
        result
    }

    /// First-to-settle barrier: adopts the outcome, value or failure, of
    /// whichever source settles first; every later settlement is a no-op.
    ///
    /// `race(vec![])` can never settle. It is returned already abandoned, so
    /// [`wait`](Promise::wait) and `.await` on it report
    /// [`WaitError`](crate::WaitError) instead of blocking forever.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_cell::Promise;
    ///
    /// let (slow, _settler) = Promise::<u32, String>::pending();
    /// let fast = Promise::resolve(1);
    /// assert_eq!(Promise::race(vec![slow, fast]).wait(), Ok(Ok(1)));
    /// ```
    pub fn race(promises: Vec<Promise<T, E>>) -> Promise<T, E> {
        let (result, settler) = Promise::pending();
        for promise in &promises {
            let fulfill_settler = settler.clone();
            let reject_settler = settler.clone();
            promise.on_settled(
                move |value| fulfill_settler.fulfill(value),
                move |error| reject_settler.reject(error),
            );
        }
        result
    }
}

struct Gathered<T> {
    slots: Vec<Option<T>>,
    filled: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{State, WaitError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn then_composes_transforms() {
        let p = Promise::<u32, String>::resolve(10)
            .then(|v| v + 1)
            .then(|v| v * 2);
        assert_eq!(p.wait(), Ok(Ok(22)));
    }

    #[test]
    fn then_on_pending_source_settles_later() {
        let (source, settler) = Promise::<u32, ()>::pending();
        let doubled = source.then(|v| v * 2);
        assert_eq!(doubled.state(), State::Pending);
        settler.fulfill(8);
        assert_eq!(doubled.outcome(), Some(Ok(16)));
    }

    #[test]
    fn then_propagates_rejection_without_running_the_transform() {
        let p = Promise::<u32, String>::reject("bad".into())
            .then(|_| -> u32 { panic!("must not run") });
        assert_eq!(p.outcome(), Some(Err("bad".to_string())));
    }

    #[test]
    fn rejection_survives_a_long_chain() {
        let p = Promise::<u32, String>::reject("bad".into())
            .then(|v| v + 1)
            .catch(|_| {})
            .then(|v| v * 2);
        assert_eq!(p.wait(), Ok(Err("bad".to_string())));
    }

    #[test]
    fn catch_observes_without_recovering() {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(None));
        let counted = hits.clone();
        let recorded = seen.clone();
        let p = Promise::<u32, String>::reject("boom".into()).catch(move |e| {
            counted.fetch_add(1, Ordering::SeqCst);
            *recorded.lock().unwrap() = Some(e);
        });
        assert_eq!(p.state(), State::Rejected);
        assert_eq!(p.outcome(), Some(Err("boom".to_string())));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock().unwrap(), Some("boom".to_string()));
    }

    #[test]
    fn catch_passes_values_through() {
        let p = Promise::<u32, String>::resolve(6).catch(|_| panic!("must not run"));
        assert_eq!(p.outcome(), Some(Ok(6)));
    }

    #[test]
    fn then_catch_observer_fires_on_late_rejection() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counted = hits.clone();
        let (source, settler) = Promise::<u32, String>::pending();
        let chained = source.then_catch(
            |v| v,
            move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
            },
        );
        settler.reject("late".into());
        assert_eq!(chained.outcome(), Some(Err("late".to_string())));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn one_source_feeds_many_chains() {
        let (source, settler) = Promise::<u32, ()>::pending();
        let plus = source.then(|v| v + 1);
        let times = source.then(|v| v * 10);
        settler.fulfill(4);
        assert_eq!(plus.outcome(), Some(Ok(5)));
        assert_eq!(times.outcome(), Some(Ok(40)));
    }

    #[test]
    fn all_preserves_input_order() {
        let (pa, sa) = Promise::<u32, ()>::pending();
        let (pb, sb) = Promise::<u32, ()>::pending();
        let (pc, sc) = Promise::<u32, ()>::pending();
        let combined = Promise::all(vec![pa, pb, pc]);
        // Settle out of input order.
        sb.fulfill(2);
        sc.fulfill(3);
        assert_eq!(combined.state(), State::Pending);
        sa.fulfill(1);
        assert_eq!(combined.outcome(), Some(Ok(vec![1, 2, 3])));
    }

    #[test]
    fn all_collects_values_from_threads() {
        fn timer(ms: u64, value: u32) -> Promise<u32, String> {
            Promise::new(move |settler| {
                thread::sleep(Duration::from_millis(ms));
                settler.fulfill(value);
            })
        }
        let combined = Promise::all(vec![timer(30, 1), timer(20, 2), timer(10, 3)]);
        assert_eq!(combined.wait(), Ok(Ok(vec![1, 2, 3])));
    }

    #[test]
    fn all_rejects_on_first_failure() {
        let (pa, sa) = Promise::<u32, String>::pending();
        let (pb, sb) = Promise::<u32, String>::pending();
        let combined = Promise::all(vec![pa, Promise::resolve(1), pb]);
        sa.reject("first".into());
        assert_eq!(combined.outcome(), Some(Err("first".to_string())));
        // The surviving source still settles; the result does not change.
        sb.fulfill(3);
        assert_eq!(combined.outcome(), Some(Err("first".to_string())));
    }

    #[test]
    fn all_of_nothing_is_an_empty_vec() {
        let combined = Promise::<u32, String>::all(Vec::new());
        assert_eq!(combined.state(), State::Fulfilled);
        assert_eq!(combined.outcome(), Some(Ok(Vec::new())));
    }

    #[test]
    fn race_adopts_the_earlier_value() {
        let (slow, _keep) = Promise::<u32, String>::pending();
        let fast = Promise::resolve(1);
        assert_eq!(Promise::race(vec![slow, fast]).wait(), Ok(Ok(1)));
    }

    #[test]
    fn race_adopts_the_earlier_rejection() {
        let (slow, _keep) = Promise::<u32, String>::pending();
        let failed = Promise::reject("lost".into());
        assert_eq!(
            Promise::race(vec![slow, failed]).wait(),
            Ok(Err("lost".to_string()))
        );
    }

    #[test]
    fn race_ignores_later_settlements() {
        let (pa, sa) = Promise::<u32, ()>::pending();
        let (pb, sb) = Promise::<u32, ()>::pending();
        let winner = Promise::race(vec![pa, pb]);
        sa.fulfill(1);
        sb.fulfill(2);
        assert_eq!(winner.outcome(), Some(Ok(1)));
    }

    #[test]
    fn race_by_wall_clock_delay() {
        fn delayed(ms: u64, value: u32) -> Promise<u32, String> {
            Promise::new(move |settler| {
                thread::sleep(Duration::from_millis(ms));
                settler.fulfill(value);
            })
        }
        let winner = Promise::race(vec![delayed(5, 1), delayed(400, 2)]);
        assert_eq!(winner.wait(), Ok(Ok(1)));
    }

    #[test]
    fn race_of_nothing_is_abandoned_not_hung() {
        let never = Promise::<u32, String>::race(Vec::new());
        assert_eq!(never.state(), State::Pending);
        assert_eq!(never.wait(), Err(WaitError::Abandoned));
    }
}
