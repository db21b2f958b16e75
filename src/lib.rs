//! A single-assignment promise: a producer settles it exactly once, to a
//! value or a failure, and every consumer reaction sees that one outcome
//! whether it was attached before or after settlement.
//!
//! The producer side is a [`Settler`] handed to an executor closure; the
//! consumer side is the [`Promise`] itself, which can be chained
//! ([`then`](Promise::then) / [`catch`](Promise::catch)), combined
//! ([`all`](Promise::all) / [`race`](Promise::race)), blocked on
//! ([`wait`](Promise::wait)), or awaited as a `Future`.
//!
//! # Examples
//!
//! ```
//! use promise_cell::Promise;
//! use std::{thread, time::Duration};
//!
//! let fetched: Promise<String, String> = Promise::new(|settler| {
//!     thread::sleep(Duration::from_millis(10));
//!     settler.fulfill("payload".into());
//! });
//! let length = fetched
//!     .then(|body| body.len())
//!     .catch(|e| eprintln!("fetch failed: {e}"));
//! assert_eq!(length.wait(), Ok(Ok(7)));
//! ```

mod combinators;
mod promise;
pub mod spawn;

pub use promise::{Promise, Settler, State, WaitError};
