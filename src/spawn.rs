//! Where executor closures run.
//!
//! [`Promise::new`](crate::Promise::new) hands its executor to a [`Spawn`]
//! implementation instead of a process-wide queue, so the caller decides the
//! scheduling and tests can run executors deterministically.

use std::thread;

/// A task scheduler for promise executors.
pub trait Spawn {
    /// Schedules `task` to run. Must not block the caller on the task's
    /// completion, except for implementations that deliberately run tasks
    /// inline such as [`InlineSpawner`].
    fn spawn(&self, task: Box<dyn FnOnce() + Send + 'static>);
}

/// Default scheduler: one OS thread per executor.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSpawner;

impl Spawn for ThreadSpawner {
    fn spawn(&self, task: Box<dyn FnOnce() + Send + 'static>) {
        thread::spawn(task);
    }
}

/// Runs the executor on the calling thread, before
/// [`spawn_on`](crate::Promise::spawn_on) returns. The returned promise is
/// already settled (or abandoned) by then, which makes scheduling in tests
/// deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineSpawner;

impl Spawn for InlineSpawner {
    fn spawn(&self, task: Box<dyn FnOnce() + Send + 'static>) {
        task();
    }
}
