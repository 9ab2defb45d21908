//! A single-resolve promise, used to let concurrent readers of the same
//! extract-cache key wait for one in-flight decompression instead of each
//! racing to redo the work.
//!
//! Grounded in `libsqsh`'s `concurrency/future_test.c`: a future carries an
//! optional input, is resolved exactly once, and wakes every waiter.
//! Resolving twice is a programmer error (checked with a `debug_assert!`
//! here rather than the C version's explicit trap, since Rust call sites
//! for this type are entirely internal to this crate).

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::{CachedError, Error};

enum State<T> {
    Pending,
    Resolved(Result<T, CachedError>),
}

struct Shared<I, T> {
    input: I,
    state: Mutex<State<T>>,
    condvar: Condvar,
}

/// The write side of a future: held by the single thread responsible for
/// producing the value.
pub struct Promise<I, T> {
    shared: Arc<Shared<I, T>>,
}

/// The read side of a future: cloneable, handed out to every waiter.
pub struct Future<I, T> {
    shared: Arc<Shared<I, T>>,
}

impl<I, T> Clone for Future<I, T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

/// Create a linked `(Promise, Future)` pair carrying input `input`.
pub fn promise<I, T>(input: I) -> (Promise<I, T>, Future<I, T>) {
    let shared = Arc::new(Shared {
        input,
        state: Mutex::new(State::Pending),
        condvar: Condvar::new(),
    });
    (
        Promise {
            shared: shared.clone(),
        },
        Future { shared },
    )
}

impl<I, T> Promise<I, T> {
    pub fn get_input(&self) -> &I {
        &self.shared.input
    }

    /// Resolve the future with a successful value, waking every waiter.
    ///
    /// Resolving an already-resolved future is a programmer error.
    pub fn resolve(self, value: T) {
        let mut state = self.shared.state.lock();
        debug_assert!(matches!(*state, State::Pending), "double resolve");
        *state = State::Resolved(Ok(value));
        self.shared.condvar.notify_all();
    }

    /// Resolve the future with an error, waking every waiter.
    pub fn fail(self, err: Error) {
        let mut state = self.shared.state.lock();
        debug_assert!(matches!(*state, State::Pending), "double resolve");
        *state = State::Resolved(Err(CachedError::new(err)));
        self.shared.condvar.notify_all();
    }
}

impl<I, T: Clone> Future<I, T> {
    pub fn get_input(&self) -> &I {
        &self.shared.input
    }

    /// Block the calling thread until the future is resolved, then return a
    /// clone of the resolved value (or its error).
    pub fn wait(&self) -> Result<T, Error> {
        let mut state = self.shared.state.lock();
        loop {
            match &*state {
                State::Pending => self.shared.condvar.wait(&mut state),
                State::Resolved(Ok(v)) => return Ok(v.clone()),
                State::Resolved(Err(e)) => return Err(e.clone().into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn waiters_observe_resolved_value() {
        let (promise, future) = promise::<(), u32>(());
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let f = future.clone();
                thread::spawn(move || f.wait().unwrap())
            })
            .collect();

        thread::sleep(Duration::from_millis(10));
        promise.resolve(42);

        for w in waiters {
            assert_eq!(w.join().unwrap(), 42);
        }
    }

    #[test]
    fn waiters_observe_failure() {
        let (promise, future) = promise::<(), u32>(());
        let f2 = future.clone();
        let waiter = thread::spawn(move || f2.wait());
        promise.fail(Error::OutOfBounds);
        assert!(waiter.join().unwrap().is_err());
    }
}
