//! Mutex and condition variable wrappers - uses parking_lot if available, std otherwise.
//!
//! Both flavours expose the parking_lot calling convention: `lock()` returns the guard
//! directly and `Condvar::wait` parks on a `&mut` guard.

#[cfg(feature = "parking_lot")]
pub use parking_lot::{Condvar, Mutex};

#[cfg(not(feature = "parking_lot"))]
mod std_mutex {
    use std::sync::{
        Condvar as StdCondvar, Mutex as StdMutex, MutexGuard as StdMutexGuard, PoisonError,
        TryLockError, WaitTimeoutResult,
    };
    use std::time::Duration;

    /// Thin wrapper around std::sync::Mutex.
    ///
    /// Poisoning is ignored: a panic on the backend worker must not take the
    /// emulation thread down with it.
    #[derive(Debug, Default)]
    pub struct Mutex<T>(StdMutex<T>);

    impl<T> Mutex<T> {
        /// Create a new mutex.
        pub const fn new(value: T) -> Self {
            Self(StdMutex::new(value))
        }

        /// Lock the mutex.
        pub fn lock(&self) -> MutexGuard<'_, T> {
            MutexGuard(Some(self.0.lock().unwrap_or_else(PoisonError::into_inner)))
        }

        /// Lock the mutex if no other thread holds it.
        pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
            match self.0.try_lock() {
                Ok(guard) => Some(MutexGuard(Some(guard))),
                Err(TryLockError::Poisoned(poisoned)) => {
                    Some(MutexGuard(Some(poisoned.into_inner())))
                }
                Err(TryLockError::WouldBlock) => None,
            }
        }
    }

    /// Guard for std mutex.
    ///
    /// The inner guard is only vacant while it is parked inside [`Condvar::wait`].
    pub struct MutexGuard<'a, T>(Option<StdMutexGuard<'a, T>>);

    impl<'a, T> MutexGuard<'a, T> {
        fn inner(&self) -> &StdMutexGuard<'a, T> {
            match &self.0 {
                Some(guard) => guard,
                None => unreachable!("mutex guard accessed while parked on a condvar"),
            }
        }

        fn inner_mut(&mut self) -> &mut StdMutexGuard<'a, T> {
            match &mut self.0 {
                Some(guard) => guard,
                None => unreachable!("mutex guard accessed while parked on a condvar"),
            }
        }
    }

    impl<'a, T> std::ops::Deref for MutexGuard<'a, T> {
        type Target = T;

        fn deref(&self) -> &Self::Target {
            self.inner()
        }
    }

    impl<'a, T> std::ops::DerefMut for MutexGuard<'a, T> {
        fn deref_mut(&mut self) -> &mut Self::Target {
            self.inner_mut()
        }
    }

    /// Thin wrapper around std::sync::Condvar.
    #[derive(Debug, Default)]
    pub struct Condvar(StdCondvar);

    impl Condvar {
        /// Create a new condition variable.
        pub const fn new() -> Self {
            Self(StdCondvar::new())
        }

        /// Block until notified, releasing the guard while parked.
        pub fn wait<T>(&self, guard: &mut MutexGuard<'_, T>) {
            if let Some(inner) = guard.0.take() {
                guard.0 = Some(self.0.wait(inner).unwrap_or_else(PoisonError::into_inner));
            }
        }

        /// Block until notified or until `timeout` elapses.
        pub fn wait_for<T>(
            &self,
            guard: &mut MutexGuard<'_, T>,
            timeout: Duration,
        ) -> WaitTimeoutResult {
            let inner = match guard.0.take() {
                Some(inner) => inner,
                None => unreachable!("mutex guard parked twice"),
            };
            let (inner, result) = self
                .0
                .wait_timeout(inner, timeout)
                .unwrap_or_else(PoisonError::into_inner);
            guard.0 = Some(inner);
            result
        }

        /// Wake one parked thread.
        pub fn notify_one(&self) {
            self.0.notify_one();
        }

        /// Wake every parked thread.
        pub fn notify_all(&self) {
            self.0.notify_all();
        }
    }
}

#[cfg(not(feature = "parking_lot"))]
pub use std_mutex::{Condvar, Mutex};
