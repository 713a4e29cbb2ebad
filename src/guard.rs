use core::{
    fmt::{Debug, Display},
    mem::ManuallyDrop,
    ops::{Deref, DerefMut},
};

use spin::{RwLockReadGuard, RwLockWriteGuard};

/// Shared access to the value of an [`Lrc`](crate::Lrc), returned by [`Lrc::read`](crate::Lrc::read).
/// Any number of `ReadGuard`s for the same value may be alive at once, across any threads.
/// The shared lock is released when the guard is dropped.
pub struct ReadGuard<'a, T> {
    pub(crate) guard: RwLockReadGuard<'a, ManuallyDrop<T>>,
}

/// Exclusive access to the value of an [`Lrc`](crate::Lrc), returned by [`Lrc::write`](crate::Lrc::write).
/// While a `WriteGuard` is alive, every other reader and writer of the same value waits.
/// The exclusive lock is released when the guard is dropped.
pub struct WriteGuard<'a, T> {
    pub(crate) guard: RwLockWriteGuard<'a, ManuallyDrop<T>>,
}

impl<'a, T> WriteGuard<'a, T> {
    /// Atomically turn exclusive access into shared access, without letting another writer in between.
    /// ```
    /// use lrc::Lrc;
    /// use lrc::WriteGuard;
    ///
    /// let lrc = Lrc::new(1);
    /// let mut writer = Lrc::write(&lrc);
    /// *writer = 2;
    /// let reader = WriteGuard::downgrade(writer);
    /// assert_eq!(*reader, 2);
    /// assert!(Lrc::try_read(&lrc).is_some());
    /// ```
    #[inline]
    pub fn downgrade(this: Self) -> ReadGuard<'a, T> {
        ReadGuard {
            guard: RwLockWriteGuard::downgrade(this.guard),
        }
    }
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T: Debug> Debug for ReadGuard<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        Debug::fmt(&**self, f)
    }
}

impl<T: Debug> Debug for WriteGuard<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        Debug::fmt(&**self, f)
    }
}

impl<T: Display> Display for ReadGuard<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        Display::fmt(&**self, f)
    }
}

impl<T: Display> Display for WriteGuard<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        Display::fmt(&**self, f)
    }
}
