use core::{
    fmt::{Debug, Pointer},
    marker::PhantomData,
    mem::ManuallyDrop,
    ptr::NonNull,
    sync::atomic::{fence, AtomicUsize, Ordering},
};

use alloc::boxed::Box;
use spin::{RwLock, RwLockWriteGuard};

use crate::guard::{ReadGuard, WriteGuard};
use crate::weak::Weak;

#[cfg(not(target_has_atomic = "ptr"))]
compile_error!("Cannot use `Lrc` on a system without atomics.");

pub(crate) const MAX_REFCOUNT: usize = (isize::MAX) as usize;

/// Sentinel stored in `observers` while [`Lrc::get_mut`] checks for uniqueness.
const OBSERVERS_LOCKED: usize = usize::MAX;

/// The control block shared by every `Lrc<T>` of one value.
pub(crate) struct LrcInner<T> {
    /// Number of live `Lrc<T>`s. The value is valid while this is non-zero.
    pub(crate) strong: AtomicUsize,
    /// References to this allocation: one for all strong handles together, plus one per weak control block.
    pub(crate) observers: AtomicUsize,
    lock: RwLock<ManuallyDrop<T>>,
}

impl<T> LrcInner<T> {
    /// Take one allocation reference on behalf of a new weak control block.
    pub(crate) fn acquire_observer(this: NonNull<Self>) {
        let observers = &unsafe { this.as_ref() }.observers;
        let mut current = observers.load(Ordering::Relaxed);
        loop {
            if current == OBSERVERS_LOCKED {
                core::hint::spin_loop();
                current = observers.load(Ordering::Relaxed);
                continue;
            }
            if current > MAX_REFCOUNT {
                panic!("Overflow of maximum weak reference count.");
            }
            match observers.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(old) => current = old,
            }
        }
    }

    /// Give back one allocation reference, freeing the control block if it was the last one.
    ///
    /// # Safety
    /// The caller must own one allocation reference on `this` and must not touch `this` afterwards.
    pub(crate) unsafe fn release_observer(this: NonNull<Self>) {
        if unsafe { this.as_ref() }
            .observers
            .fetch_sub(1, Ordering::Release)
            != 1
        {
            return;
        }

        fence(Ordering::Acquire);
        log::trace!("lrc: freeing control block {:p}", this);
        drop(unsafe { Box::from_raw(this.as_ptr()) });
    }

    /// Drop the value in place through an exclusive guard.
    ///
    /// # Safety
    /// Must only be called by the one handle that observed the strong count reach zero.
    unsafe fn drop_value(guard: &mut RwLockWriteGuard<'_, ManuallyDrop<T>>) {
        unsafe { ManuallyDrop::drop(&mut **guard) };
        log::trace!("lrc: value released");
    }

    /// Move the value out through an exclusive guard.
    ///
    /// # Safety
    /// Same as [`LrcInner::drop_value`]; the slot is left logically uninitialized.
    unsafe fn take_value(&self) -> T {
        let mut guard = self.lock.write();
        unsafe { ManuallyDrop::take(&mut *guard) }
    }
}

/// `Lrc` is a heap-allocated smart pointer for sharing a value across threads and mutating it from any of them.
/// `Lrc` stands for: Locked Reference Counted.
///
/// Every `Lrc<T>` that points to the same value shares one control block holding the atomic strong count,
/// the read-write access lock and the value itself. The value is dropped exactly once, when the last `Lrc<T>` is dropped.
///
/// ## Access
/// `Lrc<T>` does not implement [`Deref`](core::ops::Deref), because a reference to the value is only sound while the lock is held.
/// - [`Lrc::read`] takes the lock in shared mode and returns a [`ReadGuard`]. Readers never wait on each other.
/// - [`Lrc::write`] takes the lock in exclusive mode and returns a [`WriteGuard`]. Any number of `Lrc<T>`s may ask for
///   write access; exactly one holds it at a time and all others (readers and writers) wait.
/// - [`Lrc::as_ptr`] returns the address of the value without locking.
///
/// Asking for access while the same thread already holds a guard for the same value deadlocks.
/// The lock spins and does not detect this.
///
/// ## Clone behavior
/// Cloning increments the atomic strong count and returns a new handle to the same control block.
/// [`Clone::clone_from`] is [`Lrc::assign`], which releases the old value under its exclusive lock.
///
/// ## Drop behavior
/// When an `Lrc<T>` is dropped the strong count is decremented. The handle that observes the count reach zero
/// takes the exclusive lock, drops the value and releases the control block. Any [`Weak`] observing the value keeps the
/// control block (but not the value) alive until it is dropped too.
///
/// ## Examples
///
/// Example in a single thread:
/// ```
/// use lrc::Lrc;
///
/// let lrc = Lrc::new(42);
/// let lrc2 = lrc.clone();
/// *Lrc::write(&lrc2) = 99;
/// assert_eq!(*Lrc::read(&lrc), 99);
/// ```
///
/// Example with multiple threads:
/// ```
/// use std::thread;
/// use lrc::Lrc;
///
/// let lrc = Lrc::new(0);
/// let handles: Vec<_> = (0..4)
///     .map(|_| {
///         let lrc = lrc.clone();
///         thread::spawn(move || *Lrc::write(&lrc) += 1)
///     })
///     .collect();
///
/// for handle in handles {
///     handle.join().unwrap();
/// }
/// assert_eq!(*Lrc::read(&lrc), 4);
/// ```
pub struct Lrc<T> {
    pub(crate) shared: NonNull<LrcInner<T>>,
    _marker: PhantomData<LrcInner<T>>,
}

unsafe impl<T: Send + Sync> Send for Lrc<T> {}
unsafe impl<T: Send + Sync> Sync for Lrc<T> {}

impl<T> Lrc<T> {
    /// Creates a new `Lrc<T>` owning the provided value, with a strong count of 1.
    /// ```
    /// use lrc::Lrc;
    ///
    /// let lrc = Lrc::new(100);
    /// assert_eq!(*Lrc::read(&lrc), 100);
    /// assert_eq!(Lrc::strong_count(&lrc), 1);
    /// ```
    #[inline]
    pub fn new(value: T) -> Self {
        let inner = Box::new(LrcInner {
            strong: AtomicUsize::new(1),
            observers: AtomicUsize::new(1),
            lock: RwLock::new(ManuallyDrop::new(value)),
        });

        Lrc::from_inner(NonNull::from(Box::leak(inner)))
    }

    /// Wrap a control block whose strong count has already been incremented for this handle.
    #[inline]
    pub(crate) fn from_inner(shared: NonNull<LrcInner<T>>) -> Self {
        Lrc {
            shared,
            _marker: PhantomData,
        }
    }

    #[inline]
    fn inner(&self) -> &LrcInner<T> {
        unsafe { self.shared.as_ref() }
    }

    /// Lock the value for shared access, waiting while a writer holds it.
    /// The lock is released when the returned [`ReadGuard`] is dropped.
    /// ```
    /// use lrc::Lrc;
    ///
    /// let lrc = Lrc::new(String::from("data"));
    /// let a = Lrc::read(&lrc);
    /// let b = Lrc::read(&lrc);
    /// assert_eq!(*a, *b);
    /// ```
    #[inline]
    pub fn read(this: &Self) -> ReadGuard<'_, T> {
        ReadGuard {
            guard: this.inner().lock.read(),
        }
    }

    /// Lock the value for exclusive access, waiting until every other reader and writer has released it.
    /// The lock is released when the returned [`WriteGuard`] is dropped.
    ///
    /// Calling this while the current thread holds any guard for the same value deadlocks.
    /// ```
    /// use lrc::Lrc;
    ///
    /// let lrc = Lrc::new(vec![1, 2]);
    /// Lrc::write(&lrc).push(3);
    /// assert_eq!(*Lrc::read(&lrc), [1, 2, 3]);
    /// ```
    #[inline]
    pub fn write(this: &Self) -> WriteGuard<'_, T> {
        WriteGuard {
            guard: this.inner().lock.write(),
        }
    }

    /// Like [`Lrc::read`], but returns [`None`] instead of waiting if a writer holds the lock.
    /// ```
    /// use lrc::Lrc;
    ///
    /// let lrc = Lrc::new(1);
    /// let writer = Lrc::write(&lrc);
    /// assert!(Lrc::try_read(&lrc).is_none());
    /// drop(writer);
    /// assert!(Lrc::try_read(&lrc).is_some());
    /// ```
    #[inline]
    pub fn try_read(this: &Self) -> Option<ReadGuard<'_, T>> {
        this.inner().lock.try_read().map(|guard| ReadGuard { guard })
    }

    /// Like [`Lrc::write`], but returns [`None`] instead of waiting if the lock is held in any mode.
    /// ```
    /// use lrc::Lrc;
    ///
    /// let lrc = Lrc::new(1);
    /// let reader = Lrc::read(&lrc);
    /// assert!(Lrc::try_write(&lrc).is_none());
    /// drop(reader);
    /// assert!(Lrc::try_write(&lrc).is_some());
    /// ```
    #[inline]
    pub fn try_write(this: &Self) -> Option<WriteGuard<'_, T>> {
        this.inner().lock.try_write().map(|guard| WriteGuard { guard })
    }

    /// Gets the raw pointer to the value without taking the lock.
    /// Dereferencing it races with every guard of the same value; the caller must synchronize externally.
    /// ```
    /// use lrc::Lrc;
    ///
    /// let lrc = Lrc::new(100);
    /// assert_eq!(unsafe { *Lrc::as_ptr(&lrc) }, 100);
    /// ```
    #[inline]
    pub fn as_ptr(this: &Self) -> *mut T {
        this.inner().lock.as_mut_ptr().cast::<T>()
    }

    /// Return the strong count: how many `Lrc<T>`s point to this value.
    /// ```
    /// use lrc::Lrc;
    ///
    /// let lrc = Lrc::new(100);
    /// let lrc2 = lrc.clone();
    /// assert_eq!(Lrc::strong_count(&lrc2), 2);
    /// ```
    #[inline]
    pub fn strong_count(this: &Self) -> usize {
        this.inner().strong.load(Ordering::Relaxed)
    }

    /// Return how many weak control blocks observe this value. Clones of one [`Weak`] share a control block
    /// and count once; every call to [`Lrc::downgrade`] adds one.
    /// ```
    /// use lrc::Lrc;
    ///
    /// let lrc = Lrc::new(100);
    /// let weak = Lrc::downgrade(&lrc);
    /// let _weak2 = weak.clone();
    /// assert_eq!(Lrc::observer_count(&lrc), 1);
    /// let _other = Lrc::downgrade(&lrc);
    /// assert_eq!(Lrc::observer_count(&lrc), 2);
    /// ```
    #[inline]
    pub fn observer_count(this: &Self) -> usize {
        match this.inner().observers.load(Ordering::Relaxed) {
            OBSERVERS_LOCKED => 0,
            n => n - 1,
        }
    }

    /// Checks if the other `Lrc<T>` shares this one's control block.
    /// ```
    /// use lrc::Lrc;
    ///
    /// let lrc1 = Lrc::new(100);
    /// let lrc2 = lrc1.clone();
    /// let lrc3 = Lrc::new(100);
    /// assert!(Lrc::ptr_eq(&lrc1, &lrc2));
    /// assert!(!Lrc::ptr_eq(&lrc1, &lrc3));
    /// ```
    #[inline]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.shared.as_ptr() == other.shared.as_ptr()
    }

    /// Create a [`Weak`] observing this value. The `Weak<T>` gets a control block of its own.
    /// ```
    /// use lrc::Lrc;
    ///
    /// let lrc = Lrc::new(100);
    /// let weak = Lrc::downgrade(&lrc);
    /// assert!(lrc::Weak::upgrade(&weak).is_some());
    /// ```
    #[inline]
    pub fn downgrade(this: &Self) -> Weak<T> {
        Weak::new(this)
    }

    /// Rebind `this` to `src`'s value. If `this` was the last handle to its old value, that value is dropped.
    ///
    /// Both values are locked exclusively for the duration, in address order, so two threads assigning
    /// across the same pair of values cannot deadlock, and no reader of the old value can race its teardown.
    /// Assigning a handle to a clone of itself does nothing.
    ///
    /// Calling this while the current thread holds a guard for either value deadlocks.
    /// ```
    /// use lrc::Lrc;
    ///
    /// let mut a = Lrc::new(1);
    /// let b = Lrc::new(2);
    /// Lrc::assign(&mut a, &b);
    /// assert!(Lrc::ptr_eq(&a, &b));
    /// assert_eq!(*Lrc::read(&a), 2);
    /// assert_eq!(Lrc::strong_count(&b), 2);
    /// ```
    pub fn assign(this: &mut Self, src: &Self) {
        if Lrc::ptr_eq(this, src) {
            return;
        }

        let old = this.shared;
        let old_inner = unsafe { old.as_ref() };
        let src_inner = src.inner();

        let (mut old_guard, src_guard) = if old.as_ptr() < src.shared.as_ptr() {
            let old_guard = old_inner.lock.write();
            (old_guard, src_inner.lock.write())
        } else {
            let src_guard = src_inner.lock.write();
            (old_inner.lock.write(), src_guard)
        };

        let prev = src_inner.strong.fetch_add(1, Ordering::Relaxed);
        if prev > MAX_REFCOUNT {
            panic!("Overflow of maximum strong reference count.");
        }

        let last = old_inner.strong.fetch_sub(1, Ordering::Release) == 1;
        if last {
            fence(Ordering::Acquire);
            unsafe { LrcInner::drop_value(&mut old_guard) };
        }
        this.shared = src.shared;
        log::trace!("lrc: rebound {:p} to {:p}", old, src.shared);

        drop(src_guard);
        drop(old_guard);

        if last {
            unsafe { LrcInner::release_observer(old) };
        }
    }

    /// Get a `&mut T` without locking if this is the only `Lrc<T>` and no [`Weak`] observes the value.
    /// Otherwise, return [`None`], since another handle could reach the value concurrently.
    /// ```
    /// use lrc::Lrc;
    ///
    /// let mut lrc = Lrc::new(100);
    /// *Lrc::get_mut(&mut lrc).unwrap() = 300;
    /// assert_eq!(*Lrc::read(&lrc), 300);
    ///
    /// let weak = Lrc::downgrade(&lrc);
    /// assert!(Lrc::get_mut(&mut lrc).is_none());
    /// drop(weak);
    /// assert!(Lrc::get_mut(&mut lrc).is_some());
    /// ```
    #[inline]
    pub fn get_mut(this: &mut Self) -> Option<&mut T> {
        //Lock out new weak control blocks while the strong count is inspected
        if this
            .inner()
            .observers
            .compare_exchange(1, OBSERVERS_LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return None;
        }

        let unique = this.inner().strong.load(Ordering::Acquire) == 1;
        this.inner().observers.store(1, Ordering::Release);

        if unique {
            Some(unsafe { &mut *Lrc::as_ptr(this) })
        } else {
            None
        }
    }

    /// Returns the value if this is the only `Lrc<T>`. Otherwise, an [`Err`] is returned with the same `Lrc` that was passed in.
    /// This succeeds even if there are outstanding [`Weak`]s; they will fail to upgrade afterwards.
    /// ```
    /// use lrc::Lrc;
    ///
    /// let lrc = Lrc::new(100);
    /// let weak = Lrc::downgrade(&lrc);
    /// assert_eq!(Lrc::try_unwrap(lrc).ok(), Some(100));
    /// assert!(lrc::Weak::upgrade(&weak).is_none());
    ///
    /// let lrc = Lrc::new(100);
    /// let _lrc2 = lrc.clone();
    /// assert!(Lrc::try_unwrap(lrc).is_err());
    /// ```
    pub fn try_unwrap(this: Self) -> Result<T, Self> {
        if this
            .inner()
            .strong
            .compare_exchange(1, 0, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return Err(this);
        }

        fence(Ordering::Acquire);

        let this = ManuallyDrop::new(this);
        let value = unsafe { this.inner().take_value() };
        unsafe { LrcInner::release_observer(this.shared) };
        Ok(value)
    }

    /// Returns the value if this is the last `Lrc<T>`. Otherwise, [`None`] is returned and the `Lrc` is dropped.
    /// If `into_inner` is called on every clone, exactly one of the calls returns the value.
    /// ```
    /// use lrc::Lrc;
    ///
    /// let x = Lrc::new(3i32);
    /// let y = x.clone();
    ///
    /// let x_thread = std::thread::spawn(move || Lrc::into_inner(x));
    /// let y_thread = std::thread::spawn(move || Lrc::into_inner(y));
    ///
    /// let x_inner = x_thread.join().unwrap();
    /// let y_inner = y_thread.join().unwrap();
    ///
    /// assert!(matches!((x_inner, y_inner), (None, Some(3)) | (Some(3), None)));
    /// ```
    pub fn into_inner(this: Self) -> Option<T> {
        let this = ManuallyDrop::new(this);

        if this.inner().strong.fetch_sub(1, Ordering::Release) != 1 {
            return None;
        }

        fence(Ordering::Acquire);

        let value = unsafe { this.inner().take_value() };
        unsafe { LrcInner::release_observer(this.shared) };
        Some(value)
    }
}

impl<T: Clone> Lrc<T> {
    /// If this is the only `Lrc<T>`, unwrap the value. Otherwise, clone it under a read lock.
    /// ```
    /// use lrc::Lrc;
    ///
    /// let lrc = Lrc::new(String::from("Lrc"));
    /// let lrc2 = lrc.clone();
    /// assert_eq!(Lrc::unwrap_or_clone(lrc), "Lrc");
    /// assert_eq!(Lrc::unwrap_or_clone(lrc2), "Lrc");
    /// ```
    #[inline]
    pub fn unwrap_or_clone(this: Self) -> T {
        Lrc::try_unwrap(this).unwrap_or_else(|lrc| T::clone(&Lrc::read(&lrc)))
    }
}

impl<T> Drop for Lrc<T> {
    #[inline]
    fn drop(&mut self) {
        if self.inner().strong.fetch_sub(1, Ordering::Release) != 1 {
            return;
        }

        fence(Ordering::Acquire);
        {
            let mut guard = self.inner().lock.write();
            unsafe { LrcInner::drop_value(&mut guard) };
        }
        unsafe { LrcInner::release_observer(self.shared) };
    }
}

impl<T> Clone for Lrc<T> {
    /// Clone an `Lrc<T>` (increment the strong count).
    /// It will panic if the strong count overflows.
    /// ```
    /// use lrc::Lrc;
    ///
    /// let lrc = Lrc::new(100);
    /// let lrc2 = lrc.clone();
    /// assert!(Lrc::ptr_eq(&lrc, &lrc2));
    /// assert_eq!(Lrc::strong_count(&lrc), 2);
    /// ```
    #[inline]
    fn clone(&self) -> Self {
        let prev = self.inner().strong.fetch_add(1, Ordering::Relaxed);
        if prev > MAX_REFCOUNT {
            panic!("Overflow of maximum strong reference count.");
        }

        Lrc::from_inner(self.shared)
    }

    /// Equivalent to [`Lrc::assign`].
    #[inline]
    fn clone_from(&mut self, source: &Self) {
        Lrc::assign(self, source)
    }
}

impl<T: Default> Default for Lrc<T> {
    fn default() -> Self {
        Lrc::new(Default::default())
    }
}

impl<T> From<T> for Lrc<T> {
    /// Create a new `Lrc<T>` from the provided data. This is equivalent to calling `Lrc::new` on the same data.
    /// ```
    /// use lrc::Lrc;
    ///
    /// let lrc = Lrc::from(100);
    /// assert_eq!(*Lrc::read(&lrc), 100);
    /// ```
    fn from(value: T) -> Self {
        Lrc::new(value)
    }
}

impl<T: Debug> Debug for Lrc<T> {
    /// Formats the value if it can be read without waiting, and `<locked>` otherwise.
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match Lrc::try_read(self) {
            Some(guard) => Debug::fmt(&*guard, f),
            None => f.write_str("<locked>"),
        }
    }
}

impl<T> Pointer for Lrc<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        Pointer::fmt(&Lrc::as_ptr(self), f)
    }
}
