use core::{
    fmt::Debug,
    marker::PhantomData,
    ptr::NonNull,
    sync::atomic::{fence, AtomicUsize, Ordering},
};

use alloc::boxed::Box;

use crate::lrc::{Lrc, LrcInner, MAX_REFCOUNT};

/// The control block shared by every clone of one `Weak<T>`.
struct WeakInner<T> {
    weak: AtomicUsize,
    /// Holds one allocation reference on the observed block, never a strong one.
    observed: NonNull<LrcInner<T>>,
}

/// `Weak<T>` is a non-owning observer of an [`Lrc<T>`]'s value. It is used to prevent cyclic references which cause memory to never be freed.
/// `Weak<T>` does not keep the value alive, and cannot access it directly: it must be upgraded into an `Lrc<T>` with [`Weak::upgrade`],
/// which fails once the last `Lrc<T>` has been dropped.
///
/// Each call to [`Lrc::downgrade`] creates a separate weak control block with its own count; clones of a `Weak<T>` share it.
/// A weak control block lives until its last `Weak<T>` is dropped, whether or not the value is still alive.
///
/// To prevent name clashes, `Weak<T>`'s functions are associated.
///
/// # Examples
///
/// Example in a single thread:
/// ```
/// use lrc::Lrc;
/// use lrc::Weak;
///
/// let lrc = Lrc::new(100);
/// let weak = Lrc::downgrade(&lrc);
/// let new_lrc = Weak::upgrade(&weak).unwrap();
/// assert_eq!(*Lrc::read(&new_lrc), 100);
///
/// drop(lrc);
/// drop(new_lrc);
/// assert!(Weak::upgrade(&weak).is_none());
/// ```
///
/// Example with multiple threads:
/// ```
/// use std::thread;
/// use lrc::Lrc;
///
/// let lrc = Lrc::new(100);
/// let weak = Lrc::downgrade(&lrc);
/// let handle = thread::spawn(move || {
///     if let Some(lrc) = lrc::Weak::upgrade(&weak) {
///         *Lrc::write(&lrc) += 1;
///     }
/// });
/// handle.join().unwrap();
/// assert_eq!(*Lrc::read(&lrc), 101);
/// ```
pub struct Weak<T> {
    block: NonNull<WeakInner<T>>,
    _marker: PhantomData<WeakInner<T>>,
}

unsafe impl<T: Send + Sync> Send for Weak<T> {}
unsafe impl<T: Send + Sync> Sync for Weak<T> {}

impl<T> Weak<T> {
    /// Create a `Weak<T>` observing `lrc`'s value, with a fresh control block and a weak count of 1.
    /// This is the same as [`Lrc::downgrade`].
    /// ```
    /// use lrc::Lrc;
    /// use lrc::Weak;
    ///
    /// let lrc = Lrc::new(100);
    /// let weak = Weak::new(&lrc);
    /// assert_eq!(Weak::weak_count(&weak), 1);
    /// ```
    pub fn new(lrc: &Lrc<T>) -> Self {
        LrcInner::acquire_observer(lrc.shared);

        let block = Box::new(WeakInner {
            weak: AtomicUsize::new(1),
            observed: lrc.shared,
        });

        Weak {
            block: NonNull::from(Box::leak(block)),
            _marker: PhantomData,
        }
    }

    #[inline]
    fn inner(&self) -> &WeakInner<T> {
        unsafe { self.block.as_ref() }
    }

    #[inline]
    fn observed(&self) -> &LrcInner<T> {
        unsafe { self.inner().observed.as_ref() }
    }

    /// Try to get an [`Lrc<T>`] to the observed value. The strong count is incremented only if it is not already zero,
    /// in a single atomic step, so the returned `Lrc<T>` joins the existing owners of the value.
    /// If the value has been dropped, [`None`] is returned.
    /// ```
    /// use lrc::Lrc;
    /// use lrc::Weak;
    ///
    /// let lrc = Lrc::new(100i32);
    /// let weak = Lrc::downgrade(&lrc);
    /// let new_lrc = Weak::upgrade(&weak).expect("Value was dropped");
    /// assert!(Lrc::ptr_eq(&lrc, &new_lrc));
    /// assert_eq!(Lrc::strong_count(&lrc), 2);
    /// ```
    #[inline]
    pub fn upgrade(this: &Self) -> Option<Lrc<T>> {
        let upgraded = this
            .observed()
            .strong
            .fetch_update(Ordering::Acquire, Ordering::Relaxed, |n| {
                // Any write of 0 we can observe leaves the field in permanently zero state.
                if n == 0 {
                    return None;
                }
                assert!(
                    n <= MAX_REFCOUNT,
                    "Overflow of maximum strong reference count."
                );
                Some(n + 1)
            })
            .is_ok();

        if upgraded {
            Some(Lrc::from_inner(this.inner().observed))
        } else {
            log::trace!("lrc: upgrade of expired value {:p}", this.inner().observed);
            None
        }
    }

    /// Return the strong count of the observed value, or 0 if it has been dropped.
    /// ```
    /// use lrc::Lrc;
    /// use lrc::Weak;
    ///
    /// let lrc = Lrc::new(100);
    /// let weak = Lrc::downgrade(&lrc);
    /// assert_eq!(Weak::strong_count(&weak), 1);
    /// drop(lrc);
    /// assert_eq!(Weak::strong_count(&weak), 0);
    /// ```
    #[inline]
    pub fn strong_count(this: &Self) -> usize {
        this.observed().strong.load(Ordering::Relaxed)
    }

    /// Return how many `Weak<T>`s share this one's control block.
    /// ```
    /// use lrc::Lrc;
    /// use lrc::Weak;
    ///
    /// let lrc = Lrc::new(100);
    /// let weak1 = Lrc::downgrade(&lrc);
    /// let weak2 = weak1.clone();
    /// let _other = Lrc::downgrade(&lrc);
    /// assert_eq!(Weak::weak_count(&weak2), 2);
    /// ```
    #[inline]
    pub fn weak_count(this: &Self) -> usize {
        this.inner().weak.load(Ordering::Relaxed)
    }

    /// Whether the observed value has been dropped. A `false` result can be stale by the time it is read;
    /// use [`Weak::upgrade`] to actually reach the value.
    #[inline]
    pub fn is_expired(this: &Self) -> bool {
        Weak::strong_count(this) == 0
    }

    /// Checks if two `Weak<T>`s observe the same value, even if they were created by separate downgrades.
    /// ```
    /// use lrc::Lrc;
    /// use lrc::Weak;
    ///
    /// let lrc = Lrc::new(100);
    /// let weak1 = Lrc::downgrade(&lrc);
    /// let weak2 = Lrc::downgrade(&lrc);
    /// assert!(Weak::ptr_eq(&weak1, &weak2));
    /// ```
    #[inline]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.inner().observed.as_ptr() == other.inner().observed.as_ptr()
    }
}

impl<T> Drop for Weak<T> {
    #[inline]
    fn drop(&mut self) {
        if self.inner().weak.fetch_sub(1, Ordering::Release) != 1 {
            return;
        }

        fence(Ordering::Acquire);

        let block = unsafe { Box::from_raw(self.block.as_ptr()) };
        let observed = block.observed;
        drop(block);
        log::trace!("lrc: weak control block freed, observing {:p}", observed);

        unsafe { LrcInner::release_observer(observed) };
    }
}

impl<T> Clone for Weak<T> {
    /// Clone a `Weak<T>` (increment the weak count of its control block).
    /// ```
    /// use lrc::Lrc;
    /// use lrc::Weak;
    ///
    /// let lrc = Lrc::new(100);
    /// let weak1 = Lrc::downgrade(&lrc);
    /// let weak2 = weak1.clone();
    /// assert_eq!(Weak::weak_count(&weak1), 2);
    /// ```
    #[inline]
    fn clone(&self) -> Self {
        let prev = self.inner().weak.fetch_add(1, Ordering::Relaxed);

        //If an absurd number of threads are created, and then they are aborted before this, UB can
        //occur if the refcount wraps around.
        if prev > MAX_REFCOUNT {
            panic!("Overflow of maximum weak reference count.");
        }

        Weak {
            block: self.block,
            _marker: PhantomData,
        }
    }
}

impl<T> From<&Lrc<T>> for Weak<T> {
    /// Create a `Weak<T>` from an `Lrc<T>`. This is equivalent to calling `Lrc::downgrade`.
    fn from(value: &Lrc<T>) -> Self {
        Weak::new(value)
    }
}

impl<T> Debug for Weak<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("(Weak)")
    }
}
