//! `Lrc<T>` is a heap-allocated smart pointer for sharing data across threads, with a read-write lock guarding the data.
//! `Lrc<T>` stands for: Locked Reference Counted.
//! `Lrc<T>` provides shared ownership of the data similar to `Arc<T>`, but every handle can also mutate it:
//! [`Lrc::read`] hands out shared access and [`Lrc::write`] hands out exclusive access, both through guards that
//! release the lock when dropped.
//!
//! A cycle between `Lrc` pointers cannot be deallocated as the reference counts will never reach zero. The solution is a `Weak<T>`.
//! A `Weak<T>` is a non-owning observer of the data held by an `Lrc<T>`. It cannot access the data directly and
//! must be upgraded back into an `Lrc<T>`, which only succeeds while the value is alive.
//! Every `Weak<T>` family has its own control block and reference count, so dropping all `Lrc<T>`s never invalidates a `Weak<T>`:
//! it simply stops upgrading.
//!
//! Requesting access to a value while already holding a guard for the same value on the same thread deadlocks.
//! The lock is a spinning lock and does not detect this.

#![cfg_attr(feature = "nostd", no_std)]

extern crate alloc;

pub mod guard;
pub mod lrc;
pub mod weak;

pub use crate::guard::{ReadGuard, WriteGuard};
pub use crate::lrc::Lrc;
pub use crate::weak::Weak;
