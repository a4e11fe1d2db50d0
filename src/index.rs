//! The segregated free-list index: `K` size-class buckets, each an
//! independently-locked doubly-linked list of parked [`Header`]s.
//!
//! Per-bucket locking caps contention between unrelated size classes at
//! the cost of a subtlety in [`FreeListIndex::find_fit`]: satisfying a
//! small request from a larger bucket means holding that larger bucket's
//! lock while we walk it, then releasing it before trying the next one —
//! never more than one bucket lock at a time.

use std::cell::UnsafeCell;
use std::ptr;

use parking_lot::Mutex;

#[cfg(feature = "logging")]
use log::trace;

use crate::header::Header;

/// Number of size-class buckets. Bucket `K-1` is a catch-all for every
/// payload size `>= 2^(K-1)`.
pub const NUM_BUCKETS: usize = 10;

/// Maps a payload size to its bucket index: `min(floor(log2(size)), K-1)`.
///
/// `size` is assumed non-zero (the facade rejects zero-size requests
/// before consulting the index).
pub const fn bucket_of(
  size: usize,
) -> usize {
  debug_assert!(size > 0);
  let bit = (usize::BITS - 1 - size.leading_zeros()) as usize;
  if bit < NUM_BUCKETS - 1 { bit } else { NUM_BUCKETS - 1 }
}

/// One size class: a lock guarding its own head pointer and the
/// `next`/`prev` links of every header currently parked in it.
struct Bucket {
  lock: Mutex<()>,
  head: UnsafeCell<*mut Header>,
}

// SAFETY: every access to `head` and to the headers reachable from it
// happens while `lock` is held; the raw pointers themselves carry no
// thread affinity.
unsafe impl Send for Bucket {}
unsafe impl Sync for Bucket {}

impl Bucket {
  const fn new() -> Self {
    Self { lock: Mutex::new(()), head: UnsafeCell::new(ptr::null_mut()) }
  }
}

/// The full segregated free-list index: `NUM_BUCKETS` independently
/// locked buckets.
pub struct FreeListIndex {
  buckets: [Bucket; NUM_BUCKETS],
}

impl FreeListIndex {
  /// Builds an empty index. `const`-constructible so it can live inside
  /// a `static` allocator with no lazy initialization.
  pub const fn new() -> Self {
    // `Bucket` has no `Copy`/array-repeat-expr friendly const ctor
    // shortcut, so the buckets are spelled out explicitly.
    Self {
      buckets: [
        Bucket::new(),
        Bucket::new(),
        Bucket::new(),
        Bucket::new(),
        Bucket::new(),
        Bucket::new(),
        Bucket::new(),
        Bucket::new(),
        Bucket::new(),
        Bucket::new(),
      ],
    }
  }

  /// Parks `header` at the head of its bucket's list, under that
  /// bucket's lock only.
  ///
  /// # Safety
  ///
  /// `header` must point to a live header not currently reachable from
  /// any bucket, and must not be aliased by any other live reference.
  pub unsafe fn insert(
    &self,
    header: *mut Header,
  ) {
    let size = unsafe { (*header).size };
    let idx = bucket_of(size);
    let bucket = &self.buckets[idx];
    let _guard = bucket.lock.lock();

    unsafe {
      (*header).is_free = true;
      (*header).prev = ptr::null_mut();
      let old_head = *bucket.head.get();
      (*header).next = old_head;
      if !old_head.is_null() {
        (*old_head).prev = header;
      }
      *bucket.head.get() = header;
    }

    #[cfg(feature = "logging")]
    trace!("index: parked {size}-byte block in bucket {idx}");
  }

  /// Unlinks `header` from bucket `idx`'s list. The caller must already
  /// hold that bucket's lock and must know `header.is_free` is true.
  ///
  /// Not exposed outside this module: detaching without holding the
  /// owning bucket's lock would race `insert`/`find_fit` on the same
  /// bucket, which is exactly what per-bucket locking exists to rule
  /// out.
  ///
  /// # Safety
  ///
  /// `header` must currently be linked into bucket `idx`'s list.
  unsafe fn detach_locked(
    &self,
    idx: usize,
    header: *mut Header,
  ) {
    unsafe {
      let prev = (*header).prev;
      let next = (*header).next;
      if prev.is_null() {
        *self.buckets[idx].head.get() = next;
      } else {
        (*prev).next = next;
      }
      if !next.is_null() {
        (*next).prev = prev;
      }
      (*header).next = ptr::null_mut();
      (*header).prev = ptr::null_mut();
    }
  }

  /// First-fit-within-best-class search: starting at `bucket_of(size)`
  /// and walking upward, takes one bucket lock at a time, returns the
  /// first parked header whose size is at least `size`, detached and
  /// marked in-use.
  ///
  /// The excess between a returned block's size and the requested size
  /// is not reclaimed — blocks are never split.
  pub fn find_fit(
    &self,
    size: usize,
  ) -> Option<*mut Header> {
    for idx in bucket_of(size)..NUM_BUCKETS {
      let bucket = &self.buckets[idx];
      let _guard = bucket.lock.lock();

      let mut current = unsafe { *bucket.head.get() };
      while !current.is_null() {
        let candidate_size = unsafe { (*current).size };
        if candidate_size >= size {
          unsafe {
            self.detach_locked(idx, current);
            (*current).is_free = false;
          }
          #[cfg(feature = "logging")]
          trace!(
            "index: reused {candidate_size}-byte block from bucket {idx} for a {size}-byte request"
          );
          return Some(current);
        }
        current = unsafe { (*current).next };
      }
    }
    None
  }

  /// Sums the sizes of every parked header across all buckets, taking
  /// each bucket's lock in turn. A point-in-time snapshot: by the time
  /// it returns, concurrent mutators may have already invalidated it.
  pub fn free_bytes(
    &self,
  ) -> usize {
    let mut total = 0usize;
    for bucket in &self.buckets {
      let _guard = bucket.lock.lock();
      let mut current = unsafe { *bucket.head.get() };
      while !current.is_null() {
        total += unsafe { (*current).size };
        current = unsafe { (*current).next };
      }
    }
    total
  }
}
