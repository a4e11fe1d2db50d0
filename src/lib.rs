//! # segalloc — a segregated-free-list `sbrk` allocator
//!
//! This crate provides a general-purpose dynamic memory allocator that
//! plays the role of `malloc`/`calloc`/`realloc`/`free` for a single
//! process. It obtains address space from the operating system by
//! moving the program break (`sbrk`), carves that space into headered
//! blocks, tracks free blocks in a free-list index segregated by size
//! class, and returns freed trailing space to the OS when possible. It
//! is safe to call from any number of threads concurrently.
//!
//! ## Crate Structure
//!
//! ```text
//!   segalloc
//!   ├── align      - alignment constant and rounding helper
//!   ├── header     - the on-heap record prefixing every allocation
//!   ├── boundary   - serialized access to the program break (sbrk)
//!   ├── index      - the segregated free-list index (K size-class buckets)
//!   └── allocator  - the facade: allocate / release / reallocate / zeroed_allocate
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use segalloc::Allocator;
//!
//! static HEAP: Allocator = Allocator::new();
//!
//! unsafe {
//!   let p = HEAP.allocate(64) as *mut u64;
//!   assert!(!p.is_null());
//!   p.write(42);
//!   assert_eq!(p.read(), 42);
//!   HEAP.release(p as *mut u8);
//! }
//! ```
//!
//! ## How It Works
//!
//! Each allocation is preceded by a [`header::Header`] recording its
//! size. A miss against the free-list index grows the heap with `sbrk`
//! and formats a fresh header there; a release either shrinks the break
//! (if the released block is the one abutting it) or parks the block in
//! the index bucket matching its size, for a later allocation to reuse.
//! See the module docs for each piece for the full story.
//!
//! ## Thread Safety
//!
//! [`Allocator`] is `Send + Sync`. A single boundary lock serializes all
//! break motion; `K` independent bucket locks serialize free-list
//! mutation per size class, so two allocations of different sizes rarely
//! contend with each other. There is no guarantee about the *contents* of
//! memory shared across a release/allocate pair on different threads —
//! only the allocator's own metadata is synchronized.
//!
//! ## Limitations
//!
//! - Unix-only: requires `libc` and `sbrk` (POSIX systems).
//! - No coalescing of adjacent free blocks and no splitting of
//!   oversized ones — see the design notes in this crate's repository
//!   for the reasoning.
//! - Does not register itself as `#[global_allocator]`; wiring this
//!   allocator in as the process's actual `malloc` is left to the
//!   embedder.
//!
//! ## Safety
//!
//! This crate is inherently unsafe as it deals with raw memory
//! management. All four entry points are `unsafe fn`: callers must
//! uphold the classical `malloc`/`free` contract (no double release, no
//! use of a payload pointer after it has been released).

pub mod align;
mod allocator;
mod boundary;
pub mod header;
mod index;

pub use allocator::Allocator;
pub use index::{NUM_BUCKETS, bucket_of};

/// The process-wide allocator instance.
///
/// `const`-constructed, so there is no lazy initialization path to
/// reason about: the first call to any of its methods is the first time
/// it touches heap state at all.
static GLOBAL: Allocator = Allocator::new();

/// Returns the process-wide [`Allocator`] singleton.
///
/// This is a convenience for embedders that want one shared instance
/// without declaring their own `static`; nothing about [`Allocator`]
/// requires using this particular instance; see the crate's quick start
/// example for declaring your own.
pub fn global() -> &'static Allocator {
  &GLOBAL
}
