//! The on-heap record prefixing every allocation.
//!
//! A [`Header`] is a passive record: it has no methods that walk other
//! headers or touch locks. Everything that reasons about *where* a header
//! lives (a free-list bucket, the caller's hands) belongs to
//! [`crate::index`] or [`crate::allocator`]; this module only knows how to
//! format one in place and how to find one given a payload pointer.

use std::mem;
use std::ptr;

/// Metadata stored immediately before every payload this allocator hands
/// out.
///
/// `next` and `prev` are only meaningful while `is_free` is `true` — they
/// are the intrusive links used by the bucket the block is parked in.
/// While a block is live their contents are undefined; nothing reads them.
#[repr(C)]
pub struct Header {
  /// Rounded payload size in bytes. Never the total block size.
  pub size: usize,
  /// `true` iff the block is currently parked in a free-list bucket.
  pub is_free: bool,
  /// Intrusive free-list link, valid only while `is_free`.
  pub next: *mut Header,
  /// Intrusive free-list link, valid only while `is_free`.
  pub prev: *mut Header,
}

/// Size of a [`Header`] in bytes — the fixed offset between a block's
/// address and the payload pointer handed to the caller.
pub const HEADER_SIZE: usize = mem::size_of::<Header>();

impl Header {
  /// Formats a fresh, in-use header at `addr`, which must be the start
  /// of a region of at least `HEADER_SIZE + size` freshly obtained
  /// bytes (i.e. the address the boundary broker just returned from a
  /// grow).
  ///
  /// # Safety
  ///
  /// `addr` must be valid for writes of `HEADER_SIZE` bytes and must not
  /// alias any other header.
  pub unsafe fn write_new(
    addr: *mut u8,
    size: usize,
  ) -> *mut Header {
    let header = addr as *mut Header;
    unsafe {
      ptr::write(
        header,
        Header {
          size,
          is_free: false,
          next: ptr::null_mut(),
          prev: ptr::null_mut(),
        },
      );
    }
    header
  }

  /// The payload pointer for a given header: the first byte after the
  /// header, which is where the caller's usable bytes begin.
  ///
  /// # Safety
  ///
  /// `header` must point to a live, properly initialized `Header`.
  pub unsafe fn payload_ptr(
    header: *mut Header,
  ) -> *mut u8 {
    unsafe { (header as *mut u8).add(HEADER_SIZE) }
  }

  /// Recovers the header for a payload pointer previously returned by
  /// this allocator.
  ///
  /// # Safety
  ///
  /// `payload` must have been produced by this allocator's `allocate`,
  /// `reallocate`, or `zeroed_allocate` and not yet released. Passing
  /// any other pointer is undefined behavior — this function does not
  /// and cannot validate its input.
  pub unsafe fn header_of(
    payload: *mut u8,
  ) -> *mut Header {
    unsafe { payload.sub(HEADER_SIZE) as *mut Header }
  }
}
