//! # mapalloc
//!
//! A general purpose allocator that gets all of its memory straight from anonymous
//! virtual memory mappings (`mmap` on Unix, `VirtualAlloc` on Windows).
//!
//! ```text
//!   allocate / allocate_zeroed / release
//!                  |
//!   +--------------v---------------+
//!   |           MapAlloc           |
//!   |                              |
//!   |  Free List (address order,   |   sub-page blocks: first fit, carve,
//!   |  one lock, coalescing)       |   coalesce on release
//!   +--------------+---------------+
//!                  |
//!   +--------------v---------------+
//!   |   PlatformMemory (Kernel)    |   one page per refill, whole mappings
//!   |   mmap / munmap              |   for anything a page or larger
//!   +------------------------------+
//! ```
//!
//! Every block carries a one word header holding its total size. Blocks smaller than
//! a page are carved out of pages and, once released, kept in an address-ordered free
//! list where adjacent blocks merge. Blocks of a page or more get their own mapping and
//! go back to the operating system as soon as they are released.
//!
//! ## Quick Start
//!
//! ```rust
//! use mapalloc::MapAlloc;
//!
//! let allocator = MapAlloc::new();
//!
//! let ptr = allocator.allocate(64).unwrap();
//! unsafe {
//!     ptr.as_ptr().write_bytes(7, 64);
//!     allocator.release(ptr.as_ptr());
//! }
//! ```
//!
//! It can also serve the whole program:
//!
//! ```rust,ignore
//! #[global_allocator]
//! static ALLOCATOR: mapalloc::MapAlloc = mapalloc::MapAlloc::new();
//! ```
//!
//! Diagnostics go through the [`log`] facade at `trace`/`debug`/`warn` level.

mod block;
mod diag;
mod error;
mod freelist;
mod kernel;
mod memalloc;
mod utils;

pub use error::AllocError;
pub use kernel::{Kernel, PlatformMemory};
pub use memalloc::{MIN_PAGE_SIZE, MapAlloc, PAGE_SIZE};
