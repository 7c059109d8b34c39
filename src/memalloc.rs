use std::{
    alloc::{GlobalAlloc, Layout},
    ptr::{self, NonNull},
};

use log::Level;
use spin::Mutex;

use crate::{
    block::{self, FreeBlock, GRANULE, HEADER_SIZE, MIN_BLOCK_SIZE},
    diag::diag,
    error::AllocError,
    freelist::FreeList,
    kernel::{Kernel, PlatformMemory},
    utils::{align, pages_for},
};

/// Default page size. Small blocks are carved out of regions of exactly this size, and
/// any block this size or larger gets a mapping of its own.
pub const PAGE_SIZE: usize = 4096;

/// Smallest accepted page size: room for a minimal block plus a leftover free block,
/// twice over.
pub const MIN_PAGE_SIZE: usize = 4 * GRANULE;

/// Alignment of every payload we hand out. Block starts are [`GRANULE`] aligned and the
/// payload sits [`HEADER_SIZE`] bytes further.
const PAYLOAD_ALIGN: usize = HEADER_SIZE;

const _: () = assert!(GRANULE % HEADER_SIZE == 0);

/// The allocator: a page source plus one address-ordered free list shared by every
/// thread.
///
/// ```text
///   allocate(s)                                release(p)
///       |                                          |
///   s + header < page? --no--> map whole pages     size < page? --no--> unmap span
///       | yes                                      | yes
///   free list first-fit --miss--> map one page     insert_sorted + coalesce
///       |                            |
///       +------------+---------------+
///                    |
///   carve to size, leftover back to the free list
/// ```
///
/// The lock only guards the free list and is held for one list operation at a time;
/// mapping and unmapping always happen outside of it.
pub struct MapAlloc<S = Kernel> {
    /// Where pages come from and large blocks go back to.
    source: S,
    /// Threshold between list-managed blocks and dedicated mappings.
    page_size: usize,
    free_list: Mutex<FreeList>,
}

impl MapAlloc<Kernel> {
    /// Allocator backed by anonymous OS mappings with a [`PAGE_SIZE`] page.
    ///
    /// This is `const` so it can back a `#[global_allocator]` static.
    pub const fn new() -> Self {
        Self::with_source(Kernel)
    }
}

impl Default for MapAlloc<Kernel> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> MapAlloc<S> {
    /// Allocator getting its pages from `source`, with a [`PAGE_SIZE`] page.
    pub const fn with_source(source: S) -> Self {
        Self {
            source,
            page_size: PAGE_SIZE,
            free_list: Mutex::new(FreeList::new()),
        }
    }

    /// Changes the page size. It has to be a power of two no smaller than
    /// [`MIN_PAGE_SIZE`]. It should also be a multiple of the source's own mapping
    /// granularity, otherwise returning large blocks may give back more or less than
    /// was mapped for them.
    pub fn with_page_size(mut self, page_size: usize) -> Result<Self, AllocError> {
        if !page_size.is_power_of_two() || page_size < MIN_PAGE_SIZE {
            return Err(AllocError::InvalidPageSize(page_size));
        }

        self.page_size = page_size;

        Ok(self)
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Calls `visit(address, size)` for every block on the free list, lowest address
    /// first. The list is locked for the whole walk, so `visit` must not allocate from
    /// this allocator.
    pub fn for_each_free_block(&self, mut visit: impl FnMut(usize, usize)) {
        let free_list = self.free_list.lock();

        for (addr, size) in &*free_list {
            visit(addr, size);
        }
    }

    /// Number of blocks currently on the free list.
    pub fn free_block_count(&self) -> usize {
        self.free_list.lock().len()
    }
}

impl<S: PlatformMemory> MapAlloc<S> {
    /// Returns a pointer to at least `size` writable bytes, aligned to a machine word.
    ///
    /// A `size` of zero still yields a unique, releasable pointer.
    pub fn allocate(&self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let Some(needed) = block::effective_size(size) else {
            diag!(Level::Warn, "allocate({size}) overflows usize");
            return Err(AllocError::SizeOverflow);
        };

        let payload = if needed < self.page_size {
            self.allocate_small(needed)?
        } else {
            self.allocate_large(needed)?
        };

        diag!(Level::Trace, "allocate({size}): {needed} byte block at {payload:?}");

        Ok(payload)
    }

    /// Allocates room for `count` elements of `element_size` bytes each, every byte set
    /// to zero.
    pub fn allocate_zeroed(
        &self,
        count: usize,
        element_size: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        let Some(total) = count.checked_mul(element_size) else {
            diag!(Level::Warn, "allocate_zeroed({count}, {element_size}) overflows usize");
            return Err(AllocError::SizeOverflow);
        };

        let payload = self.allocate(total)?;

        unsafe { payload.as_ptr().write_bytes(0, total) };

        Ok(payload)
    }

    /// Gives a block back. Blocks smaller than a page go to the free list and merge with
    /// their free neighbours, anything bigger is unmapped right away. Null is ignored.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer returned by [`MapAlloc::allocate`] or
    /// [`MapAlloc::allocate_zeroed`] on this same allocator, and it must not have been
    /// released already.
    pub unsafe fn release(&self, ptr: *mut u8) {
        let Some(payload) = NonNull::new(ptr) else {
            diag!(Level::Debug, "release(null) ignored");
            return;
        };

        let size = unsafe {
            let header = block::header_of(payload);
            let size = header.as_ref().size;

            if size < self.page_size {
                let block = FreeBlock::init(header.cast(), size);
                self.free_list.lock().insert_sorted(block);
            } else {
                self.source.return_memory(header.cast(), size);
                diag!(Level::Debug, "unmapped {size} bytes at {header:?}");
            }

            size
        };

        diag!(Level::Trace, "release({payload:?}): {size} byte block");
    }

    /// Serves blocks smaller than a page: first fit from the free list, or a fresh page,
    /// carved down to `needed` bytes.
    fn allocate_small(&self, needed: usize) -> Result<NonNull<u8>, AllocError> {
        let candidate = self.free_list.lock().find_fit(needed);

        let (start, size) = match candidate {
            Some(block) => (block.cast::<u8>(), unsafe { block.as_ref().size }),
            None => (self.map(self.page_size)?, self.page_size),
        };

        // Sizes are granule multiples, so the residual is either zero or a valid block.
        let residual = size - needed;
        let size = if residual >= MIN_BLOCK_SIZE {
            unsafe {
                let leftover = FreeBlock::init(start.add(needed), residual);
                self.free_list.lock().insert_sorted(leftover);
            }
            needed
        } else {
            size
        };

        debug_assert!(size < self.page_size);

        Ok(unsafe { block::seal(start, size) })
    }

    /// Serves blocks of a page or more with a mapping of their own. These never touch
    /// the free list.
    fn allocate_large(&self, needed: usize) -> Result<NonNull<u8>, AllocError> {
        let len = align(needed, self.page_size).ok_or(AllocError::SizeOverflow)?;

        diag!(
            Level::Debug,
            "mapping {} pages for a {needed} byte block",
            pages_for(len, self.page_size)
        );

        let start = self.map(len)?;

        Ok(unsafe { block::seal(start, len) })
    }

    fn map(&self, len: usize) -> Result<NonNull<u8>, AllocError> {
        match unsafe { self.source.request_memory(len) } {
            Some(addr) => {
                diag!(Level::Debug, "mapped {len} bytes at {addr:?}");
                Ok(addr)
            }
            None => {
                diag!(Level::Warn, "out of memory mapping {len} bytes");
                Err(AllocError::OutOfMemory { requested: len })
            }
        }
    }

    /// Layouts asking for more than [`PAYLOAD_ALIGN`]: over-allocate by `align`, hand out
    /// the first aligned address that leaves a word free below it, and keep the real
    /// payload pointer in that word.
    ///
    /// ```text
    /// payload                               aligned
    ///    |                                     |
    ///    v                                     v
    ///    +-------------+-----------------------+--------------------+
    ///    |   padding   | payload (one word)    |   layout.size()    |
    ///    +-------------+-----------------------+--------------------+
    /// ```
    unsafe fn alloc_over_aligned(&self, layout: Layout, zeroed: bool) -> *mut u8 {
        let Some(padded) = layout.size().checked_add(layout.align()) else {
            return ptr::null_mut();
        };

        let Ok(payload) = self.allocate(padded) else {
            return ptr::null_mut();
        };

        let addr = payload.as_ptr().addr();
        let offset = (addr + HEADER_SIZE).next_multiple_of(layout.align()) - addr;

        unsafe {
            let aligned = payload.as_ptr().add(offset);
            aligned.cast::<*mut u8>().sub(1).write(payload.as_ptr());

            if zeroed {
                aligned.write_bytes(0, layout.size());
            }

            aligned
        }
    }
}

unsafe impl<S: PlatformMemory> GlobalAlloc for MapAlloc<S> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > PAYLOAD_ALIGN {
            return unsafe { self.alloc_over_aligned(layout, false) };
        }

        self.allocate(layout.size())
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if layout.align() > PAYLOAD_ALIGN {
            return unsafe { self.alloc_over_aligned(layout, true) };
        }

        self.allocate_zeroed(1, layout.size())
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe {
            if layout.align() > PAYLOAD_ALIGN {
                let payload = ptr.cast::<*mut u8>().sub(1).read();
                self.release(payload);
            } else {
                self.release(ptr);
            }
        }
    }
}
