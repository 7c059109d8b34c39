use std::{mem, ptr::NonNull};

use crate::utils::align;

/// Non-null pointer to `T`.
pub(crate) type Link<T> = Option<NonNull<T>>;

/// Bytes in front of every payload handed to the user. See [`BlockHeader`].
pub(crate) const HEADER_SIZE: usize = mem::size_of::<BlockHeader>();

/// The smallest block we can ever track. A block that goes back to the free list must be
/// able to hold a [`FreeBlock`], so nothing smaller is ever carved.
pub(crate) const MIN_BLOCK_SIZE: usize = mem::size_of::<FreeBlock>();

/// Every block size is a multiple of this. Since it equals [`MIN_BLOCK_SIZE`], the tail
/// left over after carving is either empty or big enough to be a free block.
pub(crate) const GRANULE: usize = MIN_BLOCK_SIZE;

const _: () = assert!(GRANULE.is_power_of_two());
const _: () = assert!(mem::offset_of!(FreeBlock, size) == mem::offset_of!(BlockHeader, size));

/// Header of a block owned by a caller. The payload starts right after it.
///
/// ```text
/// +---------------------+ <------+
/// |        size         |        | -> Header
/// +---------------------+ <------+ <- pointer returned to the caller
/// |       Payload       |        |
/// |         ...         |        | -> size - HEADER_SIZE bytes
/// |         ...         |        |
/// +---------------------+ <------+
/// ```
///
/// `size` covers the whole span, header included. Blocks smaller than a page came from
/// the free list; anything else is a mapping of its own.
#[repr(C)]
pub(crate) struct BlockHeader {
    pub size: usize,
}

/// Header of a block sitting on the free list. It shares the `size` word with
/// [`BlockHeader`] and keeps the link in what used to be the payload, so freeing a block
/// costs no extra memory:
///
/// ```text
/// +---------------------+ <------+
/// |        size         |        |
/// +---------------------+        | -> FreeBlock
/// |        next         |        |
/// +---------------------+ <------+
/// |      (unused)       |
/// +---------------------+
/// ```
#[repr(C)]
pub(crate) struct FreeBlock {
    pub size: usize,
    pub next: Link<FreeBlock>,
}

impl FreeBlock {
    /// Writes a fresh, unlinked free block of `size` bytes at `addr`.
    ///
    /// **SAFETY**: `addr..addr + size` must be writable memory owned by the allocator,
    /// aligned for `FreeBlock`, and `size` must be at least [`MIN_BLOCK_SIZE`].
    pub unsafe fn init(addr: NonNull<u8>, size: usize) -> NonNull<FreeBlock> {
        debug_assert!(size >= MIN_BLOCK_SIZE);

        let block = addr.cast::<FreeBlock>();
        unsafe { block.as_ptr().write(FreeBlock { size, next: None }) };

        block
    }

    /// First address past the end of `block`.
    ///
    /// **SAFETY**: `block` must point to an initialized `FreeBlock`.
    #[inline]
    pub unsafe fn end(block: NonNull<FreeBlock>) -> usize {
        unsafe { block.as_ptr().addr() + block.as_ref().size }
    }
}

/// Total block size needed for a payload of `size` bytes: header added, rounded up to
/// [`GRANULE`] and never below [`MIN_BLOCK_SIZE`]. `None` if that overflows.
pub(crate) fn effective_size(size: usize) -> Option<usize> {
    let needed = align(size.checked_add(HEADER_SIZE)?, GRANULE)?;

    Some(needed.max(MIN_BLOCK_SIZE))
}

/// Stamps `size` into the header at `block` and returns the payload address.
///
/// **SAFETY**: `block` must be the start of a span of at least `size` bytes owned by the
/// allocator and handed to exactly one caller.
#[inline]
pub(crate) unsafe fn seal(block: NonNull<u8>, size: usize) -> NonNull<u8> {
    unsafe {
        block.cast::<BlockHeader>().as_ptr().write(BlockHeader { size });

        block.add(HEADER_SIZE)
    }
}

/// Recovers the block start from a payload pointer.
///
/// **SAFETY**: `payload` must have been produced by [`seal`] and not released since.
#[inline]
pub(crate) unsafe fn header_of(payload: NonNull<u8>) -> NonNull<BlockHeader> {
    unsafe { payload.sub(HEADER_SIZE).cast() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_a_minimum_request() {
        assert_eq!(Some(MIN_BLOCK_SIZE), effective_size(0));
    }

    #[test]
    fn sizes_are_granule_multiples() {
        for size in 0..1024 {
            let needed = effective_size(size).unwrap();

            assert_eq!(0, needed % GRANULE);
            assert!(needed >= size + HEADER_SIZE);
            assert!(needed < size + HEADER_SIZE + GRANULE);
        }
    }

    #[test]
    fn header_boundary() {
        // A payload that exactly fills the remainder of a minimum block.
        assert_eq!(Some(MIN_BLOCK_SIZE), effective_size(MIN_BLOCK_SIZE - HEADER_SIZE));
        assert_eq!(
            Some(MIN_BLOCK_SIZE + GRANULE),
            effective_size(MIN_BLOCK_SIZE - HEADER_SIZE + 1)
        );
    }

    #[test]
    fn overflow_is_reported() {
        assert_eq!(None, effective_size(usize::MAX));
        assert_eq!(None, effective_size(usize::MAX - HEADER_SIZE));
    }

    #[test]
    fn seal_and_recover() {
        let mut storage = [0usize; 8];
        let block = NonNull::new(storage.as_mut_ptr()).unwrap().cast::<u8>();

        unsafe {
            let payload = seal(block, 48);
            assert_eq!(block.as_ptr().addr() + HEADER_SIZE, payload.as_ptr().addr());

            let header = header_of(payload);
            assert_eq!(block.cast::<BlockHeader>(), header);
            assert_eq!(48, header.as_ref().size);
        }
    }
}
