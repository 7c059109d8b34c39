use std::{marker::PhantomData, ptr::NonNull};

use crate::block::{FreeBlock, Link};

/// Singly linked list of free [`FreeBlock`]s, sorted by address.
///
/// The nodes live inside the free memory itself, so the list never allocates. Keeping it
/// sorted is what makes coalescing cheap: a block can only be adjacent to its
/// predecessor and successor in the list.
///
/// ```text
///                 Free List (ascending addresses)
///
///  head
///   |       +------+------+         +------+------+         +------+------+
///   +-----> | size | next | ------> | size | next | ------> | size | None |
///           +------+------+         +------+------+         +------+------+
///            0x1000                  0x1800                  0x7f20
/// ```
///
/// Invariants, upheld by [`FreeList::insert_sorted`]:
///
/// - addresses strictly increase along the list.
/// - no block ends at or past the start of the next one; such neighbours are merged.
/// - every block is at least [`crate::block::MIN_BLOCK_SIZE`] bytes.
pub(crate) struct FreeList {
    head: Link<FreeBlock>,
}

// The list only holds addresses of memory the allocator owns; every access goes through
// the allocator's lock.
unsafe impl Send for FreeList {}

pub(crate) struct Iter<'a> {
    current: Link<FreeBlock>,
    marker: PhantomData<&'a FreeBlock>,
}

impl FreeList {
    /// Creates a new empty list.
    pub const fn new() -> Self {
        Self { head: None }
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Takes the first block, in address order, that can hold `size` bytes.
    ///
    /// This is first-fit, not best-fit: we stop at the lowest address that is big enough
    /// even if a tighter block sits further down the list. The block is unlinked before
    /// being returned, so the caller owns it.
    pub fn find_fit(&mut self, size: usize) -> Link<FreeBlock> {
        let mut prev: Link<FreeBlock> = None;
        let mut current = self.head;

        while let Some(mut block) = current {
            unsafe {
                if block.as_ref().size >= size {
                    let next = block.as_ref().next;

                    match prev {
                        Some(mut prev) => prev.as_mut().next = next,
                        None => self.head = next,
                    }
                    block.as_mut().next = None;

                    return Some(block);
                }

                prev = current;
                current = block.as_ref().next;
            }
        }

        None
    }

    /// Inserts `block` keeping the list sorted, merging it with the neighbours it touches.
    ///
    /// ```text
    /// before:   [prev]      [block]  [next]
    ///           +------+    +-----+  +------+
    ///           |      |    |     |->|      |
    ///           +------+    +-----+  +------+
    ///
    /// after:    [prev]      [block + next]
    ///           +------+    +-------------+
    ///           |      |    |             |
    ///           +------+    +-------------+
    /// ```
    ///
    /// A neighbour is absorbed when the lower block's end reaches or passes the upper
    /// block's start. The merged size is the sum of both sizes.
    ///
    /// **SAFETY**: `block` must be an initialized [`FreeBlock`] owned by the allocator and
    /// not already on the list.
    pub unsafe fn insert_sorted(&mut self, mut block: NonNull<FreeBlock>) {
        let addr = block.as_ptr().addr();

        let mut prev: Link<FreeBlock> = None;
        let mut next = self.head;

        unsafe {
            while let Some(node) = next {
                if node.as_ptr().addr() >= addr {
                    break;
                }
                prev = next;
                next = node.as_ref().next;
            }

            block.as_mut().next = next;

            if let Some(next) = next {
                if FreeBlock::end(block) >= next.as_ptr().addr() {
                    block.as_mut().size += next.as_ref().size;
                    block.as_mut().next = next.as_ref().next;
                }
            }

            match prev {
                Some(mut prev) if FreeBlock::end(prev) >= addr => {
                    prev.as_mut().size += block.as_ref().size;
                    prev.as_mut().next = block.as_ref().next;
                }
                Some(mut prev) => prev.as_mut().next = Some(block),
                None => self.head = Some(block),
            }
        }
    }

    /// Iterates over `(address, size)` of every free block, lowest address first.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            current: self.head,
            marker: PhantomData,
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.current?;

        unsafe {
            self.current = block.as_ref().next;

            Some((block.as_ptr().addr(), block.as_ref().size))
        }
    }
}

impl<'a> IntoIterator for &'a FreeList {
    type Item = (usize, usize);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
