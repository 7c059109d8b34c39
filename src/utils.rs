//! Size arithmetic shared by the allocator. Every helper here is checked: a size that
//! would wrap around `usize` yields `None` instead.

/// Rounds `to_be_aligned` up to the next multiple of `alignment`, which must be a
/// power of two.
///
/// Used both for block sizes (multiples of [`crate::block::GRANULE`]) and for mapped
/// regions (multiples of the page size).
#[inline]
pub(crate) fn align(to_be_aligned: usize, alignment: usize) -> Option<usize> {
    debug_assert!(alignment.is_power_of_two());

    to_be_aligned
        .checked_add(alignment - 1)
        .map(|value| value & !(alignment - 1))
}

/// Number of whole pages needed to hold `len` bytes.
#[inline]
pub(crate) fn pages_for(len: usize, page_size: usize) -> usize {
    len.div_ceil(page_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    #[test]
    fn align_pointer_size() {
        let word = mem::size_of::<usize>();
        let aligments = vec![(1..=word, word), (word + 1..=2 * word, 2 * word)];

        for (sizes, expected) in aligments {
            for size in sizes {
                assert_eq!(Some(expected), align(size, word));
            }
        }
    }

    #[test]
    fn align_page_size() {
        let aligments = vec![(1..4097, 4096), (4097..8193, 8192)];

        for (sizes, expected) in aligments {
            for size in sizes {
                assert_eq!(Some(expected), align(size, 4096))
            }
        }
    }

    #[test]
    fn align_keeps_multiples() {
        assert_eq!(Some(0), align(0, 16));
        assert_eq!(Some(64), align(64, 16));
    }

    #[test]
    fn align_overflow_is_none() {
        assert_eq!(None, align(usize::MAX, 16));
        assert_eq!(None, align(usize::MAX - 3, 4096));
    }

    #[test]
    fn pages_round_up() {
        assert_eq!(1, pages_for(1, 4096));
        assert_eq!(1, pages_for(4096, 4096));
        assert_eq!(2, pages_for(4097, 4096));
        assert_eq!(3, pages_for(3 * 4096, 4096));
    }
}
