use std::{error::Error, fmt};

/// Why an allocation (or configuring an allocator) failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The platform refused to map `requested` more bytes.
    OutOfMemory { requested: usize },
    /// A size computation did not fit in a `usize`. Treated as out of memory: no
    /// request this large could ever be satisfied.
    SizeOverflow,
    /// The page size is not a power of two or is smaller than [`crate::MIN_PAGE_SIZE`].
    InvalidPageSize(usize),
}

impl AllocError {
    /// True for every variant a caller would report as "out of memory".
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. } | Self::SizeOverflow)
    }
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory { requested } => {
                write!(f, "out of memory: could not map {requested} bytes")
            }
            Self::SizeOverflow => f.write_str("out of memory: requested size overflows usize"),
            Self::InvalidPageSize(size) => write!(f, "invalid page size {size}"),
        }
    }
}

impl Error for AllocError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_counts_as_out_of_memory() {
        assert!(AllocError::OutOfMemory { requested: 4096 }.is_out_of_memory());
        assert!(AllocError::SizeOverflow.is_out_of_memory());
        assert!(!AllocError::InvalidPageSize(1000).is_out_of_memory());
    }

    #[test]
    fn display() {
        assert_eq!(
            "out of memory: could not map 8192 bytes",
            AllocError::OutOfMemory { requested: 8192 }.to_string()
        );
        assert_eq!("invalid page size 3", AllocError::InvalidPageSize(3).to_string());
    }
}
