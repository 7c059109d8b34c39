use std::ptr::NonNull;

/// Where the allocator gets its memory from. Everything above this trait deals in blocks
/// and free lists and has nothing to do with the concrete syscalls each kernel offers.
///
/// Implementations must be safe to call from several threads at once; the allocator
/// never holds its own lock while calling into the source.
pub trait PlatformMemory {
    /// Request a memory region of `len` bytes, where `len` is a whole number of pages.
    /// The region must be readable, writable and aligned to the page size. Returns `None`
    /// if the underlying syscall fails.
    ///
    /// # Safety
    ///
    /// `len` must be non-zero.
    unsafe fn request_memory(&self, len: usize) -> Option<NonNull<u8>>;

    /// Returns the memory of size `len` starting from `addr` back to the kernel.
    ///
    /// # Safety
    ///
    /// `addr` and `len` must describe exactly one region previously obtained from
    /// [`PlatformMemory::request_memory`] on the same source, and nothing may touch that
    /// memory afterwards.
    unsafe fn return_memory(&self, addr: NonNull<u8>, len: usize);
}

/// Anonymous mappings straight from the operating system: `mmap`/`munmap` on Unix,
/// `VirtualAlloc`/`VirtualFree` on Windows.
#[derive(Debug, Default, Clone, Copy)]
pub struct Kernel;

impl Kernel {
    /// Returns the virtual memory page size of the computer in bytes. This is usually
    /// 4096.
    pub fn page_size() -> usize {
        unsafe { platform::page_size() }
    }
}

impl PlatformMemory for Kernel {
    unsafe fn request_memory(&self, len: usize) -> Option<NonNull<u8>> {
        unsafe { platform::request_memory(len) }
    }

    unsafe fn return_memory(&self, addr: NonNull<u8>, len: usize) {
        unsafe { platform::return_memory(addr, len) }
    }
}

#[cfg(unix)]
mod platform {
    use libc::{mmap, munmap, off_t, size_t};

    use std::{
        os::raw::{c_int, c_void},
        ptr::{self, NonNull},
    };

    pub(super) unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
        // mmap parameters.
        const ADDR: *mut c_void = ptr::null_mut::<c_void>();
        // Read-Write only memory.
        const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
        const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
        const FD: c_int = -1;
        const OFFSET: off_t = 0;

        let addr = unsafe { mmap(ADDR, len as size_t, PROT, FLAGS, FD, OFFSET) };

        if addr == libc::MAP_FAILED {
            return None;
        }

        NonNull::new(addr.cast::<u8>())
    }

    pub(super) unsafe fn return_memory(addr: NonNull<u8>, len: usize) {
        let result = unsafe { munmap(addr.as_ptr().cast::<c_void>(), len as size_t) };

        if result != 0 {
            crate::diag::diag!(
                log::Level::Warn,
                "munmap({:?}, {}) failed: {}",
                addr,
                len,
                std::io::Error::last_os_error()
            );
        }
    }

    pub(super) unsafe fn page_size() -> usize {
        unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
    }
}

#[cfg(windows)]
mod platform {
    use std::{mem::MaybeUninit, os::raw::c_void, ptr::NonNull};

    use windows::Win32::System::{Memory, SystemInformation};

    pub(super) unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
        // Read-Write only.
        let protection = Memory::PAGE_READWRITE;

        let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

        unsafe {
            let addr = Memory::VirtualAlloc(None, len, flags, protection);

            NonNull::new(addr.cast())
        }
    }

    pub(super) unsafe fn return_memory(addr: NonNull<u8>, len: usize) {
        // MEM_RELEASE frees the whole reservation and requires a zero length.
        let result =
            unsafe { Memory::VirtualFree(addr.as_ptr().cast::<c_void>(), 0, Memory::MEM_RELEASE) };

        if let Err(err) = result {
            crate::diag::diag!(
                log::Level::Warn,
                "VirtualFree({:?}, {}) failed: {}",
                addr,
                len,
                err
            );
        }
    }

    pub(super) unsafe fn page_size() -> usize {
        unsafe {
            let mut system_info = MaybeUninit::uninit();
            SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

            system_info.assume_init().dwPageSize as usize
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_a_power_of_two() {
        assert!(Kernel::page_size().is_power_of_two());
    }

    #[test]
    fn mapped_memory_is_writable_and_aligned() {
        let page_size = Kernel::page_size();

        unsafe {
            let region = Kernel.request_memory(2 * page_size).unwrap();
            assert_eq!(0, region.as_ptr().addr() % page_size);

            region.as_ptr().write(0xAB);
            region.add(2 * page_size - 1).as_ptr().write(0xCD);
            assert_eq!(0xAB, *region.as_ptr());
            assert_eq!(0xCD, *region.add(2 * page_size - 1).as_ptr());

            Kernel.return_memory(region, 2 * page_size);
        }
    }
}
