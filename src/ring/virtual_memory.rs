//! Double-mapped virtual memory region.
//!
//! The ring's backing store is an anonymous shared memory object of `len`
//! bytes mapped twice into one contiguous `2 * len` reservation, so bytes
//! `[len, 2*len)` alias bytes `[0, len)`. Every copy into or out of the
//! ring can then be a single linear memcpy, even when it crosses the
//! physical wrap boundary.
//!
//! Platform backing:
//! - Linux/Android: `memfd_create`
//! - other Unix (macOS, BSDs): `shm_open` + immediate `shm_unlink`
//!
//! Non-Unix targets report `Unsupported` at construction.

use std::ptr::NonNull;

use crate::error::JitterResult;

/// A `len`-byte region mapped at both `base` and `base + len`.
///
/// `len` is the requested length rounded up to a whole number of pages.
/// The backing file descriptor is closed as soon as both mappings exist;
/// the mappings keep the memory alive until `Drop` unmaps them.
#[derive(Debug)]
pub(crate) struct DoubleMapped {
    base: NonNull<u8>,
    len: usize,
}

// SAFETY: DoubleMapped owns a process-private anonymous mapping with no
// thread-local state. Concurrent access to the bytes is coordinated by the
// ring's occupancy and per-slot flags at a higher layer.
unsafe impl Send for DoubleMapped {}
unsafe impl Sync for DoubleMapped {}

impl DoubleMapped {
    /// Length of the aliased region in bytes (one copy of the ring).
    pub fn len(&self) -> usize {
        self.len
    }

    /// Base of the primary mapping. Valid for reads and writes over
    /// `[base, base + 2 * len)`.
    pub fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }
}

// ============================================================================
// Unix implementation
// ============================================================================

#[cfg(unix)]
impl DoubleMapped {
    /// Map a ring of at least `min_len` bytes.
    pub fn new(min_len: usize) -> JitterResult<Self> {
        use crate::error::JitterError;

        if min_len == 0 {
            return Err(JitterError::invalid_argument("ring length must be > 0"));
        }

        // SAFETY: sysconf with a valid name has no preconditions.
        let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if page <= 0 {
            return Err(JitterError::memory("could not determine page size"));
        }
        let page = page as usize;
        let len = min_len
            .checked_next_multiple_of(page)
            .ok_or_else(|| JitterError::invalid_argument("ring length overflows"))?;

        let fd = create_backing_fd(len)?;

        // Reserve 2*len of contiguous address space, then map the object
        // into each half. MAP_FIXED over our own PROT_NONE reservation is
        // well defined.
        // SAFETY: requesting a fresh anonymous PROT_NONE mapping.
        let reservation = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                2 * len,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if reservation == libc::MAP_FAILED {
            let err = std::io::Error::last_os_error();
            // SAFETY: fd is a valid open descriptor from create_backing_fd.
            unsafe { libc::close(fd) };
            return Err(JitterError::memory(format!(
                "failed to reserve {} bytes of address space: {}",
                2 * len,
                err
            )));
        }

        let base = reservation as *mut u8;
        for half in 0..2 {
            // SAFETY: the target range lies inside our own reservation and
            // fd refers to an object of exactly len bytes.
            let mapped = unsafe {
                libc::mmap(
                    base.add(half * len) as *mut libc::c_void,
                    len,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED | libc::MAP_FIXED,
                    fd,
                    0,
                )
            };
            if mapped == libc::MAP_FAILED {
                let err = std::io::Error::last_os_error();
                // SAFETY: unmapping the full reservation we created above.
                unsafe {
                    libc::munmap(reservation, 2 * len);
                    libc::close(fd);
                }
                return Err(JitterError::memory(format!(
                    "failed to map ring alias: {err}"
                )));
            }
        }

        // The mappings keep the object alive on their own.
        // SAFETY: fd is a valid open descriptor and no longer needed.
        unsafe { libc::close(fd) };

        let base = NonNull::new(base).ok_or_else(|| JitterError::memory("mmap returned null"))?;
        log::debug!("allocated {} byte double-mapped ring", len);
        Ok(Self { base, len })
    }
}

/// Create the anonymous shared memory object backing the ring, sized to
/// `len` bytes.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn create_backing_fd(len: usize) -> JitterResult<libc::c_int> {
    use crate::error::JitterError;

    // SAFETY: the name is a valid NUL-terminated string literal.
    let fd = unsafe {
        libc::memfd_create(
            c"jitterbuf-ring".as_ptr(),
            libc::MFD_CLOEXEC,
        )
    };
    if fd < 0 {
        return Err(JitterError::memory(format!(
            "memfd_create failed: {}",
            std::io::Error::last_os_error()
        )));
    }
    // SAFETY: fd is a valid open descriptor.
    if unsafe { libc::ftruncate(fd, len as libc::off_t) } != 0 {
        let err = std::io::Error::last_os_error();
        // SAFETY: fd is a valid open descriptor.
        unsafe { libc::close(fd) };
        return Err(JitterError::memory(format!(
            "failed to size ring object to {len} bytes: {err}"
        )));
    }
    Ok(fd)
}

#[cfg(all(unix, not(any(target_os = "linux", target_os = "android"))))]
fn create_backing_fd(len: usize) -> JitterResult<libc::c_int> {
    use std::ffi::CString;
    use std::sync::atomic::{AtomicU64, Ordering};

    use crate::error::JitterError;

    static NEXT: AtomicU64 = AtomicU64::new(0);

    let name = format!(
        "/jitterbuf.{}.{}",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed)
    );
    let c_name = CString::new(name.clone())
        .map_err(|_| JitterError::memory("shm name contained a NUL byte"))?;

    // SAFETY: c_name is a valid NUL-terminated string; flags and mode are
    // valid POSIX constants.
    let fd = unsafe {
        libc::shm_open(
            c_name.as_ptr(),
            libc::O_CREAT | libc::O_RDWR | libc::O_EXCL,
            0o600,
        )
    };
    if fd < 0 {
        return Err(JitterError::memory(format!(
            "shm_open('{}') failed: {}",
            name,
            std::io::Error::last_os_error()
        )));
    }
    // The object is private to this buffer; unlink the name immediately so
    // only our descriptor and mappings keep it alive.
    // SAFETY: c_name is a valid NUL-terminated string.
    unsafe { libc::shm_unlink(c_name.as_ptr()) };

    // SAFETY: fd is a valid open descriptor.
    if unsafe { libc::ftruncate(fd, len as libc::off_t) } != 0 {
        let err = std::io::Error::last_os_error();
        // SAFETY: fd is a valid open descriptor.
        unsafe { libc::close(fd) };
        return Err(JitterError::memory(format!(
            "failed to size ring object to {len} bytes: {err}"
        )));
    }
    Ok(fd)
}

#[cfg(unix)]
impl Drop for DoubleMapped {
    fn drop(&mut self) {
        // SAFETY: base covers the 2*len reservation established in new();
        // both FIXED mappings fall inside it.
        let rc = unsafe { libc::munmap(self.base.as_ptr() as *mut libc::c_void, 2 * self.len) };
        if rc != 0 {
            log::error!(
                "failed to unmap ring: {}",
                std::io::Error::last_os_error()
            );
        }
    }
}

// ============================================================================
// Fallback for non-Unix targets
// ============================================================================

#[cfg(not(unix))]
impl DoubleMapped {
    pub fn new(_min_len: usize) -> JitterResult<Self> {
        Err(crate::error::JitterError::unsupported(
            "double-mapped rings require virtual memory aliasing, only available on Unix",
        ))
    }
}

// ============================================================================
// Tests
// ============================================================================
