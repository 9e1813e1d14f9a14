use std::sync::OnceLock;

/// Page size assumed when the system cannot be queried.
pub const DEFAULT_PAGE_SIZE: usize = 4 * 1024;

/// Gets the system's standard page size in bytes.
///
/// This function returns the size of standard memory pages on the current system.
/// The value is cached after the first call. On most systems, this is typically
/// 4KB (4,096 bytes).
///
/// # Returns
///
/// The page size in bytes. If the system's page size cannot be determined,
/// returns [`DEFAULT_PAGE_SIZE`].
///
/// # Implementation Notes
///
/// The function uses lazy initialization with [`OnceLock`] to cache the result of
/// calling `sysconf(_SC_PAGESIZE)`.
pub fn get_page_size() -> usize {
    static SIZE: OnceLock<usize> = OnceLock::new();
    *SIZE.get_or_init(|| match read_page_size() {
        Ok(size) => size,
        Err(e) => {
            log::warn!("sysconf(_SC_PAGESIZE) failed ({e}), assuming {DEFAULT_PAGE_SIZE} bytes");
            DEFAULT_PAGE_SIZE
        }
    })
}

/// Reads the standard page size from the system using sysconf.
fn read_page_size() -> std::io::Result<usize> {
    let res = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if res < 0 {
        return Err(std::io::Error::last_os_error());
    }
    let size = res as usize;
    if !size.is_power_of_two() {
        return Err(std::io::Error::other(format!(
            "page size {size} is not a power of two"
        )));
    }
    Ok(size)
}
