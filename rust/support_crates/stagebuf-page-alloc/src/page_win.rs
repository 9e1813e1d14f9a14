use std::sync::OnceLock;
use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};

/// Page size assumed when the system reports an unusable value.
pub const DEFAULT_PAGE_SIZE: usize = 4 * 1024;

/// Gets the system's standard page size in bytes.
///
/// The value is obtained from `GetSystemInfo` and cached after the first call.
pub fn get_page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

    *PAGE_SIZE.get_or_init(|| {
        let size = unsafe {
            let mut system_info: SYSTEM_INFO = std::mem::zeroed();
            GetSystemInfo(&mut system_info);
            system_info.dwPageSize as usize
        };
        if size.is_power_of_two() {
            size
        } else {
            log::warn!("GetSystemInfo reported page size {size}, assuming {DEFAULT_PAGE_SIZE}");
            DEFAULT_PAGE_SIZE
        }
    })
}
