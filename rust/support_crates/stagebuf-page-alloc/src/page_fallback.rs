/// Page size assumed on platforms without a page-size query.
pub const DEFAULT_PAGE_SIZE: usize = 4 * 1024;

/// Returns the "standard page" size in bytes.
pub fn get_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}
