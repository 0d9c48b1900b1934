use crate::domain::Task;

/// The service rejects larger pages.
pub const PAGE_SIZE: u32 = 100;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Cursor {
    pub offset: u32,
    pub page_size: u32,
    pub has_more: bool,
}

impl Cursor {
    pub fn first_page() -> Self {
        Self {
            offset: 0,
            page_size: PAGE_SIZE,
            has_more: true,
        }
    }

    /// Follows the server-reported position; the page size is ours to keep.
    pub fn advance(self, next: Cursor) -> Self {
        Self {
            offset: next.offset,
            page_size: self.page_size,
            has_more: next.has_more,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Page {
    pub tasks: Vec<Task>,
    pub next: Cursor,
}
