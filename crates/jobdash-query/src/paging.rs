pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 200;

/// Resolved page window. Never fails: malformed input falls back to defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: i64,
    pub page_size: i64,
    pub offset: i64,
}

impl PageWindow {
    pub fn resolve(page: Option<&str>, page_size: Option<&str>) -> Self {
        let page = parse(page).unwrap_or(1).max(1);
        let page_size = parse(page_size)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        Self {
            page,
            page_size,
            offset: (page - 1).saturating_mul(page_size),
        }
    }
}

impl Default for PageWindow {
    fn default() -> Self {
        Self::resolve(None, None)
    }
}

fn parse(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_absent() {
        assert_eq!(
            PageWindow::default(),
            PageWindow {
                page: 1,
                page_size: 20,
                offset: 0
            }
        );
    }

    #[test]
    fn page_size_is_clamped() {
        assert_eq!(PageWindow::resolve(None, Some("9999")).page_size, 200);
        assert_eq!(PageWindow::resolve(None, Some("0")).page_size, 1);
        assert_eq!(PageWindow::resolve(None, Some("-3")).page_size, 1);
        assert_eq!(PageWindow::resolve(None, Some("abc")).page_size, 20);
    }

    #[test]
    fn bad_pages_collapse_to_first() {
        for raw in ["0", "-5", "abc", ""] {
            assert_eq!(PageWindow::resolve(Some(raw), None).page, 1, "page={raw:?}");
        }
    }

    #[test]
    fn offset_follows_page_and_size() {
        let window = PageWindow::resolve(Some("3"), Some("10"));
        assert_eq!(window.offset, 20);
        let huge = PageWindow::resolve(Some("9223372036854775807"), Some("200"));
        assert_eq!(huge.offset, i64::MAX);
    }
}
