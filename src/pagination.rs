use serde::Serialize;

use crate::error::ApiError;

pub const DEFAULT_PAGE_SIZE: i64 = 30;
pub const MAX_PAGE_SIZE: i64 = 1000;
const PAGE_PARAM: &str = "page";
const PAGE_SIZE_PARAM: &str = "max_page";

/// Page named by the `page` parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageNumber {
    /// 1-based
    Number(i64),
    Last,
}

/// Page as requested, before the row count is known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: PageNumber,
    pub size: i64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: PageNumber::Number(1),
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn from_params(params: &[(String, String)]) -> Result<Self, ApiError> {
        let mut request = Self::default();

        for (key, value) in params {
            match key.as_str() {
                PAGE_PARAM => {
                    request.page = match value.trim() {
                        "last" => PageNumber::Last,
                        v => v
                            .parse()
                            .ok()
                            .filter(|p: &i64| *p >= 1)
                            .map(PageNumber::Number)
                            .ok_or(ApiError::InvalidPage)?,
                    };
                }
                PAGE_SIZE_PARAM => {
                    // Bad sizes fall back to the default
                    if let Some(size) = value.trim().parse::<i64>().ok().filter(|s| *s > 0) {
                        request.size = size.min(MAX_PAGE_SIZE);
                    }
                }
                _ => {}
            }
        }

        Ok(request)
    }

    /// Resolve against the total row count; a page past the end is an error,
    /// except page 1 of an empty result.
    pub fn resolve(self, count: i64) -> Result<PageWindow, ApiError> {
        let pages = ((count + self.size - 1) / self.size).max(1);
        let page = match self.page {
            PageNumber::Number(p) if p > pages => return Err(ApiError::InvalidPage),
            PageNumber::Number(p) => p,
            PageNumber::Last => pages,
        };
        Ok(PageWindow {
            page,
            size: self.size,
        })
    }
}

/// A page that exists for the current row count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: i64,
    pub size: i64,
}

impl PageWindow {
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.size
    }
}

/// Paginated response envelope
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            count: 0,
            next: None,
            previous: None,
            results: Vec::new(),
        }
    }

    /// `path` and `params` describe the current request and are used for
    /// the next/previous links.
    pub fn new(
        request: PageWindow,
        count: i64,
        results: Vec<T>,
        path: &str,
        params: &[(String, String)],
    ) -> Self {
        let has_next = request.page * request.size < count;
        let next = has_next.then(|| page_link(path, params, Some(request.page + 1)));
        let previous = match request.page {
            1 => None,
            // DRF drops the page parameter when linking back to the first page
            2 => Some(page_link(path, params, None)),
            p => Some(page_link(path, params, Some(p - 1))),
        };

        Self {
            count,
            next,
            previous,
            results,
        }
    }
}

fn page_link(path: &str, params: &[(String, String)], page: Option<i64>) -> String {
    let mut pairs: Vec<String> = params
        .iter()
        .filter(|(k, _)| k != PAGE_PARAM)
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect();
    if let Some(page) = page {
        pairs.push(format!("{}={}", PAGE_PARAM, page));
    }

    if pairs.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, pairs.join("&"))
    }
}
