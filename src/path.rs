//! Inbound request path parsing.
//!
//! Image paths look like `/<illust id>.jpg` for single-page illustrations
//! and `/<illust id>-<page>.jpg` for multi-page ones. `jpeg`, `png` and `gif`
//! are accepted too; the extension never changes what is served.

use regex::Regex;
use std::sync::LazyLock;

/// Regex for image request paths.
static IMAGE_PATH_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/(\d+)(?:-(\d+))?\.(?:jpg|jpeg|png|gif)$").unwrap());

/// A parsed image request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    /// Illustration id, decimal digits exactly as requested.
    pub illust_id: String,

    /// Requested page (1-based), absent for single-page illustrations.
    pub page: Option<u32>,
}

impl ImageRequest {
    /// Parses a request path.
    ///
    /// Returns `None` when the path is not an image path, including a page of
    /// zero or one too large to represent.
    pub fn parse(path: &str) -> Option<Self> {
        let caps = IMAGE_PATH_PATTERN.captures(path)?;

        let page = match caps.get(2) {
            Some(m) => {
                let page: u32 = m.as_str().parse().ok()?;
                if page < 1 {
                    return None;
                }
                Some(page)
            }
            None => None,
        };

        Some(Self {
            illust_id: caps[1].to_string(),
            page,
        })
    }

    /// File name this request is persisted under.
    pub fn file_name(&self) -> String {
        match self.page {
            Some(page) => format!("{}-{}.jpg", self.illust_id, page),
            None => format!("{}.jpg", self.illust_id),
        }
    }
}
