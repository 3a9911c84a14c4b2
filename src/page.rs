//! Page selection against an illustration's page count, and derivation of
//! the per-page image URL from the upstream template.

use crate::error::{PageError, UpstreamError};
use regex::Regex;
use std::sync::LazyLock;

/// First-page marker in the last path segment: `/<illust id>_p0`, then
/// anything that does not continue the page number.
static PAGE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(\d+)_p0([^0-9/][^/]*)?$").unwrap());

/// Checks a requested page against the illustration's page count.
///
/// Returns the effective 1-based page: the requested one, or 1 for a
/// single-page illustration requested without a selector.
pub fn validate_page(page_count: u32, requested: Option<u32>) -> Result<u32, PageError> {
    match requested {
        Some(_) if page_count == 1 => Err(PageError::SelectorNotApplicable),
        Some(page) if page_count < page => Err(PageError::OutOfRange {
            requested: page,
            page_count,
        }),
        Some(page) => Ok(page),
        None if page_count != 1 => Err(PageError::SelectorRequired { page_count }),
        None => Ok(1),
    }
}

/// Substitutes the page marker in `template` for `page`.
///
/// Upstream templates name the first page `<illust id>_p0`; page `N` lives at
/// `<illust id>_p<N-1>`. Only the marker in the last path segment that
/// directly follows the illustration id is touched. Page 1 returns the
/// template unchanged.
pub fn derive_image_url(
    template: &str,
    illust_id: &str,
    page: u32,
) -> Result<String, UpstreamError> {
    if page <= 1 {
        return Ok(template.to_string());
    }

    let caps = PAGE_MARKER
        .captures(template)
        .filter(|caps| &caps[1] == illust_id)
        .ok_or_else(|| {
            UpstreamError::Malformed(format!(
                "image URL has no page marker for {}: {}",
                illust_id, template
            ))
        })?;

    // The marker is anchored at the end of the template.
    let prefix = &template[..template.len() - caps[0].len()];
    let suffix = caps.get(2).map(|m| m.as_str()).unwrap_or("");

    Ok(format!("{}/{}_p{}{}", prefix, illust_id, page - 1, suffix))
}
