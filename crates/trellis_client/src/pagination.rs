//! Pagination driver.
//!
//! Follows server-supplied `Link: <...>; rel="next"` continuations. The
//! client never builds page URLs itself; it only resolves the link relative
//! to the page it came from and refuses to leave the origin of the first
//! page. Collection stops on exhaustion, at the caller's item limit, or at
//! the page ceiling, whichever comes first.

use crate::Response;
use derive_getters::Getters;
use reqwest::Url;
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use trellis_error::{HttpError, TrellisResult};

/// Metadata about a paged collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Getters)]
pub struct ListMeta {
    /// Total number of items the server reports, 0 when unknown
    total_count: u64,
}

impl ListMeta {
    /// Metadata with a known total.
    pub fn new(total_count: u64) -> Self {
        Self { total_count }
    }
}

/// How many items a caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLimit {
    /// The configured default cap.
    Default,
    /// Everything, up to the page ceiling.
    Unlimited,
    /// Exactly this many items at most.
    Exact(usize),
}

impl PageLimit {
    /// Interpret a raw limit: `0` is the default cap, negative is
    /// unlimited, positive is an exact ceiling.
    pub fn from_raw(limit: i64) -> Self {
        match limit {
            0 => PageLimit::Default,
            l if l < 0 => PageLimit::Unlimited,
            l => PageLimit::Exact(usize::try_from(l).unwrap_or(usize::MAX)),
        }
    }

    /// Concrete item cap, `None` when unlimited.
    pub fn resolve(self, default_limit: usize) -> Option<usize> {
        match self {
            PageLimit::Default => Some(default_limit),
            PageLimit::Unlimited => None,
            PageLimit::Exact(n) => Some(n),
        }
    }
}

impl From<i64> for PageLimit {
    fn from(limit: i64) -> Self {
        Self::from_raw(limit)
    }
}

impl From<i32> for PageLimit {
    fn from(limit: i32) -> Self {
        Self::from_raw(i64::from(limit))
    }
}

/// Extract the `rel="next"` target from a `Link` header value.
pub fn parse_next_link(header: &str) -> Option<String> {
    header
        .split(',')
        .map(str::trim)
        .filter(|part| {
            part.split(';')
                .skip(1)
                .map(str::trim)
                .any(|param| param.eq_ignore_ascii_case(r#"rel="next""#) || param.eq_ignore_ascii_case("rel=next"))
        })
        .find_map(|part| {
            let start = part.find('<')?;
            let end = part.find('>')?;
            (end > start + 1).then(|| part[start + 1..end].to_string())
        })
}

/// Resolve a possibly relative continuation against the page it came from.
///
/// # Errors
///
/// Returns an error when the target cannot be parsed.
pub fn resolve_url(base: &Url, target: &str) -> Result<Url, HttpError> {
    base.join(target).map_err(|e| {
        HttpError::for_url(
            format!("Failed to resolve Link header URL against {}: {}", base, e),
            target,
        )
    })
}

/// Whether two URLs share scheme and host, ignoring default ports.
pub fn is_same_origin(a: &Url, b: &Url) -> bool {
    a.scheme().eq_ignore_ascii_case(b.scheme())
        && a.host_str().map(str::to_ascii_lowercase) == b.host_str().map(str::to_ascii_lowercase)
        && a.port_or_known_default() == b.port_or_known_default()
}

/// Something that can fetch one page.
///
/// The client implements this by routing the GET through the rate
/// limiter and retry policy.
#[async_trait::async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch the page at `url`.
    async fn fetch_page(&self, url: &Url, cancel: &CancellationToken) -> TrellisResult<Response>;
}

/// Bounds on one pagination run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBounds {
    /// Item cap, `None` for unlimited
    pub limit: Option<usize>,
    /// Hard ceiling on pages, counting the first
    pub max_pages: usize,
}

/// Follow continuations after an already-fetched first page.
///
/// `already_collected` is the number of items the caller took from the
/// first page. Returns only the items of later pages, trimmed so that
/// `already_collected + returned <= limit`.
///
/// # Errors
///
/// Fails if a continuation leaves the first page's origin, if a page body
/// is not a JSON array, or if any page fetch fails.
#[instrument(skip(source, first_page, cancel), fields(first_url = %first_page.url()))]
pub async fn follow_pagination(
    source: &dyn PageSource,
    first_page: &Response,
    already_collected: usize,
    bounds: PageBounds,
    cancel: &CancellationToken,
) -> TrellisResult<Vec<JsonValue>> {
    let origin = first_page.url().clone();
    let remaining = |collected: usize| bounds.limit.map(|l| l.saturating_sub(collected));

    if remaining(already_collected) == Some(0) {
        return Ok(Vec::new());
    }

    let mut next = next_url(first_page, &origin)?;
    let mut results = Vec::new();
    let mut collected = already_collected;
    let mut pages = 1;

    while let Some(url) = next {
        if pages >= bounds.max_pages {
            warn!(max_pages = bounds.max_pages, "Pagination capped");
            break;
        }

        let page = source.fetch_page(&url, cancel).await?;
        pages += 1;

        let mut items = page.items()?;
        debug!(page = pages, items = items.len(), "Fetched page");

        if let Some(room) = remaining(collected) {
            items.truncate(room);
        }
        collected += items.len();
        results.extend(items);

        if remaining(collected) == Some(0) {
            break;
        }

        next = next_url(&page, &origin)?;
    }

    Ok(results)
}

/// Resolved, origin-checked continuation of `page`.
fn next_url(page: &Response, origin: &Url) -> TrellisResult<Option<Url>> {
    let Some(link) = page.next_link() else {
        return Ok(None);
    };
    let url = resolve_url(page.url(), &link)?;
    if !is_same_origin(origin, &url) {
        return Err(HttpError::for_url(
            "Pagination Link header points to a different origin",
            url.as_str(),
        )
        .into());
    }
    Ok(Some(url))
}
