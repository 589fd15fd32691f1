//! Cursor-based pagination for search APIs

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::retry::{retry_with_backoff, RetryPolicy, Retryable};

/// One page of results and the cursor for the next one
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `None` when this is the last page
    pub next: Option<String>,
}

/// Pacing for a paginated fetch
#[derive(Debug, Clone, Default)]
pub struct PageOptions {
    /// Sleep between page requests
    pub interval: Duration,
    /// Stop after this many pages
    pub max_pages: Option<usize>,
}

/// Fetch pages until the cursor runs out or `max_pages` is reached.
///
/// `fetch_page` receives `None` for the first page and the previous page's
/// cursor after that. Each page request is retried on its own under `retry`,
/// so pages already fetched are never requested again. A page that still
/// fails aborts the whole fetch.
pub async fn paginate<T, E, F, Fut>(
    options: &PageOptions,
    retry: &RetryPolicy,
    mut fetch_page: F,
) -> Result<Vec<T>, E>
where
    E: Retryable + Display,
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
{
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let operation = format!("page {}", pages + 1);
        let page = retry_with_backoff(retry, &operation, || fetch_page(cursor.clone())).await?;
        pages += 1;
        items.extend(page.items);

        let Some(next) = page.next else {
            break;
        };

        if options.max_pages.is_some_and(|max| pages >= max) {
            debug!("Stopping after {} pages", pages);
            break;
        }

        cursor = Some(next);
        if !options.interval.is_zero() {
            tokio::time::sleep(options.interval).await;
        }
    }

    debug!("Fetched {} items over {} pages", items.len(), pages);
    Ok(items)
}
