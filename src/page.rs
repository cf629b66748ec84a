use async_trait::async_trait;
use futures::stream::{Stream, TryStreamExt};

/// One page of a paginated listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Items of this page, in the order the remote returned them.
    pub items: Vec<T>,
    /// Opaque token for the next page. Absent or empty means this was the
    /// last page.
    pub continuation: Option<String>,
}

impl<T> Page<T> {
    /// Final page of a listing.
    pub fn last(items: Vec<T>) -> Self {
        Page {
            items,
            continuation: None,
        }
    }

    /// Page with more results behind `token`.
    pub fn with_continuation(items: Vec<T>, token: impl Into<String>) -> Self {
        Page {
            items,
            continuation: Some(token.into()),
        }
    }
}

/// Paged listing endpoint, queried one page at a time.
///
/// Connection context and filter are whatever the implementor captures.
#[async_trait]
pub trait PageSource {
    type Item: Send;

    /// Fetches the first page of the listing.
    async fn first_page(&self) -> anyhow::Result<Page<Self::Item>>;

    /// Fetches the page behind a continuation token returned by an earlier
    /// page.
    async fn next_page(&self, token: &str) -> anyhow::Result<Page<Self::Item>>;
}

enum Cursor {
    First,
    Next(String),
    Done,
}

/// Lazily walks `source` one page at a time.
///
/// Each stream element is the item batch of one page, requested only when the
/// stream is polled that far. A fetch fault ends the stream with that error.
pub fn pages<S>(source: &S) -> impl Stream<Item = anyhow::Result<Vec<S::Item>>> + '_
where
    S: PageSource + Sync,
{
    futures::stream::try_unfold(Cursor::First, move |cursor| async move {
        let page = match cursor {
            Cursor::First => source.first_page().await?,
            Cursor::Next(token) => source.next_page(&token).await?,
            Cursor::Done => return Ok(None),
        };

        let cursor = match page.continuation {
            Some(token) if !token.is_empty() => Cursor::Next(token),
            _ => Cursor::Done,
        };

        Ok(Some((page.items, cursor)))
    })
}

/// Fetches every page of `source` and concatenates the items in page-return
/// order.
///
/// A fault from any page fetch aborts the whole collection; nothing gathered
/// from earlier pages is returned. Pages fetched later may reflect concurrent
/// remote mutations, so the result is not a point-in-time snapshot of the
/// remote data set, only a sequence built in fetch order.
pub async fn collect_all<S>(source: &S) -> anyhow::Result<Vec<S::Item>>
where
    S: PageSource + Sync,
{
    pages(source).try_concat().await
}
