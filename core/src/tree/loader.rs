use std::ops::Range;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info_span, instrument, warn, Instrument, Span};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::provider::{DotProvider, Fields, ProviderPool};
use crate::{Dot, Error, DOT_COLUMNS};

use super::LoadError;

/// Number of ids covered by one page read.
pub const PAGE_SIZE: u64 = 100;

/// Where and how the loader reads dots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Data source holding the dots table.
    pub source: String,
    /// Name of the dots table.
    pub table: String,
    /// Number of ids covered by one page read.
    pub page_size: u64,
    /// Upper bound on pages read concurrently in one wave.
    pub max_wave: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            source: "dots".into(),
            table: "dots".into(),
            page_size: PAGE_SIZE,
            max_wave: 34,
        }
    }
}

/// Wave sizes for the paginated load: 1, 2, 3, 5, 8, … capped at a maximum.
#[derive(Debug, Clone)]
pub struct Fanout {
    previous: usize,
    current: usize,
    cap: usize,
}

impl Fanout {
    pub fn new(cap: usize) -> Self {
        Self {
            previous: 0,
            current: 1,
            cap: cap.max(1),
        }
    }
}

impl Iterator for Fanout {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let size = self.current.min(self.cap);
        let next = self.current.saturating_add(self.previous.max(1));
        self.previous = self.current;
        self.current = next;
        Some(size)
    }
}

/// The rows of one id window.
#[derive(Debug)]
struct Page {
    lower: u64,
    dots: Vec<Dot>,
    rows_beyond: Option<bool>,
}

impl Page {
    /// Whether this page is the last one holding data. Providers that know
    /// about rows past the window decide; otherwise a short page ends it.
    fn is_end(&self, page_size: u64) -> bool {
        match self.rows_beyond {
            Some(rows_beyond) => !rows_beyond,
            None => (self.dots.len() as u64) < page_size,
        }
    }
}

/// Reads all dots in bounded, growing waves of concurrent page reads.
///
/// After every wave all of its pages have been read, and the load ends after
/// the first wave holding a page that is the end of the data. Pages of that
/// wave above the end page are kept. A page failing twice
/// in a row aborts the whole load, cancelling the other pages in flight.
pub(super) async fn load_dots(
    pool: Arc<ProviderPool>,
    config: &LoaderConfig,
) -> Result<Vec<Dot>, LoadError> {
    let span = info_span!("load_dots", indicatif.pb_show = 1);
    span.pb_set_style(&dotroute_tracing::PB_PROGRESS_STYLE);
    span.pb_set_message("Loading dots");
    span.pb_set_length(0);
    span.pb_start();

    async move {
        let page_size = config.page_size.max(1);
        let mut dots = Vec::new();
        let mut lower = 0u64;

        for wave in Fanout::new(config.max_wave) {
            debug!(wave, lower, "starting wave");
            Span::current().pb_inc_length(wave as u64);

            let mut pages = JoinSet::new();
            for _ in 0..wave {
                let range = lower..lower.saturating_add(page_size);
                lower = range.end;
                pages.spawn(fetch_page_with_retry(
                    pool.clone(),
                    config.clone(),
                    range,
                ));
            }

            let mut fetched = Vec::with_capacity(wave);
            while let Some(page) = pages.join_next().await {
                // returning early drops the JoinSet, aborting the other pages.
                fetched.push(page??);
                Span::current().pb_inc(1);
            }
            fetched.sort_by_key(|page: &Page| page.lower);

            let done = fetched.is_empty() || fetched.iter().any(|p| p.is_end(page_size));
            dots.extend(fetched.into_iter().flat_map(|p| p.dots));

            if done {
                break;
            }
        }

        Ok::<_, LoadError>(dots)
    }
    .instrument(span)
    .await
}

async fn fetch_page_with_retry(
    pool: Arc<ProviderPool>,
    config: LoaderConfig,
    range: Range<u64>,
) -> Result<Page, LoadError> {
    match fetch_page(&pool, &config, range.clone()).await {
        Ok(page) => Ok(page),
        Err(e) => {
            warn!(err = %e, page.lower = range.start, page.upper = range.end, "page load failed, retrying");
            fetch_page(&pool, &config, range.clone())
                .await
                .map_err(|source| LoadError::PageFailed {
                    lower: range.start,
                    upper: range.end,
                    source,
                })
        }
    }
}

#[instrument(skip(pool, config), fields(page.lower = range.start, page.upper = range.end), err)]
async fn fetch_page(
    pool: &Arc<ProviderPool>,
    config: &LoaderConfig,
    range: Range<u64>,
) -> Result<Page, Error> {
    let mut provider = pool.get(&config.source).await?;
    provider.init_fields(
        Fields::new(&config.table)
            .with_fields(DOT_COLUMNS)
            .with_range(range.clone()),
    );

    match read_page(&mut *provider, range.clone()).await {
        Ok(page) => Ok(page),
        Err(e) => {
            provider.discard();
            Err(e)
        }
    }
}

async fn read_page(provider: &mut dyn DotProvider, range: Range<u64>) -> Result<Page, Error> {
    let mut dots = Vec::new();
    if provider.begin().await? {
        while provider.has_more() {
            let dot = Dot::try_from(provider.produce().await?)?;
            if !range.contains(&dot.id) {
                provider.finalize().await?;
                return Err(Error::StorageError(format!(
                    "dot {} returned for page [{}, {})",
                    dot.id, range.start, range.end
                )));
            }
            dots.push(dot);
        }
    }
    let rows_beyond = provider.rows_beyond_range();
    provider.finalize().await?;

    Ok(Page {
        lower: range.start,
        dots,
        rows_beyond,
    })
}

/// Writes `dots` into a freshly constructed dots table through the
/// provider interface, e.g. to seed an empty backing store.
#[instrument(skip(pool, dots), fields(source = %config.source, table = %config.table, dots = dots.len()))]
pub async fn store_dots(
    pool: &Arc<ProviderPool>,
    config: &LoaderConfig,
    dots: &[Dot],
) -> Result<(), Error> {
    let mut provider = pool.get(&config.source).await?;
    provider.init_fields(Fields::new(&config.table).with_fields([
        "id integer",
        "parent_id integer",
        "name text",
        "value text",
    ]));
    provider.construct().await?;

    for dot in dots {
        provider.init_fields(
            Fields::new(&config.table)
                .with_fields(DOT_COLUMNS)
                .with_values(dot.to_row()),
        );
        provider.create().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Fanout, Page};
    use crate::Dot;

    #[test]
    fn fanout_grows_like_fibonacci() {
        assert_eq!(
            vec![1, 2, 3, 5, 8, 13, 21, 34, 34, 34],
            Fanout::new(34).take(10).collect::<Vec<_>>()
        );
        assert_eq!(vec![1, 1, 1], Fanout::new(0).take(3).collect::<Vec<_>>());
    }

    #[test]
    fn page_end_detection() {
        let full = |rows_beyond| Page {
            lower: 0,
            dots: (0..10).map(|i| Dot::new(i, 0, "", "")).collect(),
            rows_beyond,
        };
        let short = |rows_beyond| Page {
            lower: 0,
            dots: vec![Dot::new(0, 0, "", "")],
            rows_beyond,
        };

        assert!(!full(None).is_end(10));
        assert!(short(None).is_end(10));
        assert!(full(Some(false)).is_end(10));
        assert!(!short(Some(true)).is_end(10));
    }
}
