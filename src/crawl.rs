use crate::extract::extract;
use crate::fetch::{Document, Fetch};
use crate::types::{ExtractionStrategy, Record, StrategyKind};
use scraper::{ElementRef, Selector};
use std::collections::HashSet;
use tracing::{debug, info, warn};
use url::Url;

/// Tried in order; the first element that yields an href wins.
const NEXT_SELECTORS: &[&str] = &[r#"a[rel="next"]"#, ".next a", ".pagination .next"];
const NEXT_TEXT_MARKERS: &[&str] = &["Next", "→"];

/// Why a crawl stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    PageBudgetExhausted,
    NoNextLink,
    SelfLink,
    Cycle,
    FetchFailed(String),
    ExtractionFailed(String),
    UnsupportedStrategy,
    RowLimit,
}

/// Result of visiting one page.
#[derive(Debug)]
pub enum PageOutcome {
    Records {
        records: Vec<Record>,
        next: Option<Url>,
    },
    /// The page failed; records gathered so far stand.
    SoftFail(Termination),
    HardStop(Termination),
}

#[derive(Debug)]
pub struct CrawlOutcome {
    pub records: Vec<Record>,
    pub pages_visited: usize,
    pub termination: Termination,
}

fn href_of<'a>(el: ElementRef<'a>) -> Option<&'a str> {
    if let Some(href) = el.value().attr("href") {
        return Some(href);
    }
    let anchor = Selector::parse("a[href]").ok()?;
    el.select(&anchor).next()?.value().attr("href")
}

fn resolve(base: &Url, href: &str) -> Option<Url> {
    let mut target = base.join(href.trim()).ok()?;
    if target.scheme() != "http" && target.scheme() != "https" {
        return None;
    }
    target.set_fragment(None);
    Some(target)
}

/// Locate the page's "next" pagination link, resolved against the page URL.
pub fn find_next_link(document: &Document) -> Option<Url> {
    for candidate in NEXT_SELECTORS {
        let Ok(sel) = Selector::parse(candidate) else {
            continue;
        };
        let found = document
            .html
            .select(&sel)
            .filter_map(href_of)
            .find_map(|href| resolve(&document.url, href));
        if let Some(next) = found {
            debug!("Next link via '{}': {}", candidate, next);
            return Some(next);
        }
    }

    let anchors = Selector::parse("a[href]").ok()?;
    let next = document
        .html
        .select(&anchors)
        .filter(|a| {
            let text = a.text().collect::<String>();
            NEXT_TEXT_MARKERS.iter().any(|m| text.contains(m))
        })
        .filter_map(|a| a.value().attr("href"))
        .find_map(|href| resolve(&document.url, href));
    if let Some(next) = &next {
        debug!("Next link via anchor text: {}", next);
    }
    next
}

async fn visit_page<F: Fetch + ?Sized>(fetcher: &F, url: &Url, strategy: &ExtractionStrategy) -> PageOutcome {
    if !matches!(strategy.kind, StrategyKind::Table | StrategyKind::ListItems) {
        return PageOutcome::HardStop(Termination::UnsupportedStrategy);
    }

    let page = match fetcher.fetch(url).await {
        Ok(page) => page,
        Err(e) => return PageOutcome::SoftFail(Termination::FetchFailed(e.to_string())),
    };

    // the same parse serves extraction and link discovery
    let document = Document::parse(page);
    match extract(&document, strategy) {
        Ok(records) => PageOutcome::Records {
            records,
            next: find_next_link(&document),
        },
        Err(e) => PageOutcome::SoftFail(Termination::ExtractionFailed(e.to_string())),
    }
}

/// Follow "next" links from `start`, extracting every page with one strategy.
///
/// Pages are fetched strictly one after another. Fetch and extraction
/// failures end the crawl but keep what earlier pages produced.
pub async fn crawl<F: Fetch + ?Sized>(
    fetcher: &F,
    start: &Url,
    strategy: &ExtractionStrategy,
    max_pages: usize,
    max_rows: usize,
) -> CrawlOutcome {
    let mut records: Vec<Record> = Vec::new();
    let mut visited: HashSet<Url> = HashSet::new();
    let mut pages_visited = 0;
    let mut current = start.clone();
    // discovered links are compared without fragments
    current.set_fragment(None);

    let termination = loop {
        if pages_visited >= max_pages {
            break Termination::PageBudgetExhausted;
        }

        info!("Scraping page {}: {}", pages_visited + 1, current);
        visited.insert(current.clone());

        match visit_page(fetcher, &current, strategy).await {
            PageOutcome::Records { records: found, next } => {
                pages_visited += 1;
                debug!("Page {} yielded {} records", pages_visited, found.len());
                records.extend(found);
                if records.len() >= max_rows {
                    records.truncate(max_rows);
                    break Termination::RowLimit;
                }
                match next {
                    None => break Termination::NoNextLink,
                    Some(next) if next == current => break Termination::SelfLink,
                    Some(next) if visited.contains(&next) => break Termination::Cycle,
                    Some(next) => current = next,
                }
            }
            PageOutcome::SoftFail(reason) => {
                warn!("Stopping crawl at {}: {:?}", current, reason);
                break reason;
            }
            PageOutcome::HardStop(reason) => break reason,
        }
    };

    info!(
        "Crawl finished after {} pages with {} records ({:?})",
        pages_visited,
        records.len(),
        termination
    );
    CrawlOutcome {
        records,
        pages_visited,
        termination,
    }
}
