use crate::error::FetchError;
use crate::fetch::{Document, Fetch};
use crate::types::ProbeResult;
use scraper::Selector;
use tracing::{info, warn};
use url::Url;

const NO_TITLE: &str = "No title";

fn count(document: &Document, selector: &str) -> usize {
    match Selector::parse(selector) {
        Ok(sel) => document.html.select(&sel).count(),
        Err(_) => 0,
    }
}

/// Count the structural candidates of an already-parsed page.
pub fn probe_document(document: &Document) -> ProbeResult {
    let tables_found = count(document, "table");
    let lists_found = count(document, "ul, ol");
    let structured_divs = match Selector::parse("[class]") {
        Ok(sel) => document
            .html
            .select(&sel)
            .filter(|el| {
                el.value()
                    .attr("class")
                    .map(|c| !c.trim().is_empty())
                    .unwrap_or(false)
            })
            .count(),
        Err(_) => 0,
    };

    ProbeResult {
        valid: true,
        tables_found: Some(tables_found),
        lists_found: Some(lists_found),
        structured_divs: Some(structured_divs),
        potential_sources: Some(tables_found + lists_found + structured_divs),
        title: Some(
            document
                .title
                .clone()
                .unwrap_or_else(|| NO_TITLE.to_string()),
        ),
        error: None,
    }
}

/// Fetch a page and count its structures, keeping the typed fetch failure.
pub async fn try_probe<F: Fetch + ?Sized>(fetcher: &F, url: &Url) -> Result<ProbeResult, FetchError> {
    let page = fetcher.fetch(url).await?;
    let result = probe_document(&Document::parse(page));
    info!(
        "Probed {}: {} tables, {} lists, {} classed elements",
        url,
        result.tables_found.unwrap_or(0),
        result.lists_found.unwrap_or(0),
        result.structured_divs.unwrap_or(0)
    );
    Ok(result)
}

/// Fetch a page and report whether it looks scrapable.
pub async fn probe<F: Fetch + ?Sized>(fetcher: &F, url: &Url) -> ProbeResult {
    match try_probe(fetcher, url).await {
        Ok(result) => result,
        Err(e) => {
            warn!("Probe of {} failed: {}", url, e);
            ProbeResult::invalid(e.to_string())
        }
    }
}
