use crate::extract::{collapse_whitespace, row_cells, table_rows};
use crate::fetch::{Document, Fetch};
use crate::types::{DetectionResult, ExtractionStrategy};
use scraper::{ElementRef, Selector};
use std::cmp::Ordering;
use tracing::{debug, info, warn};
use url::Url;

/// Only the first few tables are inspected; some pages carry hundreds.
const MAX_TABLES: usize = 3;
/// A class must repeat more than this many times to count as a data unit.
const MIN_REPEATS: usize = 3;
const SAMPLE_CHARS: usize = 100;
/// Size at which the size bonus inside a confidence band saturates.
const SIZE_SATURATION: usize = 50;

const ITEM_CLASS_TOKENS: &[&str] = &[
    "product", "item", "card", "listing", "entry", "post", "article",
];

const TABLE_BAND: (f64, f64) = (0.80, 0.15);
const LIST_BAND: (f64, f64) = (0.55, 0.20);
const SECTION_BAND: (f64, f64) = (0.30, 0.20);

fn banded_confidence((base, span): (f64, f64), size: usize) -> f64 {
    let fill = size.min(SIZE_SATURATION) as f64 / SIZE_SATURATION as f64;
    base + span * fill
}

fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

fn is_plain_ident(id: &str) -> bool {
    let mut chars = id.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// CSS selector that addresses exactly this element within its document.
pub(crate) fn unique_selector(element: ElementRef) -> String {
    let name = element.value().name();
    if let Some(id) = element.value().id().filter(|id| is_plain_ident(id)) {
        return format!("{}#{}", name, id);
    }

    let mut parts = Vec::new();
    let mut current = Some(element);
    while let Some(node) = current {
        let parent = node.parent().and_then(ElementRef::wrap);
        let part = match parent {
            Some(p) => {
                let position = p
                    .children()
                    .filter_map(ElementRef::wrap)
                    .position(|sibling| sibling.id() == node.id())
                    .map(|i| i + 1)
                    .unwrap_or(1);
                format!("{}:nth-child({})", node.value().name(), position)
            }
            None => node.value().name().to_string(),
        };
        parts.push(part);
        current = parent;
    }
    parts.reverse();
    parts.join(" > ")
}

fn table_candidates(document: &Document) -> Vec<ExtractionStrategy> {
    let Ok(sel) = Selector::parse("table") else {
        return Vec::new();
    };

    let mut found = Vec::new();
    for table in document.html.select(&sel).take(MAX_TABLES) {
        let rows = table_rows(table);
        if rows.len() < 2 {
            continue;
        }
        let columns = row_cells(rows[0]).len();
        let mut strategy = ExtractionStrategy::table(unique_selector(table))
            .with_confidence(banded_confidence(TABLE_BAND, rows.len()));
        strategy.estimated_rows = Some(rows.len());
        strategy.estimated_columns = Some(columns);
        strategy.description = Some(format!("HTML table with {} rows and {} columns", rows.len(), columns));
        found.push(strategy);
    }
    debug!("Table heuristic produced {} candidates", found.len());
    found
}

fn list_item_candidates(document: &Document) -> Vec<ExtractionStrategy> {
    let Ok(sel) = Selector::parse("[class]") else {
        return Vec::new();
    };
    let classed: Vec<(ElementRef, String)> = document
        .html
        .select(&sel)
        .filter_map(|el| el.value().attr("class").map(|c| (el, c.to_lowercase())))
        .collect();

    let mut found = Vec::new();
    let mut claimed_sets = Vec::new();
    for token in ITEM_CLASS_TOKENS {
        let matches: Vec<ElementRef> = classed
            .iter()
            .filter(|(_, class)| class.contains(token))
            .map(|(el, _)| *el)
            .collect();
        if matches.len() <= MIN_REPEATS {
            continue;
        }

        let ids: Vec<_> = matches.iter().map(|el| el.id()).collect();
        if claimed_sets.contains(&ids) {
            debug!("Class token '{}' matches an already detected item set", token);
            continue;
        }
        claimed_sets.push(ids);

        let sample = truncate_text(&collapse_whitespace(matches[0].text()), SAMPLE_CHARS);
        let mut strategy = ExtractionStrategy::list_items(format!("[class*=\"{}\" i]", token))
            .with_confidence(banded_confidence(LIST_BAND, matches.len()));
        strategy.estimated_items = Some(matches.len());
        strategy.sample_content = Some(sample);
        strategy.description = Some(format!("{} items whose class contains '{}'", matches.len(), token));
        found.push(strategy);
    }
    debug!("List-items heuristic produced {} candidates", found.len());
    found
}

fn repeated_section_candidates(document: &Document) -> Vec<ExtractionStrategy> {
    let Ok(sel) = Selector::parse("section[class], article[class], div[class]") else {
        return Vec::new();
    };

    // first-seen order keeps the output deterministic
    let mut groups: Vec<(String, usize)> = Vec::new();
    for el in document.html.select(&sel) {
        let class_str = el
            .value()
            .attr("class")
            .unwrap_or_default()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if class_str.is_empty() {
            continue;
        }
        match groups.iter_mut().find(|(c, _)| *c == class_str) {
            Some(group) => group.1 += 1,
            None => groups.push((class_str, 1)),
        }
    }

    let mut found = Vec::new();
    for (class_str, count) in groups {
        if count <= MIN_REPEATS {
            continue;
        }
        let selector = format!(".{}", class_str.replace(' ', "."));
        if Selector::parse(&selector).is_err() {
            debug!("Skipping repeated class '{}': not a valid selector", class_str);
            continue;
        }
        let mut strategy = ExtractionStrategy::repeated_sections(selector)
            .with_confidence(banded_confidence(SECTION_BAND, count));
        strategy.estimated_items = Some(count);
        strategy.description = Some(format!("{} sections sharing class '{}'", count, class_str));
        found.push(strategy);
    }
    debug!("Repeated-sections heuristic produced {} candidates", found.len());
    found
}

/// All viable strategies for a page, best first.
pub fn detect_strategies(document: &Document) -> Vec<ExtractionStrategy> {
    let mut strategies = table_candidates(document);
    strategies.extend(list_item_candidates(document));
    strategies.extend(repeated_section_candidates(document));
    // stable: equal scores keep document order
    strategies.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });
    strategies
}

pub async fn detect<F: Fetch + ?Sized>(fetcher: &F, url: &Url) -> DetectionResult {
    let page = match fetcher.fetch(url).await {
        Ok(page) => page,
        Err(e) => {
            warn!("Structure detection for {} failed: {}", url, e);
            return DetectionResult::failed(e.to_string());
        }
    };
    let strategies = detect_strategies(&Document::parse(page));
    info!("Detected {} candidate strategies on {}", strategies.len(), url);

    DetectionResult {
        success: true,
        recommended_strategy: strategies.first().cloned(),
        strategies,
        error: None,
    }
}
