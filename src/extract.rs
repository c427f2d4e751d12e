use crate::error::ExtractError;
use crate::fetch::Document;
use crate::types::{ExtractionStrategy, FieldSpec, Record, StrategyKind, SOURCE_URL_COLUMN};
use scraper::{ElementRef, Selector};
use tracing::debug;
use url::Url;

/// Column used for list items when the strategy names no fields.
pub const DEFAULT_TEXT_COLUMN: &str = "text";

fn parse_selector(selector: &str) -> Result<Selector, ExtractError> {
    Selector::parse(selector).map_err(|e| ExtractError::InvalidSelector {
        selector: selector.to_string(),
        reason: format!("{:?}", e),
    })
}

pub(crate) fn collapse_whitespace<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn element_text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Rows belonging to this table, excluding rows of nested tables.
pub(crate) fn table_rows(table: ElementRef) -> Vec<ElementRef> {
    let Ok(tr) = Selector::parse("tr") else {
        return Vec::new();
    };
    table
        .select(&tr)
        .filter(|row| {
            row.ancestors()
                .filter_map(ElementRef::wrap)
                .find(|a| a.value().name() == "table")
                .map(|owner| owner.id() == table.id())
                .unwrap_or(false)
        })
        .collect()
}

pub(crate) fn row_cells(row: ElementRef) -> Vec<ElementRef> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|c| matches!(c.value().name(), "th" | "td"))
        .collect()
}

fn first_link(el: ElementRef, base: &Url) -> Option<String> {
    let sel = Selector::parse("a[href]").ok()?;
    let href = el.select(&sel).next()?.value().attr("href")?;
    base.join(href.trim()).ok().map(|u| u.to_string())
}

pub fn extract_table(document: &Document, strategy: &ExtractionStrategy) -> Result<Vec<Record>, ExtractError> {
    let sel = parse_selector(&strategy.selector)?;
    let matched = document
        .html
        .select(&sel)
        .next()
        .ok_or_else(|| ExtractError::SelectorNotFound(strategy.selector.clone()))?;

    // a selector may point at a wrapper around the table
    let table = if matched.value().name() == "table" {
        matched
    } else {
        let inner = parse_selector("table")?;
        matched.select(&inner).next().unwrap_or(matched)
    };

    let rows = table_rows(table);
    let Some((header_row, body)) = rows.split_first() else {
        return Ok(Vec::new());
    };
    let headers: Vec<String> = row_cells(*header_row).into_iter().map(element_text).collect();

    let mut records = Vec::with_capacity(body.len());
    for row in body {
        let mut record = Record::new();
        for (i, cell) in row_cells(*row).into_iter().enumerate() {
            let header = match headers.get(i) {
                Some(h) if !h.is_empty() => h.clone(),
                _ => format!("Column_{}", i + 1),
            };
            record.insert(header, Some(element_text(cell)));
        }
        if let Some(link) = first_link(*row, &document.url) {
            record.insert(SOURCE_URL_COLUMN, Some(link));
        }
        records.push(record);
    }
    Ok(records)
}

fn read_field(el: ElementRef, spec: &FieldSpec, base: &Url) -> String {
    let raw = match spec.attribute.as_deref() {
        Some(attr @ ("href" | "src")) => el
            .value()
            .attr(attr)
            .map(|v| base.join(v.trim()).map(|u| u.to_string()).unwrap_or_else(|_| v.to_string()))
            .unwrap_or_default(),
        Some(attr) => el.value().attr(attr).unwrap_or_default().to_string(),
        None => element_text(el),
    };
    spec.transform.apply(&raw)
}

pub fn extract_list_items(document: &Document, strategy: &ExtractionStrategy) -> Result<Vec<Record>, ExtractError> {
    let sel = parse_selector(&strategy.selector)?;
    let items: Vec<ElementRef> = document.html.select(&sel).collect();
    if items.is_empty() {
        return Err(ExtractError::SelectorNotFound(strategy.selector.clone()));
    }

    let fields = strategy
        .fields
        .iter()
        .map(|(name, spec)| parse_selector(&spec.selector).map(|sel| (name.as_str(), spec, sel)))
        .collect::<Result<Vec<_>, ExtractError>>()?;

    let mut records = Vec::with_capacity(items.len());
    'items: for item in items {
        let mut record = Record::new();
        if fields.is_empty() {
            record.insert(DEFAULT_TEXT_COLUMN, Some(collapse_whitespace(item.text())));
        }
        for (name, spec, field_sel) in &fields {
            match item.select(field_sel).next() {
                Some(el) => record.insert(*name, Some(read_field(el, spec, &document.url))),
                None if spec.required => {
                    debug!("Dropping item without required field '{}'", name);
                    continue 'items;
                }
                None => {}
            }
        }
        if let Some(link) = first_link(item, &document.url) {
            record.insert(SOURCE_URL_COLUMN, Some(link));
        }
        records.push(record);
    }
    Ok(records)
}

/// Pull the ordered records of one page according to `strategy`.
pub fn extract(document: &Document, strategy: &ExtractionStrategy) -> Result<Vec<Record>, ExtractError> {
    match strategy.kind {
        StrategyKind::Table => extract_table(document, strategy),
        StrategyKind::ListItems => extract_list_items(document, strategy),
        StrategyKind::RepeatedSections => Err(ExtractError::Unsupported(strategy.kind.to_string())),
    }
}
