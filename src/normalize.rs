use crate::types::{Record, Transform};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

const NUMERIC_INDICATORS: &[&str] = &[
    "price", "cost", "amount", "value", "rating", "score", "number", "count",
];
const URL_INDICATORS: &[&str] = &["url", "link"];
const NULL_LITERALS: &[&str] = &["", "None", "nan"];

/// A normalized dataset value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    fn to_raw(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Number(n) => Some(n.to_string()),
            Cell::Text(s) => Some(s.clone()),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Cell::Null => serde_json::Value::Null,
            Cell::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Cell::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Url,
    Datetime,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub total_rows: usize,
    pub total_columns: usize,
    pub empty_cells: usize,
    pub completeness_percentage: f64,
}

/// Column-unified, typed and deduplicated records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

fn name_has_any(name: &str, tokens: &[&str]) -> bool {
    let lower = name.to_lowercase();
    tokens.iter().any(|t| lower.contains(t))
}

pub fn is_numeric_column(name: &str) -> bool {
    name_has_any(name, NUMERIC_INDICATORS)
}

pub fn is_url_column(name: &str) -> bool {
    name_has_any(name, URL_INDICATORS)
}

fn clean_text(raw: &str) -> Cell {
    let trimmed = raw.trim();
    if NULL_LITERALS.contains(&trimmed) {
        Cell::Null
    } else {
        Cell::Text(trimmed.to_string())
    }
}

fn coerce_number(cell: Cell) -> Cell {
    match cell {
        Cell::Text(s) => Transform::Currency
            .apply(&s)
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(Cell::Number)
            .unwrap_or(Cell::Null),
        other => other,
    }
}

fn validate_url(cell: Cell) -> Cell {
    match cell {
        Cell::Text(s)
            if (s.starts_with("http://") || s.starts_with("https://")) && Url::parse(&s).is_ok() =>
        {
            Cell::Text(s)
        }
        _ => Cell::Null,
    }
}

/// Clean raw records into a [`Dataset`]. Deterministic and idempotent.
pub fn normalize(records: &[Record]) -> Dataset {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.to_string());
            }
        }
    }

    let numeric: Vec<bool> = columns.iter().map(|c| is_numeric_column(c)).collect();
    let urls: Vec<bool> = columns.iter().map(|c| is_url_column(c)).collect();

    let mut seen = HashSet::new();
    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        let row: Vec<Cell> = columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let mut cell = match record.get(column).flatten() {
                    Some(raw) => clean_text(raw),
                    None => Cell::Null,
                };
                if numeric[i] {
                    cell = coerce_number(cell);
                }
                if urls[i] {
                    cell = validate_url(cell);
                }
                cell
            })
            .collect();

        // emptiness is judged after cleaning so blanked rows go too
        if row.iter().all(Cell::is_null) {
            continue;
        }
        if seen.insert(format!("{:?}", row)) {
            rows.push(row);
        }
    }

    if rows.is_empty() {
        // columns come from rows; none survived, so none remain
        columns.clear();
    }
    Dataset { columns, rows }
}

impl Dataset {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Back to raw records, every column present on every row.
    pub fn to_records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                let mut record = Record::new();
                for (column, cell) in self.columns.iter().zip(row) {
                    record.insert(column.clone(), cell.to_raw());
                }
                record
            })
            .collect()
    }

    pub fn to_json_rows(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.preview(self.rows.len())
    }

    pub fn preview(&self, limit: usize) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .take(limit)
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(column, cell)| (column.clone(), cell.to_json()))
                    .collect()
            })
            .collect()
    }

    pub fn quality(&self) -> QualityReport {
        let total_cells = self.rows.len() * self.columns.len();
        let empty_cells = self
            .rows
            .iter()
            .flat_map(|row| row.iter())
            .filter(|cell| cell.is_null())
            .count();
        let completeness = if total_cells > 0 {
            (total_cells - empty_cells) as f64 / total_cells as f64 * 100.0
        } else {
            0.0
        };
        QualityReport {
            total_rows: self.rows.len(),
            total_columns: self.columns.len(),
            empty_cells,
            completeness_percentage: (completeness * 100.0).round() / 100.0,
        }
    }

    /// Likely type of each column, in column order.
    pub fn column_types(&self) -> Vec<(String, ColumnKind)> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let values: Vec<&Cell> = self.rows.iter().map(|r| &r[i]).filter(|c| !c.is_null()).collect();
                let kind = if values.is_empty() {
                    ColumnKind::Text
                } else if is_numeric_column(column) || mostly_numeric(&values) {
                    ColumnKind::Numeric
                } else if name_has_any(column, &["url", "link", "href"]) {
                    ColumnKind::Url
                } else if name_has_any(column, &["date", "time", "created", "updated"]) {
                    ColumnKind::Datetime
                } else {
                    ColumnKind::Text
                };
                (column.clone(), kind)
            })
            .collect()
    }
}

fn mostly_numeric(values: &[&Cell]) -> bool {
    let numeric = values
        .iter()
        .filter(|cell| match cell {
            Cell::Number(_) => true,
            Cell::Text(s) => s
                .replace([',', '$', '€', '£'], "")
                .trim()
                .parse::<f64>()
                .is_ok(),
            Cell::Null => false,
        })
        .count();
    numeric as f64 / values.len() as f64 >= 0.8
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(pairs: &[(&str, Option<&str>)]) -> Record {
        let mut record = Record::new();
        for (k, v) in pairs {
            record.insert(*k, v.map(str::to_string));
        }
        record
    }

    fn sample_records() -> Vec<Record> {
        vec![
            rec(&[("name", Some("  Product A ")), ("price", Some("$1,299.99")), ("link", Some("https://shop.example/a"))]),
            rec(&[("name", Some("")), ("price", Some("None"))]),
            rec(&[("name", Some("Product B")), ("price", Some("N/A")), ("rating", Some("4.5 stars"))]),
            rec(&[("name", Some("Product A")), ("price", Some("1299.99")), ("link", Some("https://shop.example/a"))]),
            rec(&[("name", Some("nan")), ("link", Some("/relative/path"))]),
            rec(&[("name", Some("Product C")), ("link_count", Some("7")), ("link", Some("ftp://files.example/c"))]),
        ]
    }

    #[test]
    fn test_table_scenario() {
        let records = vec![
            Record::new().with("Name", "A").with("Price", "$10"),
            Record::new().with("Name", "B").with("Price", "$20"),
        ];
        let dataset = normalize(&records);
        assert_eq!(
            serde_json::Value::Array(dataset.to_json_rows().into_iter().map(serde_json::Value::Object).collect()),
            json!([{"Name": "A", "Price": 10.0}, {"Name": "B", "Price": 20.0}])
        );
    }

    #[test]
    fn test_cleaning_steps() {
        let dataset = normalize(&sample_records());

        assert_eq!(dataset.columns(), &["name", "price", "link", "rating", "link_count"]);
        // blank row, all-null row after URL validation, and the exact duplicate are gone
        assert_eq!(dataset.len(), 3);

        let rows = dataset.rows();
        assert_eq!(rows[0][0], Cell::Text("Product A".into()));
        assert_eq!(rows[0][1], Cell::Number(1299.99));
        assert_eq!(rows[0][2], Cell::Text("https://shop.example/a".into()));
        assert_eq!(rows[0][3], Cell::Null);

        assert_eq!(rows[1][1], Cell::Null, "unparsable price becomes null");
        assert_eq!(rows[1][3], Cell::Number(4.5));

        assert_eq!(rows[2][2], Cell::Null, "non-http link becomes null");
        assert_eq!(rows[2][4], Cell::Null, "numeric column named like a link fails URL validation");
    }

    #[test]
    fn test_invariants_hold() {
        let dataset = normalize(&sample_records());
        for (i, row) in dataset.rows().iter().enumerate() {
            assert!(!row.iter().all(Cell::is_null));
            assert!(!dataset.rows()[..i].contains(row));
        }
        for (i, column) in dataset.columns().iter().enumerate() {
            for row in dataset.rows() {
                if is_numeric_column(column) && !is_url_column(column) {
                    assert!(matches!(row[i], Cell::Null | Cell::Number(_)));
                }
                if is_url_column(column) {
                    if let Cell::Text(s) = &row[i] {
                        assert!(Url::parse(s).is_ok());
                    }
                }
            }
        }
    }

    #[test]
    fn test_idempotent() {
        let inputs = vec![
            sample_records(),
            vec![Record::new().with("Score", "-3.25").with("count", "1e3").with("title", " x ")],
            vec![
                Record::new().with("value", "10").with("website_url", "https://a.example/x?y=1"),
                Record::new().with("value", "10.0"),
                Record::new().with("value", "10").with("website_url", "https://a.example/x?y=1"),
            ],
            vec![Record::new().with("name", "  ").with("price", "N/A")],
            Vec::new(),
        ];
        for input in inputs {
            let once = normalize(&input);
            let twice = normalize(&once.to_records());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_all_blank_input_has_no_columns() {
        let dataset = normalize(&[
            Record::new().with("name", "  ").with("price", "N/A"),
            Record::new().with("link", "/relative"),
        ]);
        assert!(dataset.is_empty());
        assert!(dataset.columns().is_empty());
        assert_eq!(dataset, Dataset::default());
    }

    #[test]
    fn test_negative_and_exponent_inputs() {
        let dataset = normalize(&[Record::new().with("Score", "-3.25").with("count", "1e3")]);
        assert_eq!(dataset.rows()[0][0], Cell::Number(-3.25));
        // letters are stripped before parsing, so "1e3" reads as 13
        assert_eq!(dataset.rows()[0][1], Cell::Number(13.0));
    }

    #[test]
    fn test_quality_and_types() {
        let dataset = normalize(&[
            Record::new().with("name", "A").with("qty", "3").with("created", "2024-01-01"),
            Record::new().with("name", "B").with("qty", "$4").with("_source_url", "https://x.example/b"),
        ]);
        let quality = dataset.quality();
        assert_eq!(quality.total_rows, 2);
        assert_eq!(quality.total_columns, 4);
        assert_eq!(quality.empty_cells, 2);
        assert_eq!(quality.completeness_percentage, 75.0);

        let types = dataset.column_types();
        assert_eq!(types[0], ("name".to_string(), ColumnKind::Text));
        assert_eq!(types[1], ("qty".to_string(), ColumnKind::Numeric));
        assert_eq!(types[2], ("created".to_string(), ColumnKind::Datetime));
        assert_eq!(types[3], ("_source_url".to_string(), ColumnKind::Url));

        assert_eq!(normalize(&[]).quality().completeness_percentage, 0.0);
    }
}
