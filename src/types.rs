use crate::error::ErrorKind;
use crate::normalize::Dataset;
use crate::store::DatasetHandle;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Reserved column holding the absolute link found inside a record's element.
pub const SOURCE_URL_COLUMN: &str = "_source_url";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Table,
    ListItems,
    RepeatedSections,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::Table => "table",
            StrategyKind::ListItems => "list_items",
            StrategyKind::RepeatedSections => "repeated_sections",
        };
        f.write_str(name)
    }
}

/// Post-processing applied to a field value right after extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    #[default]
    None,
    /// Collapse runs of whitespace into single spaces.
    Strip,
    /// Keep only digits, `.` and `-`.
    #[serde(alias = "price")]
    Currency,
}

impl Transform {
    pub fn apply(self, value: &str) -> String {
        match self {
            Transform::None => value.to_string(),
            Transform::Strip => value.split_whitespace().collect::<Vec<_>>().join(" "),
            Transform::Currency => value
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect(),
        }
    }
}

/// How to read one output column from a repeating element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// CSS selector resolved inside the repeating element.
    pub selector: String,
    /// Attribute to read instead of the element text.
    #[serde(default)]
    pub attribute: Option<String>,
    #[serde(default)]
    pub transform: Transform,
    /// A record missing a required field is dropped.
    #[serde(default)]
    pub required: bool,
}

impl FieldSpec {
    pub fn text(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            attribute: None,
            transform: Transform::None,
            required: false,
        }
    }

    pub fn attr(selector: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            attribute: Some(attribute.into()),
            ..Self::text(selector)
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Where repeating data lives on a page and how to read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionStrategy {
    #[serde(rename = "type")]
    pub kind: StrategyKind,
    pub selector: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSpec>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_rows: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_columns: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_items: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ExtractionStrategy {
    fn bare(kind: StrategyKind, selector: impl Into<String>) -> Self {
        Self {
            kind,
            selector: selector.into(),
            fields: BTreeMap::new(),
            confidence: 0.0,
            estimated_rows: None,
            estimated_columns: None,
            estimated_items: None,
            sample_content: None,
            description: None,
        }
    }

    pub fn table(selector: impl Into<String>) -> Self {
        Self::bare(StrategyKind::Table, selector)
    }

    pub fn list_items(selector: impl Into<String>) -> Self {
        Self::bare(StrategyKind::ListItems, selector)
    }

    pub fn repeated_sections(selector: impl Into<String>) -> Self {
        Self::bare(StrategyKind::RepeatedSections, selector)
    }

    pub fn with_field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

/// One raw key/value extraction. Keys keep first-insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Option<String>)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a column, keeping its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: Option<String>) {
        let key = key.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, Some(value.into()));
        self
    }

    /// `None` when the key is absent, `Some(None)` when it is present but null.
    pub fn get(&self, key: &str) -> Option<Option<&str>> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_deref())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, Some(v.into()));
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables_found: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lists_found: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_divs: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub potential_sources: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub success: bool,
    pub strategies: Vec<ExtractionStrategy>,
    pub recommended_strategy: Option<ExtractionStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DetectionResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Summary handed back to the serving layer for one `run`.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeResult {
    pub success: bool,
    pub scrape_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_count: Option<usize>,
    pub columns: Vec<String>,
    pub preview: Vec<serde_json::Map<String, serde_json::Value>>,
    pub pages_visited: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<ExtractionStrategy>,
    #[serde(skip)]
    pub dataset: Option<Dataset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<DatasetHandle>,
    pub created_at: String,
}
