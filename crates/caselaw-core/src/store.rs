//! Document store: loads the two source files into one ordered `Corpus`.
//!
//! Only structural presence of fields is checked; legal content is taken as is.
//! Indexing text is built here so the vectorizer never needs to know which
//! fields a source carries or how much each one weighs.

use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{Corpus, Record, SourceTag};

/// A field that contributes to a record's indexing text, repeated `repeat` times.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub repeat: usize,
}

const fn field(name: &'static str, repeat: usize) -> FieldSpec { FieldSpec { name, repeat } }

/// Customs service rulings: case number, decision date, disposition, claim, reasoning.
pub const RULINGS_FIELDS: &[FieldSpec] = &[
    field("사건번호", 1),
    field("선고일자\n(종결일자)", 1),
    field("판결주문", 1),
    field("청구취지", 1),
    field("판결이유", 1),
];

/// Law portal precedents. The judgment summary carries half of the total weight.
pub const PRECEDENTS_FIELDS: &[FieldSpec] = &[
    field("제목", 1),
    field("판례번호", 1),
    field("내용", 1),
    field("선고일자", 1),
    field("법원명", 1),
    field("사건유형", 1),
    field("판결요지", 5),
    field("참조조문", 1),
    field("판결결과", 1),
];

impl SourceTag {
    pub fn index_fields(self) -> &'static [FieldSpec] {
        match self {
            SourceTag::Rulings => RULINGS_FIELDS,
            SourceTag::Precedents => PRECEDENTS_FIELDS,
        }
    }

    /// Field holding the record's native identifier.
    pub fn id_field(self) -> &'static str {
        match self {
            SourceTag::Rulings => "사건번호",
            SourceTag::Precedents => "판례번호",
        }
    }
}

/// Collapse runs of whitespace to one space and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Default)]
pub struct DocumentStore;

impl DocumentStore {
    pub fn new() -> Self { Self }

    /// Load both sources; either file missing is fatal.
    pub fn load(&self, rulings_path: &Path, precedents_path: &Path) -> Result<Corpus> {
        let rulings = self.load_source(rulings_path, SourceTag::Rulings)?;
        let precedents = self.load_source(precedents_path, SourceTag::Precedents)?;
        info!(rulings = rulings.len(), precedents = precedents.len(), "corpus loaded");
        Ok(Corpus::new(rulings, precedents))
    }

    pub fn load_source(&self, path: &Path, source: SourceTag) -> Result<Vec<Record>> {
        if !path.is_file() { return Err(Error::DataFileMissing(path.to_path_buf())); }
        let content = self.read_file_content(path)?;
        let value: Value = serde_json::from_str(&content)
            .map_err(|e| Error::InvalidData { path: path.to_path_buf(), reason: e.to_string() })?;
        let Value::Array(items) = value else {
            return Err(Error::InvalidData { path: path.to_path_buf(), reason: "expected a JSON array of records".into() });
        };
        let mut records = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            let Value::Object(map) = item else {
                return Err(Error::InvalidData { path: path.to_path_buf(), reason: format!("entry {i} is not an object") });
            };
            let fields: Vec<(String, String)> = map
                .into_iter()
                .filter_map(|(k, v)| value_text(&v).map(|t| (k, t)))
                .collect();
            records.push(build_record(source, fields));
        }
        debug!(path = %path.display(), source = %source, count = records.len(), "source parsed");
        Ok(records)
    }

    fn read_file_content(&self, file_path: &Path) -> Result<String> {
        match fs::read_to_string(file_path) {
            Ok(content) => Ok(content),
            Err(_) => Ok(String::from_utf8_lossy(&fs::read(file_path)?).to_string()),
        }
    }
}

/// Build a record from its fields, deriving `id` and `raw_text`.
pub fn build_record(source: SourceTag, fields: Vec<(String, String)>) -> Record {
    let lookup = |name: &str| fields.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str());
    let id = lookup(source.id_field()).map(str::to_string);
    let mut parts = Vec::new();
    for spec in source.index_fields() {
        if let Some(value) = lookup(spec.name) {
            let part = format!("{}: {} \n\n", spec.name, value);
            for _ in 0..spec.repeat { parts.push(part.clone()); }
        }
    }
    let raw_text = normalize_whitespace(&parts.join(" "));
    Record { id, source, fields, raw_text }
}

fn value_text(v: &Value) -> Option<String> {
    let text = match v {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    };
    if text.is_empty() { None } else { Some(text) }
}
