use crate::{DocId, Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl Document {
    pub fn new(id: DocId, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self { id, title: title.into(), description: description.into() }
    }

    /// Text indexed for keyword search.
    pub fn indexed_text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }
}

/// Read the document array stored under `field` of a JSON object,
/// e.g. `{"movies": [{"id": 1, "title": "...", "description": "..."}]}`.
pub fn load_documents<P: AsRef<Path>>(path: P, field: &str) -> Result<Vec<Document>> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    let mut json: serde_json::Value = serde_json::from_reader(reader)?;
    let docs = json
        .get_mut(field)
        .map(serde_json::Value::take)
        .ok_or_else(|| Error::invalid(format!("{} has no '{field}' field", path.as_ref().display())))?;
    Ok(serde_json::from_value(docs)?)
}
