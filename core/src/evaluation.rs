//! Precision@k / recall@k of RRF search against a golden dataset.

use crate::embedding::Encoder;
use crate::hybrid::HybridSearch;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct GoldenDataset {
    pub test_cases: Vec<TestCase>,
}

/// A query and the titles that count as relevant for it.
#[derive(Debug, Clone, Deserialize)]
pub struct TestCase {
    pub query: String,
    pub relevant_docs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseReport {
    pub query: String,
    pub precision: f64,
    pub recall: f64,
    pub retrieved: Vec<String>,
    pub relevant: Vec<String>,
}

pub fn load_golden_dataset<P: AsRef<Path>>(path: P) -> Result<GoldenDataset> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

pub fn score_case(case: &TestCase, retrieved: Vec<String>) -> CaseReport {
    let relevant: HashSet<&str> = case.relevant_docs.iter().map(String::as_str).collect();
    let found = retrieved.iter().filter(|t| relevant.contains(t.as_str())).count() as f64;
    let ratio = |n: usize| if n == 0 { 0.0 } else { found / n as f64 };
    CaseReport {
        query: case.query.clone(),
        precision: ratio(retrieved.len()),
        recall: ratio(case.relevant_docs.len()),
        retrieved,
        relevant: case.relevant_docs.clone(),
    }
}

pub fn evaluate<E: Encoder>(engine: &HybridSearch<E>, dataset: &GoldenDataset, k: f64, limit: usize) -> Result<Vec<CaseReport>> {
    dataset
        .test_cases
        .iter()
        .map(|case| {
            let titles = engine
                .rrf_search(&case.query, k, limit)?
                .into_iter()
                .map(|r| r.document.title)
                .collect();
            let report = score_case(case, titles);
            tracing::debug!(query = %case.query, precision = report.precision, recall = report.recall, "evaluated");
            Ok(report)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case() -> TestCase {
        TestCase { query: "princess".into(), relevant_docs: vec!["Brave".into(), "Frozen".into()] }
    }

    #[test]
    fn precision_and_recall() {
        let r = score_case(&case(), vec!["Brave".into(), "Cars".into(), "Up".into(), "Frozen".into()]);
        assert_eq!(r.precision, 0.5);
        assert_eq!(r.recall, 1.0);
    }

    #[test]
    fn nothing_retrieved() {
        let r = score_case(&case(), vec![]);
        assert_eq!(r.precision, 0.0);
        assert_eq!(r.recall, 0.0);
    }

    #[test]
    fn parses_golden_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("golden.json");
        std::fs::write(&path, r#"{"test_cases": [{"query": "cars", "relevant_docs": ["Cars"]}]}"#).unwrap();
        let ds = load_golden_dataset(&path).unwrap();
        assert_eq!(ds.test_cases[0].relevant_docs, vec!["Cars".to_string()]);
    }
}
