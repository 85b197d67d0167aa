//! Score records and batch reports
//!
//! A [`ScoreRecord`] is produced only by a fully successful audit. Its serialized form is the
//! per-page entry of the persisted results file:
//!
//! ```json
//! { "url": "https://example.com/", "time": 7.3,
//!   "score": { "accessibility": 100, "best-practices": 92, "performance": 87.3, "pwa": 30, "seo": 90 } }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::{AuditError, LighthouseResult};

/// The audit categories every record must carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Accessibility,
    BestPractices,
    Performance,
    Pwa,
    Seo,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Accessibility,
        Category::BestPractices,
        Category::Performance,
        Category::Pwa,
        Category::Seo,
    ];

    /// Key used by Lighthouse and in the results file.
    pub fn key(&self) -> &'static str {
        match self {
            Category::Accessibility => "accessibility",
            Category::BestPractices => "best-practices",
            Category::Performance => "performance",
            Category::Pwa => "pwa",
            Category::Seo => "seo",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Category scores scaled to [0, 100]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScores {
    pub accessibility: f64,
    #[serde(rename = "best-practices")]
    pub best_practices: f64,
    pub performance: f64,
    pub pwa: f64,
    pub seo: f64,
}

impl CategoryScores {
    /// Scale the raw Lighthouse scores of `result` by 100.
    ///
    /// Fails on the first category that is absent, has a null score or lies outside [0, 1].
    pub fn from_lighthouse(result: &LighthouseResult, url: &str) -> Result<Self, AuditError> {
        let scaled = |category: Category| -> Result<f64, AuditError> {
            let raw = result
                .categories
                .get(category.key())
                .and_then(|c| c.score)
                .ok_or_else(|| AuditError::MissingCategory {
                    url: url.to_string(),
                    category: category.key().to_string(),
                })?;

            if !(0.0..=1.0).contains(&raw) {
                return Err(AuditError::MalformedReport(format!(
                    "score {raw} for '{category}' is outside [0, 1]"
                )));
            }

            Ok(raw * 100.0)
        };

        Ok(Self {
            accessibility: scaled(Category::Accessibility)?,
            best_practices: scaled(Category::BestPractices)?,
            performance: scaled(Category::Performance)?,
            pwa: scaled(Category::Pwa)?,
            seo: scaled(Category::Seo)?,
        })
    }

    pub fn get(&self, category: Category) -> f64 {
        match category {
            Category::Accessibility => self.accessibility,
            Category::BestPractices => self.best_practices,
            Category::Performance => self.performance,
            Category::Pwa => self.pwa,
            Category::Seo => self.seo,
        }
    }
}

/// Outcome of one successful audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    /// Final URL after redirects
    pub url: String,
    /// Wall-clock seconds from the first launch to the end of the successful Lighthouse run,
    /// including failed attempts and retry waits
    #[serde(rename = "time")]
    pub elapsed_seconds: f64,
    #[serde(rename = "score")]
    pub scores: CategoryScores,
}

impl ScoreRecord {
    pub fn from_lighthouse(
        result: &LighthouseResult,
        requested_url: &str,
        elapsed: Duration,
    ) -> Result<Self, AuditError> {
        let url = result.resolved_url().ok_or_else(|| {
            AuditError::MalformedReport(format!("no final URL reported for {requested_url}"))
        })?;
        let scores = CategoryScores::from_lighthouse(result, requested_url)?;

        Ok(Self {
            url: url.to_string(),
            elapsed_seconds: elapsed.as_secs_f64(),
            scores,
        })
    }
}

/// Ordered results of one batch
///
/// `records` follows the input URL order. URLs that exhausted their retries are listed in
/// `failed_urls`, which is kept for console output only and never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub records: Vec<ScoreRecord>,
    pub total_elapsed_seconds: f64,
    pub failed_urls: Vec<String>,
}

impl BatchReport {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Pretty JSON array of the records, as written to the results file.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.records)
    }

    pub fn from_json(json: &str) -> Result<Vec<ScoreRecord>, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LighthouseCategory;
    use std::collections::HashMap;

    fn lighthouse_result(scores: &[(&str, Option<f64>)]) -> LighthouseResult {
        LighthouseResult {
            final_url: Some("https://example.com/".to_string()),
            final_displayed_url: None,
            requested_url: Some("https://example.com".to_string()),
            categories: scores
                .iter()
                .map(|(k, v)| (k.to_string(), LighthouseCategory { score: *v }))
                .collect::<HashMap<_, _>>(),
        }
    }

    fn full_result() -> LighthouseResult {
        lighthouse_result(&[
            ("accessibility", Some(1.0)),
            ("best-practices", Some(0.92)),
            ("performance", Some(0.873)),
            ("pwa", Some(0.25)),
            ("seo", Some(0.0)),
        ])
    }

    #[test]
    fn test_scores_scaled_by_100() {
        let record = ScoreRecord::from_lighthouse(
            &full_result(),
            "https://example.com",
            Duration::from_millis(7300),
        )
        .unwrap();

        assert_eq!(record.url, "https://example.com/");
        assert!((record.elapsed_seconds - 7.3).abs() < 1e-9);
        assert_eq!(record.scores.performance, 0.873 * 100.0);
        assert!((record.scores.performance - 87.3).abs() < 1e-9);
        assert_eq!(record.scores.accessibility, 100.0);
        assert_eq!(record.scores.seo, 0.0);
        assert_eq!(record.scores.get(Category::Pwa), 25.0);
    }

    #[test]
    fn test_missing_category_fails() {
        let result = lighthouse_result(&[
            ("accessibility", Some(1.0)),
            ("best-practices", Some(0.92)),
            ("performance", Some(0.873)),
            ("seo", Some(0.5)),
        ]);

        let err =
            ScoreRecord::from_lighthouse(&result, "https://example.com", Duration::ZERO).unwrap_err();
        match err {
            AuditError::MissingCategory { category, .. } => assert_eq!(category, "pwa"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_null_score_fails() {
        let mut result = full_result();
        result
            .categories
            .insert("seo".to_string(), LighthouseCategory { score: None });

        let err =
            CategoryScores::from_lighthouse(&result, "https://example.com").unwrap_err();
        assert!(matches!(err, AuditError::MissingCategory { .. }));
    }

    #[test]
    fn test_out_of_range_score_fails() {
        let mut result = full_result();
        result
            .categories
            .insert("performance".to_string(), LighthouseCategory { score: Some(87.0) });

        let err =
            CategoryScores::from_lighthouse(&result, "https://example.com").unwrap_err();
        assert!(matches!(err, AuditError::MalformedReport(_)));
    }

    #[test]
    fn test_missing_final_url_fails() {
        let mut result = full_result();
        result.final_url = None;
        result.requested_url = None;

        let err =
            ScoreRecord::from_lighthouse(&result, "https://example.com", Duration::ZERO).unwrap_err();
        assert!(matches!(err, AuditError::MalformedReport(_)));
    }

    #[test]
    fn test_serialized_shape() {
        let record = ScoreRecord::from_lighthouse(
            &full_result(),
            "https://example.com",
            Duration::from_secs(2),
        )
        .unwrap();
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["url"], "https://example.com/");
        assert_eq!(value["time"], 2.0);
        let keys: Vec<_> = value["score"]
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        let mut expected: Vec<_> = Category::ALL.iter().map(|c| c.key().to_string()).collect();
        expected.sort();
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_report_json_round_trip() {
        let record = ScoreRecord::from_lighthouse(
            &full_result(),
            "https://example.com",
            Duration::from_millis(1500),
        )
        .unwrap();
        let report = BatchReport {
            records: vec![record.clone(), record],
            total_elapsed_seconds: 3.2,
            failed_urls: vec!["https://bad.example".to_string()],
        };

        let json = report.to_json().unwrap();
        assert!(json.starts_with('['));
        assert_eq!(BatchReport::from_json(&json).unwrap(), report.records);
    }
}
