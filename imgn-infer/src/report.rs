//! Run report export
//!
//! A JSON record of one inference run: posterior summaries, evidence, samples and
//! the seed needed to reproduce the run.

use crate::pipeline::InferenceResults;
use imgn_common::Result;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use uuid::Uuid;

/// Complete record of an inference run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// RFC 3339 completion time
    pub timestamp: String,
    pub run_id: Uuid,
    pub sampler: String,
    pub likelihood: String,
    pub results: InferenceResults,
}

impl RunReport {
    pub fn new(results: &InferenceResults, run_id: Uuid, sampler: &str, likelihood: &str) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            run_id,
            sampler: sampler.to_string(),
            likelihood: likelihood.to_string(),
            results: results.clone(),
        }
    }

    /// Write as pretty-printed JSON
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Read a report written by [`write_json`](Self::write_json)
    pub fn read_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let report = serde_json::from_reader(BufReader::new(file))?;
        Ok(report)
    }

    /// Human-readable summary table
    pub fn format_summary(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "ln Z = {:.4} ± {:.4}  ({} samples, {} workers x {} realizations, seed {})\n",
            self.results.log_evidence,
            self.results.log_evidence_error,
            self.results.samples.len(),
            self.results.workers,
            self.results.ensemble_size,
            self.results.master_seed
        ));
        for (name, summary) in self
            .results
            .parameter_names
            .iter()
            .zip(&self.results.summaries)
        {
            out.push_str(&format!(
                "  {:<12} {:>12.5}  -{:<10.5} +{:<10.5}\n",
                name, summary.median, summary.errlo, summary.errup
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PosteriorSummary;

    fn results() -> InferenceResults {
        InferenceResults {
            parameter_names: vec!["a".to_string()],
            samples: vec![vec![1.0], vec![2.0]],
            log_evidence: -3.5,
            log_evidence_error: 0.1,
            summaries: vec![PosteriorSummary {
                median: 1.5,
                errlo: 0.4,
                errup: 0.4,
            }],
            master_seed: 17,
            workers: 2,
            ensemble_size: 3,
            iterations: 10,
            likelihood_calls: 300,
        }
    }

    #[test]
    fn test_json_export_import() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        let report = RunReport::new(&results(), Uuid::new_v4(), "nested", "ensemble");
        report.write_json(&path).unwrap();
        let loaded = RunReport::read_json(&path).unwrap();

        assert_eq!(loaded, report);
        assert!(chrono::DateTime::parse_from_rfc3339(&loaded.timestamp).is_ok());
    }

    #[test]
    fn test_format_summary_lists_parameters() {
        let report = RunReport::new(&results(), Uuid::nil(), "nested", "ensemble");
        let text = report.format_summary();
        assert!(text.contains("ln Z = -3.5000"));
        assert!(text.lines().any(|l| l.trim_start().starts_with("a ")));
    }
}
