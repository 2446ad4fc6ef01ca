//! Timing instrumentation for the extraction pipeline.
//!
//! Collects paper-level and per-question phase durations, merges them into
//! the shared `timing.json` under the cache lock so parallel extractions
//! can contribute to one file.

use std::path::Path;
use std::time::Instant;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::cache::lock::locked_update_json;
use crate::error::Result;

/// Phase durations for one PDF extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimingLog {
    /// Phase name to duration in seconds, once per paper.
    pub paper_timings: IndexMap<String, f64>,
    /// Question id to phase durations.
    pub question_timings: IndexMap<String, IndexMap<String, f64>>,
}

impl TimingLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_paper(&mut self, phase: &str, seconds: f64) {
        self.paper_timings.insert(phase.to_string(), seconds);
    }

    pub fn log_question(&mut self, question_id: &str, phase: &str, seconds: f64) {
        self.question_timings
            .entry(question_id.to_string())
            .or_default()
            .insert(phase.to_string(), seconds);
    }

    /// Times a paper-level phase.
    pub fn time_paper<R>(&mut self, phase: &str, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let out = f();
        self.log_paper(phase, start.elapsed().as_secs_f64());
        out
    }

    /// Times a question-level phase.
    pub fn time_question<R>(&mut self, question_id: &str, phase: &str, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let out = f();
        self.log_question(question_id, phase, start.elapsed().as_secs_f64());
        out
    }

    /// Mean duration per phase across all questions.
    pub fn phase_averages(&self) -> IndexMap<String, f64> {
        let mut totals: IndexMap<String, (f64, usize)> = IndexMap::new();
        for phases in self.question_timings.values() {
            for (phase, duration) in phases {
                let entry = totals.entry(phase.clone()).or_insert((0.0, 0));
                entry.0 += duration;
                entry.1 += 1;
            }
        }
        totals
            .into_iter()
            .map(|(phase, (total, count))| (phase, total / count as f64))
            .collect()
    }

    /// The `n` slowest questions as (id, total, slowest phase, duration).
    pub fn slowest_questions(&self, n: usize) -> Vec<(String, f64, String, f64)> {
        let mut results: Vec<(String, f64, String, f64)> = self
            .question_timings
            .iter()
            .filter_map(|(id, phases)| {
                let total: f64 = phases.values().sum();
                let (phase, duration) =
                    phases.iter().max_by(|a, b| a.1.total_cmp(b.1))?;
                Some((id.clone(), total, phase.clone(), *duration))
            })
            .collect();
        results.sort_by(|a, b| b.1.total_cmp(&a.1));
        results.truncate(n);
        results
    }

    /// Human-readable summary for the per-PDF log line.
    pub fn summary(&self) -> String {
        let mut lines = vec![String::new(), "=== Extraction Timing Summary ===".to_string()];
        if !self.paper_timings.is_empty() {
            lines.push("Paper-level:".to_string());
            for (phase, duration) in &self.paper_timings {
                lines.push(format!("  {phase:25} {duration:.3}s"));
            }
        }
        let averages = self.phase_averages();
        if !averages.is_empty() {
            lines.push(String::new());
            lines.push("Question-level averages:".to_string());
            let mut sorted: Vec<_> = averages.into_iter().collect();
            sorted.sort_by(|a, b| b.1.total_cmp(&a.1));
            for (phase, avg) in sorted {
                lines.push(format!("  {phase:25} {avg:.3}s"));
            }
        }
        let slowest = self.slowest_questions(3);
        if !slowest.is_empty() {
            lines.push(String::new());
            lines.push("Slowest questions:".to_string());
            for (id, total, phase, duration) in slowest {
                lines.push(format!("  {id}: {total:.3}s ({phase}: {duration:.3}s)"));
            }
        }
        lines.push(String::new());
        lines.join("\n")
    }

    /// Merges this log into the shared timing file under the cache lock, so
    /// parallel PDF extractions can all contribute.
    pub fn save_merged(&self, path: &Path) -> Result<()> {
        let paper = self.paper_timings.clone();
        let questions = self.question_timings.clone();
        locked_update_json(path, move |existing| {
            // A corrupt non-object file starts over rather than aborting the
            // whole extraction.
            let mut obj = match existing {
                serde_json::Value::Object(obj) => obj,
                _ => Default::default(),
            };
            merge_map(&mut obj, "paper_timings", &paper);
            merge_nested(&mut obj, "question_timings", &questions);

            // Recompute derived views over the merged data.
            let merged: TimingLog = serde_json::from_value(serde_json::Value::Object(obj.clone()))
                .unwrap_or_default();
            obj.insert(
                "phase_averages".to_string(),
                serde_json::to_value(merged.phase_averages()).unwrap_or_default(),
            );
            let slowest: Vec<serde_json::Value> = merged
                .slowest_questions(5)
                .into_iter()
                .map(|(id, total, phase, duration)| {
                    json!({
                        "id": id,
                        "total": total,
                        "slowest_phase": phase,
                        "phase_duration": duration,
                    })
                })
                .collect();
            obj.insert("slowest_questions".to_string(), serde_json::Value::Array(slowest));
            serde_json::Value::Object(obj)
        })?;
        Ok(())
    }
}

fn merge_map(
    obj: &mut serde_json::Map<String, serde_json::Value>,
    key: &str,
    values: &IndexMap<String, f64>,
) {
    let entry = obj
        .entry(key.to_string())
        .or_insert_with(|| serde_json::Value::Object(Default::default()));
    if let Some(map) = entry.as_object_mut() {
        for (k, v) in values {
            map.insert(k.clone(), json!(v));
        }
    }
}

fn merge_nested(
    obj: &mut serde_json::Map<String, serde_json::Value>,
    key: &str,
    values: &IndexMap<String, IndexMap<String, f64>>,
) {
    let entry = obj
        .entry(key.to_string())
        .or_insert_with(|| serde_json::Value::Object(Default::default()));
    if let Some(map) = entry.as_object_mut() {
        for (id, phases) in values {
            map.insert(id.clone(), serde_json::to_value(phases).unwrap_or_default());
        }
    }
}
