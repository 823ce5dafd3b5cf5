//! Cross-attempt memory.
//!
//! `AttemptMemory` is an append-only, size-bounded log of build/deploy
//! attempts. Its rendered context is what keeps later retries from drifting
//! back toward approaches that already failed: successful attempts are
//! listed first and labeled authoritatively, failed attempts follow as
//! patterns to avoid, and a closing directive pins the generation to the
//! most recent success.
//!
//! Pruning removes oldest *failed* records once the log exceeds its bound.
//! Successful records are retained unconditionally — an attempt that once
//! worked must never be forgotten while later attempts are failing.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::classifier::ErrorAnalysis;

/// What one attempt produced, when it produced anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    /// Element names the generator created inside the artifact
    pub elements: Vec<String>,
    /// Practices or patterns the generator reports having applied
    pub practices: Vec<String>,
}

impl ArtifactSummary {
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty() && self.practices.is_empty()
    }
}

/// One historical attempt. Appended once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt_number: u32,
    pub succeeded: bool,
    pub summary: ArtifactSummary,
    pub errors: Vec<ErrorAnalysis>,
    pub timestamp: DateTime<Utc>,
}

impl AttemptRecord {
    pub fn success(attempt_number: u32, summary: ArtifactSummary) -> Self {
        Self {
            attempt_number,
            succeeded: true,
            summary,
            errors: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn failure(
        attempt_number: u32,
        summary: ArtifactSummary,
        errors: Vec<ErrorAnalysis>,
    ) -> Self {
        Self {
            attempt_number,
            succeeded: false,
            summary,
            errors,
            timestamp: Utc::now(),
        }
    }
}

/// How many failed attempts the rendered context surfaces at most.
const RENDERED_FAILURE_LIMIT: usize = 5;

/// Append-only attempt log with success-preserving pruning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptMemory {
    records: Vec<AttemptRecord>,
    capacity: usize,
}

impl AttemptMemory {
    /// Create an empty memory bounded to `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append one attempt record, pruning oldest failures past capacity.
    pub fn record(&mut self, attempt: AttemptRecord) {
        self.records.push(attempt);
        while self.records.len() > self.capacity {
            let Some(oldest_failure) = self.records.iter().position(|r| !r.succeeded) else {
                // Only successes remain; those are never pruned.
                break;
            };
            self.records.remove(oldest_failure);
        }
    }

    pub fn records(&self) -> &[AttemptRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn successes(&self) -> impl Iterator<Item = &AttemptRecord> {
        self.records.iter().filter(|r| r.succeeded)
    }

    fn failures(&self) -> impl Iterator<Item = &AttemptRecord> {
        self.records.iter().filter(|r| !r.succeeded)
    }

    /// Render the attempt history as a context block for the next
    /// generation attempt.
    ///
    /// Ordering is load-bearing: successes first, labeled "PRESERVE IT",
    /// then recent failures as patterns to avoid, then the closing
    /// directive. See the module docs.
    pub fn render_context(&self) -> String {
        if self.records.is_empty() {
            return String::new();
        }

        let mut out = String::from("## PRIOR ATTEMPT HISTORY\n");

        for record in self.successes() {
            out.push_str(&format!(
                "\n### Attempt {} — THIS APPROACH WORKED — PRESERVE IT\n",
                record.attempt_number
            ));
            if record.summary.elements.is_empty() {
                out.push_str("Elements created: (none reported)\n");
            } else {
                out.push_str(&format!(
                    "Elements created: {}\n",
                    record.summary.elements.join(", ")
                ));
            }
            if !record.summary.practices.is_empty() {
                out.push_str(&format!(
                    "Practices applied: {}\n",
                    record.summary.practices.join(", ")
                ));
            }
        }

        let recent_failures: Vec<&AttemptRecord> = {
            let all: Vec<&AttemptRecord> = self.failures().collect();
            let skip = all.len().saturating_sub(RENDERED_FAILURE_LIMIT);
            all.into_iter().skip(skip).collect()
        };

        if !recent_failures.is_empty() {
            out.push_str("\n### PATTERNS TO AVOID\n");
            for record in recent_failures {
                match record.errors.first() {
                    Some(analysis) => out.push_str(&format!(
                        "- Attempt {} failed ({}): {}\n",
                        record.attempt_number,
                        analysis.category,
                        analysis
                            .leading_directive()
                            .unwrap_or(analysis.raw_message.as_str())
                    )),
                    None => out.push_str(&format!(
                        "- Attempt {} failed (unclassified)\n",
                        record.attempt_number
                    )),
                }
            }
        }

        out.push_str(
            "\nBuild upon the most recent success; do not revert to a previously failed approach.\n",
        );
        out
    }

    /// Persist the memory as JSON so a run can resume across restarts.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize attempt memory")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write attempt memory to {}", path.display()))?;
        Ok(())
    }

    /// Load a previously saved memory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read attempt memory from {}", path.display()))?;
        let memory: AttemptMemory =
            serde_json::from_str(&content).context("Failed to parse attempt memory JSON")?;
        Ok(memory)
    }
}
