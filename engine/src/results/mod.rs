//! Run results: one record per finished interview
//!
//! An interview result keeps the combination it ran under, the answer per
//! question (`None` for failed or skipped), and the outcome counts. The
//! collection offers dotted-path selection over answers and a content
//! checksum for comparing runs.

use crate::interview::{InterviewStatus, TaskOutcome};
use sdk::errors::EngineError;
use sdk::types::{Agent, ModelSpec, Scenario};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// What one interview produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewResult {
    pub agent: Agent,
    pub scenario: Scenario,
    pub model: ModelSpec,
    pub iteration: u32,
    /// Answer per question name; `None` when the question failed or was
    /// skipped
    pub answers: BTreeMap<String, Option<String>>,
    pub status: InterviewStatus,
}

impl InterviewResult {
    /// Build a result record from an interview's terminal outcomes
    pub fn from_outcomes(
        agent: Agent,
        scenario: Scenario,
        model: ModelSpec,
        iteration: u32,
        outcomes: BTreeMap<String, TaskOutcome>,
    ) -> Self {
        let status = InterviewStatus::from_outcomes(outcomes.values());
        let answers = outcomes
            .into_iter()
            .map(|(name, outcome)| {
                let answer = match outcome {
                    TaskOutcome::Answered { answer, .. } => Some(answer),
                    _ => None,
                };
                (name, answer)
            })
            .collect();
        Self {
            agent,
            scenario,
            model,
            iteration,
            answers,
            status,
        }
    }
}

/// All interview results from one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Results {
    pub data: Vec<InterviewResult>,
}

impl Results {
    pub fn new(data: Vec<InterviewResult>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Summed outcome counts across all interviews
    pub fn status(&self) -> InterviewStatus {
        let mut total = InterviewStatus::default();
        for result in &self.data {
            total.answered += result.status.answered;
            total.failed += result.status.failed;
            total.skipped += result.status.skipped;
            total.cache_hits += result.status.cache_hits;
        }
        total
    }

    /// Select one column by dotted path, e.g. `"answer.how_feeling"`.
    /// One element per interview, in run order.
    pub fn select(&self, path: &str) -> Result<Vec<Option<String>>, EngineError> {
        let question = path.strip_prefix("answer.").ok_or_else(|| {
            EngineError::JobSpec(format!(
                "unsupported select path '{}', expected 'answer.<question>'",
                path
            ))
        })?;
        if !self.data.is_empty() && !self.data[0].answers.contains_key(question) {
            return Err(EngineError::UnknownQuestion(question.to_string()));
        }
        Ok(self
            .data
            .iter()
            .map(|r| r.answers.get(question).cloned().flatten())
            .collect())
    }

    /// The first interview's value for a dotted path
    pub fn first(&self, path: &str) -> Result<Option<String>, EngineError> {
        Ok(self.select(path)?.into_iter().next().flatten())
    }

    /// SHA-256 over the canonical answer listing, for comparing two runs of
    /// the same job without comparing record by record.
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        for result in &self.data {
            for (question, answer) in &result.answers {
                hasher.update(question.as_bytes());
                hasher.update([0u8]);
                match answer {
                    Some(a) => hasher.update(a.as_bytes()),
                    None => hasher.update(b"\x01"),
                }
                hasher.update([0u8]);
            }
        }
        hex::encode(hasher.finalize())
    }

    /// Write one JSON record per interview
    pub fn export_jsonl(&self, path: &Path) -> anyhow::Result<()> {
        use anyhow::Context;
        let mut file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        for result in &self.data {
            let line = serde_json::to_string(result).context("Failed to serialize result")?;
            writeln!(file, "{}", line)?;
        }
        Ok(())
    }
}
