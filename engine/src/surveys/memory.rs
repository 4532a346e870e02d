//! Memory plan: which prior answers each question sees
//!
//! A survey's memory plan records, per question, the prior questions whose
//! answers get replayed into its prompt. The plan also doubles as the
//! dependency graph the interview scheduler runs: a question cannot be asked
//! until every prior it remembers has resolved.

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-question memory of prior answers.
///
/// Priors must come strictly earlier in survey order, so the dependency
/// graph is acyclic by construction. Deserialization rebuilds the plan
/// through the same validating constructors, so a serialized plan carrying
/// a forward or unknown edge fails to parse instead of silently losing the
/// edge at run time.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct MemoryPlan {
    question_order: Vec<String>,
    data: BTreeMap<String, Vec<String>>,
}

#[derive(Deserialize)]
struct MemoryPlanRepr {
    #[serde(default)]
    question_order: Vec<String>,
    #[serde(default)]
    data: BTreeMap<String, Vec<String>>,
}

impl<'de> Deserialize<'de> for MemoryPlan {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let repr = MemoryPlanRepr::deserialize(deserializer)?;
        let mut plan = MemoryPlan::new();
        for name in &repr.question_order {
            plan.register_question(name);
        }
        for (focal, priors) in &repr.data {
            for prior in priors {
                plan.add_single_memory(focal, prior)
                    .map_err(serde::de::Error::custom)?;
            }
        }
        Ok(plan)
    }
}

impl MemoryPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a question name at the end of the survey order. Called as
    /// questions are added to the survey, before any memory edges reference
    /// them.
    pub fn register_question(&mut self, name: &str) {
        self.question_order.push(name.to_string());
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.question_order.iter().position(|q| q == name)
    }

    /// Give `focal` the answer to `prior` when it is asked.
    ///
    /// Both names must be registered, and `prior` must come strictly before
    /// `focal` in survey order. Adding the same edge twice is a no-op.
    pub fn add_single_memory(&mut self, focal: &str, prior: &str) -> Result<(), EngineError> {
        let focal_pos = self
            .position(focal)
            .ok_or_else(|| EngineError::UnknownQuestion(focal.to_string()))?;
        let prior_pos = self
            .position(prior)
            .ok_or_else(|| EngineError::UnknownQuestion(prior.to_string()))?;
        if prior_pos >= focal_pos {
            return Err(EngineError::OrderViolation {
                focal: focal.to_string(),
                prior: prior.to_string(),
            });
        }
        let priors = self.data.entry(focal.to_string()).or_default();
        if !priors.iter().any(|p| p == prior) {
            priors.push(prior.to_string());
        }
        Ok(())
    }

    /// Give `focal` the answers to every question in `priors`. Fails on the
    /// first invalid edge; edges validated before it are kept.
    pub fn add_memory_collection<'a>(
        &mut self,
        focal: &str,
        priors: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), EngineError> {
        for prior in priors {
            self.add_single_memory(focal, prior)?;
        }
        Ok(())
    }

    /// The registered question names in survey order
    pub(crate) fn order(&self) -> &[String] {
        &self.question_order
    }

    /// The priors `focal` remembers, in the order they were added
    pub fn prior_questions(&self, focal: &str) -> &[String] {
        self.data.get(focal).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether any question has memory edges
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
