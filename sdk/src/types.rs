//! Agent, scenario and model specification types
//!
//! These are the three entity kinds a job specification is built from. Each
//! carries its own combination rule, used by the job expander's `by`
//! combinator:
//!
//! - **Agents** merge their trait maps; overlapping trait keys are an error.
//! - **Scenarios** merge their fields; new values overwrite old on collision.
//! - **Models** do not merge at all; a new model replaces the old one.

use crate::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A persona answering the survey, described by a map of traits.
///
/// Trait maps use a `BTreeMap` so that prompt rendering and serialization are
/// deterministic regardless of insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Agent {
    /// Trait name -> trait value (e.g. "status" -> "Joyful")
    #[serde(default)]
    pub traits: BTreeMap<String, serde_json::Value>,
}

impl Agent {
    /// Create an agent with no traits
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an agent from an iterator of (trait, value) pairs
    pub fn with_traits<I, K, V>(traits: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        Self {
            traits: traits
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Combine two agents into one with the union of their traits.
    ///
    /// Fails with `AgentCombination` if the two agents share a trait key;
    /// silently preferring one side would hide a misconstructed job.
    pub fn combine(&self, other: &Agent) -> Result<Agent, EngineError> {
        let mut traits = self.traits.clone();
        for (key, value) in &other.traits {
            if traits.contains_key(key) {
                return Err(EngineError::AgentCombination(key.clone()));
            }
            traits.insert(key.clone(), value.clone());
        }
        Ok(Agent { traits })
    }

    /// An example agent for docs and tests
    pub fn example() -> Self {
        Self::with_traits([("status", "Joyful")])
    }
}

/// A set of values substituted into question text (`{{ key }}` placeholders).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Scenario {
    /// Placeholder name -> substituted value
    #[serde(default)]
    pub values: BTreeMap<String, serde_json::Value>,
}

impl Scenario {
    /// Create an empty scenario
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scenario from an iterator of (key, value) pairs
    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Combine two scenarios; on key collision the new scenario wins.
    pub fn combine(&self, other: &Scenario) -> Scenario {
        let mut values = self.values.clone();
        for (key, value) in &other.values {
            values.insert(key.clone(), value.clone());
        }
        Scenario { values }
    }

    /// An example scenario for docs and tests
    pub fn example() -> Self {
        Self::with_values([("period", "morning")])
    }
}

/// Published per-minute rate limits for a model endpoint.
///
/// These seed the per-model token buckets: `rpm` caps requests per minute,
/// `tpm` caps prompt tokens per minute. Both are bucket capacities as well as
/// refill amounts per minute.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RateLimits {
    /// Requests per minute
    pub rpm: f64,
    /// Tokens per minute
    pub tpm: f64,
}

impl Default for RateLimits {
    fn default() -> Self {
        // Conservative defaults; real limits come from config overrides.
        Self {
            rpm: 500.0,
            tpm: 200_000.0,
        }
    }
}

/// A language model selection: endpoint name plus call parameters and the
/// endpoint's published rate limits.
///
/// Two interviews referencing the same `name` share one bucket pair for the
/// whole run, so the aggregate call rate respects the endpoint limits no
/// matter how many interviews run concurrently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelSpec {
    /// Model endpoint identity (e.g. "gpt-4-1106-preview")
    pub name: String,

    /// Call parameters (temperature, max_tokens, ...), part of the cache key
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,

    /// Published rate limits for this endpoint
    #[serde(default)]
    pub limits: RateLimits,
}

impl ModelSpec {
    /// Create a model spec with default parameters and limits
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: BTreeMap::new(),
            limits: RateLimits::default(),
        }
    }

    /// Set a call parameter
    pub fn with_parameter(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Set the endpoint rate limits
    pub fn with_limits(mut self, limits: RateLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Call parameters as a JSON value, for cache keys and transport
    pub fn parameters_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.parameters).unwrap_or_else(|_| serde_json::json!({}))
    }

    /// An example model spec for docs and tests
    pub fn example() -> Self {
        Self::new("gpt-4-1106-preview").with_parameter("temperature", 0.5)
    }
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self::example()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_combine_disjoint() {
        let a = Agent::with_traits([("status", "Joyful")]);
        let b = Agent::with_traits([("age", 30)]);
        let combined = a.combine(&b).unwrap();
        assert_eq!(combined.traits.len(), 2);
        assert_eq!(combined.traits["status"], "Joyful");
        assert_eq!(combined.traits["age"], 30);
    }

    #[test]
    fn test_agent_combine_overlap_fails() {
        let a = Agent::with_traits([("status", "Joyful")]);
        let b = Agent::with_traits([("status", "Grumpy")]);
        assert!(a.combine(&b).is_err());
    }

    #[test]
    fn test_scenario_combine_new_wins() {
        let a = Scenario::with_values([("price", 100)]);
        let b = Scenario::with_values([("price", 200), ("quantity", 2)]);
        let combined = a.combine(&b);
        assert_eq!(combined.values["price"], 200);
        assert_eq!(combined.values["quantity"], 2);
    }

    #[test]
    fn test_model_spec_serde_roundtrip() {
        let spec = ModelSpec::example();
        let json = serde_json::to_string(&spec).unwrap();
        let back: ModelSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(spec, back);
    }

    #[test]
    fn test_agent_traits_deterministic_order() {
        let a = Agent::with_traits([("b", 1), ("a", 2)]);
        let keys: Vec<_> = a.traits.keys().cloned().collect();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }
}
