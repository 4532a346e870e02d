//! Job specification and interview expansion
//!
//! A job is a survey plus three dimensions: agents, scenarios and models.
//! Dimensions attach through the `by` combinator, whose merge rule depends
//! on the kind being attached. Expansion takes the full cross product, one
//! interview per (agent, scenario, model) triple.

use crate::interview::Interview;
use crate::surveys::Survey;
use sdk::errors::EngineError;
use sdk::types::{Agent, ModelSpec, Scenario};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One dimension's worth of input to `by`.
///
/// The kind is explicit in the variant, so a call site always states which
/// merge rule it is invoking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobInput {
    Agents(Vec<Agent>),
    Scenarios(Vec<Scenario>),
    Models(Vec<ModelSpec>),
}

impl From<Vec<Agent>> for JobInput {
    fn from(agents: Vec<Agent>) -> Self {
        JobInput::Agents(agents)
    }
}

impl From<Agent> for JobInput {
    fn from(agent: Agent) -> Self {
        JobInput::Agents(vec![agent])
    }
}

impl From<Vec<Scenario>> for JobInput {
    fn from(scenarios: Vec<Scenario>) -> Self {
        JobInput::Scenarios(scenarios)
    }
}

impl From<Scenario> for JobInput {
    fn from(scenario: Scenario) -> Self {
        JobInput::Scenarios(vec![scenario])
    }
}

impl From<Vec<ModelSpec>> for JobInput {
    fn from(models: Vec<ModelSpec>) -> Self {
        JobInput::Models(models)
    }
}

impl From<ModelSpec> for JobInput {
    fn from(model: ModelSpec) -> Self {
        JobInput::Models(vec![model])
    }
}

/// A survey with attached agents, scenarios and models, ready to expand
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Jobs {
    pub survey: Survey,
    #[serde(default)]
    pub agents: Vec<Agent>,
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
    #[serde(default)]
    pub models: Vec<ModelSpec>,
}

impl Jobs {
    /// A job over a survey with no dimensions attached yet
    pub fn new(survey: Survey) -> Self {
        Self {
            survey,
            agents: Vec::new(),
            scenarios: Vec::new(),
            models: Vec::new(),
        }
    }

    /// Attach one dimension.
    ///
    /// If the dimension was empty, the input replaces it. Otherwise the
    /// dimension's own merge rule applies pairwise across the cross product:
    /// agents union their traits (overlap is an error), scenarios merge with
    /// new values winning, and models simply replace the previous list.
    pub fn by(mut self, input: impl Into<JobInput>) -> Result<Jobs, EngineError> {
        match input.into() {
            JobInput::Agents(new_agents) => {
                if self.agents.is_empty() {
                    self.agents = new_agents;
                } else {
                    let mut combined = Vec::with_capacity(self.agents.len() * new_agents.len());
                    for existing in &self.agents {
                        for new in &new_agents {
                            combined.push(existing.combine(new)?);
                        }
                    }
                    self.agents = combined;
                }
            }
            JobInput::Scenarios(new_scenarios) => {
                if self.scenarios.is_empty() {
                    self.scenarios = new_scenarios;
                } else {
                    let mut combined =
                        Vec::with_capacity(self.scenarios.len() * new_scenarios.len());
                    for existing in &self.scenarios {
                        for new in &new_scenarios {
                            combined.push(existing.combine(new));
                        }
                    }
                    self.scenarios = combined;
                }
            }
            JobInput::Models(new_models) => {
                self.models = new_models;
            }
        }
        Ok(self)
    }

    fn agents_or_default(&self) -> Vec<Agent> {
        if self.agents.is_empty() {
            vec![Agent::new()]
        } else {
            self.agents.clone()
        }
    }

    fn scenarios_or_default(&self) -> Vec<Scenario> {
        if self.scenarios.is_empty() {
            vec![Scenario::new()]
        } else {
            self.scenarios.clone()
        }
    }

    /// The models this job will run against, defaulting to the example model
    /// when none were attached
    pub fn models_or_default(&self) -> Vec<ModelSpec> {
        if self.models.is_empty() {
            vec![ModelSpec::default()]
        } else {
            self.models.clone()
        }
    }

    /// Expand into one interview per (agent, scenario, model) triple, in
    /// agent-major order. Empty dimensions contribute one neutral element,
    /// so a bare survey still yields one interview.
    pub fn interviews(&self) -> Vec<Interview> {
        let survey = Arc::new(self.survey.clone());
        let scenarios = self.scenarios_or_default();
        let models = self.models_or_default();
        let mut interviews = Vec::new();
        for agent in self.agents_or_default() {
            for scenario in &scenarios {
                for model in &models {
                    interviews.push(Interview::new(
                        Arc::clone(&survey),
                        agent.clone(),
                        scenario.clone(),
                        model.clone(),
                        0,
                    ));
                }
            }
        }
        interviews
    }

    /// Number of interviews one expansion yields
    pub fn interview_count(&self) -> usize {
        self.agents.len().max(1) * self.scenarios.len().max(1) * self.models.len().max(1)
    }

    /// Total questions across one expansion
    pub fn total_questions(&self) -> usize {
        self.interview_count() * self.survey.len()
    }

    /// A small fully populated job: two questions, two scenarios filling the
    /// `{{period}}` placeholder, two agents, one model
    pub fn example() -> Result<Jobs, EngineError> {
        Jobs::new(Survey::example())
            .by(vec![
                Agent::with_traits([("status", "Joyful")]),
                Agent::with_traits([("status", "Sad")]),
            ])?
            .by(vec![
                Scenario::with_values([("period", "morning")]),
                Scenario::with_values([("period", "afternoon")]),
            ])?
            .by(ModelSpec::example())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_by_replaces_empty_dimension() {
        let jobs = Jobs::new(Survey::example())
            .by(vec![Agent::example()])
            .unwrap();
        assert_eq!(jobs.agents.len(), 1);
        assert!(jobs.scenarios.is_empty());
    }

    #[test]
    fn test_by_agents_combines_pairwise() {
        let jobs = Jobs::new(Survey::example())
            .by(vec![
                Agent::with_traits([("status", "Joyful")]),
                Agent::with_traits([("status", "Sad")]),
            ])
            .unwrap()
            .by(vec![
                Agent::with_traits([("age", 20)]),
                Agent::with_traits([("age", 60)]),
            ])
            .unwrap();
        assert_eq!(jobs.agents.len(), 4);
        assert_eq!(jobs.agents[0].traits["status"], "Joyful");
        assert_eq!(jobs.agents[0].traits["age"], 20);
        assert_eq!(jobs.agents[3].traits["status"], "Sad");
        assert_eq!(jobs.agents[3].traits["age"], 60);
    }

    #[test]
    fn test_by_single_agents_fold_into_one() {
        let jobs = Jobs::new(Survey::example())
            .by(Agent::with_traits([("status", "Joyful")]))
            .unwrap()
            .by(Agent::with_traits([("age", 30)]))
            .unwrap();
        assert_eq!(jobs.agents.len(), 1);
        assert_eq!(jobs.agents[0].traits.len(), 2);
    }

    #[test]
    fn test_by_agents_overlap_is_error() {
        let result = Jobs::new(Survey::example())
            .by(vec![Agent::with_traits([("status", "Joyful")])])
            .unwrap()
            .by(vec![Agent::with_traits([("status", "Sad")])]);
        assert!(matches!(result, Err(EngineError::AgentCombination(_))));
    }

    #[test]
    fn test_by_scenarios_new_value_wins() {
        let jobs = Jobs::new(Survey::example())
            .by(vec![Scenario::with_values([("period", json!("morning"))])])
            .unwrap()
            .by(vec![Scenario::with_values([
                ("period", json!("evening")),
                ("place", json!("home")),
            ])])
            .unwrap();
        assert_eq!(jobs.scenarios.len(), 1);
        assert_eq!(jobs.scenarios[0].values["period"], "evening");
        assert_eq!(jobs.scenarios[0].values["place"], "home");
    }

    #[test]
    fn test_by_models_replaces() {
        let jobs = Jobs::new(Survey::example())
            .by(ModelSpec::new("first"))
            .unwrap()
            .by(vec![ModelSpec::new("second"), ModelSpec::new("third")])
            .unwrap();
        assert_eq!(jobs.models.len(), 2);
        assert_eq!(jobs.models[0].name, "second");
    }

    #[test]
    fn test_interviews_is_full_cross_product() {
        let jobs = Jobs::example().unwrap();
        let interviews = jobs.interviews();
        // 2 agents x 2 scenarios x 1 model
        assert_eq!(interviews.len(), 4);
        assert_eq!(jobs.interview_count(), 4);
        assert_eq!(jobs.total_questions(), 8);
    }

    #[test]
    fn test_bare_survey_yields_one_neutral_interview() {
        let jobs = Jobs::new(Survey::example());
        let interviews = jobs.interviews();
        assert_eq!(interviews.len(), 1);
        assert!(interviews[0].agent.traits.is_empty());
        assert!(interviews[0].scenario.values.is_empty());
        assert_eq!(interviews[0].model.name, ModelSpec::default().name);
    }

    #[test]
    fn test_survey_by_sugar() {
        let jobs = Survey::example().by(Agent::example()).unwrap();
        assert_eq!(jobs.agents.len(), 1);
    }

    #[test]
    fn test_jobs_serde_round_trip() {
        let jobs = Jobs::example().unwrap();
        let json = serde_json::to_string(&jobs).unwrap();
        let back: Jobs = serde_json::from_str(&json).unwrap();
        assert_eq!(back.agents, jobs.agents);
        assert_eq!(back.scenarios, jobs.scenarios);
        assert_eq!(back.models, jobs.models);
        assert_eq!(back.survey, jobs.survey);
    }
}
