//! Surveys: ordered question lists plus their memory plan
//!
//! A survey is the unit the rest of the engine works over: the job expander
//! crosses a survey with agents, scenarios and models, and each interview
//! asks the survey's questions respecting its memory plan.

mod memory;

pub use memory::MemoryPlan;

use crate::jobs::{JobInput, Jobs};
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};

/// A single free-text question
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    /// Unique name within the survey, used as the answer key
    pub name: String,
    /// The text presented to the model, possibly with `{{placeholder}}`
    /// slots filled from the scenario
    pub text: String,
}

impl Question {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// An ordered list of uniquely named questions with a memory plan.
///
/// Deserialization goes through `add_question`, so a serialized survey with
/// duplicate names, or a memory plan whose question order disagrees with the
/// question list, fails to parse.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Survey {
    /// Optional display name
    pub name: Option<String>,
    questions: Vec<Question>,
    memory_plan: MemoryPlan,
}

#[derive(Deserialize)]
struct SurveyRepr {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    questions: Vec<Question>,
    #[serde(default)]
    memory_plan: MemoryPlan,
}

impl<'de> Deserialize<'de> for Survey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        let repr = SurveyRepr::deserialize(deserializer)?;
        let mut survey = Survey {
            name: repr.name,
            ..Survey::default()
        };
        for question in repr.questions {
            survey.add_question(question).map_err(Error::custom)?;
        }
        // An omitted plan stays empty; a carried one must list the same
        // questions in the same order, or its edge positions mean nothing.
        if !(repr.memory_plan.order().is_empty() && repr.memory_plan.is_empty()) {
            if repr.memory_plan.order() != survey.memory_plan.order() {
                return Err(Error::custom(
                    "memory plan question order does not match the survey's questions",
                ));
            }
            survey.memory_plan = repr.memory_plan;
        }
        Ok(survey)
    }
}

impl Survey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Append a question. Names must be unique within the survey.
    pub fn add_question(&mut self, question: Question) -> Result<(), EngineError> {
        if self.questions.iter().any(|q| q.name == question.name) {
            return Err(EngineError::DuplicateQuestion(question.name));
        }
        self.memory_plan.register_question(&question.name);
        self.questions.push(question);
        Ok(())
    }

    /// Give `focal` the answer to `prior` when it is asked
    pub fn add_targeted_memory(&mut self, focal: &str, prior: &str) -> Result<(), EngineError> {
        self.memory_plan.add_single_memory(focal, prior)
    }

    /// Give `focal` the answers to every question in `priors`
    pub fn add_memory_collection<'a>(
        &mut self,
        focal: &str,
        priors: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), EngineError> {
        self.memory_plan.add_memory_collection(focal, priors)
    }

    /// Questions in survey order
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Question names in survey order
    pub fn question_names(&self) -> Vec<String> {
        self.questions.iter().map(|q| q.name.clone()).collect()
    }

    /// Look up a question by name
    pub fn question(&self, name: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.name == name)
    }

    pub fn memory_plan(&self) -> &MemoryPlan {
        &self.memory_plan
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Start a job from this survey and attach the first dimension.
    /// Equivalent to `Jobs::new(survey).by(input)`.
    pub fn by(self, input: impl Into<JobInput>) -> Result<Jobs, EngineError> {
        Jobs::new(self).by(input)
    }

    /// A two-question survey where the second question remembers the first
    pub fn example() -> Self {
        let mut survey = Survey::with_name("example");
        // Survey construction on fixed inputs cannot collide names.
        let _ = survey.add_question(Question::new(
            "how_feeling",
            "How are you feeling {{period}}?",
        ));
        let _ = survey.add_question(Question::new(
            "how_feeling_yesterday",
            "How were you feeling yesterday {{period}}?",
        ));
        let _ = survey.add_targeted_memory("how_feeling_yesterday", "how_feeling");
        survey
    }
}
