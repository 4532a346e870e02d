//! One interview: one agent answering one survey against one model
//!
//! Each question becomes an async task. Tasks are built in survey order, so
//! a question's memory priors (always earlier in the order) already exist as
//! shared futures when the question is constructed; the task awaits them all
//! before running. Questions with no edge between them run concurrently,
//! bounded only by the model's admission buckets.
//!
//! A question whose prior failed or was skipped is skipped itself, so a
//! failure cascades through everything downstream of it; independent
//! questions are unaffected.

mod prompts;

pub use prompts::{render_template, system_prompt, user_prompt};

use crate::buckets::ModelBuckets;
use crate::cache::Cache;
use crate::llm::{call_with_retry, parse_answer, ModelClient, RetryPolicy};
use crate::runner::RunProgress;
use crate::surveys::{Question, Survey};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use sdk::types::{Agent, ModelSpec, Scenario};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Terminal state of one question task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The model produced a parseable answer
    Answered { answer: String, from_cache: bool },
    /// The call or answer parsing failed after retries
    Failed { error: String },
    /// A memory prior did not resolve to an answer, or the run was cancelled
    Skipped,
}

/// Outcome counts for one finished interview
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct InterviewStatus {
    pub answered: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cache_hits: usize,
}

impl InterviewStatus {
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a TaskOutcome>) -> Self {
        let mut status = Self::default();
        for outcome in outcomes {
            match outcome {
                TaskOutcome::Answered { from_cache, .. } => {
                    status.answered += 1;
                    if *from_cache {
                        status.cache_hits += 1;
                    }
                }
                TaskOutcome::Failed { .. } => status.failed += 1,
                TaskOutcome::Skipped => status.skipped += 1,
            }
        }
        status
    }
}

/// Shared run services an interview executes against
#[derive(Clone)]
pub struct InterviewContext {
    pub cache: Cache,
    pub buckets: Arc<ModelBuckets>,
    pub client: Arc<dyn ModelClient>,
    pub policy: RetryPolicy,
    pub cancel: Arc<AtomicBool>,
    pub progress: Option<Arc<RunProgress>>,
}

/// One (survey, agent, scenario, model, iteration) combination
#[derive(Debug, Clone)]
pub struct Interview {
    pub survey: Arc<Survey>,
    pub agent: Agent,
    pub scenario: Scenario,
    pub model: ModelSpec,
    pub iteration: u32,
}

type SharedOutcome = Shared<BoxFuture<'static, TaskOutcome>>;

struct QuestionEnv {
    ctx: InterviewContext,
    survey: Arc<Survey>,
    agent: Agent,
    scenario: Scenario,
    model: ModelSpec,
    parameters: serde_json::Value,
    iteration: u32,
}

impl Interview {
    pub fn new(
        survey: Arc<Survey>,
        agent: Agent,
        scenario: Scenario,
        model: ModelSpec,
        iteration: u32,
    ) -> Self {
        Self {
            survey,
            agent,
            scenario,
            model,
            iteration,
        }
    }

    /// Ask every question, respecting the memory plan, and return each
    /// question's terminal outcome keyed by question name.
    pub async fn conduct(&self, ctx: InterviewContext) -> BTreeMap<String, TaskOutcome> {
        let env = Arc::new(QuestionEnv {
            ctx,
            survey: Arc::clone(&self.survey),
            agent: self.agent.clone(),
            scenario: self.scenario.clone(),
            parameters: self.model.parameters_json(),
            model: self.model.clone(),
            iteration: self.iteration,
        });

        // Built in survey order: every memory prior is earlier in the order,
        // so its shared future already exists when its dependent is built.
        let mut tasks: HashMap<String, SharedOutcome> = HashMap::new();
        let mut ordered: Vec<(String, SharedOutcome)> = Vec::new();
        for question in self.survey.questions() {
            let priors: Vec<(String, SharedOutcome)> = self
                .survey
                .memory_plan()
                .prior_questions(&question.name)
                .iter()
                .filter_map(|p| tasks.get(p).map(|t| (p.clone(), t.clone())))
                .collect();
            let task = run_question(Arc::clone(&env), question.clone(), priors)
                .boxed()
                .shared();
            tasks.insert(question.name.clone(), task.clone());
            ordered.push((question.name.clone(), task));
        }

        let outcomes =
            futures::future::join_all(ordered.iter().map(|(_, task)| task.clone())).await;
        ordered
            .into_iter()
            .map(|(name, _)| name)
            .zip(outcomes)
            .collect()
    }
}

async fn run_question(
    env: Arc<QuestionEnv>,
    question: Question,
    priors: Vec<(String, SharedOutcome)>,
) -> TaskOutcome {
    // Await memory priors first; any non-answer upstream skips this question.
    let mut memory: Vec<(String, String)> = Vec::new();
    for (prior_name, task) in priors {
        match task.await {
            TaskOutcome::Answered { answer, .. } => {
                let text = env
                    .survey
                    .question(&prior_name)
                    .map(|q| q.text.clone())
                    .unwrap_or_else(|| prior_name.clone());
                memory.push((render_template(&text, &env.scenario), answer));
            }
            _ => {
                debug!(
                    question = %question.name,
                    prior = %prior_name,
                    "skipping: memory prior did not produce an answer"
                );
                record_outcome(&env, &TaskOutcome::Skipped);
                return TaskOutcome::Skipped;
            }
        }
    }

    if env.ctx.cancel.load(Ordering::SeqCst) {
        record_outcome(&env, &TaskOutcome::Skipped);
        return TaskOutcome::Skipped;
    }

    let system = system_prompt(&env.agent);
    let rendered = render_template(&question.text, &env.scenario);
    let user = user_prompt(&rendered, &memory);

    if let Some(raw) = env.ctx.cache.fetch(
        &env.model.name,
        &env.parameters,
        &system,
        &user,
        env.iteration,
    ) {
        match serde_json::from_str::<serde_json::Value>(&raw).map_err(|e| e.to_string()) {
            Ok(value) => {
                if let Ok(answer) = parse_answer(&value) {
                    let outcome = TaskOutcome::Answered {
                        answer,
                        from_cache: true,
                    };
                    record_outcome(&env, &outcome);
                    return outcome;
                }
                warn!(question = %question.name, "cached response has no answer, re-asking");
            }
            Err(e) => {
                warn!(question = %question.name, "unreadable cache entry ({}), re-asking", e);
            }
        }
    }

    // One request plus a character-based token estimate through the model's
    // shared buckets.
    let token_estimate = ((system.len() + user.len()) as f64 / 4.0).max(1.0);
    if let Err(e) = env.ctx.buckets.requests.get_tokens(1.0).await {
        let outcome = TaskOutcome::Failed {
            error: e.to_string(),
        };
        record_outcome(&env, &outcome);
        return outcome;
    }
    if let Err(e) = env.ctx.buckets.tokens.get_tokens(token_estimate).await {
        // no call happens, so the request slot already taken goes back
        env.ctx.buckets.requests.add_tokens(1.0);
        let outcome = TaskOutcome::Failed {
            error: e.to_string(),
        };
        record_outcome(&env, &outcome);
        return outcome;
    }

    if let Some(progress) = &env.ctx.progress {
        progress.call_started(&env.model.name);
    }
    let result = call_with_retry(
        env.ctx.client.as_ref(),
        &system,
        &user,
        &env.parameters,
        &env.ctx.policy,
    )
    .await;
    if let Some(progress) = &env.ctx.progress {
        progress.call_finished(&env.model.name);
    }

    let raw = match result {
        Ok(raw) => raw,
        Err(e) => {
            let outcome = TaskOutcome::Failed {
                error: e.to_string(),
            };
            record_outcome(&env, &outcome);
            return outcome;
        }
    };

    let answer = match parse_answer(&raw) {
        Ok(answer) => answer,
        Err(e) => {
            // Unparseable responses are not cached: a re-run should re-ask.
            let outcome = TaskOutcome::Failed {
                error: e.to_string(),
            };
            record_outcome(&env, &outcome);
            return outcome;
        }
    };

    if let Err(e) = env
        .ctx
        .cache
        .store(
            &env.model.name,
            &env.parameters,
            &system,
            &user,
            &raw,
            env.iteration,
        )
        .await
    {
        warn!(question = %question.name, "failed to cache response: {}", e);
    }

    let outcome = TaskOutcome::Answered {
        answer,
        from_cache: false,
    };
    record_outcome(&env, &outcome);
    outcome
}

fn record_outcome(env: &QuestionEnv, outcome: &TaskOutcome) {
    if let Some(progress) = &env.ctx.progress {
        progress.record_outcome(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ModelError;
    use crate::surveys::Question;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    /// Echoes a canned answer per question, optionally failing on specific
    /// user prompts.
    struct ScriptedClient {
        calls: AtomicU32,
        fail_when_contains: Option<String>,
    }

    impl ScriptedClient {
        fn answering() -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_when_contains: None,
            }
        }

        fn failing_on(text: &str) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_when_contains: Some(text.to_string()),
            }
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedClient {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn call(
            &self,
            _system_prompt: &str,
            user_prompt: &str,
            _parameters: &serde_json::Value,
        ) -> crate::llm::Result<serde_json::Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(marker) = &self.fail_when_contains {
                if user_prompt.contains(marker) {
                    return Err(ModelError::InvalidResponse("scripted failure".into()));
                }
            }
            Ok(json!({"answer": format!("echo: {}", user_prompt.lines().next().unwrap_or(""))}))
        }
    }

    fn context(client: Arc<dyn ModelClient>, cache: Cache) -> InterviewContext {
        InterviewContext {
            cache,
            buckets: Arc::new(ModelBuckets::for_model(&ModelSpec::default())),
            client,
            policy: RetryPolicy {
                initial_backoff: std::time::Duration::from_millis(1),
                ..RetryPolicy::default()
            },
            cancel: Arc::new(AtomicBool::new(false)),
            progress: None,
        }
    }

    fn chained_survey(n: usize) -> Survey {
        let mut survey = Survey::new();
        for i in 0..n {
            survey
                .add_question(Question::new(format!("q{}", i), format!("Question {}?", i)))
                .unwrap();
            if i > 0 {
                survey
                    .add_targeted_memory(&format!("q{}", i), &format!("q{}", i - 1))
                    .unwrap();
            }
        }
        survey
    }

    fn interview(survey: Survey) -> Interview {
        Interview::new(
            Arc::new(survey),
            Agent::example(),
            Scenario::example(),
            ModelSpec::default(),
            0,
        )
    }

    #[tokio::test]
    async fn test_all_questions_answered() {
        let client = Arc::new(ScriptedClient::answering());
        let outcomes = interview(chained_survey(3))
            .conduct(context(client, Cache::new()))
            .await;
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes
            .values()
            .all(|o| matches!(o, TaskOutcome::Answered { from_cache: false, .. })));
    }

    #[tokio::test]
    async fn test_failure_cascades_down_the_chain() {
        let client = Arc::new(ScriptedClient::failing_on("Question 1?"));
        let outcomes = interview(chained_survey(4))
            .conduct(context(client, Cache::new()))
            .await;
        assert!(matches!(outcomes["q0"], TaskOutcome::Answered { .. }));
        assert!(matches!(outcomes["q1"], TaskOutcome::Failed { .. }));
        assert_eq!(outcomes["q2"], TaskOutcome::Skipped);
        assert_eq!(outcomes["q3"], TaskOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_independent_questions_unaffected_by_failure() {
        let mut survey = Survey::new();
        for i in 0..3 {
            survey
                .add_question(Question::new(format!("q{}", i), format!("Question {}?", i)))
                .unwrap();
        }
        let client = Arc::new(ScriptedClient::failing_on("Question 1?"));
        let outcomes = interview(survey).conduct(context(client, Cache::new())).await;
        assert!(matches!(outcomes["q0"], TaskOutcome::Answered { .. }));
        assert!(matches!(outcomes["q1"], TaskOutcome::Failed { .. }));
        assert!(matches!(outcomes["q2"], TaskOutcome::Answered { .. }));
    }

    #[tokio::test]
    async fn test_second_run_served_from_cache() {
        let cache = Cache::new();
        let first_client = Arc::new(ScriptedClient::answering());
        interview(chained_survey(3))
            .conduct(context(first_client.clone(), cache.clone()))
            .await;
        assert_eq!(first_client.calls.load(Ordering::SeqCst), 3);

        let second_client = Arc::new(ScriptedClient::answering());
        let outcomes = interview(chained_survey(3))
            .conduct(context(second_client.clone(), cache))
            .await;
        assert_eq!(second_client.calls.load(Ordering::SeqCst), 0);
        assert!(outcomes
            .values()
            .all(|o| matches!(o, TaskOutcome::Answered { from_cache: true, .. })));
    }

    #[tokio::test]
    async fn test_different_iterations_do_not_share_cache() {
        let cache = Cache::new();
        let client = Arc::new(ScriptedClient::answering());
        interview(chained_survey(1))
            .conduct(context(client.clone(), cache.clone()))
            .await;

        let mut second = interview(chained_survey(1));
        second.iteration = 1;
        second.conduct(context(client.clone(), cache)).await;
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_request_slot_returned_when_token_bucket_rejects() {
        use sdk::types::RateLimits;

        // token bucket too small for any prompt estimate: the question fails
        // without a call, and the request bucket ends up untouched
        let spec = ModelSpec::default().with_limits(RateLimits { rpm: 500.0, tpm: 1.0 });
        let buckets = Arc::new(ModelBuckets::for_model(&spec));
        let ctx = InterviewContext {
            cache: Cache::new(),
            buckets: Arc::clone(&buckets),
            client: Arc::new(ScriptedClient::answering()),
            policy: RetryPolicy::default(),
            cancel: Arc::new(AtomicBool::new(false)),
            progress: None,
        };
        let outcomes = interview(chained_survey(1)).conduct(ctx).await;
        assert!(matches!(outcomes["q0"], TaskOutcome::Failed { .. }));
        assert!(buckets.requests.available() >= 500.0 - 1e-6);
    }

    #[tokio::test]
    async fn test_cancel_skips_everything() {
        let client = Arc::new(ScriptedClient::answering());
        let ctx = context(client.clone(), Cache::new());
        ctx.cancel.store(true, Ordering::SeqCst);
        let outcomes = interview(chained_survey(3)).conduct(ctx).await;
        assert!(outcomes.values().all(|o| *o == TaskOutcome::Skipped));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_scenario_rendering_reaches_the_model() {
        let mut survey = Survey::new();
        survey
            .add_question(Question::new("q0", "How is the {{period}}?"))
            .unwrap();
        let client = Arc::new(ScriptedClient::answering());
        let outcomes = interview(survey).conduct(context(client, Cache::new())).await;
        match &outcomes["q0"] {
            TaskOutcome::Answered { answer, .. } => {
                assert_eq!(answer, "echo: How is the morning?");
            }
            other => panic!("expected answer, got {:?}", other),
        }
    }

    #[test]
    fn test_status_counts() {
        let outcomes = [
            TaskOutcome::Answered {
                answer: "a".into(),
                from_cache: true,
            },
            TaskOutcome::Answered {
                answer: "b".into(),
                from_cache: false,
            },
            TaskOutcome::Failed { error: "e".into() },
            TaskOutcome::Skipped,
        ];
        let status = InterviewStatus::from_outcomes(outcomes.iter());
        assert_eq!(status.answered, 2);
        assert_eq!(status.cache_hits, 1);
        assert_eq!(status.failed, 1);
        assert_eq!(status.skipped, 1);
    }
}
