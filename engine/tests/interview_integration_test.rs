//! Integration tests for interview scheduling and the runner
//!
//! Exercises failure cascades through memory chains, cache-backed re-runs,
//! and cross-product expansion end to end with scripted model clients.

use async_trait::async_trait;
use canvass_engine::cache::Cache;
use canvass_engine::jobs::Jobs;
use canvass_engine::llm::{ModelClient, ModelError, RetryPolicy};
use canvass_engine::runner::{InterviewRunner, RunOptions};
use canvass_engine::surveys::{Question, Survey};
use sdk::types::{Agent, ModelSpec, Scenario};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Answers every question, but the call whose user prompt names a poisoned
/// question fails without retry value.
struct ScriptedClient {
    name: String,
    calls: AtomicU32,
    poisoned: Option<String>,
}

impl ScriptedClient {
    fn new(name: &str, poisoned: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            calls: AtomicU32::new(0),
            poisoned: poisoned.map(String::from),
        })
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
        _parameters: &serde_json::Value,
    ) -> canvass_engine::llm::Result<serde_json::Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(marker) = &self.poisoned {
            if user_prompt.starts_with(marker) {
                return Err(ModelError::InvalidResponse("scripted failure".into()));
            }
        }
        let first_line = user_prompt.lines().next().unwrap_or("");
        Ok(json!({"answer": format!("answer to {}", first_line)}))
    }
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        initial_backoff: std::time::Duration::from_millis(1),
        ..RetryPolicy::default()
    }
}

/// n questions where every question remembers the previous one
fn chained_survey(n: usize) -> Survey {
    let mut survey = Survey::new();
    for i in 0..n {
        survey
            .add_question(Question::new(
                format!("question_{}", i),
                format!("Prompt {}.", i),
            ))
            .unwrap();
        if i > 0 {
            survey
                .add_targeted_memory(&format!("question_{}", i), &format!("question_{}", i - 1))
                .unwrap();
        }
    }
    survey
}

fn clients_for(
    model: &str,
    client: Arc<dyn ModelClient>,
) -> HashMap<String, Arc<dyn ModelClient>> {
    HashMap::from([(model.to_string(), client)])
}

fn single_model_jobs(survey: Survey) -> Jobs {
    Jobs::new(survey).by(ModelSpec::new("scripted")).unwrap()
}

#[tokio::test]
async fn test_failure_cascades_through_a_twenty_question_chain() {
    let client = ScriptedClient::new("scripted", Some("Prompt 5."));
    let runner = InterviewRunner::new(single_model_jobs(chained_survey(20)));
    let results = runner
        .run(
            Cache::new(),
            &clients_for("scripted", client.clone()),
            fast_policy(),
            &RunOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    let record = &results.data[0];
    for i in 0..5 {
        assert!(record.answers[&format!("question_{}", i)].is_some());
    }
    assert!(record.answers["question_5"].is_none());
    for i in 6..20 {
        assert!(record.answers[&format!("question_{}", i)].is_none());
    }
    assert_eq!(record.status.answered, 5);
    assert_eq!(record.status.failed, 1);
    assert_eq!(record.status.skipped, 14);
    // questions 6..19 never reached the model
    assert_eq!(client.calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_unchained_failure_affects_one_question_only() {
    let mut survey = Survey::new();
    for i in 0..20 {
        survey
            .add_question(Question::new(
                format!("question_{}", i),
                format!("Prompt {}.", i),
            ))
            .unwrap();
    }
    let client = ScriptedClient::new("scripted", Some("Prompt 5."));
    let runner = InterviewRunner::new(single_model_jobs(survey));
    let results = runner
        .run(
            Cache::new(),
            &clients_for("scripted", client),
            fast_policy(),
            &RunOptions::default(),
        )
        .await
        .unwrap();

    let record = &results.data[0];
    assert_eq!(record.status.answered, 19);
    assert_eq!(record.status.failed, 1);
    assert_eq!(record.status.skipped, 0);
    assert!(record.answers["question_5"].is_none());
}

#[tokio::test]
async fn test_cached_rerun_makes_no_calls_and_matches_checksum() {
    let cache = Cache::new();
    let client = ScriptedClient::new("scripted", None);
    let jobs = single_model_jobs(chained_survey(5));

    let first = InterviewRunner::new(jobs.clone())
        .run(
            cache.clone(),
            &clients_for("scripted", client.clone()),
            fast_policy(),
            &RunOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(client.calls.load(Ordering::SeqCst), 5);

    let second = InterviewRunner::new(jobs)
        .run(
            cache,
            &clients_for("scripted", client.clone()),
            fast_policy(),
            &RunOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(client.calls.load(Ordering::SeqCst), 5);
    assert_eq!(second.status().cache_hits, 5);
    assert_eq!(first.checksum(), second.checksum());
}

#[tokio::test]
async fn test_cross_product_expansion_counts() {
    let survey = chained_survey(2);
    let jobs = Jobs::new(survey)
        .by(vec![
            Agent::with_traits([("status", "Joyful")]),
            Agent::with_traits([("status", "Sad")]),
        ])
        .unwrap()
        .by(vec![
            Scenario::with_values([("period", "morning")]),
            Scenario::with_values([("period", "evening")]),
        ])
        .unwrap()
        .by(ModelSpec::new("scripted"))
        .unwrap();
    assert_eq!(jobs.interview_count(), 4);
    assert_eq!(jobs.total_questions(), 8);

    let client = ScriptedClient::new("scripted", None);
    let results = InterviewRunner::new(jobs)
        .run(
            Cache::new(),
            &clients_for("scripted", client),
            fast_policy(),
            &RunOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 4);
    assert_eq!(results.status().answered, 8);
    let column = results.select("answer.question_0").unwrap();
    assert_eq!(column.len(), 4);
    assert!(column.iter().all(Option::is_some));
}

#[tokio::test]
async fn test_memory_replays_prior_answer_into_the_prompt() {
    struct PromptCapture {
        prompts: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ModelClient for PromptCapture {
        fn name(&self) -> &str {
            "capture"
        }

        async fn call(
            &self,
            _system_prompt: &str,
            user_prompt: &str,
            _parameters: &serde_json::Value,
        ) -> canvass_engine::llm::Result<serde_json::Value> {
            self.prompts.lock().unwrap().push(user_prompt.to_string());
            Ok(json!({"answer": "Fine"}))
        }
    }

    let client = Arc::new(PromptCapture {
        prompts: std::sync::Mutex::new(Vec::new()),
    });
    let jobs = Jobs::new(Survey::example())
        .by(ModelSpec::new("capture"))
        .unwrap();
    InterviewRunner::new(jobs)
        .run(
            Cache::new(),
            &clients_for("capture", client.clone()),
            fast_policy(),
            &RunOptions::default(),
        )
        .await
        .unwrap();

    let prompts = client.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 2);
    let second = prompts
        .iter()
        .find(|p| p.contains("yesterday"))
        .expect("second question prompt");
    assert!(second.contains("you already answered"));
    assert!(second.contains("Answer: Fine"));
}

#[tokio::test]
async fn test_sqlite_cache_survives_across_runs() {
    let dir = tempfile::TempDir::new().unwrap();
    let db_path = dir.path().join("cache.db");
    let jobs = single_model_jobs(chained_survey(3));
    let client = ScriptedClient::new("scripted", None);

    {
        let cache = Cache::open_sqlite(&db_path, true).await.unwrap();
        InterviewRunner::new(jobs.clone())
            .run(
                cache,
                &clients_for("scripted", client.clone()),
                fast_policy(),
                &RunOptions::default(),
            )
            .await
            .unwrap();
    }
    assert_eq!(client.calls.load(Ordering::SeqCst), 3);

    // a fresh cache handle over the same database serves every answer
    let cache = Cache::open_sqlite(&db_path, true).await.unwrap();
    let results = InterviewRunner::new(jobs)
        .run(
            cache,
            &clients_for("scripted", client.clone()),
            fast_policy(),
            &RunOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    assert_eq!(results.status().cache_hits, 3);
}

#[tokio::test]
async fn test_outcome_statuses_map_to_answers() {
    let client = ScriptedClient::new("scripted", Some("Prompt 1."));
    let runner = InterviewRunner::new(single_model_jobs(chained_survey(3)));
    let results = runner
        .run(
            Cache::new(),
            &clients_for("scripted", client),
            fast_policy(),
            &RunOptions::default(),
        )
        .await
        .unwrap();
    let record = &results.data[0];
    assert!(matches!(
        record.answers.get("question_0"),
        Some(Some(answer)) if answer.contains("Prompt 0.")
    ));
    assert_eq!(record.answers["question_1"], None);
    assert_eq!(record.answers["question_2"], None);
}
