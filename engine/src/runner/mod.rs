//! Concurrent execution of an expanded job
//!
//! The runner expands a job into interviews, fans them out with a bounded
//! concurrency limit, and shares one cache and one bucket collection across
//! all of them. Progress counters update live; a cancel flag stops new work
//! while letting in-flight model calls finish and cache their responses.

use crate::buckets::BucketCollection;
use crate::cache::Cache;
use crate::interview::{InterviewContext, TaskOutcome};
use crate::jobs::Jobs;
use crate::llm::{ModelClient, RetryPolicy};
use crate::results::{InterviewResult, Results};
use futures::StreamExt;
use sdk::errors::EngineError;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

/// Knobs for one run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// How many times to repeat every interview (distinct cache iterations)
    pub repetitions: u32,
    /// Interviews in flight at once
    pub max_concurrent_interviews: usize,
    /// Log a progress snapshot every few seconds
    pub progress: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            repetitions: 1,
            max_concurrent_interviews: 16,
            progress: false,
        }
    }
}

/// Live counters for a run, shared with every question task
#[derive(Debug, Default)]
pub struct RunProgress {
    total_interviews: AtomicUsize,
    completed_interviews: AtomicUsize,
    answered: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    cache_hits: AtomicUsize,
    in_flight: Mutex<HashMap<String, usize>>,
}

/// Point-in-time copy of the run counters
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total_interviews: usize,
    pub completed_interviews: usize,
    pub answered: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cache_hits: usize,
    /// Live model calls per model name
    pub in_flight: HashMap<String, usize>,
}

impl RunProgress {
    fn set_total(&self, total: usize) {
        self.total_interviews.store(total, Ordering::SeqCst);
    }

    fn interview_completed(&self) {
        self.completed_interviews.fetch_add(1, Ordering::SeqCst);
    }

    /// Count one question's terminal outcome
    pub fn record_outcome(&self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Answered { from_cache, .. } => {
                self.answered.fetch_add(1, Ordering::SeqCst);
                if *from_cache {
                    self.cache_hits.fetch_add(1, Ordering::SeqCst);
                }
            }
            TaskOutcome::Failed { .. } => {
                self.failed.fetch_add(1, Ordering::SeqCst);
            }
            TaskOutcome::Skipped => {
                self.skipped.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// A live model call started for `model`
    pub fn call_started(&self, model: &str) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            *in_flight.entry(model.to_string()).or_insert(0) += 1;
        }
    }

    /// A live model call for `model` returned
    pub fn call_finished(&self, model: &str) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            if let Some(count) = in_flight.get_mut(model) {
                *count = count.saturating_sub(1);
            }
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let in_flight = self
            .in_flight
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default();
        ProgressSnapshot {
            total_interviews: self.total_interviews.load(Ordering::SeqCst),
            completed_interviews: self.completed_interviews.load(Ordering::SeqCst),
            answered: self.answered.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            cache_hits: self.cache_hits.load(Ordering::SeqCst),
            in_flight,
        }
    }
}

/// Runs all interviews of a job to completion
pub struct InterviewRunner {
    jobs: Jobs,
    cancel: Arc<AtomicBool>,
    progress: Arc<RunProgress>,
}

impl InterviewRunner {
    pub fn new(jobs: Jobs) -> Self {
        Self {
            jobs,
            cancel: Arc::new(AtomicBool::new(false)),
            progress: Arc::new(RunProgress::default()),
        }
    }

    /// Flag that stops questions which have not started yet. In-flight model
    /// calls complete and cache their responses.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Live counters, readable while `run` is executing
    pub fn progress(&self) -> Arc<RunProgress> {
        Arc::clone(&self.progress)
    }

    /// Run every interview (times `repetitions`) and collect results in
    /// expansion order. The cache is flushed before returning.
    pub async fn run(
        &self,
        cache: Cache,
        clients: &HashMap<String, Arc<dyn ModelClient>>,
        policy: RetryPolicy,
        options: &RunOptions,
    ) -> Result<Results, EngineError> {
        let models = self.jobs.models_or_default();
        let buckets = Arc::new(BucketCollection::from_models(models.iter()));

        let mut interviews = Vec::new();
        for rep in 0..options.repetitions.max(1) {
            for mut interview in self.jobs.interviews() {
                interview.iteration = rep;
                interviews.push(interview);
            }
        }
        self.progress.set_total(interviews.len());
        info!(
            interviews = interviews.len(),
            models = models.len(),
            "starting run"
        );

        let mut contexts = Vec::with_capacity(interviews.len());
        for interview in &interviews {
            let client = clients
                .get(&interview.model.name)
                .ok_or_else(|| {
                    EngineError::JobSpec(format!(
                        "no client configured for model '{}'",
                        interview.model.name
                    ))
                })?
                .clone();
            let model_buckets = buckets.get(&interview.model.name).ok_or_else(|| {
                EngineError::JobSpec(format!(
                    "no buckets for model '{}'",
                    interview.model.name
                ))
            })?;
            contexts.push(InterviewContext {
                cache: cache.clone(),
                buckets: model_buckets,
                client,
                policy: policy.clone(),
                cancel: Arc::clone(&self.cancel),
                progress: Some(Arc::clone(&self.progress)),
            });
        }

        let reporter = options.progress.then(|| {
            let progress = Arc::clone(&self.progress);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(5));
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let snap = progress.snapshot();
                    info!(
                        completed = snap.completed_interviews,
                        total = snap.total_interviews,
                        answered = snap.answered,
                        failed = snap.failed,
                        skipped = snap.skipped,
                        cache_hits = snap.cache_hits,
                        "run progress"
                    );
                }
            })
        });

        let progress = Arc::clone(&self.progress);
        let mut indexed: Vec<(usize, InterviewResult)> =
            futures::stream::iter(interviews.into_iter().zip(contexts).enumerate())
                .map(|(index, (interview, ctx))| {
                    let progress = Arc::clone(&progress);
                    async move {
                        let outcomes = interview.conduct(ctx).await;
                        progress.interview_completed();
                        let result = InterviewResult::from_outcomes(
                            interview.agent,
                            interview.scenario,
                            interview.model,
                            interview.iteration,
                            outcomes,
                        );
                        (index, result)
                    }
                })
                .buffer_unordered(options.max_concurrent_interviews.max(1))
                .collect()
                .await;

        if let Some(handle) = reporter {
            handle.abort();
        }

        if let Err(e) = cache.flush().await {
            warn!("cache flush failed: {:#}", e);
        }

        // Results come back in completion order; restore expansion order so
        // two runs of the same job compare cleanly.
        indexed.sort_by_key(|(index, _)| *index);
        let results = Results::new(indexed.into_iter().map(|(_, r)| r).collect());
        let status = results.status();
        info!(
            answered = status.answered,
            failed = status.failed,
            skipped = status.skipped,
            cache_hits = status.cache_hits,
            "run finished"
        );
        Ok(results)
    }
}
