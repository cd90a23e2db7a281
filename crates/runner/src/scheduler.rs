//! Concurrent fan-out over the population with ordered result assembly.
//!
//! The Cartesian product (agents outer, then scenarios, then models,
//! iterations innermost) is enumerated lazily from a shared index counter;
//! nothing is materialized per interview until a worker picks it up. Rows
//! flow through a channel to a single assembler, which inserts them at
//! their ordinal slot.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use dashmap::DashMap;
use indexmap::IndexMap;
use model::Model;
use results::Results;
use survey::{Agent, Scenario, Survey};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{Engine, RunnerError, interview::Interview};

/// One job: a survey crossed with its population.
#[derive(Clone)]
pub struct JobSpec {
    /// The survey to run.
    pub survey: Survey,
    /// Agents; an empty list runs one blank agent.
    pub agents: Vec<Agent>,
    /// Scenarios; an empty list runs one empty scenario.
    pub scenarios: Vec<Scenario>,
    /// Models; an empty list runs the test model.
    pub models: Vec<Model>,
    /// Iterations per combination; clamped to at least 1.
    pub iterations: u32,
}

impl JobSpec {
    /// A job over the survey with a default population of one.
    pub fn new(survey: Survey) -> Self {
        Self {
            survey,
            agents: Vec::new(),
            scenarios: Vec::new(),
            models: Vec::new(),
            iterations: 1,
        }
    }

    /// Replace the agents.
    pub fn with_agents(mut self, agents: impl IntoIterator<Item = Agent>) -> Self {
        self.agents = agents.into_iter().collect();
        self
    }

    /// Replace the scenarios.
    pub fn with_scenarios(mut self, scenarios: impl IntoIterator<Item = Scenario>) -> Self {
        self.scenarios = scenarios.into_iter().collect();
        self
    }

    /// Replace the models.
    pub fn with_models(mut self, models: impl IntoIterator<Item = Model>) -> Self {
        self.models = models.into_iter().collect();
        self
    }

    /// Set the iteration count.
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    fn normalized(mut self) -> Self {
        if self.agents.is_empty() {
            self.agents.push(Agent::new());
        }
        if self.scenarios.is_empty() {
            self.scenarios.push(Scenario::new());
        }
        if self.models.is_empty() {
            self.models.push(Model::test());
        }
        self.iterations = self.iterations.max(1);
        self
    }

    /// Size of the Cartesian product.
    pub fn total(&self) -> usize {
        self.agents.len().max(1) * self.scenarios.len().max(1) * self.models.len().max(1) * (self.iterations.max(1) as usize)
    }
}

/// A point-in-time view of job progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    /// Interviews in the job.
    pub total: usize,
    /// Interviews not yet picked up by a worker.
    pub queued: usize,
    /// Interviews currently running.
    pub running: usize,
    /// Interviews that completed with every turn validated.
    pub done: usize,
    /// Interviews that completed carrying at least one exception.
    pub failed: usize,
    /// Currently running interviews per model identity.
    pub running_per_model: IndexMap<String, usize>,
}

#[derive(Default)]
struct StatusCounters {
    total: AtomicUsize,
    started: AtomicUsize,
    done: AtomicUsize,
    failed: AtomicUsize,
    per_model: DashMap<String, usize>,
}

impl StatusCounters {
    fn snapshot(&self) -> JobStatus {
        let total = self.total.load(Ordering::Relaxed);
        let started = self.started.load(Ordering::Relaxed);
        let done = self.done.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);

        JobStatus {
            total,
            queued: total.saturating_sub(started),
            running: started.saturating_sub(done + failed),
            done,
            failed,
            running_per_model: self
                .per_model
                .iter()
                .filter(|entry| *entry.value() > 0)
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
        }
    }
}

/// The final state of a job.
pub struct JobOutcome {
    /// Rows emitted up to completion or cancellation, in canonical order.
    pub results: Results,
    /// The error that aborted the job, when one did. Partial results are
    /// still populated.
    pub fatal: Option<RunnerError>,
}

/// Handle on a running job. The scheduler's task machinery never leaks
/// through here: `wait`, `status` and `cancel` are the whole surface.
pub struct JobHandle {
    join: tokio::task::JoinHandle<JobOutcome>,
    counters: Arc<StatusCounters>,
    cancel: CancellationToken,
}

impl JobHandle {
    /// Await the job and take its outcome.
    pub async fn wait(self) -> JobOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => JobOutcome {
                results: Results::new(),
                fatal: Some(RunnerError::Worker(e.to_string())),
            },
        }
    }

    /// A progress snapshot.
    pub fn status(&self) -> JobStatus {
        self.counters.snapshot()
    }

    /// Request cooperative cancellation: running interviews finish their
    /// current turn and emit partial rows; queued interviews never start.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

pub(crate) fn run(engine: Engine, spec: JobSpec) -> JobHandle {
    let spec = Arc::new(spec.normalized());
    let total = spec.total();

    let counters = Arc::new(StatusCounters::default());
    counters.total.store(total, Ordering::Relaxed);

    let cancel = CancellationToken::new();

    let survey_id = cache::sha256_hex(
        &serde_json::to_string(&spec.survey).unwrap_or_default(),
    );

    let worker_count = engine.config().execution.concurrency.max(1).min(total);
    log::debug!("Starting job: {total} interviews across {worker_count} workers");

    let next_index = Arc::new(AtomicUsize::new(0));
    let (row_tx, mut row_rx) = mpsc::unbounded_channel::<results::ResultRow>();
    let fatal_slot: Arc<tokio::sync::Mutex<Option<RunnerError>>> = Arc::new(tokio::sync::Mutex::new(None));

    let join = tokio::spawn({
        let counters = counters.clone();
        let cancel = cancel.clone();

        async move {
            let mut workers = Vec::with_capacity(worker_count);

            for _ in 0..worker_count {
                let engine = engine.clone();
                let spec = spec.clone();
                let survey_id = survey_id.clone();
                let counters = counters.clone();
                let cancel = cancel.clone();
                let next_index = next_index.clone();
                let row_tx = row_tx.clone();
                let fatal_slot = fatal_slot.clone();

                workers.push(tokio::spawn(async move {
                    loop {
                        if cancel.is_cancelled() {
                            break;
                        }

                        let order = next_index.fetch_add(1, Ordering::SeqCst);
                        if order >= total {
                            break;
                        }

                        counters.started.fetch_add(1, Ordering::Relaxed);

                        let (agent, scenario, model, iteration) = spec.combination(order);
                        let identity = model.identity();
                        *counters.per_model.entry(identity.clone()).or_insert(0) += 1;

                        let outcome = Interview::new(
                            engine.inner(),
                            &spec.survey,
                            &survey_id,
                            agent,
                            scenario,
                            model,
                            iteration,
                            order,
                        )
                        .conduct(&cancel)
                        .await;

                        if let Some(mut slot) = counters.per_model.get_mut(&identity) {
                            *slot = slot.saturating_sub(1);
                        }

                        if outcome.row.exceptions.is_empty() {
                            counters.done.fetch_add(1, Ordering::Relaxed);
                        } else {
                            counters.failed.fetch_add(1, Ordering::Relaxed);
                        }

                        if let Some(error) = outcome.fatal {
                            let mut slot = fatal_slot.lock().await;
                            if slot.is_none() {
                                *slot = Some(RunnerError::Provider(error));
                            }
                            drop(slot);

                            // Fatal errors cancel everything still queued.
                            cancel.cancel();
                        }

                        if row_tx.send(outcome.row).is_err() {
                            break;
                        }
                    }
                }));
            }

            // The workers hold the only other senders; dropping ours lets
            // the assembler drain to completion once they finish.
            drop(row_tx);

            let assembler = tokio::spawn(async move {
                let mut results = Results::new();

                while let Some(row) = row_rx.recv().await {
                    results.insert_ordered(row);
                }

                results
            });

            for worker in workers {
                if let Err(e) = worker.await {
                    log::error!("Worker task failed: {e}");
                }
            }

            let results = assembler.await.unwrap_or_default();
            let fatal = fatal_slot.lock().await.take();

            JobOutcome { results, fatal }
        }
    });

    JobHandle {
        join,
        counters,
        cancel,
    }
}

impl JobSpec {
    /// Decompose an ordinal into its population coordinates. The
    /// enumeration is canonical and documented: agents outermost, then
    /// scenarios, then models, iterations innermost.
    fn combination(&self, order: usize) -> (&Agent, &Scenario, &Model, u32) {
        let iterations = self.iterations.max(1) as usize;
        let models = self.models.len();
        let scenarios = self.scenarios.len();

        let iteration = order % iterations;
        let rest = order / iterations;
        let model = rest % models;
        let rest = rest / models;
        let scenario = rest % scenarios;
        let agent = rest / scenarios;

        (
            &self.agents[agent],
            &self.scenarios[scenario],
            &self.models[model],
            iteration as u32,
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use survey::Question;

    use super::*;

    #[test]
    fn canonical_enumeration_order() {
        let survey = Survey::new([Question::free_text("q", "t")]).unwrap();

        let spec = JobSpec::new(survey)
            .with_agents([Agent::new().with_name("a0"), Agent::new().with_name("a1")])
            .with_scenarios([
                Scenario::from_pairs([("s", json!(0))]),
                Scenario::from_pairs([("s", json!(1))]),
            ])
            .with_models([Model::test()])
            .with_iterations(2)
            .normalized();

        assert_eq!(spec.total(), 8);

        // order 0: first agent, first scenario, iteration 0.
        let (agent, scenario, _, iteration) = spec.combination(0);
        assert_eq!(agent.name.as_deref(), Some("a0"));
        assert_eq!(scenario.get("s"), Some(&json!(0)));
        assert_eq!(iteration, 0);

        // Iterations are innermost.
        let (_, _, _, iteration) = spec.combination(1);
        assert_eq!(iteration, 1);

        // Scenarios advance before agents.
        let (agent, scenario, _, _) = spec.combination(2);
        assert_eq!(agent.name.as_deref(), Some("a0"));
        assert_eq!(scenario.get("s"), Some(&json!(1)));

        let (agent, _, _, _) = spec.combination(4);
        assert_eq!(agent.name.as_deref(), Some("a1"));
    }

    #[test]
    fn empty_population_normalizes_to_one() {
        let survey = Survey::new([Question::free_text("q", "t")]).unwrap();
        let spec = JobSpec::new(survey).normalized();

        assert_eq!(spec.total(), 1);
        assert_eq!(spec.models[0].inference_service, "test");
    }
}
