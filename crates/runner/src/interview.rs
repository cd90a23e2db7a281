//! One survey walked for one (agent, scenario, model, iteration).

use std::collections::HashMap;

use cache::{canonical_json, sha256_hex};
use indexmap::IndexMap;
use model::{LlmError, Model};
use results::{ExceptionRecord, ResultRow, TurnRecord};
use serde_json::{Value, json};
use survey::{Agent, Answers, RuleTarget, Scenario, Survey};
use tokio_util::sync::CancellationToken;

use crate::{EngineInner, invigilator::Invigilator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnStatus {
    Running,
    Done,
    Failed,
}

/// Transient state for one interview. Owned by exactly one worker; turns
/// run sequentially because each next step depends on prior answers.
pub(crate) struct Interview<'a> {
    engine: &'a EngineInner,
    survey: &'a Survey,
    agent: &'a Agent,
    scenario: &'a Scenario,
    model: &'a Model,
    iteration: u32,
    order: usize,
    initial_hash: String,
    answers: Answers,
    turns: IndexMap<String, TurnRecord>,
    exceptions: Vec<ExceptionRecord>,
    status: HashMap<String, TurnStatus>,
}

/// What the interview ended with: its row, plus a job-fatal error when
/// one occurred mid-walk.
pub(crate) struct InterviewOutcome {
    pub row: ResultRow,
    pub fatal: Option<LlmError>,
}

impl<'a> Interview<'a> {
    #[expect(clippy::too_many_arguments)]
    pub fn new(
        engine: &'a EngineInner,
        survey: &'a Survey,
        survey_id: &str,
        agent: &'a Agent,
        scenario: &'a Scenario,
        model: &'a Model,
        iteration: u32,
        order: usize,
    ) -> Self {
        let agent_hash = sha256_hex(&canonical_json(&serde_json::to_value(agent).unwrap_or(Value::Null)));
        let scenario_hash = sha256_hex(&canonical_json(&scenario.to_json()));

        let initial_hash = sha256_hex(&format!(
            "{survey_id}\n{agent_hash}\n{scenario_hash}\n{}\n{iteration}",
            model.identity_hash(),
        ));

        Self {
            engine,
            survey,
            agent,
            scenario,
            model,
            iteration,
            order,
            initial_hash,
            answers: Answers::new(),
            turns: IndexMap::new(),
            exceptions: Vec::new(),
            status: HashMap::new(),
        }
    }

    /// Walk the survey to END, a stop rule, a fatal error or cancellation.
    /// Cancellation finishes the in-flight turn and emits the partial row.
    pub async fn conduct(mut self, cancel: &CancellationToken) -> InterviewOutcome {
        log::debug!(
            "Interview {} starting (hash {})",
            self.order,
            &self.initial_hash[..12]
        );

        let mut current = self.survey.first();
        let mut fatal = None;

        loop {
            if cancel.is_cancelled() {
                log::debug!("Interview {} cancelled before question {current}", self.order);
                break;
            }

            let Some(question) = self.survey.question(current) else {
                break;
            };

            let name = question.question_name.clone();
            self.status.insert(name.clone(), TurnStatus::Running);

            let outcome = Invigilator {
                engine: self.engine,
                survey: self.survey,
                question_index: current,
                question,
                agent: self.agent,
                scenario: self.scenario,
                model: self.model,
                answers: &self.answers,
                iteration: self.iteration,
            }
            .run_turn()
            .await;

            self.answers
                .insert(name.as_str(), outcome.record.answer.clone(), outcome.record.comment.clone());
            self.turns.insert(name.clone(), outcome.record);

            let failed = outcome.exception.is_some();

            if let Some(exception) = outcome.exception {
                self.exceptions.push(exception);
            }

            self.status
                .insert(name, if failed { TurnStatus::Failed } else { TurnStatus::Done });

            if let Some(error) = outcome.fatal {
                log::warn!("Interview {} hit a job-fatal error: {error}", self.order);
                fatal = Some(error);
                break;
            }

            if failed && self.engine.config.execution.stop_on_error {
                log::debug!("Interview {} stopping on first error", self.order);
                break;
            }

            match self.survey.next(current, &self.answers) {
                RuleTarget::Question(next) => current = next,
                RuleTarget::End => break,
            }
        }

        let done = self.status.values().filter(|s| **s == TurnStatus::Done).count();
        log::debug!(
            "Interview {} finished: {done}/{} turns ok, {} exceptions",
            self.order,
            self.status.len(),
            self.exceptions.len()
        );

        InterviewOutcome {
            row: self.into_row(),
            fatal,
        }
    }

    fn into_row(self) -> ResultRow {
        ResultRow {
            order: self.order,
            iteration: self.iteration,
            agent: json!({
                "name": self.agent.name,
                "traits": self.agent.traits_json(),
            }),
            scenario: self.scenario.to_json(),
            model: serde_json::to_value(self.model).unwrap_or(Value::Null),
            turns: self.turns,
            exceptions: self.exceptions,
        }
    }
}
