//! One question turn: render → cache/model → validate → repair → record.

use cache::FingerprintInput;
use model::{CallRequest, LlmError, Model, RawResponse, estimate_request_tokens};
use results::{ExceptionRecord, TurnRecord};
use serde_json::Value;
use survey::{Agent, Answers, Question, QuestionType, Scenario, Survey};
use validation::{Outcome, parse_raw, repair_candidates, validate_logged};

use crate::{EngineInner, RunnerError, prompt};

/// What one turn produced: the record for the result row, an optional
/// per-turn exception, and an optional job-fatal error.
pub(crate) struct TurnOutcome {
    pub record: TurnRecord,
    pub exception: Option<ExceptionRecord>,
    pub fatal: Option<LlmError>,
}

/// Runs a single question turn for one interview.
pub(crate) struct Invigilator<'a> {
    pub engine: &'a EngineInner,
    pub survey: &'a Survey,
    pub question_index: usize,
    pub question: &'a Question,
    pub agent: &'a Agent,
    pub scenario: &'a Scenario,
    pub model: &'a Model,
    pub answers: &'a Answers,
    pub iteration: u32,
}

impl Invigilator<'_> {
    pub async fn run_turn(&self) -> TurnOutcome {
        // Locally computed questions never render prompts or touch the
        // model.
        if self.question.question_type == QuestionType::Compute {
            return self.run_compute();
        }

        let prompts = match prompt::render_prompts(
            self.survey,
            self.question_index,
            self.question,
            self.agent,
            self.scenario,
            self.answers,
        ) {
            Ok(prompts) => prompts,
            Err(e) => {
                log::debug!("Template render failed for '{}': {e}", self.question.question_name);
                return self.failed_turn(String::new(), String::new(), "template", e.to_string());
            }
        };

        // Agent-provided direct answers bypass model, cache and buckets.
        if let Some(direct) = self.agent.direct_answer_for(&self.question.question_name) {
            let value = direct(self.question, self.scenario, self.answers);
            return self.record_direct(prompts, value);
        }

        self.run_model_turn(prompts).await
    }

    fn run_compute(&self) -> TurnOutcome {
        let context = prompt::build_context(self.agent, self.scenario, self.answers);
        let template_source = self
            .question
            .compute_template
            .as_deref()
            .unwrap_or(&self.question.question_text);

        match template::render(template_source, &context) {
            Ok(rendered) => {
                let record = self.base_record(String::new(), String::new());

                TurnOutcome {
                    record: TurnRecord {
                        answer: Value::String(rendered.clone()),
                        generated_tokens: Some(rendered),
                        validated: true,
                        ..record
                    },
                    exception: None,
                    fatal: None,
                }
            }
            Err(e) => self.failed_turn(String::new(), String::new(), "template", e.to_string()),
        }
    }

    fn record_direct(&self, prompts: prompt::RenderedPrompts, value: Value) -> TurnOutcome {
        let outcome = validate_logged(self.question, &value, &self.engine.validation_log);

        match outcome {
            Outcome::Valid(answer) => TurnOutcome {
                record: TurnRecord {
                    answer,
                    validated: true,
                    ..self.base_record(prompts.system, prompts.user)
                },
                exception: None,
                fatal: None,
            },
            Outcome::Invalid { message, .. } => {
                self.failed_turn(prompts.system, prompts.user, "validation", message)
            }
        }
    }

    async fn run_model_turn(&self, prompts: prompt::RenderedPrompts) -> TurnOutcome {
        let file_hashes = collect_file_hashes(self.scenario);
        let parameters_json = self.model.parameters_json();

        let mut record = self.base_record(prompts.system.clone(), prompts.user.clone());
        let mut user_prompt = prompts.user.clone();
        let mut attempts = 0u32;

        loop {
            let call = match self
                .call_through_cache(&prompts.system, &user_prompt, &parameters_json, &file_hashes)
                .await
            {
                Ok(call) => call,
                Err(e) => return self.turn_error(record, e),
            };

            record.cache_key = call.fingerprint;
            record.cache_used = call.hit;
            record.raw_model_response = call.response.raw.clone();
            record.input_tokens += call.response.input_tokens;
            record.output_tokens += call.response.output_tokens;
            record.cost += model::cost(
                &self.model.inference_service,
                &self.model.model_name,
                call.response.input_tokens,
                call.response.output_tokens,
            );

            let raw_text = call.response.text;
            record.generated_tokens = Some(raw_text.clone());

            let parsed = parse_raw(&raw_text);
            record.comment = parsed.comment.clone();

            let mut failure_message = String::new();

            if let Some(candidate) = parsed.answer {
                match validate_logged(self.question, &candidate, &self.engine.validation_log) {
                    Outcome::Valid(answer) => {
                        record.answer = answer;
                        record.validated = true;
                        return TurnOutcome {
                            record,
                            exception: None,
                            fatal: None,
                        };
                    }
                    Outcome::Invalid { message, .. } => failure_message = message,
                }
            }

            // Deterministic repairs before spending another model call.
            for candidate in repair_candidates(self.question, &raw_text) {
                if let Outcome::Valid(answer) = validation::validate(self.question, &candidate) {
                    log::debug!(
                        "Repaired reply for '{}' deterministically",
                        self.question.question_name
                    );
                    record.answer = answer;
                    record.validated = true;
                    return TurnOutcome {
                        record,
                        exception: None,
                        fatal: None,
                    };
                }
            }

            if attempts >= self.engine.config.execution.max_repair_attempts {
                let message = if failure_message.is_empty() {
                    "reply could not be decoded into an answer".to_string()
                } else {
                    failure_message
                };

                record.answer = Value::Null;
                record.validated = false;

                return TurnOutcome {
                    exception: Some(ExceptionRecord {
                        question_name: self.question.question_name.clone(),
                        kind: "validation".to_string(),
                        message,
                    }),
                    record,
                    fatal: None,
                };
            }

            attempts += 1;
            log::debug!(
                "Repair attempt {attempts} for '{}': re-calling with corrective prompt",
                self.question.question_name
            );

            // The corrective prompt differs from the original, so it gets
            // its own cache slot and stays resumable.
            user_prompt = format!(
                "{}\n\nYour previous reply was not a valid answer: {}.\nPrevious reply: {raw_text}\nAnswer again, following the required format exactly.",
                prompts.user,
                if failure_message.is_empty() {
                    "it could not be parsed"
                } else {
                    &failure_message
                }
            );
        }
    }

    async fn call_through_cache(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        parameters_json: &Value,
        file_hashes: &[String],
    ) -> Result<CachedCall, RunnerError> {
        let model_identity = self.model.identity();

        let input = FingerprintInput {
            model_identity: &model_identity,
            parameters: parameters_json,
            system_prompt,
            user_prompt,
            iteration: self.iteration,
            file_hashes,
        };

        let request = CallRequest {
            system_prompt: system_prompt.to_string(),
            user_prompt: user_prompt.to_string(),
            parameters: self.model.parameters.clone(),
            response_schema: self.question.answer_schema.clone(),
            files: Vec::new(),
        };

        let engine = self.engine;
        let model = self.model;

        let outcome = engine
            .cache
            .get_or_build(&input, || async {
                let provider = engine.providers.get(&model.inference_service)?;
                let buckets = engine.buckets.for_model(&model.inference_service, &model.model_name);

                let estimated =
                    estimate_request_tokens(system_prompt, user_prompt, model.parameters.max_tokens);

                // Both buckets must be held before the call; acquiring them
                // concurrently halves the wait on contended models.
                let (tokens, requests) =
                    tokio::join!(buckets.tokens.acquire(estimated as f64), buckets.requests.acquire(1.0));
                tokens?;
                requests?;

                let response = engine.retry.run(|| provider.call(&model.model_name, &request)).await?;

                serde_json::to_value(&response)
                    .map_err(|e| RunnerError::Provider(LlmError::MalformedResponse(e.to_string())))
            })
            .await?;

        let response: RawResponse = serde_json::from_value(outcome.entry.output_raw.clone())
            .map_err(|e| RunnerError::Provider(LlmError::MalformedResponse(format!("corrupt cache entry: {e}"))))?;

        Ok(CachedCall {
            fingerprint: outcome.entry.fingerprint,
            hit: outcome.hit,
            response,
        })
    }

    fn base_record(&self, system_prompt: String, user_prompt: String) -> TurnRecord {
        TurnRecord {
            answer: Value::Null,
            comment: None,
            generated_tokens: None,
            question_text: self.question.question_text.clone(),
            question_type: self.question.question_type.to_string(),
            question_options: self.question.question_options.clone(),
            user_prompt,
            system_prompt,
            raw_model_response: Value::Null,
            cache_key: String::new(),
            cache_used: false,
            validated: false,
            input_tokens: 0,
            output_tokens: 0,
            cost: 0.0,
        }
    }

    fn failed_turn(
        &self,
        system_prompt: String,
        user_prompt: String,
        kind: &str,
        message: String,
    ) -> TurnOutcome {
        TurnOutcome {
            record: self.base_record(system_prompt, user_prompt),
            exception: Some(ExceptionRecord {
                question_name: self.question.question_name.clone(),
                kind: kind.to_string(),
                message,
            }),
            fatal: None,
        }
    }

    fn turn_error(&self, record: TurnRecord, error: RunnerError) -> TurnOutcome {
        let message = error.to_string();

        let (kind, fatal) = match error {
            RunnerError::Provider(e) => {
                let kind = format!("provider:{:?}", e.classification()).to_lowercase();
                let fatal = e.is_fatal_for_job().then_some(e);
                (kind, fatal)
            }
            RunnerError::Bucket(_) => ("bucket".to_string(), None),
            _ => ("runner".to_string(), None),
        };

        TurnOutcome {
            exception: Some(ExceptionRecord {
                question_name: self.question.question_name.clone(),
                kind,
                message,
            }),
            record,
            fatal,
        }
    }
}

struct CachedCall {
    fingerprint: String,
    hit: bool,
    response: RawResponse,
}

/// Content hashes of any file blobs referenced by the scenario. Blob
/// values look like `{"canvass_file": {"sha256": "...", ...}}`.
fn collect_file_hashes(scenario: &Scenario) -> Vec<String> {
    let mut hashes = Vec::new();

    for (_, value) in &scenario.fields {
        collect_from_value(value, &mut hashes);
    }

    hashes
}

fn collect_from_value(value: &Value, hashes: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::Object(file)) = map.get("canvass_file")
                && let Some(Value::String(sha256)) = file.get("sha256")
            {
                hashes.push(sha256.clone());
                return;
            }

            for value in map.values() {
                collect_from_value(value, hashes);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_from_value(item, hashes);
            }
        }
        _ => {}
    }
}
