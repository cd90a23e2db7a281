//! End-to-end job execution against the deterministic test provider.

use config::{Config, TestProviderConfig};
use model::{Model, ProviderSet, TestProvider};
use runner::{Engine, JobSpec};
use serde_json::json;
use survey::{Agent, Question, Scenario, Survey};

fn test_engine() -> Engine {
    Engine::with_providers(Config::default(), ProviderSet::test_only())
}

fn scripted_engine(provider: TestProvider) -> Engine {
    Engine::with_providers(Config::default(), ProviderSet::with_test_provider(provider))
}

fn scripted(pairs: &[(&str, &str)]) -> TestProvider {
    let mut provider = TestProvider::new("test".to_string(), TestProviderConfig::default());
    for (pattern, reply) in pairs {
        provider = provider.with_reply(*pattern, *reply);
    }
    provider
}

fn one_question_survey() -> Survey {
    Survey::new([Question::free_text("hi", "Say hi.")]).unwrap()
}

#[tokio::test]
async fn results_arrive_in_canonical_order() {
    let engine = test_engine();

    let spec = JobSpec::new(one_question_survey())
        .with_agents([Agent::new().with_name("A"), Agent::new().with_name("B")])
        .with_models([Model::test()]);

    let outcome = engine.run(spec).wait().await;

    assert!(outcome.fatal.is_none());
    assert_eq!(outcome.results.len(), 2);

    let rows = outcome.results.rows();
    assert_eq!(rows[0].order, 0);
    assert_eq!(rows[0].agent["name"], json!("A"));
    assert_eq!(rows[1].order, 1);
    assert_eq!(rows[1].agent["name"], json!("B"));

    // Every answer comes from the canned response list.
    let canned = engine.providers().test_provider().unwrap().canned_responses().to_vec();
    for row in rows {
        let answer = row.column("answer.hi").unwrap();
        assert!(canned.iter().any(|c| json!(c) == answer), "{answer}");
        assert_eq!(row.column("validated.hi"), Some(json!(true)));
    }
}

#[tokio::test]
async fn concurrent_identical_jobs_coalesce_on_one_model_call() {
    let engine = test_engine();
    let survey = one_question_survey();

    let job_a = engine.run(JobSpec::new(survey.clone()));
    let job_b = engine.run(JobSpec::new(survey));

    let (a, b) = tokio::join!(job_a.wait(), job_b.wait());

    // Two jobs, one fingerprint: exactly one underlying provider call.
    assert_eq!(engine.providers().test_provider().unwrap().call_count(), 1);

    let answer_a = a.results.rows()[0].column("answer.hi").unwrap();
    let answer_b = b.results.rows()[0].column("answer.hi").unwrap();
    assert_eq!(answer_a, answer_b);

    // Exactly one of the two turns was served from the cache.
    let hits = [&a, &b]
        .iter()
        .filter(|outcome| outcome.results.rows()[0].column("cache_used.hi") == Some(json!(true)))
        .count();
    assert_eq!(hits, 1);
}

#[tokio::test]
async fn stop_rule_skips_remaining_questions() {
    let mut survey = Survey::new([
        Question::multiple_choice("q1", "Do you like math?", ["Yes", "No"]),
        Question::free_text("q2", "Why?"),
    ])
    .unwrap();
    survey.add_stop_rule("q1", "q1.answer == 'No'").unwrap();

    let engine = test_engine();
    let agent = Agent::new().answering("q1", json!("No"));

    let outcome = engine.run(JobSpec::new(survey).with_agents([agent])).wait().await;

    let row = &outcome.results.rows()[0];
    assert_eq!(row.column("answer.q1"), Some(json!("No")));
    // q2 was never asked: no answer, no validated flag.
    assert_eq!(row.column("answer.q2"), None);
    assert_eq!(row.column("validated.q2"), None);

    // The direct answer bypassed the model entirely.
    assert_eq!(engine.providers().test_provider().unwrap().call_count(), 0);
}

#[tokio::test]
async fn linear_scale_label_reply_repairs_to_its_value() {
    let survey = Survey::new([
        Question::linear_scale("rating", "How do you feel? (1 = I hate it, 5 = I love it)", 1, 5)
            .with_labels([(1, "I hate it"), (5, "I love it")]),
    ])
    .unwrap();

    let engine = scripted_engine(scripted(&[("love it", "I LOVE IT")]));
    let outcome = engine.run(JobSpec::new(survey)).wait().await;

    let row = &outcome.results.rows()[0];
    assert_eq!(row.column("answer.rating"), Some(json!(5)));
    assert_eq!(row.column("validated.rating"), Some(json!(true)));
    assert!(row.exceptions.is_empty());
}

#[tokio::test]
async fn checkbox_below_minimum_fails_validation_unless_permissive() {
    let reply = r#"{"answer": ["a"]}"#;

    let strict = Survey::new([
        Question::checkbox("pick", "Choose a few:", ["a", "b", "c", "d"]).with_selection_bounds(2, 3),
    ])
    .unwrap();

    let engine = scripted_engine(scripted(&[("Choose", reply)]));
    let outcome = engine.run(JobSpec::new(strict)).wait().await;

    let row = &outcome.results.rows()[0];
    assert_eq!(row.column("answer.pick"), Some(json!(null)));
    assert_eq!(row.column("validated.pick"), Some(json!(false)));
    assert_eq!(row.exceptions.len(), 1);
    assert_eq!(row.exceptions[0].kind, "validation");
    assert!(!engine.validation_log().is_empty());

    let permissive = Survey::new([
        Question::checkbox("pick", "Choose a few:", ["a", "b", "c", "d"])
            .with_selection_bounds(2, 3)
            .permissive(),
    ])
    .unwrap();

    let engine = scripted_engine(scripted(&[("Choose", reply)]));
    let outcome = engine.run(JobSpec::new(permissive)).wait().await;

    let row = &outcome.results.rows()[0];
    assert_eq!(row.column("answer.pick"), Some(json!(["a"])));
    assert_eq!(row.column("validated.pick"), Some(json!(true)));
}

#[tokio::test]
async fn prior_answers_pipe_into_later_prompts() {
    let survey = Survey::new([
        Question::free_text("q1", "What do you like?"),
        Question::free_text("q2", "Expand on: {{ q1.answer }}"),
    ])
    .unwrap();

    let engine = scripted_engine(scripted(&[
        ("What do you like", "long walks on the beach"),
        ("Expand on", "They are relaxing."),
    ]));
    let outcome = engine.run(JobSpec::new(survey)).wait().await;

    let row = &outcome.results.rows()[0];
    let q2_prompt = row.column("prompt.q2_user_prompt").unwrap();
    let q2_prompt = q2_prompt.as_str().unwrap();

    assert!(q2_prompt.contains("Expand on: long walks on the beach"), "{q2_prompt}");
    assert!(!q2_prompt.contains("{{"), "unresolved placeholder in {q2_prompt}");
}

#[tokio::test]
async fn corrective_recall_repairs_unparseable_replies() {
    // The corrective prompt matches first; the original falls through to
    // the second script.
    let engine = scripted_engine(scripted(&[
        ("previous reply was not a valid answer", "red"),
        ("Pick one", "purple-ish nonsense"),
    ]));

    let survey = Survey::new([Question::multiple_choice("color", "Pick one", ["red", "blue"])]).unwrap();

    let outcome = engine.run(JobSpec::new(survey)).wait().await;

    let row = &outcome.results.rows()[0];
    assert_eq!(row.column("answer.color"), Some(json!("red")));
    assert_eq!(row.column("validated.color"), Some(json!(true)));
    // Original call plus one corrective call.
    assert_eq!(engine.providers().test_provider().unwrap().call_count(), 2);
}

#[tokio::test]
async fn missing_api_key_aborts_the_job() {
    let config: Config = toml::from_str(
        r#"
        [llm.providers.openai]
        type = "openai"
        "#,
    )
    .unwrap();

    let providers = ProviderSet::from_config(&config).unwrap();
    let engine = Engine::with_providers(config, providers);

    let spec = JobSpec::new(one_question_survey())
        .with_agents([Agent::new().with_name("A"), Agent::new().with_name("B")])
        .with_models([Model::new("openai", "gpt-4o")]);

    let outcome = engine.run(spec).wait().await;

    assert!(matches!(
        outcome.fatal,
        Some(runner::RunnerError::Provider(model::LlmError::AuthenticationFailed(_)))
    ));
    // The failing interview still emitted a partial row.
    assert!(!outcome.results.is_empty());
    assert_eq!(outcome.results.rows()[0].exceptions[0].kind, "provider:auth");
}

#[tokio::test]
async fn status_snapshot_tracks_progress() {
    let engine = test_engine();

    let spec = JobSpec::new(one_question_survey())
        .with_agents((0..5).map(|i| Agent::new().with_name(format!("agent{i}"))));

    let handle = engine.run(spec);

    let status = handle.status();
    assert_eq!(status.total, 5);
    assert!(status.queued + status.running + status.done + status.failed <= 5);

    let outcome = handle.wait().await;

    assert_eq!(outcome.results.len(), 5);
    assert!(outcome.results.iter().all(|row| row.exceptions.is_empty()));
}

#[tokio::test]
async fn cancellation_retains_partial_results() {
    let engine = test_engine();

    let spec = JobSpec::new(one_question_survey())
        .with_agents((0..50).map(|i| Agent::new().with_name(format!("agent{i}"))));

    let handle = engine.run(spec);
    handle.cancel();
    let outcome = handle.wait().await;

    // Cancellation is not a failure; whatever completed is retained in
    // canonical order.
    assert!(outcome.fatal.is_none());
    assert!(outcome.results.len() <= 50);

    let orders: Vec<usize> = outcome.results.iter().map(|row| row.order).collect();
    let mut sorted = orders.clone();
    sorted.sort_unstable();
    assert_eq!(orders, sorted);
}

#[tokio::test]
async fn identical_jobs_with_shared_cache_resume_without_new_calls() {
    let engine = test_engine();
    let survey = one_question_survey();

    let first = engine.run(JobSpec::new(survey.clone())).wait().await;
    let calls_after_first = engine.providers().test_provider().unwrap().call_count();

    let second = engine.run(JobSpec::new(survey)).wait().await;

    assert_eq!(engine.providers().test_provider().unwrap().call_count(), calls_after_first);
    assert_eq!(
        first.results.rows()[0].column("answer.hi"),
        second.results.rows()[0].column("answer.hi")
    );
    assert_eq!(second.results.rows()[0].column("cache_used.hi"), Some(json!(true)));
}

#[tokio::test]
async fn compute_questions_never_call_the_model() {
    let survey = Survey::new([
        Question::free_text("q1", "What do you like?"),
        Question::compute("echo", "You said: {{ q1.answer }}"),
    ])
    .unwrap();

    let engine = scripted_engine(scripted(&[("What do you like", "sunshine")]));
    let outcome = engine.run(JobSpec::new(survey)).wait().await;

    let row = &outcome.results.rows()[0];
    assert_eq!(row.column("answer.echo"), Some(json!("You said: sunshine")));
    // Only q1 reached the provider.
    assert_eq!(engine.providers().test_provider().unwrap().call_count(), 1);
}

#[tokio::test]
async fn scenario_population_crosses_with_agents() {
    let engine = test_engine();

    let spec = JobSpec::new(one_question_survey())
        .with_agents([Agent::new().with_name("A"), Agent::new().with_name("B")])
        .with_scenarios([
            Scenario::from_pairs([("topic", json!("cats"))]),
            Scenario::from_pairs([("topic", json!("dogs"))]),
            Scenario::from_pairs([("topic", json!("birds"))]),
        ]);

    let outcome = engine.run(spec).wait().await;

    assert_eq!(outcome.results.len(), 6);

    // Scenarios enumerate within each agent.
    let topics: Vec<_> = outcome
        .results
        .iter()
        .map(|row| row.column("scenario.topic").unwrap())
        .collect();
    assert_eq!(
        topics,
        vec![
            json!("cats"),
            json!("dogs"),
            json!("birds"),
            json!("cats"),
            json!("dogs"),
            json!("birds")
        ]
    );
}
