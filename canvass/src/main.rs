use std::path::Path;

use anyhow::Context;
use args::{Args, Command};
use clap::Parser;
use config::Config;
use model::Model;
use runner::{Engine, JobSpec};
use survey::{Agent, Scenario, Survey};

mod args;
mod logger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logger::init(&args);

    let config = load_config(&args.config)?;

    match args.command {
        Command::Run {
            survey,
            agents,
            scenarios,
            models,
            iterations,
            fresh,
            output,
        } => {
            let mut config = config;
            if fresh {
                config.cache.fresh = true;
            }

            run(config, &survey, agents.as_deref(), scenarios.as_deref(), &models, iterations, output.as_deref()).await
        }
        Command::Status => status(config).await,
        Command::Validate { survey } => validate(&survey),
    }
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        Config::load(path)
    } else {
        log::debug!("No configuration file at {}, using environment only", path.display());
        Ok(Config::from_env())
    }
}

async fn run(
    config: Config,
    survey_path: &Path,
    agents_path: Option<&Path>,
    scenarios_path: Option<&Path>,
    model_specs: &[String],
    iterations: u32,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let survey: Survey = read_json(survey_path).context("Failed to load survey document")?;

    let agents: Vec<Agent> = match agents_path {
        Some(path) => read_json(path).context("Failed to load agents file")?,
        None => Vec::new(),
    };

    let scenarios: Vec<Scenario> = match scenarios_path {
        Some(path) => read_json(path).context("Failed to load scenarios file")?,
        None => Vec::new(),
    };

    let models = model_specs
        .iter()
        .map(|spec| parse_model(spec))
        .collect::<anyhow::Result<Vec<Model>>>()?;

    let poll_interval = config.execution.status_poll_interval;

    let engine = Engine::from_config(config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize engine: {e}"))?;

    let spec = JobSpec::new(survey)
        .with_agents(agents)
        .with_scenarios(scenarios)
        .with_models(models)
        .with_iterations(iterations);

    log::info!("Running job: {} interviews", spec.total());

    let handle = engine.run(spec);

    loop {
        let status = handle.status();

        log::info!(
            "progress: {}/{} done, {} running, {} queued, {} failed",
            status.done,
            status.total,
            status.running,
            status.queued,
            status.failed
        );

        if status.done + status.failed >= status.total {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            _ = tokio::signal::ctrl_c() => {
                log::warn!("Interrupted, cancelling job; partial results will be written");
                handle.cancel();
                break;
            }
        }
    }

    let outcome = handle.wait().await;

    if let Some(fatal) = &outcome.fatal {
        log::error!("Job aborted: {fatal}");
    }

    let json = outcome.results.to_json()?;

    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            log::info!("Wrote {} result rows to {}", outcome.results.len(), path.display());
        }
        None => println!("{json}"),
    }

    match outcome.fatal {
        Some(fatal) => Err(anyhow::anyhow!("job failed: {fatal}")),
        None => Ok(()),
    }
}

async fn status(config: Config) -> anyhow::Result<()> {
    let cache = cache::Cache::from_config(&config.cache)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open cache: {e}"))?;

    println!("cache entries: {}", cache.len().await);

    Ok(())
}

fn validate(survey_path: &Path) -> anyhow::Result<()> {
    let survey: Survey = read_json(survey_path).context("Survey document failed validation")?;

    // Round-trip equality is part of the document contract.
    let reparsed: Survey = serde_json::from_str(&serde_json::to_string(&survey)?)?;
    anyhow::ensure!(reparsed == survey, "survey does not round-trip");

    println!(
        "ok: {} questions, {} rules, {} groups",
        survey.len(),
        survey.rules().len(),
        survey.question_groups().len()
    );

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(serde_json::from_str(&content)?)
}

fn parse_model(spec: &str) -> anyhow::Result<Model> {
    let (service, model_name) = spec
        .split_once('/')
        .with_context(|| format!("Model '{spec}' must be 'service/model_name'"))?;

    Ok(Model::new(service, model_name))
}
