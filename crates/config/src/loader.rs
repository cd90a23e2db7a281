use std::{fmt::Write, path::Path, sync::LazyLock};

use anyhow::bail;
use indoc::indoc;
use regex::Regex;
use secrecy::SecretString;
use serde::Deserialize;
use toml::Value;

use crate::{CacheBackendConfig, Config, ProviderType};

static ENV_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*env\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap_or_else(|_| unreachable!("static pattern"))
});

pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref().to_path_buf();
    let content = std::fs::read_to_string(&path)?;
    let mut raw_config: Value = toml::from_str(&content)?;

    expand_env_references(&mut Vec::new(), &mut raw_config)?;

    let mut config = Config::deserialize(raw_config)?;

    apply_env_overrides(&mut config);
    validate_has_providers(&config)?;

    for (name, provider) in &config.llm.providers {
        if provider.provider_type() != ProviderType::Test && provider.api_key().is_none() {
            log::warn!("Provider '{name}' has no API key configured; calls to it will fail with an auth error");
        }
    }

    Ok(config)
}

pub(crate) fn validate_has_providers(config: &Config) -> anyhow::Result<()> {
    if !config.llm.has_providers() {
        bail!(indoc! {r#"
            No LLM providers configured. Canvass requires at least one provider to run a job.

            Example configuration:

              [llm.providers.openai]
              type = "openai"
              api_key = "{{ env.OPENAI_API_KEY }}"

            For deterministic offline runs:

              [llm.providers.test]
              type = "test"
        "#});
    }

    Ok(())
}

/// Resolve api keys, concurrency and cache path from the environment for
/// everything the file left unset.
pub(crate) fn apply_env_overrides(config: &mut Config) {
    for (name, provider) in config.llm.providers.iter_mut() {
        if provider.api_key().is_some() {
            continue;
        }

        let conventional = match provider.provider_type() {
            ProviderType::Openai => "OPENAI_API_KEY",
            ProviderType::Anthropic => "ANTHROPIC_API_KEY",
            ProviderType::Google => "GOOGLE_API_KEY",
            ProviderType::Test => continue,
        };

        let key = std::env::var(conventional)
            .or_else(|_| std::env::var("CANVASS_API_KEY"))
            .ok();

        match key {
            Some(key) => provider.set_api_key(SecretString::from(key)),
            None => log::debug!("No environment API key found for provider '{name}'"),
        }
    }

    if let Ok(value) = std::env::var("CANVASS_CONCURRENCY") {
        match value.parse::<usize>() {
            Ok(concurrency) if concurrency > 0 => config.execution.concurrency = concurrency,
            _ => log::warn!("Ignoring invalid CANVASS_CONCURRENCY value '{value}'"),
        }
    }

    if matches!(config.cache.backend, CacheBackendConfig::Memory)
        && let Ok(path) = std::env::var("CANVASS_CACHE_PATH")
    {
        config.cache.backend = CacheBackendConfig::File { path: path.into() };
    }
}

fn expand_env_references<'a>(path: &mut Vec<Result<&'a str, usize>>, value: &'a mut Value) -> anyhow::Result<()> {
    match value {
        Value::String(s) => {
            if !s.contains("{{") {
                return Ok(());
            }

            let mut expanded = String::with_capacity(s.len());
            let mut last = 0;

            for captures in ENV_REFERENCE.captures_iter(s) {
                let overall = captures.get(0).unwrap_or_else(|| unreachable!("group 0 always exists"));
                let name = &captures[1];

                let Ok(var) = std::env::var(name) else {
                    bail!(
                        "Failed to expand environment reference at path '{}': variable '{name}' is not set",
                        render_path(path)
                    );
                };

                expanded.push_str(&s[last..overall.start()]);
                expanded.push_str(&var);
                last = overall.end();
            }

            expanded.push_str(&s[last..]);
            *s = expanded;
        }
        Value::Array(values) => {
            for (i, value) in values.iter_mut().enumerate() {
                path.push(Err(i));
                expand_env_references(path, value)?;
                path.pop();
            }
        }
        Value::Table(map) => {
            for (key, value) in map {
                path.push(Ok(key.as_str()));
                expand_env_references(path, value)?;
                path.pop();
            }
        }
        Value::Integer(_) | Value::Float(_) | Value::Boolean(_) | Value::Datetime(_) => (),
    }

    Ok(())
}

fn render_path(path: &[Result<&str, usize>]) -> String {
    let mut rendered = String::new();

    for segment in path {
        match segment {
            Ok(s) => {
                rendered.push_str(s);
                rendered.push('.');
            }
            Err(i) => {
                let _ = write!(rendered, "[{i}]");
            }
        }
    }

    if rendered.ends_with('.') {
        rendered.pop();
    }

    rendered
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use crate::{Config, LlmProviderConfig};

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        use std::io::Write as _;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn expands_env_references() {
        let file = write_config(indoc::indoc! {r#"
            [llm.providers.openai]
            type = "openai"
            api_key = "{{ env.CANVASS_TEST_KEY }}"
        "#});

        let config = temp_env::with_var("CANVASS_TEST_KEY", Some("sk-from-env"), || {
            Config::load(file.path()).unwrap()
        });

        let LlmProviderConfig::Openai(provider) = &config.llm.providers["openai"] else {
            panic!("expected openai provider");
        };

        assert_eq!(provider.api_key.as_ref().unwrap().expose_secret(), "sk-from-env");
    }

    #[test]
    fn missing_env_reference_fails_with_path() {
        let file = write_config(indoc::indoc! {r#"
            [llm.providers.openai]
            type = "openai"
            api_key = "{{ env.CANVASS_DEFINITELY_UNSET }}"
        "#});

        let error = temp_env::with_var_unset("CANVASS_DEFINITELY_UNSET", || {
            Config::load(file.path()).unwrap_err()
        });

        let message = error.to_string();
        assert!(message.contains("llm.providers.openai.api_key"), "{message}");
        assert!(message.contains("CANVASS_DEFINITELY_UNSET"), "{message}");
    }

    #[test]
    fn no_providers_is_an_error() {
        let file = write_config("");
        let error = Config::load(file.path()).unwrap_err();

        assert!(error.to_string().contains("No LLM providers configured"));
    }
}
