use std::path::Path;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        let expanded = crate::env::expand_env(&raw)
            .map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self =
            toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if no models are registered or the agent options
    /// are out of range.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.models.is_empty() {
            anyhow::bail!("at least one model must be configured under [models]");
        }

        for (name, model) in &self.models {
            if model.credential.is_empty() {
                anyhow::bail!("model '{name}' has an empty credential key");
            }
        }

        if self.agent.max_turns == 0 {
            anyhow::bail!("agent.max_turns must be at least 1");
        }

        if self.agent.per_turn_deadline_seconds == 0 {
            anyhow::bail!("agent.per_turn_deadline_seconds must be at least 1");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use axon_core::Dialect;

    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_minimal_config() {
        let file = write_config(
            r#"
[models."gpt-4o"]
endpoint = "https://api.openai.com/v1"
dialect = "openai"
credential = "OPENAI_API_KEY"

[agent]
system_prompt = "You are a helpful assistant."
"#,
        );

        let config = Config::load(file.path()).unwrap();
        let model = &config.models["gpt-4o"];
        assert_eq!(model.dialect, Dialect::Openai);
        assert_eq!(config.agent.max_turns, 4);
        assert_eq!(config.agent.per_turn_deadline_seconds, 60);
        assert!(config.agent.emit_function_announcements);
        assert!(config.agent.stream);
        assert!(!config.agent.relay_tool_use_events);
        assert!(!config.agent.relay_usage_events);
    }

    #[test]
    fn expands_env_placeholders() {
        temp_env::with_var("AXON_TEST_CRED", Some("SOME_KEY"), || {
            let file = write_config(
                r#"
[models."claude"]
endpoint = "https://api.anthropic.com"
dialect = "anthropic"
credential = "{{ env.AXON_TEST_CRED }}"
"#,
            );

            let config = Config::load(file.path()).unwrap();
            assert_eq!(config.models["claude"].credential, "SOME_KEY");
        });
    }

    #[test]
    fn rejects_empty_model_table() {
        let file = write_config("[agent]\nmax_turns = 2\n");
        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("at least one model"));
    }

    #[test]
    fn rejects_zero_max_turns() {
        let file = write_config(
            r#"
[models."m"]
endpoint = "https://example.com"
dialect = "google"
credential = "KEY"

[agent]
max_turns = 0
"#,
        );
        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("max_turns"));
    }
}
