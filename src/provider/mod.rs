//! Provider adapter port.
//!
//! The [`StyleProvider`] trait is the one capability the reconciler needs
//! from an AI backend: turn source image bytes plus a [`Style`] into styled
//! image bytes, or fail. The reconciler never retries; a failure carries a
//! `retryable` flag so the caller can decide.
//!
//! The bundled adapter is [`CommandProvider`], which delegates to an external
//! program. Adapters are chosen once at startup from [`ProviderConfig`].

pub mod command;

pub use command::CommandProvider;

use crate::styles::Style;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderError {
    pub retryable: bool,
    pub message: String,
}

impl ProviderError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            retryable: true,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            retryable: false,
            message: message.into(),
        }
    }
}

/// Trait for image style-transfer providers.
///
/// Shared by reference across the worker pool, hence `Sync`.
pub trait StyleProvider: Sync {
    /// Short name for logs and CLI output.
    fn name(&self) -> &str;

    /// Produce styled bytes for `source`. `source_name` is the source's
    /// relative path, useful to providers that infer a MIME type from it.
    fn transform(
        &self,
        source: &[u8],
        source_name: &str,
        style: &Style,
    ) -> Result<Vec<u8>, ProviderError>;
}

/// `[provider]` section of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ProviderConfig {
    /// Run an external program per artifact.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

/// Instantiate the provider described by `config`.
pub fn from_config(config: &ProviderConfig) -> Box<dyn StyleProvider> {
    match config {
        ProviderConfig::Command { program, args } => {
            Box::new(CommandProvider::new(program.clone(), args.clone()))
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Mock provider that records calls and fails on request.
    /// Uses Mutex so it is Sync and works with the rayon pool.
    #[derive(Default)]
    pub struct MockProvider {
        pub calls: Mutex<Vec<RecordedCall>>,
        failing: Mutex<HashSet<(String, String)>>,
        panicking: Mutex<HashSet<(String, String)>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedCall {
        pub source: String,
        pub style: String,
        pub prompt: String,
        pub strength: f64,
    }

    impl MockProvider {
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail every call for this (source path, style name) pair.
        pub fn fail_for(&self, source: &str, style: &str) {
            self.failing
                .lock()
                .unwrap()
                .insert((source.to_string(), style.to_string()));
        }

        /// Panic inside `transform` for this pair, like a buggy adapter.
        pub fn panic_for(&self, source: &str, style: &str) {
            self.panicking
                .lock()
                .unwrap()
                .insert((source.to_string(), style.to_string()));
        }

        pub fn get_calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }

        /// Bytes the mock produces for a pair, for asserting written content.
        pub fn output_for(source_name: &str, style: &str) -> Vec<u8> {
            format!("{}:{}", style, source_name).into_bytes()
        }
    }

    impl StyleProvider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        fn transform(
            &self,
            _source: &[u8],
            source_name: &str,
            style: &Style,
        ) -> Result<Vec<u8>, ProviderError> {
            self.calls.lock().unwrap().push(RecordedCall {
                source: source_name.to_string(),
                style: style.name.clone(),
                prompt: style.prompt.clone(),
                strength: style.strength,
            });

            let key = (source_name.to_string(), style.name.clone());
            let panics = self.panicking.lock().unwrap().contains(&key);
            if panics {
                panic!("mock panic for {} / {}", source_name, style.name);
            }
            if self.failing.lock().unwrap().contains(&key) {
                return Err(ProviderError::retryable(format!(
                    "mock failure for {} / {}",
                    source_name, style.name
                )));
            }
            Ok(Self::output_for(source_name, &style.name))
        }
    }

    #[test]
    fn parse_command_provider_config() {
        let config: ProviderConfig = toml::from_str(
            r#"
kind = "command"
program = "stylize"
args = ["--model", "flux"]
"#,
        )
        .unwrap();
        assert_eq!(
            config,
            ProviderConfig::Command {
                program: "stylize".into(),
                args: vec!["--model".into(), "flux".into()],
            }
        );
    }

    #[test]
    fn unknown_provider_kind_is_rejected() {
        let result: Result<ProviderConfig, _> = toml::from_str(r#"kind = "telepathy""#);
        assert!(result.is_err());
    }

    #[test]
    fn from_config_builds_command_provider() {
        let provider = from_config(&ProviderConfig::Command {
            program: "stylize".into(),
            args: vec![],
        });
        assert_eq!(provider.name(), "stylize");
    }

    #[test]
    fn mock_records_and_fails_on_request() {
        let provider = MockProvider::new();
        provider.fail_for("b.jpg", "anime");
        let style = crate::test_helpers::style("anime", "01");

        assert_eq!(
            provider.transform(b"x", "a.jpg", &style).unwrap(),
            MockProvider::output_for("a.jpg", "anime")
        );
        let err = provider.transform(b"x", "b.jpg", &style).unwrap_err();
        assert!(err.retryable);
        assert_eq!(provider.get_calls().len(), 2);
    }
}
