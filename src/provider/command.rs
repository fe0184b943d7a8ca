//! Provider that delegates each transformation to an external program.
//!
//! The program receives the source image on stdin and must write the styled
//! image to stdout. Style parameters are passed through the environment:
//!
//! | Variable | Value |
//! |---|---|
//! | `STYLESYNC_STYLE` | style name |
//! | `STYLESYNC_INDEX` | style index |
//! | `STYLESYNC_PROMPT` | prompt text |
//! | `STYLESYNC_STRENGTH` | strength, `0.0`–`1.0` |
//! | `STYLESYNC_SOURCE_NAME` | source path relative to the source root |
//!
//! Exit status 0 with non-empty stdout is success. Exit status 2 means the
//! request itself is bad (a permanent failure); any other failure is
//! reported as retryable.

use super::{ProviderError, StyleProvider};
use crate::styles::Style;
use std::io::Write;
use std::process::{Command, Stdio};

/// Exit status a wrapper uses to signal "do not retry this input".
const PERMANENT_FAILURE_STATUS: i32 = 2;

#[derive(Debug, Clone)]
pub struct CommandProvider {
    program: String,
    args: Vec<String>,
}

impl CommandProvider {
    pub fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }
}

impl StyleProvider for CommandProvider {
    fn name(&self) -> &str {
        &self.program
    }

    fn transform(
        &self,
        source: &[u8],
        source_name: &str,
        style: &Style,
    ) -> Result<Vec<u8>, ProviderError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env("STYLESYNC_STYLE", &style.name)
            .env("STYLESYNC_INDEX", &style.index)
            .env("STYLESYNC_PROMPT", &style.prompt)
            .env("STYLESYNC_STRENGTH", style.strength.to_string())
            .env("STYLESYNC_SOURCE_NAME", source_name)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ProviderError::permanent(format!("failed to start '{}': {}", self.program, e))
            })?;

        // Feed stdin from a separate thread so a program that streams its
        // output before consuming all input cannot deadlock us.
        let stdin = child.stdin.take();
        let output = std::thread::scope(|scope| {
            let writer = scope.spawn(move || match stdin {
                Some(mut pipe) => pipe.write_all(source),
                None => Ok(()),
            });
            let output = child.wait_with_output();
            let written = writer.join();
            (output, written)
        });

        let output = match output {
            (Ok(output), _) => output,
            (Err(e), _) => {
                return Err(ProviderError::retryable(format!(
                    "'{}' did not complete: {}",
                    self.program, e
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            );
            return Err(match output.status.code() {
                Some(PERMANENT_FAILURE_STATUS) => ProviderError::permanent(message),
                _ => ProviderError::retryable(message),
            });
        }
        if output.stdout.is_empty() {
            return Err(ProviderError::retryable(format!(
                "'{}' produced no output",
                self.program
            )));
        }
        Ok(output.stdout)
    }
}
