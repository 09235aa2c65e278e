//! The text-generation boundary and its subprocess-backed implementation.

use std::process::Stdio;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Turns a prompt into generated text.
///
/// Implementations must be safe to share across concurrent pipeline runs.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Runs an external CLI once per prompt: the prompt goes to stdin, the
/// generated text is read from stdout.
///
/// The child is killed if the call is dropped (for example on timeout).
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
}

impl CommandGenerator {
    pub const DEFAULT_PROGRAM: &str = "claude";

    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for CommandGenerator {
    /// `claude -p`: print mode, prompt on stdin.
    fn default() -> Self {
        Self::new(Self::DEFAULT_PROGRAM, vec!["-p".to_string()])
    }
}

#[async_trait]
impl TextGenerator for CommandGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn generator {:?}", self.program))?;

        debug!(program = %self.program, pid = ?child.id(), prompt_len = prompt.len(), "generator spawned");

        let mut stdin = child
            .stdin
            .take()
            .context("generator stdin was not captured")?;
        let input = prompt.as_bytes().to_vec();
        // Feed stdin concurrently so a chatty child cannot fill its stdout
        // pipe while we are still writing.
        let writer = tokio::spawn(async move {
            stdin.write_all(&input).await?;
            stdin.shutdown().await
        });

        let output = child
            .wait_with_output()
            .await
            .context("failed to wait for generator")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "generator {:?} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            );
        }

        // Write errors (EPIPE) are ignored once the child has succeeded.
        writer.await.context("stdin writer task panicked")?.ok();

        String::from_utf8(output.stdout).context("generator output is not valid UTF-8")
    }
}
