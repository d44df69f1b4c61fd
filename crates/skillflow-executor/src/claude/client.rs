//! Claude CLI runtime.
//!
//! Each run spawns the CLI in print mode with streaming JSON output. The
//! prompt is written to stdin; stdout is decoded line by line into runtime
//! messages and forwarded through a channel that backs the returned stream.

use std::process::Stdio;

use async_trait::async_trait;
use futures::StreamExt;
use skillflow_core::{
    AgentRuntime, MessageStream, RunRequest, RuntimeError, RuntimeMessage,
    config::RuntimeSettings,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader},
    process::{Child, ChildStdin, ChildStdout, Command},
    sync::mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use super::types::CliOptions;
use crate::command::CommandBuilder;

/// Messages buffered between the reader task and the consumer.
const CHANNEL_CAPACITY: usize = 64;
/// Trailing stderr kept for error reports.
const STDERR_TAIL_BYTES: usize = 4096;
/// Set by the CLI in its own sessions; a nested CLI refuses to start with it.
const NESTED_SESSION_ENV: &str = "CLAUDECODE";

/// Agent runtime backed by the Claude CLI.
#[derive(Debug, Clone)]
pub struct ClaudeCli {
    options: CliOptions,
    builder: CommandBuilder,
}

impl ClaudeCli {
    #[must_use]
    pub fn new(options: CliOptions) -> Self {
        let builder = CommandBuilder::new(options.command.clone()).params(options.base_args());
        Self { options, builder }
    }

    #[must_use]
    pub fn from_settings(settings: &RuntimeSettings) -> Self {
        Self::new(CliOptions::from(settings))
    }

    #[must_use]
    pub const fn options(&self) -> &CliOptions {
        &self.options
    }

    fn run_args(request: &RunRequest) -> Result<Vec<String>, RuntimeError> {
        let mut args = Vec::new();
        if !request.system_prompt.is_empty() {
            args.extend([
                "--append-system-prompt".to_string(),
                request.system_prompt.clone(),
            ]);
        }
        if let Some(agents) = request.agents.as_ref().filter(|a| !a.is_empty()) {
            let json = serde_json::to_string(agents)
                .map_err(|e| RuntimeError::Start(format!("Failed to encode agents: {e}")))?;
            args.extend(["--agents".to_string(), json]);
        }
        if let Some(resume) = &request.resume {
            args.extend(["--resume".to_string(), resume.clone()]);
        }
        Ok(args)
    }
}

#[async_trait]
impl AgentRuntime for ClaudeCli {
    async fn start(&self, request: RunRequest) -> Result<MessageStream, RuntimeError> {
        let parts = self
            .builder
            .build(&Self::run_args(&request)?)
            .map_err(|e| RuntimeError::Start(e.to_string()))?;
        let (program, args) = parts
            .into_resolved()
            .await
            .map_err(|e| RuntimeError::Start(e.to_string()))?;

        tracing::info!(
            program = %program.display(),
            cwd = %request.working_dir.display(),
            resume = request.resume.as_deref().unwrap_or("-"),
            agents = request.agents.as_ref().map_or(0, |a| a.len()),
            system_prompt_bytes = request.system_prompt.len(),
            "Starting Claude CLI"
        );

        let mut child = Command::new(&program)
            .args(&args)
            .current_dir(&request.working_dir)
            .env_remove(NESTED_SESSION_ENV)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RuntimeError::Start(format!("{}: {e}", program.display())))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RuntimeError::Start("stdout not captured".to_string()))?;
        let stdin = child.stdin.take();

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(pump(child, stdin, request.prompt, stdout, tx, request.cancel));

        Ok(ReceiverStream::new(rx).boxed())
    }
}

type MessageSender = mpsc::Sender<Result<RuntimeMessage, RuntimeError>>;

async fn pump(
    mut child: Child,
    stdin: Option<ChildStdin>,
    prompt: String,
    stdout: ChildStdout,
    tx: MessageSender,
    cancel: CancellationToken,
) {
    let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(read_tail(stderr)));

    if let Some(mut stdin) = stdin {
        if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
            tracing::warn!("Failed to write prompt to CLI: {e}");
        }
        // Dropping stdin closes it so the CLI starts the turn.
    }

    let mut lines = BufReader::new(stdout).lines();
    let mut saw_result = false;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!("Run cancelled, stopping CLI");
                if let Err(e) = child.start_kill() {
                    tracing::debug!("Failed to kill CLI: {e}");
                }
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<RuntimeMessage>(line) {
                        Ok(message) => {
                            saw_result |= matches!(message, RuntimeMessage::Result(_));
                            if tx.send(Ok(message)).await.is_err() {
                                // Consumer dropped the stream.
                                let _ = child.start_kill();
                                break;
                            }
                        }
                        Err(e) => tracing::debug!("Skipping undecodable CLI line: {e}"),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = tx.send(Err(RuntimeError::Io(e))).await;
                    break;
                }
            }
        }
    }

    let status = child.wait().await;
    let stderr = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    if cancel.is_cancelled() || saw_result {
        return;
    }
    match status {
        Ok(status) if !status.success() => {
            tracing::error!(code = ?status.code(), "Claude CLI exited without a result");
            let _ = tx
                .send(Err(RuntimeError::Exited {
                    code: status.code(),
                    stderr,
                }))
                .await;
        }
        Ok(_) => {}
        Err(e) => {
            let _ = tx.send(Err(RuntimeError::Io(e))).await;
        }
    }
}

async fn read_tail(stream: impl AsyncRead + Unpin) -> String {
    let mut lines = BufReader::new(stream).lines();
    let mut tail = String::new();
    while let Ok(Some(line)) = lines.next_line().await {
        if !tail.is_empty() {
            tail.push('\n');
        }
        tail.push_str(&line);
        if tail.len() > STDERR_TAIL_BYTES {
            let mut cut = tail.len() - STDERR_TAIL_BYTES;
            while !tail.is_char_boundary(cut) {
                cut += 1;
            }
            tail.drain(..cut);
        }
    }
    tail
}
