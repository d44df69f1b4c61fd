//! Translation of one runtime run into normalized events.
//!
//! The translator consumes the runtime's message stream in order, emits
//! `SkillEvent`s to a sink and records what the caller needs afterwards
//! (visible text, session id, pending questions, chain directive) in the
//! run's `ExecutionContext`.
//!
//! Two tool calls cannot be answered by this service: the chain directive and
//! the native question tool. Both end the run by cancelling the context's
//! token, the same path an external cancel takes, so the consumption loop has
//! a single exit condition.

use futures::StreamExt;
use skillflow_core::{
    ContentBlock, EventSink, ExecutionContext, MessageStream, ResultMessage, RuntimeError,
    RuntimeMessage, SkillEvent, UsageReport,
};

use crate::scanner::{self, TextBlock};
use crate::tools::{self, ToolCall};

/// Consumes one run's message stream.
pub struct StreamTranslator<'a> {
    ctx: &'a mut ExecutionContext,
    sink: &'a dyn EventSink,
    reported_session_id: Option<String>,
}

impl<'a> StreamTranslator<'a> {
    /// Create a translator writing into `ctx` and `sink`.
    pub fn new(ctx: &'a mut ExecutionContext, sink: &'a dyn EventSink) -> Self {
        Self {
            ctx,
            sink,
            reported_session_id: None,
        }
    }

    /// Consume `stream` until it ends or the run is cancelled.
    ///
    /// A cancelled run is never reported as an error, even if the stream
    /// fails while shutting down.
    ///
    /// # Errors
    /// Returns the runtime's error if the stream fails before cancellation.
    pub async fn run(mut self, mut stream: MessageStream) -> Result<(), RuntimeError> {
        let cancel = self.ctx.cancel.clone();

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                next = stream.next() => next,
            };

            match next {
                None => break,
                Some(Ok(message)) => self.handle_message(message).await,
                Some(Err(e)) if cancel.is_cancelled() => {
                    tracing::debug!(execution = %self.ctx.execution_id, "Ignoring error after cancel: {e}");
                    break;
                }
                Some(Err(e)) => return Err(e),
            }
        }

        tracing::debug!(
            execution = %self.ctx.execution_id,
            cancelled = cancel.is_cancelled(),
            produced_text = self.ctx.produced_text,
            "Run finished"
        );
        Ok(())
    }

    async fn handle_message(&mut self, message: RuntimeMessage) {
        match message {
            RuntimeMessage::System { session_id, .. } => {
                if let Some(id) = session_id {
                    self.observe_session_id(id).await;
                }
            }
            RuntimeMessage::Assistant { message, .. } => {
                for block in message.content {
                    if self.ctx.cancel.is_cancelled() {
                        break;
                    }
                    self.handle_block(block).await;
                }
            }
            RuntimeMessage::Result(result) => self.handle_result(result).await,
            RuntimeMessage::User { .. } | RuntimeMessage::Other => {}
        }
    }

    async fn handle_block(&mut self, block: ContentBlock) {
        match block {
            ContentBlock::Text { text } if !text.is_empty() => self.handle_text(&text).await,
            ContentBlock::ToolUse { id, name, input } => {
                match tools::classify(&id, &name, &input) {
                    ToolCall::AskUser(questions) => {
                        tracing::warn!(
                            execution = %self.ctx.execution_id,
                            "{} called; cancelling run and converting to questions",
                            tools::ASK_USER_TOOL
                        );
                        if let Some(questions) = questions {
                            self.ctx.push_questions(questions);
                        }
                        self.ctx.cancel.cancel();
                    }
                    ToolCall::Delegate(event) | ToolCall::Other(event) => {
                        self.sink.emit(event).await;
                    }
                }
            }
            ContentBlock::Text { .. } | ContentBlock::Other => {}
        }
    }

    async fn handle_text(&mut self, text: &str) {
        match scanner::scan(text) {
            TextBlock::Chain(chain) => {
                tracing::info!(
                    execution = %self.ctx.execution_id,
                    "Skill chain detected: {}:{}",
                    chain.plugin,
                    chain.skill_name
                );
                self.sink
                    .emit(SkillEvent::SkillChanged {
                        new_skill_name: chain.skill_name.clone(),
                        new_session_id: None,
                        chain_input: chain.input.clone(),
                    })
                    .await;
                self.ctx.chain = Some(chain);
                self.ctx.cancel.cancel();
            }
            TextBlock::Questions {
                residual,
                questions,
            } => {
                if !residual.is_empty() {
                    self.emit_text(residual).await;
                }
                if let Some(questions) = questions {
                    tracing::info!(
                        execution = %self.ctx.execution_id,
                        "Parsed {} structured questions",
                        questions.questions.len()
                    );
                    self.ctx.push_questions(questions);
                }
            }
            TextBlock::Plain(text) => self.emit_text(text).await,
        }
    }

    async fn emit_text(&mut self, text: String) {
        if !self.ctx.produced_text {
            self.ctx.produced_text = true;
            self.sink.text_produced().await;
        }
        self.sink.emit(SkillEvent::Text { text }).await;
    }

    async fn handle_result(&mut self, result: ResultMessage) {
        self.ctx.completed = true;
        if let Some(turns) = result.num_turns {
            self.ctx.num_turns = Some(turns);
        }
        if result.is_error {
            tracing::warn!(
                execution = %self.ctx.execution_id,
                subtype = result.subtype.as_deref().unwrap_or("unknown"),
                "Runtime reported an unsuccessful turn"
            );
        }

        if result.total_cost_usd.is_some() || result.usage.is_some() {
            let usage = result.usage.unwrap_or_default();
            self.sink
                .emit(SkillEvent::Usage(UsageReport {
                    input_tokens: usage.input_tokens,
                    output_tokens: usage.output_tokens,
                    cache_read_tokens: usage.cache_read_input_tokens,
                    cache_creation_tokens: usage.cache_creation_input_tokens,
                    total_cost_usd: result.total_cost_usd.unwrap_or_default(),
                    duration_ms: result.duration_ms.unwrap_or_default(),
                    num_turns: result.num_turns.unwrap_or_default(),
                }))
                .await;
        }

        if let Some(id) = result.session_id {
            self.observe_session_id(id).await;
        }
    }

    async fn observe_session_id(&mut self, id: String) {
        if self.reported_session_id.as_deref() == Some(id.as_str()) {
            return;
        }
        self.sink.session_id(&id).await;
        self.reported_session_id = Some(id.clone());
        self.ctx.sdk_session_id = Some(id);
    }
}
