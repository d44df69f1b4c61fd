//! Execution context for a single runtime run.

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::event::QuestionSet;

/// A skill-chain directive found in assistant text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillChain {
    /// Plugin the target skill belongs to.
    pub plugin: String,
    /// Target skill name.
    pub skill_name: String,
    /// Trailing arguments, passed to the next skill as its input.
    pub input: String,
}

/// Ephemeral state for one run.
///
/// `cancel` is a child of the caller's token: cancelling it stops only this
/// run, while cancelling the caller's token stops this run too.
#[derive(Debug)]
pub struct ExecutionContext {
    /// Identifier used to correlate log lines of one run.
    pub execution_id: Uuid,
    /// Cancellation signal observed by the stream consumer.
    pub cancel: CancellationToken,
    /// Whether any visible text was emitted.
    pub produced_text: bool,
    /// Last runtime session id observed.
    pub sdk_session_id: Option<String>,
    /// Questions buffered for delivery after the run.
    pub pending_questions: Option<QuestionSet>,
    /// Chain directive that ended the run, if any.
    pub chain: Option<SkillChain>,
    /// Turns consumed, from the result message.
    pub num_turns: Option<u32>,
    /// Whether the runtime reported an explicit end of turn.
    pub completed: bool,
}

impl ExecutionContext {
    /// Create a context whose cancellation is linked to `parent`.
    #[must_use]
    pub fn new(parent: &CancellationToken, resume_session_id: Option<String>) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            cancel: parent.child_token(),
            produced_text: false,
            sdk_session_id: resume_session_id,
            pending_questions: None,
            chain: None,
            num_turns: None,
            completed: false,
        }
    }

    /// Add questions to the pending payload.
    pub fn push_questions(&mut self, questions: QuestionSet) {
        match &mut self.pending_questions {
            Some(existing) => existing.merge(questions),
            None => self.pending_questions = Some(questions),
        }
    }

    /// Whether a non-empty question payload is waiting for the user.
    #[must_use]
    pub fn has_questions(&self) -> bool {
        self.pending_questions.as_ref().is_some_and(|q| !q.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::QuestionItem;

    #[test]
    fn test_child_cancellation_does_not_reach_parent() {
        let parent = CancellationToken::new();
        let ctx = ExecutionContext::new(&parent, None);
        ctx.cancel.cancel();
        assert!(ctx.cancel.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_parent_cancellation_reaches_child() {
        let parent = CancellationToken::new();
        let ctx = ExecutionContext::new(&parent, Some("prev".into()));
        parent.cancel();
        assert!(ctx.cancel.is_cancelled());
        assert_eq!(ctx.sdk_session_id.as_deref(), Some("prev"));
    }

    #[test]
    fn test_push_questions_merges() {
        let mut ctx = ExecutionContext::new(&CancellationToken::new(), None);
        assert!(!ctx.has_questions());
        ctx.push_questions(QuestionSet {
            title: "T".into(),
            questions: vec![QuestionItem::text("A")],
        });
        ctx.push_questions(QuestionSet {
            title: "U".into(),
            questions: vec![QuestionItem::text("B")],
        });
        let pending = ctx.pending_questions.unwrap();
        assert_eq!(pending.title, "U");
        assert_eq!(pending.questions.len(), 2);
    }
}
