//! Skill execution orchestrator.
//!
//! One call to [`Orchestrator::execute`] drives an invocation: it loads the
//! skill document, assembles prompts and the agent roster, runs the stream
//! translator (repeating with a continuation prompt while the runtime stops
//! short), and reconciles the session store with the outcome.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use skillflow_core::{
    AgentRegistry, AgentRoster, AgentRuntime, EventSink, ExecutionContext, RunRequest,
    Settings, SkillDocuments, SkillEvent, UsageReport,
};
use skillflow_executor::{
    ProgressTracker, PromptMode, SkillOutline, StreamTranslator, SystemPromptBuilder,
    UserPromptBuilder, merge_rosters, prompt::continuation_prompt,
};
use tokio_util::sync::CancellationToken;

use crate::{
    session::{SessionMeta, SessionStatus, SessionUsage, preview_of},
    store::SessionStore,
};

/// Orchestrator limits and language defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Language the skill documents are written in.
    pub default_language: String,
    /// Turn budget of one run.
    pub max_turns: u32,
    pub max_auto_continues: u32,
}

impl OrchestratorConfig {
    /// `language` when it differs from the documents' language.
    #[must_use]
    pub fn override_language<'a>(&self, language: Option<&'a str>) -> Option<&'a str> {
        language.filter(|lang| !lang.is_empty() && *lang != self.default_language)
    }
}

impl From<&Settings> for OrchestratorConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            default_language: settings.default_language.clone(),
            max_turns: settings.runtime.max_turns,
            max_auto_continues: settings.runtime.max_auto_continues,
        }
    }
}

/// One skill invocation.
#[derive(Debug, Clone, Default)]
pub struct SkillRequest {
    /// Skill to run, or the free-form prompt sentinel.
    pub skill_name: String,
    pub input: Option<String>,
    /// Project holding the skill documents.
    pub project_dir: PathBuf,
    /// Working directory for the runtime's tools.
    pub working_dir: PathBuf,
    /// Runtime session to resume.
    pub resume_session_id: Option<String>,
    pub attachments: Vec<String>,
    /// Skill whose results this invocation continues from.
    pub previous_skill: Option<String>,
    pub plugin_id: Option<String>,
    /// Requested response language.
    pub language: Option<String>,
}

/// How an invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The runtime finished. `fully_complete` is false while questions wait.
    Completed { fully_complete: bool },
    /// Control passed to another skill in a newly created session.
    Chained {
        skill_name: String,
        session_id: String,
        input: String,
    },
    /// Cancelled by the caller, or stopped at a chain to an unknown skill.
    /// The session was left untouched.
    Cancelled,
    /// The skill document does not exist.
    NotFound,
    /// The run failed; the session is in the error state.
    Failed(String),
}

/// Drives skill invocations against a runtime.
pub struct Orchestrator {
    runtime: Arc<dyn AgentRuntime>,
    registry: Arc<dyn AgentRegistry>,
    documents: Arc<dyn SkillDocuments>,
    sessions: SessionStore,
    config: OrchestratorConfig,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        runtime: Arc<dyn AgentRuntime>,
        registry: Arc<dyn AgentRegistry>,
        documents: Arc<dyn SkillDocuments>,
        sessions: SessionStore,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            runtime,
            registry,
            documents,
            sessions,
            config,
        }
    }

    #[must_use]
    pub const fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Run one invocation for `session_id`, delivering events to `sink`.
    ///
    /// Cancelling `cancel` stops the invocation without a `complete` event
    /// and without touching the session status. A caller starting a new
    /// invocation for the same session must cancel the previous one first.
    pub async fn execute(
        &self,
        session_id: &str,
        request: &SkillRequest,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> ExecutionOutcome {
        let mode = PromptMode::for_skill(&request.skill_name);

        let document = match mode {
            PromptMode::Skill => {
                match self
                    .documents
                    .load(&request.skill_name, &request.project_dir)
                    .await
                {
                    Ok(document) => Some(document),
                    Err(e) => {
                        tracing::error!(session = session_id, "{e}");
                        sink.emit(SkillEvent::error(e.to_string())).await;
                        return ExecutionOutcome::NotFound;
                    }
                }
            }
            PromptMode::FreeForm => None,
        };

        let tracker = document.as_deref().and_then(SkillOutline::parse).map(|outline| {
            tracing::info!(
                "Parsed {} {:?} headings from the skill document",
                outline.len(),
                outline.mode
            );
            ProgressTracker::new(outline)
        });
        if let Some(tracker) = &tracker {
            sink.emit(SkillEvent::Progress {
                steps: Some(tracker.steps().to_vec()),
                active_step: Some(tracker.active()),
            })
            .await;
        }

        let roster = self.load_roster(mode, request).await;
        let override_language = self.config.override_language(request.language.as_deref());

        let system_prompt = SystemPromptBuilder {
            mode,
            override_language,
            roster: &roster,
            plugin_id: request.plugin_id.as_deref(),
            previous_skill: request.previous_skill.as_deref(),
            document: document.as_deref(),
        }
        .build();
        let mut prompt = UserPromptBuilder {
            mode,
            input: request.input.as_deref(),
            resuming: request.resume_session_id.is_some(),
            attachments: &request.attachments,
            override_language,
        }
        .build();
        let agents = (!roster.is_empty()).then_some(roster);

        let observer = RunObserver {
            sink,
            sessions: &self.sessions,
            documents: self.documents.as_ref(),
            project_dir: &request.project_dir,
            session_id,
            skill_name: &request.skill_name,
            plugin_id: request.plugin_id.as_deref(),
            progress: Mutex::new(tracker),
            last_usage: Mutex::new(None),
            chained_session: Mutex::new(None),
        };

        let mut resume = request.resume_session_id.clone();
        let mut auto_continues = 0;

        let ctx = loop {
            let mut ctx = ExecutionContext::new(cancel, resume.clone());
            tracing::info!(
                session = session_id,
                execution = %ctx.execution_id,
                skill = %request.skill_name,
                resume = resume.as_deref().unwrap_or("-"),
                "Starting run"
            );

            let run = RunRequest {
                prompt: prompt.clone(),
                system_prompt: system_prompt.clone(),
                working_dir: request.working_dir.clone(),
                resume: resume.clone(),
                agents: agents.clone(),
                cancel: ctx.cancel.clone(),
            };
            let result = match self.runtime.start(run).await {
                Ok(stream) => StreamTranslator::new(&mut ctx, &observer).run(stream).await,
                Err(e) => Err(e),
            };

            if cancel.is_cancelled() {
                tracing::info!(session = session_id, "Invocation cancelled");
                observer.flush_usage().await;
                return ExecutionOutcome::Cancelled;
            }
            if let Err(e) = result {
                observer.flush_usage().await;
                return self.fail(session_id, sink, e.to_string()).await;
            }

            if ctx.sdk_session_id.is_some() {
                resume.clone_from(&ctx.sdk_session_id);
            }
            if ctx.chain.is_none()
                && self.should_continue(&ctx)
                && auto_continues < self.config.max_auto_continues
            {
                auto_continues += 1;
                tracing::info!(
                    session = session_id,
                    turns = ctx.num_turns.unwrap_or_default(),
                    "Run stopped short, auto-continuing ({auto_continues}/{})",
                    self.config.max_auto_continues
                );
                prompt = continuation_prompt(mode, override_language);
                continue;
            }
            break ctx;
        };

        observer.flush_usage().await;

        if let Some(chain) = ctx.chain {
            let Some(new_session_id) = observer.take_chained_session() else {
                tracing::info!(
                    session = session_id,
                    "Run stopped at a chain to unknown skill {}",
                    chain.skill_name
                );
                return ExecutionOutcome::Cancelled;
            };
            tracing::info!(
                session = session_id,
                next = %new_session_id,
                "Chained to {}",
                chain.skill_name
            );
            return ExecutionOutcome::Chained {
                skill_name: chain.skill_name,
                session_id: new_session_id,
                input: chain.input,
            };
        }

        let questions = ctx.pending_questions.filter(|q| !q.is_empty());
        let fully_complete = questions.is_none();
        if let Some(questions) = questions {
            sink.emit(SkillEvent::Questions(questions)).await;
        }
        if fully_complete {
            if let Some(step) = observer.finished_step() {
                sink.emit(SkillEvent::Progress {
                    steps: None,
                    active_step: Some(step),
                })
                .await;
            }
        }

        sink.emit(SkillEvent::Complete {
            session_id: session_id.to_string(),
            fully_complete,
        })
        .await;

        let status = if fully_complete {
            SessionStatus::Completed
        } else {
            SessionStatus::Waiting
        };
        if let Err(e) = self.sessions.set_status(session_id, status).await {
            tracing::warn!("Could not record completion: {e}");
        }
        tracing::info!(
            session = session_id,
            fully_complete,
            auto_continues,
            "Invocation finished"
        );

        ExecutionOutcome::Completed { fully_complete }
    }

    async fn load_roster(&self, mode: PromptMode, request: &SkillRequest) -> AgentRoster {
        let orchestration = self.registry.orchestration_agents().await;
        let plugin = match &request.plugin_id {
            Some(plugin_id) => {
                let skill = (mode == PromptMode::Skill).then_some(request.skill_name.as_str());
                self.registry.plugin_agents(plugin_id, skill).await
            }
            None => AgentRoster::new(),
        };
        merge_rosters(orchestration, plugin)
    }

    /// Whether a finished run warrants an automatic continuation.
    fn should_continue(&self, ctx: &ExecutionContext) -> bool {
        if ctx.cancel.is_cancelled() || ctx.has_questions() {
            return false;
        }
        let turns_exhausted = ctx.num_turns.is_some_and(|n| n >= self.config.max_turns);
        turns_exhausted || (!ctx.produced_text && !ctx.completed)
    }

    async fn fail(
        &self,
        session_id: &str,
        sink: &dyn EventSink,
        message: String,
    ) -> ExecutionOutcome {
        tracing::error!(session = session_id, "Run failed: {message}");
        sink.emit(SkillEvent::error(message.clone())).await;
        if let Err(e) = self.sessions.set_status(session_id, SessionStatus::Error).await {
            tracing::warn!("Could not record failure: {e}");
        }
        ExecutionOutcome::Failed(message)
    }
}

/// Sink wrapper that keeps session bookkeeping in step with the event flow.
struct RunObserver<'a> {
    sink: &'a dyn EventSink,
    sessions: &'a SessionStore,
    documents: &'a dyn SkillDocuments,
    project_dir: &'a Path,
    session_id: &'a str,
    skill_name: &'a str,
    plugin_id: Option<&'a str>,
    progress: Mutex<Option<ProgressTracker>>,
    last_usage: Mutex<Option<UsageReport>>,
    chained_session: Mutex<Option<String>>,
}

impl RunObserver<'_> {
    fn advance_progress(&self, text: &str) -> Option<u32> {
        self.progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
            .and_then(|tracker| tracker.observe(text))
    }

    fn finished_step(&self) -> Option<u32> {
        self.progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(ProgressTracker::finished_step)
    }

    fn take_chained_session(&self) -> Option<String> {
        self.chained_session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Write the last usage report of the invocation to the session.
    async fn flush_usage(&self) {
        let usage = self
            .last_usage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(usage) = usage else {
            return;
        };
        let meta = SessionMeta {
            usage: Some(SessionUsage::from(&usage)),
            ..SessionMeta::default()
        };
        if let Err(e) = self.sessions.update_meta(self.session_id, meta).await {
            tracing::debug!("Usage not recorded: {e}");
        }
    }

    /// Create the session a chain directive hands over to.
    ///
    /// Returns `None` without side effects when the target skill has no
    /// document.
    async fn create_chained_session(&self, skill_name: &str, chain_input: &str) -> Option<String> {
        if let Err(e) = self.documents.load(skill_name, self.project_dir).await {
            tracing::warn!(session = self.session_id, "Ignoring chain to {skill_name}: {e}");
            return None;
        }
        let session = self.sessions.create(skill_name).await;
        let preview = if chain_input.is_empty() {
            format!("← {}", self.skill_name)
        } else {
            preview_of(chain_input)
        };
        let meta = SessionMeta {
            preview: Some(preview),
            plugin_id: self.plugin_id.map(str::to_string),
            previous_skill_name: Some(self.skill_name.to_string()),
            ..SessionMeta::default()
        };
        if let Err(e) = self.sessions.update_meta(&session.id, meta).await {
            tracing::warn!("Chained session vanished before setup: {e}");
        }
        *self
            .chained_session
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(session.id.clone());
        Some(session.id)
    }
}

#[async_trait]
impl<'a> EventSink for RunObserver<'a> {
    async fn emit(&self, event: SkillEvent) {
        match event {
            SkillEvent::SkillChanged {
                new_skill_name,
                chain_input,
                ..
            } => {
                let Some(new_session_id) = self
                    .create_chained_session(&new_skill_name, &chain_input)
                    .await
                else {
                    return;
                };
                self.sink
                    .emit(SkillEvent::SkillChanged {
                        new_skill_name,
                        new_session_id: Some(new_session_id),
                        chain_input,
                    })
                    .await;
            }
            SkillEvent::Text { text } => {
                let advanced = self.advance_progress(&text);
                self.sink.emit(SkillEvent::Text { text }).await;
                if let Some(step) = advanced {
                    self.sink
                        .emit(SkillEvent::Progress {
                            steps: None,
                            active_step: Some(step),
                        })
                        .await;
                }
            }
            SkillEvent::Usage(report) => {
                *self
                    .last_usage
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(report.clone());
                self.sink.emit(SkillEvent::Usage(report)).await;
            }
            other => self.sink.emit(other).await,
        }
    }

    async fn session_id(&self, sdk_session_id: &str) {
        if let Err(e) = self
            .sessions
            .update_sdk_session_id(self.session_id, sdk_session_id)
            .await
        {
            tracing::debug!("Runtime session id not recorded: {e}");
        }
        self.sink.session_id(sdk_session_id).await;
    }

    async fn text_produced(&self) {
        self.sink.text_produced().await;
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{HashMap, VecDeque},
        path::Path,
        time::Duration,
    };

    use futures::{StreamExt, stream};
    use serde_json::json;
    use skillflow_core::{
        AgentDefinition, DocumentError, MessageStream, ResultMessage, RuntimeError,
        RuntimeMessage, StepInfo, TokenUsage,
    };
    use tokio::sync::mpsc;

    use super::*;
    use crate::{session::Session, storage::MemoryStorage};

    enum Script {
        Messages(Vec<RuntimeMessage>),
        Hang(Vec<RuntimeMessage>),
        StreamError(Vec<RuntimeMessage>, &'static str),
        StartError(&'static str),
    }

    struct ScriptedRuntime {
        scripts: Mutex<VecDeque<Script>>,
        requests: Mutex<Vec<RunRequest>>,
    }

    impl ScriptedRuntime {
        fn new(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
                requests: Mutex::default(),
            })
        }

        fn requests(&self) -> Vec<RunRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AgentRuntime for ScriptedRuntime {
        async fn start(&self, request: RunRequest) -> Result<MessageStream, RuntimeError> {
            self.requests.lock().unwrap().push(request);
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Script::Messages(vec![]));
            Ok(match script {
                Script::Messages(messages) => stream::iter(messages.into_iter().map(Ok)).boxed(),
                Script::Hang(messages) => stream::iter(messages.into_iter().map(Ok))
                    .chain(stream::pending())
                    .boxed(),
                Script::StreamError(messages, error) => stream::iter(messages.into_iter().map(Ok))
                    .chain(stream::once(async move {
                        Err(RuntimeError::Stream(error.to_string()))
                    }))
                    .boxed(),
                Script::StartError(error) => return Err(RuntimeError::Start(error.to_string())),
            })
        }
    }

    struct Documents(HashMap<String, String>);

    #[async_trait]
    impl SkillDocuments for Documents {
        async fn load(&self, skill_name: &str, _project_dir: &Path) -> Result<String, DocumentError> {
            self.0
                .get(skill_name)
                .cloned()
                .ok_or_else(|| DocumentError::NotFound {
                    skill: skill_name.to_string(),
                })
        }
    }

    struct Registry;

    fn agent(description: &str) -> AgentDefinition {
        AgentDefinition {
            description: description.into(),
            prompt: description.into(),
            model: None,
            disallowed_tools: None,
        }
    }

    #[async_trait]
    impl AgentRegistry for Registry {
        async fn orchestration_agents(&self) -> AgentRoster {
            AgentRoster::from([
                ("explore".to_string(), agent("orchestration explore")),
                ("shared".to_string(), agent("orchestration shared")),
            ])
        }

        async fn plugin_agents(&self, plugin_id: &str, _skill: Option<&str>) -> AgentRoster {
            if plugin_id == "dmap" {
                AgentRoster::from([("shared".to_string(), agent("plugin shared"))])
            } else {
                AgentRoster::new()
            }
        }
    }

    const DOC: &str = "# Deploy\n### Step 1: Prepare\n### Step 2: Ship\n";

    struct Harness {
        orchestrator: Orchestrator,
        runtime: Arc<ScriptedRuntime>,
        session: Session,
    }

    async fn harness(scripts: Vec<Script>, max_auto_continues: u32) -> Harness {
        let runtime = ScriptedRuntime::new(scripts);
        let sessions =
            SessionStore::open(Arc::new(MemoryStorage::new()), Duration::from_secs(3600)).await;
        let session = sessions.create("deploy").await;
        let orchestrator = Orchestrator::new(
            runtime.clone(),
            Arc::new(Registry),
            Arc::new(Documents(HashMap::from([
                ("deploy".to_string(), DOC.to_string()),
                ("publish".to_string(), "# Publish\n".to_string()),
            ]))),
            sessions,
            OrchestratorConfig {
                default_language: "ko".into(),
                max_turns: 50,
                max_auto_continues,
            },
        );
        Harness {
            orchestrator,
            runtime,
            session,
        }
    }

    fn request(skill: &str, input: Option<&str>) -> SkillRequest {
        SkillRequest {
            skill_name: skill.into(),
            input: input.map(str::to_string),
            plugin_id: Some("dmap".into()),
            ..SkillRequest::default()
        }
    }

    async fn run(h: &Harness, request: &SkillRequest) -> (ExecutionOutcome, Vec<SkillEvent>) {
        run_with(h, request, &CancellationToken::new()).await
    }

    async fn run_with(
        h: &Harness,
        request: &SkillRequest,
        cancel: &CancellationToken,
    ) -> (ExecutionOutcome, Vec<SkillEvent>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = h
            .orchestrator
            .execute(&h.session.id, request, &tx, cancel)
            .await;
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        (outcome, events)
    }

    fn finished(session_id: &str, turns: u32) -> RuntimeMessage {
        RuntimeMessage::Result(ResultMessage {
            session_id: Some(session_id.into()),
            total_cost_usd: Some(0.1),
            usage: Some(TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
                ..TokenUsage::default()
            }),
            num_turns: Some(turns),
            duration_ms: Some(1000),
            ..ResultMessage::default()
        })
    }

    fn status(h: &Harness) -> SessionStatus {
        h.orchestrator.sessions().get(&h.session.id).unwrap().status
    }

    #[test]
    fn test_override_language() {
        let config = OrchestratorConfig::from(&Settings::default());
        assert_eq!(config.override_language(None), None);
        assert_eq!(config.override_language(Some("")), None);
        assert_eq!(config.override_language(Some("ko")), None);
        assert_eq!(config.override_language(Some("en")), Some("en"));
    }

    #[tokio::test]
    async fn test_completed_run_with_progress() {
        let h = harness(
            vec![Script::Messages(vec![
                RuntimeMessage::System {
                    subtype: Some("init".into()),
                    session_id: Some("sdk-1".into()),
                },
                RuntimeMessage::assistant_text("Working on Step 2 now"),
                finished("sdk-1", 3),
            ])],
            5,
        )
        .await;

        let (outcome, events) = run(&h, &request("deploy", Some("go"))).await;
        assert_eq!(outcome, ExecutionOutcome::Completed { fully_complete: true });

        assert_eq!(
            events[0],
            SkillEvent::Progress {
                steps: Some(vec![
                    StepInfo {
                        step: 1,
                        label: "Prepare".into()
                    },
                    StepInfo {
                        step: 2,
                        label: "Ship".into()
                    },
                ]),
                active_step: Some(1),
            }
        );
        assert_eq!(events[1], SkillEvent::text("Working on Step 2 now"));
        assert_eq!(
            events[2],
            SkillEvent::Progress {
                steps: None,
                active_step: Some(2)
            }
        );
        assert!(matches!(events[3], SkillEvent::Usage(_)));
        assert_eq!(
            events[4],
            SkillEvent::Progress {
                steps: None,
                active_step: Some(3)
            }
        );
        assert_eq!(
            events[5],
            SkillEvent::Complete {
                session_id: h.session.id.clone(),
                fully_complete: true,
            }
        );
        assert_eq!(events.len(), 6);

        let session = h.orchestrator.sessions().get(&h.session.id).unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.sdk_session_id.as_deref(), Some("sdk-1"));
        assert_eq!(session.usage.unwrap().input_tokens, 10);
    }

    #[tokio::test]
    async fn test_prompt_and_roster_forwarded() {
        let h = harness(vec![Script::Messages(vec![finished("s", 1)])], 5).await;
        let mut req = request("deploy", Some("ship it"));
        req.language = Some("en".into());
        req.previous_skill = Some("plan".into());
        run(&h, &req).await;

        let sent = h.runtime.requests().remove(0);
        assert!(sent.prompt.starts_with("User input: ship it"));
        assert!(sent.prompt.contains("Respond in English."));
        assert!(sent.system_prompt.starts_with("### LANGUAGE OVERRIDE"));
        assert!(sent.system_prompt.contains("PREVIOUS SKILL RESULT"));
        assert!(sent.system_prompt.ends_with(DOC));
        let agents = sent.agents.unwrap();
        assert_eq!(agents.len(), 2);
        assert_eq!(agents["shared"].description, "plugin shared");
        assert_eq!(sent.resume, None);
    }

    #[tokio::test]
    async fn test_questions_leave_session_waiting() {
        let h = harness(
            vec![Script::Messages(vec![
                RuntimeMessage::assistant_text(concat!(
                    "Need details.\n",
                    "<!--ASK_USER-->{\"questions\":[{\"question\":\"A\"}]}<!--/ASK_USER-->",
                    "<!--ASK_USER-->{\"questions\":[{\"question\":\"B\"}]}<!--/ASK_USER-->",
                )),
                finished("sdk-1", 2),
            ])],
            5,
        )
        .await;

        let (outcome, events) = run(&h, &request("deploy", None)).await;
        assert_eq!(outcome, ExecutionOutcome::Completed { fully_complete: false });

        let questions: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                SkillEvent::Questions(set) => Some(set),
                _ => None,
            })
            .collect();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].questions.len(), 2);
        assert!(events.contains(&SkillEvent::text("Need details.")));
        assert_eq!(
            events.last(),
            Some(&SkillEvent::Complete {
                session_id: h.session.id.clone(),
                fully_complete: false,
            })
        );
        assert!(!events.iter().any(|e| matches!(
            e,
            SkillEvent::Progress {
                active_step: Some(3),
                ..
            }
        )));
        assert_eq!(status(&h), SessionStatus::Waiting);
        assert_eq!(h.runtime.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_native_question_tool_cancels_without_continuation() {
        let h = harness(
            vec![Script::Hang(vec![RuntimeMessage::tool_use(
                "q1",
                "AskUserQuestion",
                json!({"questions":[{"question":"Pick one","options":["X","Y"]}]}),
            )])],
            5,
        )
        .await;

        let (outcome, events) = run(&h, &request("deploy", None)).await;
        assert_eq!(outcome, ExecutionOutcome::Completed { fully_complete: false });
        assert!(events.iter().any(|e| matches!(e, SkillEvent::Questions(_))));
        assert_eq!(h.runtime.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_chain_creates_next_session() {
        let h = harness(
            vec![Script::Hang(vec![RuntimeMessage::assistant_text(
                "Saved output/deploy-result.md\n/dmap:publish release notes",
            )])],
            5,
        )
        .await;

        let (outcome, events) = run(&h, &request("deploy", None)).await;
        let ExecutionOutcome::Chained {
            skill_name,
            session_id,
            input,
        } = outcome
        else {
            panic!("expected chain, got {outcome:?}");
        };
        assert_eq!(skill_name, "publish");
        assert_eq!(input, "release notes");

        let changed: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, SkillEvent::SkillChanged { .. }))
            .collect();
        assert_eq!(
            changed,
            [&SkillEvent::SkillChanged {
                new_skill_name: "publish".into(),
                new_session_id: Some(session_id.clone()),
                chain_input: "release notes".into(),
            }]
        );
        assert!(!events.iter().any(|e| matches!(e, SkillEvent::Complete { .. })));

        let next = h.orchestrator.sessions().get(&session_id).unwrap();
        assert_eq!(next.skill_name, "publish");
        assert_eq!(next.previous_skill_name.as_deref(), Some("deploy"));
        assert_eq!(next.preview.as_deref(), Some("release notes"));
        assert_eq!(next.plugin_id.as_deref(), Some("dmap"));
        assert_eq!(status(&h), SessionStatus::Active);
    }

    #[tokio::test]
    async fn test_chain_to_unknown_skill_is_ignored() {
        let h = harness(
            vec![Script::Hang(vec![RuntimeMessage::assistant_text(
                "Here is a path:\n/src:main\nend",
            )])],
            5,
        )
        .await;

        let (outcome, events) = run(&h, &request("deploy", None)).await;
        assert_eq!(outcome, ExecutionOutcome::Cancelled);
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, SkillEvent::SkillChanged { .. } | SkillEvent::Complete { .. }))
        );
        assert_eq!(h.runtime.requests().len(), 1);
        assert_eq!(h.orchestrator.sessions().list(None).len(), 1);
        assert_eq!(status(&h), SessionStatus::Active);
    }

    #[tokio::test]
    async fn test_missing_document() {
        let h = harness(vec![], 5).await;
        let (outcome, events) = run(&h, &request("ghost", None)).await;
        assert_eq!(outcome, ExecutionOutcome::NotFound);
        assert_eq!(events, vec![SkillEvent::error("Skill \"ghost\" not found")]);
        assert!(h.runtime.requests().is_empty());
        assert_eq!(status(&h), SessionStatus::Active);
    }

    #[tokio::test]
    async fn test_stream_failure_marks_error() {
        let h = harness(
            vec![Script::StreamError(
                vec![RuntimeMessage::assistant_text("partial")],
                "connection reset",
            )],
            5,
        )
        .await;
        let (outcome, events) = run(&h, &request("deploy", None)).await;
        assert!(matches!(outcome, ExecutionOutcome::Failed(ref m) if m.contains("connection reset")));
        assert!(matches!(events.last(), Some(SkillEvent::Error { message }) if message.contains("connection reset")));
        assert!(!events.iter().any(|e| matches!(e, SkillEvent::Complete { .. })));
        assert_eq!(status(&h), SessionStatus::Error);
    }

    #[tokio::test]
    async fn test_start_failure_marks_error() {
        let h = harness(vec![Script::StartError("not installed")], 5).await;
        let (outcome, _) = run(&h, &request("deploy", None)).await;
        assert!(matches!(outcome, ExecutionOutcome::Failed(_)));
        assert_eq!(status(&h), SessionStatus::Error);
    }

    #[tokio::test]
    async fn test_auto_continue_resumes_captured_session() {
        let h = harness(
            vec![
                Script::Messages(vec![RuntimeMessage::System {
                    subtype: None,
                    session_id: Some("sdk-7".into()),
                }]),
                Script::Messages(vec![
                    RuntimeMessage::assistant_text("done"),
                    finished("sdk-7", 4),
                ]),
            ],
            5,
        )
        .await;

        let (outcome, _) = run(&h, &request("deploy", Some("go"))).await;
        assert_eq!(outcome, ExecutionOutcome::Completed { fully_complete: true });

        let requests = h.runtime.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].resume.as_deref(), Some("sdk-7"));
        assert!(requests[1].prompt.starts_with("Continue executing the skill"));
    }

    #[tokio::test]
    async fn test_turn_exhaustion_continues_up_to_limit() {
        let scripts = (0..5)
            .map(|_| {
                Script::Messages(vec![
                    RuntimeMessage::assistant_text("still going"),
                    finished("sdk-1", 50),
                ])
            })
            .collect();
        let h = harness(scripts, 2).await;

        let (outcome, _) = run(&h, &request("deploy", None)).await;
        assert_eq!(outcome, ExecutionOutcome::Completed { fully_complete: true });
        assert_eq!(h.runtime.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_external_cancel() {
        let h = harness(
            vec![Script::Hang(vec![RuntimeMessage::assistant_text("thinking")])],
            5,
        )
        .await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let (outcome, events) = run_with(&h, &request("deploy", None), &cancel).await;
        assert_eq!(outcome, ExecutionOutcome::Cancelled);
        assert!(events.contains(&SkillEvent::text("thinking")));
        assert!(!events.iter().any(|e| matches!(e, SkillEvent::Complete { .. })));
        assert_eq!(status(&h), SessionStatus::Active);
        assert_eq!(h.runtime.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_free_form_prompt_mode() {
        let h = harness(
            vec![Script::Messages(vec![
                RuntimeMessage::assistant_text("hi"),
                finished("sdk-2", 1),
            ])],
            5,
        )
        .await;
        let mut req = request("__prompt__", Some("list the files"));
        req.plugin_id = None;

        let (outcome, events) = run(&h, &req).await;
        assert_eq!(outcome, ExecutionOutcome::Completed { fully_complete: true });
        assert!(!events.iter().any(|e| matches!(e, SkillEvent::Progress { .. })));

        let sent = h.runtime.requests().remove(0);
        assert_eq!(sent.prompt, "list the files");
        assert!(sent.system_prompt.starts_with("You are a helpful assistant"));
        assert_eq!(sent.agents.unwrap().len(), 2);
    }
}
