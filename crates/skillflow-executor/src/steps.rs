//! Step outline parsing for progress reporting.

use std::sync::LazyLock;

use regex::Regex;
use skillflow_core::StepInfo;

static PHASE_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^#{3,4}[ \t]+Phase[ \t]+(\d+)[:.][ \t]*(.+)$").unwrap()
});

static STEP_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^#{3,4}[ \t]+Step[ \t]+(\d+)[:.][ \t]*(.+)$").unwrap()
});

static PHASE_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bPhase\s+(\d+)").unwrap());

static STEP_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bStep\s+(\d+)").unwrap());

static LABEL_SUFFIXES: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"\s*→\s*Agent:.*$").unwrap(),
        Regex::new(r"\s*\(.*?\)\s*$").unwrap(),
        Regex::new(r"\s*--\s*.+$").unwrap(),
    ]
});

/// Minimum number of headings for an outline to be reported.
const MIN_STEPS: usize = 2;

/// Which heading keyword the outline was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlineMode {
    Phase,
    Step,
}

/// Ordered steps parsed from a skill document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillOutline {
    pub mode: OutlineMode,
    pub steps: Vec<StepInfo>,
}

impl SkillOutline {
    /// Parse `### Phase N: label` headings, falling back to `### Step N: label`.
    ///
    /// Returns `None` when neither form appears at least twice.
    #[must_use]
    pub fn parse(document: &str) -> Option<Self> {
        [
            (OutlineMode::Phase, &*PHASE_HEADING),
            (OutlineMode::Step, &*STEP_HEADING),
        ]
        .into_iter()
        .find_map(|(mode, pattern)| {
            let steps: Vec<StepInfo> = pattern
                .captures_iter(document)
                .filter_map(|caps| {
                    Some(StepInfo {
                        step: caps[1].parse().ok()?,
                        label: clean_label(&caps[2]),
                    })
                })
                .collect();
            (steps.len() >= MIN_STEPS).then_some(Self { mode, steps })
        })
    }

    /// Number of steps in the outline.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Highest step number mentioned in `text`, if any.
    #[must_use]
    pub fn detect_step(&self, text: &str) -> Option<u32> {
        let pattern = match self.mode {
            OutlineMode::Phase => &*PHASE_MENTION,
            OutlineMode::Step => &*STEP_MENTION,
        };
        pattern
            .captures_iter(text)
            .filter_map(|caps| caps[1].parse::<u32>().ok())
            .max()
    }
}

fn clean_label(raw: &str) -> String {
    let mut label = raw.trim().to_string();
    for suffix in LABEL_SUFFIXES.iter() {
        label = suffix.replace(&label, "").into_owned();
    }
    label.trim().to_string()
}

/// Tracks the active step across the text of one invocation.
///
/// The active step only moves forward.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    outline: SkillOutline,
    active: u32,
}

impl ProgressTracker {
    #[must_use]
    pub const fn new(outline: SkillOutline) -> Self {
        Self { outline, active: 1 }
    }

    #[must_use]
    pub fn steps(&self) -> &[StepInfo] {
        &self.outline.steps
    }

    #[must_use]
    pub const fn active(&self) -> u32 {
        self.active
    }

    /// Advance on a mention of a later step. Returns the new active step.
    pub fn observe(&mut self, text: &str) -> Option<u32> {
        let detected = self.outline.detect_step(text)?;
        let len = u32::try_from(self.outline.len()).unwrap_or(u32::MAX);
        if detected > self.active && detected <= len {
            self.active = detected;
            Some(detected)
        } else {
            None
        }
    }

    /// Step number reported once every step is done.
    #[must_use]
    pub fn finished_step(&self) -> u32 {
        u32::try_from(self.outline.len())
            .unwrap_or(u32::MAX)
            .saturating_add(1)
    }
}
