//! Lesson content and the collaborators that produce and grade it.
//!
//! The engine treats lesson bodies as opaque JSON. The only things it looks
//! at are whether a screen carries an interactive [`Check`] and whether the
//! learner's answer to it passed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::ledger::{MistakeRecord, QuestionKind};

/// A gradable question embedded in a screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Check {
    /// What kind of question this is.
    pub kind: QuestionKind,
    /// Short description of what is being tested; becomes the mistake's
    /// context snippet when the check fails.
    pub prompt: String,
    /// Expected-answer shape, passed to the [`Validator`] untouched.
    #[serde(default)]
    pub expected: Value,
    /// Rendering payload kept with a failure so the check can be replayed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget: Option<Value>,
}

impl Check {
    /// Creates a check without a widget payload.
    #[must_use]
    pub fn new(kind: QuestionKind, prompt: impl Into<String>, expected: Value) -> Self {
        Self {
            kind,
            prompt: prompt.into(),
            expected,
            widget: None,
        }
    }

    /// Returns `true` if answering this check can fail.
    #[must_use]
    pub const fn is_interactive(&self) -> bool {
        self.kind.is_interactive()
    }
}

/// One screen of a lesson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Screen {
    /// Whatever the renderer needs. Never inspected by the engine.
    #[serde(default)]
    pub body: Value,
    /// The question on this screen, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<Check>,
}

impl Screen {
    /// A screen with nothing to answer.
    #[must_use]
    pub const fn passive(body: Value) -> Self {
        Self { body, check: None }
    }

    /// A screen carrying a check.
    #[must_use]
    pub const fn with_check(body: Value, check: Check) -> Self {
        Self {
            body,
            check: Some(check),
        }
    }

    /// The check on this screen if it is one that must be graded.
    #[must_use]
    pub fn interactive_check(&self) -> Option<&Check> {
        self.check.as_ref().filter(|c| c.is_interactive())
    }
}

/// Everything shown during one pass through a run's `active` phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonContent {
    /// Screens in presentation order.
    pub screens: Vec<Screen>,
}

impl LessonContent {
    /// Wraps a list of screens.
    #[must_use]
    pub const fn new(screens: Vec<Screen>) -> Self {
        Self { screens }
    }

    /// Number of screens carrying an interactive check.
    #[must_use]
    pub fn interactive_count(&self) -> usize {
        self.screens
            .iter()
            .filter(|s| s.interactive_check().is_some())
            .count()
    }
}

/// What the engine asks a [`ContentProvider`] for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRequest {
    /// The item to produce a lesson for.
    pub item_id: String,
    /// 0 for a fresh run, incremented on every redo.
    pub stage: u32,
    /// The ledger's records for this item, for targeting weak spots.
    pub prior_mistakes: Vec<MistakeRecord>,
}

/// Produces lesson content for an item.
///
/// Implementations usually wrap a remote generator; the engine only awaits
/// the result and never retries on its own.
#[allow(async_fn_in_trait)]
pub trait ContentProvider {
    /// Fetches the screens for one stage of an item.
    async fn fetch(&self, request: &ContentRequest) -> Result<LessonContent>;
}

/// Grades a learner's answer to a single check.
pub trait Validator {
    /// Returns `Some(true)` for a correct answer, `Some(false)` for a wrong
    /// one and `None` when the input cannot be judged. Ungradable answers
    /// are treated as if the screen had no check.
    fn validate(&self, check: &Check, input: &Value) -> Option<bool>;
}

/// Compares the learner's input with the expected value for equality.
///
/// A check whose `expected` is `null` cannot be graded.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatchValidator;

impl Validator for ExactMatchValidator {
    fn validate(&self, check: &Check, input: &Value) -> Option<bool> {
        if check.expected.is_null() {
            return None;
        }
        Some(normalize(&check.expected) == normalize(input))
    }
}

/// Trims and lowercases strings so that `" Foo"` matches `"foo"`.
fn normalize(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.trim().to_lowercase()),
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        other => other.clone(),
    }
}
