//! Interview protocol: `Question`/`Answer` types and interviewer variants.
//!
//! The runner suspends a human-gate stage by calling into an `Interviewer`.
//! All variants share the same contract (`ask`/`ask_multiple`/`inform`);
//! timeout and skip semantics are encoded in the `Answer` sentinel values
//! rather than as separate error paths, so a handler never has to special-case
//! a timing failure differently from a normal answer.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use attractor_types::{AttractorError, Result};
use serde::{Deserialize, Serialize};

/// Reserved `Answer::value` meaning the question timed out with no default.
pub const TIMEOUT: &str = "TIMEOUT";
/// Reserved `Answer::value` meaning the question was explicitly skipped.
pub const SKIPPED: &str = "SKIPPED";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    MultipleChoice,
    YesNo,
    Confirmation,
    Freeform,
}

/// One selectable option in a `MULTIPLE_CHOICE` question: a short key (often
/// an accelerator letter) and a display label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub key: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    pub question_type: QuestionType,
    pub options: Vec<QuestionOption>,
    pub stage: String,
    pub default_answer: Option<String>,
    pub timeout_seconds: Option<u64>,
}

impl Question {
    pub fn multiple_choice(
        text: impl Into<String>,
        stage: impl Into<String>,
        options: Vec<QuestionOption>,
    ) -> Self {
        Self {
            text: text.into(),
            question_type: QuestionType::MultipleChoice,
            options,
            stage: stage.into(),
            default_answer: None,
            timeout_seconds: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub value: String,
    pub text: Option<String>,
    pub selected_option: Option<String>,
}

impl Answer {
    pub fn from_value(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            text: None,
            selected_option: None,
        }
    }

    pub fn timeout() -> Self {
        Self::from_value(TIMEOUT)
    }

    pub fn skipped() -> Self {
        Self::from_value(SKIPPED)
    }

    pub fn is_timeout(&self) -> bool {
        self.value == TIMEOUT
    }

    pub fn is_skipped(&self) -> bool {
        self.value == SKIPPED
    }
}

/// The default fallback answer for a question with no explicit default,
/// used by [`AutoApproveInterviewer`] and as the final Console fallback.
fn default_fallback(question: &Question) -> Answer {
    match question.question_type {
        QuestionType::MultipleChoice => question
            .options
            .first()
            .map(|o| Answer {
                value: o.key.clone(),
                text: None,
                selected_option: Some(o.key.clone()),
            })
            .unwrap_or_else(|| Answer::from_value("")),
        QuestionType::YesNo => Answer::from_value("YES"),
        QuestionType::Confirmation => Answer::from_value("YES"),
        QuestionType::Freeform => Answer::from_value(""),
    }
}

#[async_trait]
pub trait Interviewer: Send + Sync {
    /// Ask a single question; may suspend arbitrarily but must eventually
    /// resolve, falling back to `Answer{value=TIMEOUT}` (or the question's
    /// `default_answer`) rather than hanging forever.
    async fn ask(&self, question: &Question) -> Result<Answer>;

    /// Ask a sequence of questions, one at a time (never parallelized).
    async fn ask_multiple(&self, questions: &[Question]) -> Result<Vec<Answer>> {
        let mut answers = Vec::with_capacity(questions.len());
        for q in questions {
            answers.push(self.ask(q).await?);
        }
        Ok(answers)
    }

    /// Side-channel notification with no response expected.
    async fn inform(&self, _message: &str, _stage: &str) -> Result<()> {
        Ok(())
    }
}

/// Apply timeout policy: `Answer{TIMEOUT}` unless the question carries a
/// `default_answer`, in which case that default is returned instead.
fn timeout_answer(question: &Question) -> Answer {
    match &question.default_answer {
        Some(default) => Answer::from_value(default.clone()),
        None => Answer::timeout(),
    }
}

// ---------------------------------------------------------------------------
// AutoApproveInterviewer
// ---------------------------------------------------------------------------

/// Never blocks: returns `default_answer` if present, else the first option
/// for MULTIPLE_CHOICE, else YES for YES_NO/CONFIRMATION, else "" for FREEFORM.
pub struct AutoApproveInterviewer;

#[async_trait]
impl Interviewer for AutoApproveInterviewer {
    async fn ask(&self, question: &Question) -> Result<Answer> {
        Ok(match &question.default_answer {
            Some(default) => Answer::from_value(default.clone()),
            None => default_fallback(question),
        })
    }
}

// ---------------------------------------------------------------------------
// ConsoleInterviewer
// ---------------------------------------------------------------------------

/// Reads from stdin. MULTIPLE_CHOICE retries up to 3 invalid selections
/// before falling back to the first option. Input-stream-closed is distinct
/// from timeout but also causes fallback, never a thrown error.
pub struct ConsoleInterviewer {
    max_invalid_retries: usize,
}

impl ConsoleInterviewer {
    pub fn new() -> Self {
        Self {
            max_invalid_retries: 3,
        }
    }
}

impl Default for ConsoleInterviewer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Interviewer for ConsoleInterviewer {
    async fn ask(&self, question: &Question) -> Result<Answer> {
        println!("\n{}", question.text);
        for opt in &question.options {
            println!("  [{}] {}", opt.key, opt.label);
        }

        let read_line = || -> Option<String> {
            let mut input = String::new();
            match std::io::stdin().read_line(&mut input) {
                Ok(0) => None, // stream closed (EOF)
                Ok(_) => Some(input.trim().to_string()),
                Err(_) => None,
            }
        };

        for _ in 0..=self.max_invalid_retries {
            let Some(trimmed) = read_line() else {
                // stream closed: fall back, never throw
                return Ok(default_fallback(question));
            };

            if question.question_type != QuestionType::MultipleChoice {
                return Ok(Answer {
                    value: trimmed.clone(),
                    text: Some(trimmed),
                    selected_option: None,
                });
            }

            if let Some(opt) = question
                .options
                .iter()
                .find(|o| o.key.eq_ignore_ascii_case(&trimmed) || o.label.eq_ignore_ascii_case(&trimmed))
            {
                return Ok(Answer {
                    value: opt.key.clone(),
                    text: None,
                    selected_option: Some(opt.key.clone()),
                });
            }
            println!("Invalid selection, try again.");
        }

        Ok(default_fallback(question))
    }
}

// ---------------------------------------------------------------------------
// QueueInterviewer
// ---------------------------------------------------------------------------

/// A pre-seeded FIFO of answers. `ask` dequeues; exhaustion is fatal.
pub struct QueueInterviewer {
    answers: Mutex<VecDeque<Answer>>,
}

impl QueueInterviewer {
    pub fn new(answers: Vec<Answer>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
        }
    }
}

#[async_trait]
impl Interviewer for QueueInterviewer {
    async fn ask(&self, _question: &Question) -> Result<Answer> {
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(AttractorError::QueueEmpty)
    }
}

// ---------------------------------------------------------------------------
// WebInterviewer
// ---------------------------------------------------------------------------

/// Stores at most one pending question at a time; `ask` suspends until
/// `submit_answer` completes it. A second `ask` before the first is answered
/// is a contract violation.
pub struct WebInterviewer {
    pending: Mutex<Option<Question>>,
    resolver: Mutex<Option<tokio::sync::oneshot::Sender<Answer>>>,
    timeout: Option<Duration>,
}

impl WebInterviewer {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(None),
            resolver: Mutex::new(None),
            timeout: None,
        }
    }

    pub fn with_default_timeout(timeout: Duration) -> Self {
        Self {
            pending: Mutex::new(None),
            resolver: Mutex::new(None),
            timeout: Some(timeout),
        }
    }

    /// Returns the currently pending question, if any, for an HTTP layer to
    /// display.
    pub fn pending_question(&self) -> Option<Question> {
        self.pending.lock().unwrap().clone()
    }

    /// Submit an answer to the pending question. Returns `false` if no
    /// question was pending (the HTTP layer should treat this as a 404/409).
    pub fn submit_answer(&self, answer: Answer) -> bool {
        let sender = self.resolver.lock().unwrap().take();
        *self.pending.lock().unwrap() = None;
        match sender {
            Some(tx) => tx.send(answer).is_ok(),
            None => false,
        }
    }
}

impl Default for WebInterviewer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Interviewer for WebInterviewer {
    async fn ask(&self, question: &Question) -> Result<Answer> {
        {
            let mut pending = self.pending.lock().unwrap();
            if pending.is_some() {
                return Err(AttractorError::InterviewContractViolation(
                    "a question is already pending".to_string(),
                ));
            }
            *pending = Some(question.clone());
        }

        let (tx, rx) = tokio::sync::oneshot::channel();
        *self.resolver.lock().unwrap() = Some(tx);

        let effective_timeout = question
            .timeout_seconds
            .map(Duration::from_secs)
            .or(self.timeout);

        let answer = match effective_timeout {
            Some(d) => match tokio::time::timeout(d, rx).await {
                Ok(Ok(answer)) => answer,
                Ok(Err(_)) | Err(_) => {
                    *self.pending.lock().unwrap() = None;
                    self.resolver.lock().unwrap().take();
                    timeout_answer(question)
                }
            },
            None => rx.await.unwrap_or_else(|_| timeout_answer(question)),
        };

        Ok(answer)
    }
}

// Question needs Clone to be stored by value in WebInterviewer's pending slot.
impl PartialEq for QuestionType {
    fn eq(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

// ---------------------------------------------------------------------------
// RecordingInterviewer
// ---------------------------------------------------------------------------

/// Wraps another interviewer and records every (question, answer) pair in
/// the order they occurred.
pub struct RecordingInterviewer {
    inner: std::sync::Arc<dyn Interviewer>,
    recording: Mutex<Vec<(Question, Answer)>>,
}

impl RecordingInterviewer {
    pub fn new(inner: std::sync::Arc<dyn Interviewer>) -> Self {
        Self {
            inner,
            recording: Mutex::new(Vec::new()),
        }
    }

    /// The (question, answer) pairs recorded so far, in order.
    pub fn recording(&self) -> Vec<(Question, Answer)> {
        self.recording.lock().unwrap().clone()
    }

    /// Build a replay interviewer that reproduces this recording's answers
    /// in order, independent of the original interviewer.
    pub fn replay(&self) -> QueueInterviewer {
        QueueInterviewer::new(self.recording().into_iter().map(|(_, a)| a).collect())
    }
}

#[async_trait]
impl Interviewer for RecordingInterviewer {
    async fn ask(&self, question: &Question) -> Result<Answer> {
        let answer = self.inner.ask(question).await?;
        self.recording
            .lock()
            .unwrap()
            .push((question.clone(), answer.clone()));
        Ok(answer)
    }

    async fn inform(&self, message: &str, stage: &str) -> Result<()> {
        self.inner.inform(message, stage).await
    }
}
