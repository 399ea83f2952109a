//! The interviewer capability: asking the human approval questions.
//!
//! Variants cover the common mediation strategies: auto-approval for
//! unattended runs, a console for interactive terminals, a pre-loaded queue
//! for scripted runs, an injected callback for embedding, and a recording
//! wrapper that transcribes any other interviewer.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use conductor_types::ConductorError;

// ---------------------------------------------------------------------------
// Models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionType {
    YesNo,
    MultipleChoice,
    Freeform,
    Confirmation,
}

/// One selectable option of a multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub key: String,
    pub label: String,
}

impl Choice {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerValue {
    Yes,
    No,
    Skipped,
    Timeout,
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub value: AnswerValue,
    pub selected: Option<Choice>,
    pub text: String,
}

impl Answer {
    pub fn yes() -> Self {
        Self::of_value(AnswerValue::Yes)
    }

    pub fn no() -> Self {
        Self::of_value(AnswerValue::No)
    }

    pub fn skipped() -> Self {
        Self::of_value(AnswerValue::Skipped)
    }

    pub fn timeout() -> Self {
        Self::of_value(AnswerValue::Timeout)
    }

    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            value: AnswerValue::Text(text.clone()),
            selected: None,
            text,
        }
    }

    pub fn of_choice(choice: Choice) -> Self {
        Self {
            value: AnswerValue::Text(choice.key.clone()),
            selected: Some(choice),
            text: String::new(),
        }
    }

    fn of_value(value: AnswerValue) -> Self {
        Self {
            value,
            selected: None,
            text: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Question {
    pub text: String,
    pub kind: QuestionType,
    pub options: Vec<Choice>,
    /// Pipeline stage (node id) this question belongs to.
    pub stage: String,
    pub timeout: Option<Duration>,
    /// Returned instead of `Timeout` when the deadline passes.
    pub default: Option<Answer>,
}

impl Question {
    pub fn new(text: impl Into<String>, kind: QuestionType) -> Self {
        Self {
            text: text.into(),
            kind,
            options: Vec::new(),
            stage: String::new(),
            timeout: None,
            default: None,
        }
    }

    pub fn with_options(mut self, options: Vec<Choice>) -> Self {
        self.options = options;
        self
    }

    pub fn for_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = stage.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_default(mut self, default: Answer) -> Self {
        self.default = Some(default);
        self
    }
}

// ---------------------------------------------------------------------------
// Accelerators
// ---------------------------------------------------------------------------

/// Extract the single-key accelerator and clean label from a choice label.
///
/// Supported forms: `[K] Label`, `K) Label`, `K - Label`, and a first-letter
/// fallback. The key is always uppercase; empty or whitespace-only input
/// yields `("", "")`.
pub fn parse_accelerator(label: &str) -> (String, String) {
    let text = label.trim();
    if text.is_empty() {
        return (String::new(), String::new());
    }

    let patterns = [
        r"^\[(\w)\]\s+(.*)$",
        r"^(\w)\)\s+(.*)$",
        r"^(\w)\s*[-–]\s+(.*)$",
    ];
    for pattern in patterns {
        let re = regex::Regex::new(pattern).unwrap();
        if let Some(captures) = re.captures(text) {
            let key = captures[1].to_uppercase();
            let clean = captures[2].trim().to_string();
            return (key, clean);
        }
    }

    let first = text.chars().next().unwrap_or_default();
    (first.to_uppercase().to_string(), text.to_string())
}

// ---------------------------------------------------------------------------
// Interviewer trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Interviewer: Send + Sync {
    async fn ask(&self, question: &Question) -> conductor_types::Result<Answer>;

    /// One-way status message to the human. No-op by default.
    async fn inform(&self, _message: &str, _stage: &str) {}
}

// ---------------------------------------------------------------------------
// AutoApproveInterviewer
// ---------------------------------------------------------------------------

/// Approves everything; for unattended runs.
pub struct AutoApproveInterviewer;

#[async_trait]
impl Interviewer for AutoApproveInterviewer {
    async fn ask(&self, question: &Question) -> conductor_types::Result<Answer> {
        match question.kind {
            QuestionType::YesNo | QuestionType::Confirmation => Ok(Answer::yes()),
            QuestionType::MultipleChoice if !question.options.is_empty() => {
                Ok(Answer::of_choice(question.options[0].clone()))
            }
            _ => Ok(Answer::text("auto-approved")),
        }
    }
}

// ---------------------------------------------------------------------------
// ConsoleInterviewer
// ---------------------------------------------------------------------------

/// Reads answers from the terminal, honoring accelerator keys parsed from
/// option labels and the question's timeout.
pub struct ConsoleInterviewer;

#[async_trait]
impl Interviewer for ConsoleInterviewer {
    async fn ask(&self, question: &Question) -> conductor_types::Result<Answer> {
        println!("\n{}", question.text);
        match question.kind {
            QuestionType::MultipleChoice => {
                for option in &question.options {
                    let (key, clean) = parse_accelerator(&option.label);
                    let key = if key.is_empty() {
                        option.key.to_uppercase()
                    } else {
                        key
                    };
                    println!("  [{key}] {clean}");
                }
            }
            QuestionType::YesNo | QuestionType::Confirmation => println!("  [y/n]"),
            QuestionType::Freeform => {}
        }

        let read_line = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        });

        let line = match question.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, read_line).await {
                Ok(joined) => joined
                    .map_err(|e| ConductorError::Other(format!("console read failed: {e}")))?
                    .map_err(ConductorError::Io)?,
                Err(_) => {
                    return Ok(question
                        .default
                        .clone()
                        .unwrap_or_else(Answer::timeout));
                }
            },
            None => read_line
                .await
                .map_err(|e| ConductorError::Other(format!("console read failed: {e}")))?
                .map_err(ConductorError::Io)?,
        };

        Ok(interpret_console_input(question, &line))
    }

    async fn inform(&self, message: &str, stage: &str) {
        if stage.is_empty() {
            println!("{message}");
        } else {
            println!("[{stage}] {message}");
        }
    }
}

/// Map raw console input to an [`Answer`] for the given question.
fn interpret_console_input(question: &Question, input: &str) -> Answer {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return question.default.clone().unwrap_or_else(Answer::skipped);
    }

    match question.kind {
        QuestionType::YesNo | QuestionType::Confirmation => {
            match trimmed.to_ascii_lowercase().as_str() {
                "y" | "yes" => Answer::yes(),
                "n" | "no" => Answer::no(),
                _ => Answer::text(trimmed),
            }
        }
        QuestionType::MultipleChoice => {
            let initial = trimmed
                .chars()
                .next()
                .map(|c| c.to_uppercase().to_string())
                .unwrap_or_default();
            for option in &question.options {
                let (accel, _) = parse_accelerator(&option.label);
                let accel = if accel.is_empty() {
                    option.key.to_uppercase()
                } else {
                    accel
                };
                if accel == initial || trimmed.eq_ignore_ascii_case(&option.key) {
                    return Answer::of_choice(option.clone());
                }
            }
            Answer::text(trimmed)
        }
        QuestionType::Freeform => Answer::text(trimmed),
    }
}

// ---------------------------------------------------------------------------
// QueueInterviewer
// ---------------------------------------------------------------------------

/// Serves answers from a pre-loaded deque; an empty queue yields `Skipped`.
pub struct QueueInterviewer {
    answers: Mutex<VecDeque<Answer>>,
}

impl QueueInterviewer {
    pub fn new(answers: Vec<Answer>) -> Self {
        Self {
            answers: Mutex::new(VecDeque::from(answers)),
        }
    }

    pub fn remaining(&self) -> usize {
        self.answers.lock().unwrap().len()
    }
}

#[async_trait]
impl Interviewer for QueueInterviewer {
    async fn ask(&self, _question: &Question) -> conductor_types::Result<Answer> {
        Ok(self
            .answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(Answer::skipped))
    }
}

// ---------------------------------------------------------------------------
// CallbackInterviewer
// ---------------------------------------------------------------------------

/// Defers every question to an injected function.
pub struct CallbackInterviewer {
    callback: Box<dyn Fn(&Question) -> Answer + Send + Sync>,
}

impl CallbackInterviewer {
    pub fn new(callback: impl Fn(&Question) -> Answer + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }
}

#[async_trait]
impl Interviewer for CallbackInterviewer {
    async fn ask(&self, question: &Question) -> conductor_types::Result<Answer> {
        Ok((self.callback)(question))
    }
}

// ---------------------------------------------------------------------------
// RecordingInterviewer
// ---------------------------------------------------------------------------

/// Wraps another interviewer and appends every `(question, answer)` pair to
/// a transcript.
pub struct RecordingInterviewer {
    inner: std::sync::Arc<dyn Interviewer>,
    transcript: Mutex<Vec<(Question, Answer)>>,
}

impl RecordingInterviewer {
    pub fn new(inner: std::sync::Arc<dyn Interviewer>) -> Self {
        Self {
            inner,
            transcript: Mutex::new(Vec::new()),
        }
    }

    pub fn recordings(&self) -> Vec<(Question, Answer)> {
        self.transcript.lock().unwrap().clone()
    }
}

#[async_trait]
impl Interviewer for RecordingInterviewer {
    async fn ask(&self, question: &Question) -> conductor_types::Result<Answer> {
        let answer = self.inner.ask(question).await?;
        self.transcript
            .lock()
            .unwrap()
            .push((question.clone(), answer.clone()));
        Ok(answer)
    }

    async fn inform(&self, message: &str, stage: &str) {
        self.inner.inform(message, stage).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
