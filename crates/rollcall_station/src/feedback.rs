//! Operator feedback for scan outcomes.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Success,
    Warning,
    Error,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Success => "success",
            Tone::Warning => "warning",
            Tone::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feedback {
    pub tone: Tone,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Feedback {
    pub fn new(tone: Tone, message: impl Into<String>) -> Self {
        Self {
            tone,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Latest feedback, cleared after a display interval.
///
/// A newer `show` restarts the interval; the clear timer of an older message
/// never wipes a newer one. The board is independent of the classifier's
/// in-flight guard: clearing feedback does not gate the next scan.
#[derive(Debug, Clone)]
pub struct FeedbackBoard {
    inner: Arc<BoardInner>,
}

#[derive(Debug)]
struct BoardInner {
    tx: watch::Sender<Option<Feedback>>,
    generation: AtomicU64,
    reset_after: Duration,
}

impl FeedbackBoard {
    pub fn new(reset_after: Duration) -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(BoardInner {
                tx,
                generation: AtomicU64::new(0),
                reset_after,
            }),
        }
    }

    /// Show `feedback` and schedule its removal. Must run inside a Tokio runtime.
    pub fn show(&self, feedback: Feedback) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.tx.send_replace(Some(feedback));

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.reset_after).await;
            if inner.generation.load(Ordering::SeqCst) == generation {
                inner.tx.send_replace(None);
            }
        });
    }

    pub fn current(&self) -> Option<Feedback> {
        self.inner.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Feedback>> {
        self.inner.tx.subscribe()
    }
}
