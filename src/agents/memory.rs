//! Per-agent conversation memory.
//!
//! An ordered message window with a soft cap. Once the window overflows, an
//! external summarizer compresses the oldest messages into a single summary
//! string; `messages()` then prepends that summary as a synthetic system
//! message. The agent's system prompt is never stored here.

use std::future::Future;

use tokio::sync::Mutex;

use crate::llm::Message;

/// Default window size; specialists tune per role.
pub const DEFAULT_MEMORY_SIZE: usize = 20;
/// How many recent messages survive a summarization pass.
pub const DEFAULT_KEEP_RECENT: usize = 6;

pub struct ConversationMemory {
    max_size: usize,
    keep_recent: usize,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    messages: Vec<Message>,
    summary: Option<String>,
}

impl ConversationMemory {
    pub fn new(max_size: usize, keep_recent: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            keep_recent: keep_recent.min(max_size).max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.messages.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn add(&self, messages: impl IntoIterator<Item = Message>) {
        self.inner.lock().await.messages.extend(messages);
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.messages.clear();
        inner.summary = None;
    }

    /// Window contents for the next prompt. If older turns have been
    /// summarized, the summary leads as a synthetic system message.
    pub async fn messages(&self) -> Vec<Message> {
        let inner = self.inner.lock().await;
        let mut out = Vec::with_capacity(inner.messages.len() + 1);
        if let Some(summary) = &inner.summary {
            out.push(Message::system(format!(
                "Summary of earlier conversation:\n{summary}"
            )));
        }
        out.extend(inner.messages.iter().cloned());
        out
    }

    /// Checked opportunistically by agents, never on the hot path.
    pub async fn needs_summarization(&self) -> bool {
        self.inner.lock().await.messages.len() > self.max_size
    }

    /// Compress the oldest `len - keep_recent` messages via the caller's
    /// summarizer (typically an LLM call).
    ///
    /// The lock is released while the summarizer runs so the external call
    /// cannot deadlock an outer request. Concurrent appends land at the tail
    /// and are untouched; the summary stays valid because it describes
    /// strictly older messages.
    pub async fn summarize<F, Fut, E>(&self, summarizer: F) -> Result<(), E>
    where
        F: FnOnce(Vec<Message>) -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        let (batch, batch_len) = {
            let inner = self.inner.lock().await;
            if inner.messages.len() <= self.max_size {
                return Ok(());
            }
            let n = inner.messages.len() - self.keep_recent;
            let mut batch = Vec::with_capacity(n + 1);
            // Fold the prior summary into the new one's input.
            if let Some(prev) = &inner.summary {
                batch.push(Message::system(format!("Earlier summary:\n{prev}")));
            }
            batch.extend(inner.messages[..n].iter().cloned());
            (batch, n)
        };

        // Lock released: the summarizer may take seconds.
        let summary = summarizer(batch).await?;

        let mut inner = self.inner.lock().await;
        let drain_len = batch_len.min(inner.messages.len());
        inner.messages.drain(..drain_len);
        inner.summary = Some(summary);
        Ok(())
    }
}
