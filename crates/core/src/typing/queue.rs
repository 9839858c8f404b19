use std::collections::HashMap;
use std::collections::VecDeque;

use crate::typing::tokenizer::tokenize;

/// Which kind of block a typing job reveals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Intro,
    Lesson,
}

/// Pending progressive-reveal work for one block.
///
/// `text` is the newly arrived content to reveal token by token;
/// `typed_prefix` is content that was already revealed earlier and is shown
/// instantly when the job activates. Appending a roadmap to an intro block
/// queues only the delta with the intro as prefix, so nothing is ever
/// retyped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingJob {
    pub block_id: String,
    pub text: String,
    pub typed_prefix: String,
    pub topic: Option<String>,
    pub kind: BlockKind,
}

/// Result of advancing the queue by one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing queued.
    Idle,
    /// One more token of the named block was revealed.
    Progress { block_id: String },
    /// The active job's last token was revealed; the next job starts on the
    /// following tick.
    Finished { block_id: String },
}

#[derive(Debug)]
struct ActiveJob {
    job: TypingJob,
    /// Cumulative byte offsets of token ends within `job.text`.
    offsets: Vec<usize>,
    index: usize,
}

impl ActiveJob {
    fn new(job: TypingJob) -> Self {
        let mut offsets = Vec::new();
        let mut end = 0;
        for token in tokenize(&job.text) {
            end += token.len();
            offsets.push(end);
        }
        Self {
            job,
            offsets,
            index: 0,
        }
    }

    fn revealed(&self) -> String {
        let end = if self.index == 0 {
            0
        } else {
            self.offsets[self.index - 1]
        };
        format!("{}{}", self.job.typed_prefix, &self.job.text[..end])
    }

    fn is_done(&self) -> bool {
        self.index >= self.offsets.len()
    }
}

/// FIFO backlog of reveal work across blocks.
///
/// Only one job types at a time; a later block's reveal does not start until
/// the earlier block's tokens are exhausted, so content that arrives
/// asynchronously still reads as a single narrative. Per-block revealed text
/// is tracked so finished blocks stay fully visible.
#[derive(Debug, Default)]
pub struct TypingQueue {
    queue: VecDeque<TypingJob>,
    active: Option<ActiveJob>,
    revealed: HashMap<String, String>,
}

impl TypingQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue reveal work. Activates immediately when nothing is typing.
    pub fn push(&mut self, job: TypingJob) {
        if self.active.is_none() && self.queue.is_empty() {
            self.activate(job);
        } else {
            self.queue.push_back(job);
        }
    }

    /// Advance by one token.
    pub fn tick(&mut self) -> TickOutcome {
        if self.active.is_none() {
            let Some(job) = self.queue.pop_front() else {
                return TickOutcome::Idle;
            };
            self.activate(job);
        }

        let Some(active) = self.active.as_mut() else {
            return TickOutcome::Idle;
        };

        if active.is_done() {
            // Zero-token job (empty text): finish without progress.
            let block_id = active.job.block_id.clone();
            self.active = None;
            return TickOutcome::Finished { block_id };
        }

        active.index += 1;
        let block_id = active.job.block_id.clone();
        let text = active.revealed();
        let done = active.is_done();
        self.revealed.insert(block_id.clone(), text);

        if done {
            self.active = None;
            TickOutcome::Finished { block_id }
        } else {
            TickOutcome::Progress { block_id }
        }
    }

    /// True while a job is typing or queued.
    #[must_use]
    pub fn is_typing(&self) -> bool {
        self.active.is_some() || !self.queue.is_empty()
    }

    /// The block currently being revealed, if any.
    #[must_use]
    pub fn current_block(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.job.block_id.as_str())
    }

    /// Revealed text of a block so far, if it has started typing.
    #[must_use]
    pub fn revealed(&self, block_id: &str) -> Option<&str> {
        self.revealed.get(block_id).map(String::as_str)
    }

    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Drop all pending and active work, keeping already-revealed text.
    pub fn cancel_pending(&mut self) {
        self.queue.clear();
        self.active = None;
    }

    /// Forget everything, revealed text included. Used when the display is
    /// reset for a new session.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.active = None;
        self.revealed.clear();
    }

    fn activate(&mut self, job: TypingJob) {
        // The prefix was already typed in an earlier job; show it instantly.
        self.revealed
            .insert(job.block_id.clone(), job.typed_prefix.clone());
        self.active = Some(ActiveJob::new(job));
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
