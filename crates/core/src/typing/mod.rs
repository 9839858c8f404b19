mod queue;
mod tokenizer;

pub use queue::{BlockKind, TickOutcome, TypingJob, TypingQueue};
pub use tokenizer::tokenize;
