#![forbid(unsafe_code)]

pub mod error;
pub mod model;
pub mod text;
pub mod time;
pub mod typing;

pub use time::Clock;

pub use model::{
    ContentBlock, ContentBlocks, FieldName, IntroBlock, LearningTree, LessonBlock, LifecycleState,
    PendingSession, SessionContext, SessionId, SessionStatus, StreamEvent, TreeFact, UserId,
};

pub use typing::{BlockKind, TickOutcome, TypingJob, TypingQueue, tokenize};
