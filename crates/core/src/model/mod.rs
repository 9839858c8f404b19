mod block;
mod context;
mod event;
mod ids;
mod lifecycle;
mod tree;

pub use block::{
    ContentBlock, ContentBlocks, IntroBlock, LessonBlock, intro_block_id, lesson_block_id,
};
pub use context::{ContextError, SessionContext};
pub use event::{
    DoubtAnswer, IntroductionGenerated, LessonDelivered, RoadmapGenerated, SessionStart,
    SessionStatusUpdate, SessionStop, StreamEvent, channel,
};
pub use ids::{FieldName, SessionId, UserId};
pub use lifecycle::{LifecycleState, PendingSession, SessionStatus};
pub use tree::{
    FactKind, FieldNode, LearningTree, ProfileField, ProfileSession, ProfileTopic, SessionNode,
    TopicNode, TreeFact,
};
