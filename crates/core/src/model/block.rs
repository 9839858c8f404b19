use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{FieldName, SessionId};

//
// ─── BLOCKS ────────────────────────────────────────────────────────────────────
//

/// The one-per-session introduction block. Starts with the introduction text
/// and later absorbs the roadmap as an appended markdown section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntroBlock {
    pub id: String,
    pub session_id: SessionId,
    pub session_day: Option<String>,
    pub topic: String,
    pub title: String,
    pub introduction: Option<String>,
    pub roadmap: Option<String>,
    pub content: String,
}

/// A delivered lesson, one block per (session, topic).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonBlock {
    pub id: String,
    pub session_id: SessionId,
    pub topic: String,
    pub title: String,
    pub content: String,
    pub path: Vec<String>,
}

/// A unit of renderable material tracked independently for progressive reveal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "INTRO")]
    Intro(IntroBlock),
    #[serde(rename = "LESSON")]
    Lesson(LessonBlock),
}

impl ContentBlock {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            ContentBlock::Intro(b) => &b.id,
            ContentBlock::Lesson(b) => &b.id,
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        match self {
            ContentBlock::Intro(b) => &b.session_id,
            ContentBlock::Lesson(b) => &b.session_id,
        }
    }

    #[must_use]
    pub fn content(&self) -> &str {
        match self {
            ContentBlock::Intro(b) => &b.content,
            ContentBlock::Lesson(b) => &b.content,
        }
    }
}

/// Block id for a session's introduction block.
#[must_use]
pub fn intro_block_id(session_id: &SessionId) -> String {
    format!("INTRO_{session_id}")
}

/// Block id for a delivered lesson. The timestamp keeps ids unique across
/// repeated deliveries of the same topic in different client lifetimes.
#[must_use]
pub fn lesson_block_id(session_id: &SessionId, topic: &str, at: DateTime<Utc>) -> String {
    format!("LESSON_{session_id}_{topic}_{}", at.timestamp_millis())
}

//
// ─── COLLECTION ────────────────────────────────────────────────────────────────
//

/// Ordered collection of content blocks, owned by the rendering layer and
/// mutated only by the stream handlers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlocks {
    blocks: Vec<ContentBlock>,
}

impl ContentBlocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn blocks(&self) -> &[ContentBlock] {
        &self.blocks
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Drop all blocks. Used when the stream reveals a new session id and the
    /// display starts fresh.
    pub fn reset(&mut self) {
        self.blocks.clear();
    }

    #[must_use]
    pub fn find_intro(&self, session_id: &SessionId) -> Option<&IntroBlock> {
        self.blocks.iter().find_map(|b| match b {
            ContentBlock::Intro(intro) if &intro.session_id == session_id => Some(intro),
            _ => None,
        })
    }

    #[must_use]
    pub fn has_lesson(&self, session_id: &SessionId, topic: &str) -> bool {
        self.blocks.iter().any(|b| match b {
            ContentBlock::Lesson(l) => &l.session_id == session_id && l.topic == topic,
            ContentBlock::Intro(_) => false,
        })
    }

    /// Create or update the introduction block for a session; at most one
    /// exists per session id. Returns the block id.
    pub fn upsert_intro(
        &mut self,
        session_id: &SessionId,
        session_day: Option<String>,
        topic: &str,
        field: &FieldName,
        introduction: &str,
    ) -> String {
        let id = intro_block_id(session_id);

        if let Some(existing) = self.find_intro_mut(session_id) {
            existing.introduction = Some(introduction.to_string());
            existing.content = introduction.to_string();
            return id;
        }

        self.blocks.push(ContentBlock::Intro(IntroBlock {
            id: id.clone(),
            session_id: session_id.clone(),
            session_day,
            topic: topic.to_string(),
            title: format!("Introduction & Roadmap – {field}"),
            introduction: Some(introduction.to_string()),
            roadmap: None,
            content: introduction.to_string(),
        }));
        id
    }

    /// Append the rendered roadmap section to a session's intro block.
    ///
    /// The combined content becomes `introduction + roadmap_markdown`; the
    /// raw roadmap text is kept on the block. Tolerates the roadmap arriving
    /// before the introduction by creating the block with only the roadmap
    /// section. Returns the block id.
    pub fn attach_roadmap(
        &mut self,
        session_id: &SessionId,
        field: &FieldName,
        roadmap_raw: &str,
        roadmap_markdown: &str,
    ) -> String {
        let id = intro_block_id(session_id);

        if let Some(existing) = self.find_intro_mut(session_id) {
            let intro = existing.introduction.clone().unwrap_or_default();
            existing.content = format!("{intro}{roadmap_markdown}");
            existing.roadmap = Some(roadmap_raw.to_string());
            return id;
        }

        self.blocks.push(ContentBlock::Intro(IntroBlock {
            id: id.clone(),
            session_id: session_id.clone(),
            session_day: None,
            topic: "Introduction and Roadmap".to_string(),
            title: format!("Introduction & Roadmap – {field}"),
            introduction: None,
            roadmap: Some(roadmap_raw.to_string()),
            content: roadmap_markdown.to_string(),
        }));
        id
    }

    /// Append a lesson block unless one already exists for the same
    /// (session, topic). Returns true when the block was inserted.
    pub fn push_lesson(&mut self, lesson: LessonBlock) -> bool {
        if self.has_lesson(&lesson.session_id, &lesson.topic) {
            return false;
        }
        self.blocks.push(ContentBlock::Lesson(lesson));
        true
    }

    fn find_intro_mut(&mut self, session_id: &SessionId) -> Option<&mut IntroBlock> {
        self.blocks.iter_mut().find_map(|b| match b {
            ContentBlock::Intro(intro) if &intro.session_id == session_id => Some(intro),
            _ => None,
        })
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn sid() -> SessionId {
        SessionId::new("S1")
    }

    fn field() -> FieldName {
        FieldName::new("AI")
    }

    fn lesson(topic: &str) -> LessonBlock {
        LessonBlock {
            id: format!("LESSON_S1_{topic}_0"),
            session_id: sid(),
            topic: topic.to_string(),
            title: topic.to_string(),
            content: format!("About {topic}"),
            path: vec![topic.to_string()],
        }
    }

    #[test]
    fn intro_is_unique_per_session() {
        let mut blocks = ContentBlocks::new();
        blocks.upsert_intro(&sid(), None, "Introduction and Roadmap", &field(), "Hello.");
        blocks.upsert_intro(&sid(), None, "Introduction and Roadmap", &field(), "Hello again.");

        assert_eq!(blocks.len(), 1);
        assert_eq!(
            blocks.find_intro(&sid()).unwrap().content,
            "Hello again."
        );
    }

    #[test]
    fn roadmap_appends_to_introduction() {
        let mut blocks = ContentBlocks::new();
        blocks.upsert_intro(&sid(), None, "Introduction and Roadmap", &field(), "Welcome.");
        blocks.attach_roadmap(&sid(), &field(), "1. Basics", "\n\n---\n\n```\n1. Basics\n```");

        let intro = blocks.find_intro(&sid()).unwrap();
        assert_eq!(intro.content, "Welcome.\n\n---\n\n```\n1. Basics\n```");
        assert_eq!(intro.introduction.as_deref(), Some("Welcome."));
        assert_eq!(intro.roadmap.as_deref(), Some("1. Basics"));
    }

    #[test]
    fn roadmap_before_intro_creates_the_block() {
        let mut blocks = ContentBlocks::new();
        let id = blocks.attach_roadmap(&sid(), &field(), "1. Basics", "ROADMAP");

        assert_eq!(id, "INTRO_S1");
        let intro = blocks.find_intro(&sid()).unwrap();
        assert_eq!(intro.content, "ROADMAP");
        assert_eq!(intro.introduction, None);
    }

    #[test]
    fn lessons_deduplicate_by_session_and_topic() {
        let mut blocks = ContentBlocks::new();
        assert!(blocks.push_lesson(lesson("Basics")));
        assert!(!blocks.push_lesson(lesson("Basics")));
        assert!(blocks.push_lesson(lesson("Advanced")));
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn lesson_id_embeds_timestamp() {
        let at = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let id = lesson_block_id(&sid(), "Basics", at);
        assert_eq!(id, "LESSON_S1_Basics_1700000000000");
    }

    #[test]
    fn reset_clears_everything() {
        let mut blocks = ContentBlocks::new();
        blocks.upsert_intro(&sid(), None, "t", &field(), "x");
        blocks.push_lesson(lesson("Basics"));
        blocks.reset();
        assert!(blocks.is_empty());
    }
}
