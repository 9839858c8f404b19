use serde::{Deserialize, Serialize};

use crate::model::ids::{FieldName, SessionId};

//
// ─── NODES ─────────────────────────────────────────────────────────────────────
//

/// A single topic under a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicNode {
    pub id: String,
    pub title: String,
}

/// One scheduled learning session inside a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionNode {
    pub session_id: SessionId,
    pub session_day: Option<String>,
    pub topics: Vec<TopicNode>,
    pub is_loading: bool,
}

impl SessionNode {
    fn new(session_id: SessionId, session_day: Option<String>, topic: Option<&str>) -> Self {
        let topics = topic
            .map(|title| {
                vec![TopicNode {
                    id: format!("{session_id}_0"),
                    title: title.to_string(),
                }]
            })
            .unwrap_or_default();
        Self {
            session_id,
            session_day,
            topics,
            is_loading: false,
        }
    }

    /// Placeholder node for a session announced but not yet populated.
    #[must_use]
    pub fn placeholder(session_id: SessionId) -> Self {
        Self {
            session_id,
            session_day: None,
            topics: Vec::new(),
            is_loading: true,
        }
    }
}

/// All known sessions for one learning field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldNode {
    pub field: FieldName,
    pub sessions: Vec<SessionNode>,
}

//
// ─── FACTS ─────────────────────────────────────────────────────────────────────
//

/// Which kind of stream event produced a fact. Merging is identical for both;
/// the kind is kept for display decisions downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactKind {
    Intro,
    Lesson,
}

/// A structural fact learned from the stream: this field has this session,
/// optionally on this day, optionally covering this topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeFact {
    pub field: FieldName,
    pub session_id: SessionId,
    pub session_day: Option<String>,
    pub topic: Option<String>,
    pub kind: FactKind,
}

//
// ─── PROFILE SHAPE ─────────────────────────────────────────────────────────────
//

/// Per-field profile data as returned by the profile-details endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileField {
    pub field: FieldName,
    #[serde(default)]
    pub sessions: Vec<ProfileSession>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileSession {
    pub session_id: SessionId,
    #[serde(default, alias = "day")]
    pub session_day: Option<String>,
    #[serde(default)]
    pub topics: Vec<ProfileTopic>,
}

/// The backend sends topics either as bare strings or as objects with a title.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ProfileTopic {
    Title(String),
    Detailed { title: String },
}

impl ProfileTopic {
    #[must_use]
    pub fn title(&self) -> &str {
        match self {
            ProfileTopic::Title(t) | ProfileTopic::Detailed { title: t } => t,
        }
    }
}

//
// ─── TREE ──────────────────────────────────────────────────────────────────────
//

/// Ordered collection of fields, each with its ordered sessions and topics.
///
/// The tree is append-only within a client lifetime: facts create nodes
/// lazily and never remove them. Insertion order is display order, so the
/// most recent session or topic always appears last without sorting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningTree {
    fields: Vec<FieldNode>,
}

impl LearningTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldNode] {
        &self.fields
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Rebuild the whole tree from a profile fetch.
    ///
    /// Sessions without a day get a positional `Session_NN` label; topic ids
    /// are derived from the session id and topic position.
    #[must_use]
    pub fn from_profile(profile: &[ProfileField]) -> Self {
        let fields = profile
            .iter()
            .map(|f| FieldNode {
                field: f.field.clone(),
                sessions: f
                    .sessions
                    .iter()
                    .enumerate()
                    .map(|(i, s)| SessionNode {
                        session_id: s.session_id.clone(),
                        session_day: Some(
                            s.session_day
                                .clone()
                                .unwrap_or_else(|| format!("Session_{:02}", i + 1)),
                        ),
                        topics: s
                            .topics
                            .iter()
                            .enumerate()
                            .map(|(idx, t)| TopicNode {
                                id: format!("{}_{idx}", s.session_id),
                                title: t.title().to_string(),
                            })
                            .collect(),
                        is_loading: false,
                    })
                    .collect(),
            })
            .collect();
        Self { fields }
    }

    /// Merge a fact into the tree, returning the new tree.
    ///
    /// - Unknown field: appended with a single session holding the fact.
    /// - Unknown session: appended to its field.
    /// - Known session: adopts the day if newly provided, appends the topic
    ///   unless an identical title already exists, and clears `is_loading`.
    ///
    /// Never assumes arrival order between intro and lesson facts; whichever
    /// arrives first creates the nodes.
    #[must_use]
    pub fn merge_fact(&self, fact: &TreeFact) -> Self {
        let mut tree = self.clone();

        let Some(field) = tree.fields.iter_mut().find(|f| f.field == fact.field) else {
            tree.fields.push(FieldNode {
                field: fact.field.clone(),
                sessions: vec![SessionNode::new(
                    fact.session_id.clone(),
                    fact.session_day.clone(),
                    fact.topic.as_deref(),
                )],
            });
            return tree;
        };

        let Some(session) = field
            .sessions
            .iter_mut()
            .find(|s| s.session_id == fact.session_id)
        else {
            field.sessions.push(SessionNode::new(
                fact.session_id.clone(),
                fact.session_day.clone(),
                fact.topic.as_deref(),
            ));
            return tree;
        };

        if let Some(day) = &fact.session_day {
            session.session_day = Some(day.clone());
        }
        if let Some(topic) = &fact.topic {
            if !session.topics.iter().any(|t| &t.title == topic) {
                session.topics.push(TopicNode {
                    id: format!("{}_{}", session.session_id, session.topics.len()),
                    title: topic.clone(),
                });
            }
        }
        session.is_loading = false;

        tree
    }

    /// Ensure a session node exists under a field, creating loading
    /// placeholders where needed. Used when the user accepts a freshly
    /// announced session before any content for it has arrived.
    #[must_use]
    pub fn with_placeholder_session(&self, field: &FieldName, session_id: &SessionId) -> Self {
        let mut tree = self.clone();

        let Some(node) = tree.fields.iter_mut().find(|f| &f.field == field) else {
            tree.fields.push(FieldNode {
                field: field.clone(),
                sessions: vec![SessionNode::placeholder(session_id.clone())],
            });
            return tree;
        };

        if !node.sessions.iter().any(|s| &s.session_id == session_id) {
            node.sessions.push(SessionNode::placeholder(session_id.clone()));
        }
        tree
    }

    /// Look up the day label of a session, if the tree knows it.
    #[must_use]
    pub fn session_day(&self, field: &FieldName, session_id: &SessionId) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| &f.field == field)?
            .sessions
            .iter()
            .find(|s| &s.session_id == session_id)?
            .session_day
            .as_deref()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(field: &str, session: &str, topic: Option<&str>) -> TreeFact {
        TreeFact {
            field: FieldName::new(field),
            session_id: SessionId::new(session),
            session_day: None,
            topic: topic.map(str::to_string),
            kind: FactKind::Lesson,
        }
    }

    #[test]
    fn creates_field_and_session_lazily() {
        let tree = LearningTree::new().merge_fact(&fact("AI", "S1", Some("Intro")));

        assert_eq!(tree.fields().len(), 1);
        assert_eq!(tree.fields()[0].field, FieldName::new("AI"));
        assert_eq!(tree.fields()[0].sessions.len(), 1);
        assert_eq!(tree.fields()[0].sessions[0].topics[0].title, "Intro");
    }

    #[test]
    fn merge_is_idempotent_for_duplicate_topics() {
        let f = fact("AI", "S1", Some("Intro"));
        let tree = LearningTree::new().merge_fact(&f).merge_fact(&f);

        let topics = &tree.fields()[0].sessions[0].topics;
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].title, "Intro");
    }

    #[test]
    fn merge_preserves_session_order() {
        let tree = LearningTree::new()
            .merge_fact(&fact("AI", "S1", Some("A")))
            .merge_fact(&fact("AI", "S2", Some("B")))
            .merge_fact(&fact("AI", "S1", Some("C")));

        let sessions = &tree.fields()[0].sessions;
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].session_id, SessionId::new("S1"));
        assert_eq!(sessions[1].session_id, SessionId::new("S2"));
        assert_eq!(sessions[0].topics.len(), 2);
    }

    #[test]
    fn merge_does_not_mutate_input() {
        let original = LearningTree::new().merge_fact(&fact("AI", "S1", None));
        let snapshot = original.clone();
        let _ = original.merge_fact(&fact("AI", "S1", Some("New")));
        assert_eq!(original, snapshot);
    }

    #[test]
    fn adopts_session_day_when_provided() {
        let mut with_day = fact("AI", "S1", None);
        with_day.session_day = Some("Day_01".into());

        let tree = LearningTree::new()
            .merge_fact(&fact("AI", "S1", Some("Intro")))
            .merge_fact(&with_day);

        assert_eq!(tree.session_day(&"AI".into(), &"S1".into()), Some("Day_01"));
    }

    #[test]
    fn placeholder_session_is_marked_loading_and_merge_clears_it() {
        let tree =
            LearningTree::new().with_placeholder_session(&"AI".into(), &SessionId::new("S9"));
        assert!(tree.fields()[0].sessions[0].is_loading);

        let tree = tree.merge_fact(&fact("AI", "S9", Some("Basics")));
        assert!(!tree.fields()[0].sessions[0].is_loading);
    }

    #[test]
    fn placeholder_is_noop_for_known_session() {
        let tree = LearningTree::new().merge_fact(&fact("AI", "S1", Some("Intro")));
        let again = tree.with_placeholder_session(&"AI".into(), &SessionId::new("S1"));
        assert_eq!(tree, again);
    }

    #[test]
    fn from_profile_fills_missing_days_positionally() {
        let json = serde_json::json!([
            {
                "field": "AI",
                "sessions": [
                    { "session_id": "S1", "topics": ["Intro", {"title": "Search"}] },
                    { "session_id": "S2", "day": "Day_02", "topics": [] }
                ]
            }
        ]);
        let profile: Vec<ProfileField> = serde_json::from_value(json).unwrap();
        let tree = LearningTree::from_profile(&profile);

        let sessions = &tree.fields()[0].sessions;
        assert_eq!(sessions[0].session_day.as_deref(), Some("Session_01"));
        assert_eq!(sessions[1].session_day.as_deref(), Some("Day_02"));
        assert_eq!(sessions[0].topics[0].id, "S1_0");
        assert_eq!(sessions[0].topics[1].title, "Search");
    }
}
