//! Data models for the practice engine

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type of flashcard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CardKind {
    /// Simple front/back card
    Basic,
    /// Multiple choice
    Mcq,
}

impl Default for CardKind {
    fn default() -> Self {
        Self::Basic
    }
}

/// Multiple-choice payload for `CardKind::Mcq` cards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McqPayload {
    pub options: Vec<String>,
    pub correct_index: usize,
}

/// Generative-sketch payload: a drawing program plus its canvas size
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SketchPayload {
    pub code: String,
    pub width: u32,
    pub height: u32,
}

/// A flashcard as seen by the engine. Owned by the deck, read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: Uuid,
    pub deck_id: Uuid,
    pub front: String,
    pub back: String,
    #[serde(default)]
    pub kind: CardKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcq: Option<McqPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sketch: Option<SketchPayload>,
    pub created_at: DateTime<Utc>,
}

impl Card {
    pub fn new(deck_id: Uuid, front: String, back: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            deck_id,
            front,
            back,
            kind: CardKind::default(),
            mcq: None,
            sketch: None,
            created_at: Utc::now(),
        }
    }
}

/// Outcome of one answer on one session item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    Unset,
    Correct,
    Incorrect,
}

impl Default for Outcome {
    fn default() -> Self {
        Self::Unset
    }
}

/// Per-(user, card) spaced repetition state.
///
/// Created on a card's first answer, mutated only by the scheduler, and
/// outliving any individual session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSchedule {
    pub user_id: Uuid,
    pub card_id: Uuid,
    /// When the card next becomes due
    pub due_at: DateTime<Utc>,
    /// Current spacing in milliseconds
    pub interval_ms: i64,
    /// Consecutive correct answers
    #[serde(default)]
    pub streak_count: u32,
    /// Recent reveal-to-answer latencies in milliseconds, oldest first
    #[serde(default)]
    pub response_time_history: Vec<i64>,
    #[serde(default)]
    pub last_outcome: Outcome,
}

/// Per-user practice configuration.
///
/// Captured once at session creation and held fixed for that session's
/// lifetime, so mid-session settings changes never alter a running session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyConfig {
    #[serde(default = "default_novel_limit")]
    pub daily_novel_limit: u32,
    #[serde(default = "default_review_limit")]
    pub daily_review_limit: u32,
    #[serde(default = "default_base_interval_ms")]
    pub base_interval_ms: i64,
    #[serde(default = "default_reward_multiplier")]
    pub reward_multiplier: f64,
    #[serde(default = "default_penalty_multiplier")]
    pub penalty_multiplier: f64,
    #[serde(default = "default_required_time_ms")]
    pub required_time_ms: i64,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_novel_limit() -> u32 {
    20
}

fn default_review_limit() -> u32 {
    100
}

fn default_base_interval_ms() -> i64 {
    30 * 60 * 1000
}

fn default_reward_multiplier() -> f64 {
    1.8
}

fn default_penalty_multiplier() -> f64 {
    0.6
}

fn default_required_time_ms() -> i64 {
    10_000
}

fn default_history_limit() -> usize {
    5
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            daily_novel_limit: default_novel_limit(),
            daily_review_limit: default_review_limit(),
            base_interval_ms: default_base_interval_ms(),
            reward_multiplier: default_reward_multiplier(),
            penalty_multiplier: default_penalty_multiplier(),
            required_time_ms: default_required_time_ms(),
            history_limit: default_history_limit(),
        }
    }
}

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Active,
    Completed,
}

/// Where the session cursor is and what the client may see there.
///
/// Tagged enum rather than position/flag fields, so every event handler
/// matches exhaustively and an unhandled state is a compile error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum MachineState {
    Idle,
    Presenting { position: usize },
    Revealed { position: usize },
    Answered { position: usize },
    Completed,
}

impl MachineState {
    /// Short tag for error messages and view projection
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Presenting { .. } => "presenting",
            Self::Revealed { .. } => "revealed",
            Self::Answered { .. } => "answered",
            Self::Completed => "completed",
        }
    }

    /// Current cursor position, if the session has one
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::Presenting { position }
            | Self::Revealed { position }
            | Self::Answered { position } => Some(*position),
            Self::Idle | Self::Completed => None,
        }
    }
}

/// One slot in a session's queue.
///
/// The item order is fixed at session creation; navigation moves a cursor
/// over this log, it never reorders or removes entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionItem {
    pub card_id: Uuid,
    /// 0-based, fixed at creation
    pub position: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presented_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revealed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub outcome: Outcome,
    /// Reveal-to-answer latency, recorded once and reused by outcome overrides
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<i64>,
    /// Schedule as it stood before this item's answer, kept so an outcome
    /// override can recompute from scratch instead of reversing a
    /// multiplicative update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_before: Option<CardSchedule>,
}

impl SessionItem {
    pub fn new(card_id: Uuid, position: usize) -> Self {
        Self {
            card_id,
            position,
            presented_at: None,
            revealed_at: None,
            answered_at: None,
            outcome: Outcome::Unset,
            elapsed_ms: None,
            schedule_before: None,
        }
    }
}

/// One bounded run through a queue of cards
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub deck_id: Uuid,
    pub status: SessionStatus,
    pub state: MachineState,
    /// Highest position that has ever reached `Answered`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub farthest_answered: Option<usize>,
    pub items: Vec<SessionItem>,
    /// Configuration captured at creation time
    pub config: StudyConfig,
    /// Optimistic concurrency counter, bumped on every committed mutation
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: Uuid, deck_id: Uuid, card_ids: Vec<Uuid>, config: StudyConfig) -> Self {
        let now = Utc::now();
        let items = card_ids
            .into_iter()
            .enumerate()
            .map(|(position, card_id)| SessionItem::new(card_id, position))
            .collect();
        Self {
            id: Uuid::new_v4(),
            user_id,
            deck_id,
            status: SessionStatus::Active,
            state: MachineState::Idle,
            farthest_answered: None,
            items,
            config,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    /// Items with a recorded outcome
    pub fn answered_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.outcome != Outcome::Unset)
            .count()
    }
}

/// Per-(user, deck, calendar date) quota usage.
///
/// A new date key starts at zero; counts never decrease within a date.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyCounters {
    pub user_id: Uuid,
    pub deck_id: Uuid,
    pub date: NaiveDate,
    #[serde(default)]
    pub novel_shown: u32,
    #[serde(default)]
    pub review_shown: u32,
    /// Optimistic concurrency counter
    #[serde(default)]
    pub version: u64,
}

impl DailyCounters {
    pub fn zero(user_id: Uuid, deck_id: Uuid, date: NaiveDate) -> Self {
        Self {
            user_id,
            deck_id,
            date,
            novel_shown: 0,
            review_shown: 0,
            version: 0,
        }
    }
}

/// Result of `create_or_resume`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum StartOutcome {
    /// An existing active session was returned untouched
    Resumed { session_id: Uuid },
    /// A fresh session was created
    Created { session_id: Uuid },
    /// Nothing due and no novel budget left; no session was created
    NothingDue,
}

/// Card content as projected into a view. The back (and the MCQ answer
/// index) is withheld until the item's state allows it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardView {
    pub card_id: Uuid,
    pub front: String,
    pub kind: CardKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub back: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcq_options: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcq_correct_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sketch: Option<SketchPayload>,
}

/// Client-facing projection of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: Uuid,
    pub deck_id: Uuid,
    pub phase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub farthest_answered: Option<usize>,
    pub total: usize,
    pub answered: usize,
    pub remaining: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card: Option<CardView>,
    /// Recorded outcome at the cursor, present only when visible
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<i64>,
}
