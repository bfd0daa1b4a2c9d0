//! Durable, concurrency-safe home for practice sessions
//!
//! `SessionStore` mediates between the pure machine/queue/scheduler code
//! and four collaborator seams: transactional persistence, the card read
//! model, per-user settings, and the change notifier. Every state-mutating
//! operation commits atomically under optimistic concurrency, and the
//! notifier fires strictly after a successful commit.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use super::error::{PracticeError, Result};
use super::machine::{self, SessionEvent};
use super::models::{
    Card, CardSchedule, CardView, DailyCounters, MachineState, Outcome, Session, SessionView,
    StartOutcome, StudyConfig,
};
use super::queue;

/// How many times session creation retries after losing a counter or
/// active-session race before giving up with `ConcurrencyConflict`.
const CREATE_RETRIES: usize = 3;

// ==================== Collaborator seams ====================

/// Transactional persistence for sessions, schedules, and daily counters.
///
/// Implementations must guarantee that `insert_session` and
/// `update_session` are atomic multi-row commits, and that a stale
/// version check surfaces as `ConcurrencyConflict` rather than a silent
/// overwrite.
pub trait PracticeStorage: Send + Sync {
    /// The active session for (user, deck), if any
    fn active_session(&self, user_id: Uuid, deck_id: Uuid) -> Result<Option<Session>>;

    fn session(&self, session_id: Uuid) -> Result<Option<Session>>;

    fn schedule(&self, user_id: Uuid, card_id: Uuid) -> Result<Option<CardSchedule>>;

    /// Schedules for the given cards, keyed by card id; absent cards are
    /// simply missing from the map.
    fn schedules(&self, user_id: Uuid, card_ids: &[Uuid]) -> Result<HashMap<Uuid, CardSchedule>>;

    /// Counters for the date key, zero-valued (version 0) when unseen
    fn counters(&self, user_id: Uuid, deck_id: Uuid, date: NaiveDate) -> Result<DailyCounters>;

    /// Atomically insert a fresh session and commit the incremented
    /// counters. Fails with `ConcurrencyConflict` when an active session
    /// already exists for (user, deck) or when the stored counter version
    /// differs from `expected_counter_version`.
    fn insert_session(
        &self,
        session: &Session,
        counters: &DailyCounters,
        expected_counter_version: u64,
    ) -> Result<()>;

    /// Compare-and-swap commit of a mutated session, atomically with the
    /// schedule upsert when one accompanies it. `expected_version` is the
    /// version the caller loaded; a mismatch is `ConcurrencyConflict`.
    fn update_session(
        &self,
        session: &Session,
        expected_version: u64,
        schedule: Option<&CardSchedule>,
    ) -> Result<()>;
}

/// Read model over deck cards. Absent decks, archived decks, and decks
/// owned by someone else all come back as `NotFound`.
pub trait CardSource: Send + Sync {
    fn deck_cards(&self, user_id: Uuid, deck_id: Uuid) -> Result<Vec<Card>>;
}

/// Read model over per-user practice settings
pub trait SettingsSource: Send + Sync {
    fn study_config(&self, user_id: Uuid) -> Result<StudyConfig>;
}

/// Best-effort "something changed" push. Losing a notification is fine;
/// clients re-fetch through `get_view`.
pub trait ChangeNotifier: Send + Sync {
    fn notify_changed(&self, user_id: Uuid);
}

// ==================== Store ====================

pub struct SessionStore {
    storage: Arc<dyn PracticeStorage>,
    cards: Arc<dyn CardSource>,
    settings: Arc<dyn SettingsSource>,
    notifier: Arc<dyn ChangeNotifier>,
}

impl SessionStore {
    pub fn new(
        storage: Arc<dyn PracticeStorage>,
        cards: Arc<dyn CardSource>,
        settings: Arc<dyn SettingsSource>,
        notifier: Arc<dyn ChangeNotifier>,
    ) -> Self {
        Self {
            storage,
            cards,
            settings,
            notifier,
        }
    }

    /// Return the caller's active session for the deck, or create one from
    /// a freshly built queue. Repeated calls without intervening events
    /// return the same session id and leave the daily counters untouched.
    pub fn create_or_resume(&self, user_id: Uuid, deck_id: Uuid) -> Result<StartOutcome> {
        // Deck existence and ownership are the card source's concern
        let cards = self.cards.deck_cards(user_id, deck_id)?;

        if let Some(existing) = self.storage.active_session(user_id, deck_id)? {
            return Ok(StartOutcome::Resumed {
                session_id: existing.id,
            });
        }

        let config = self.settings.study_config(user_id)?;
        let card_ids: Vec<Uuid> = cards.iter().map(|c| c.id).collect();

        for attempt in 0..CREATE_RETRIES {
            let now = Utc::now();
            let mut counters = self
                .storage
                .counters(user_id, deck_id, now.date_naive())?;
            let schedules = self.storage.schedules(user_id, &card_ids)?;

            let plan = queue::build_queue(&cards, &schedules, &counters, &config, now);
            if plan.is_empty() {
                return Ok(StartOutcome::NothingDue);
            }

            let session = Session::new(user_id, deck_id, plan.card_ids(), config.clone());
            let expected = counters.version;
            counters.novel_shown += plan.novel_taken;
            counters.review_shown += plan.review_taken;
            counters.version += 1;

            match self.storage.insert_session(&session, &counters, expected) {
                Ok(()) => {
                    log::info!(
                        "created session {} for deck {} ({} items, {} novel, {} review)",
                        session.id,
                        deck_id,
                        session.items.len(),
                        plan.novel_taken,
                        plan.review_taken
                    );
                    self.notifier.notify_changed(user_id);
                    return Ok(StartOutcome::Created {
                        session_id: session.id,
                    });
                }
                Err(PracticeError::ConcurrencyConflict) => {
                    // A sibling request may have won the race outright
                    if let Some(existing) = self.storage.active_session(user_id, deck_id)? {
                        return Ok(StartOutcome::Resumed {
                            session_id: existing.id,
                        });
                    }
                    log::debug!(
                        "session creation raced on counters (attempt {}), rebuilding queue",
                        attempt + 1
                    );
                }
                Err(err) => return Err(err),
            }
        }

        Err(PracticeError::ConcurrencyConflict)
    }

    /// Project a session for the caller.
    ///
    /// With `reset_reveal_state`, a reload mid-reveal drops the session
    /// back to `Presenting` so the answer cannot leak, and an answered
    /// current item is shown front-only; recorded outcomes for earlier
    /// positions are never discarded.
    pub fn get_view(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        reset_reveal_state: bool,
    ) -> Result<SessionView> {
        let mut session = self.load_owned(user_id, session_id)?;

        let mut withhold_current = false;
        if reset_reveal_state {
            match session.state {
                MachineState::Revealed { position } => {
                    let expected = session.version;
                    session.items[position].revealed_at = None;
                    session.state = MachineState::Presenting { position };
                    session.updated_at = Utc::now();
                    session.version += 1;
                    self.storage.update_session(&session, expected, None)?;
                }
                MachineState::Answered { .. } => {
                    // Outcome stays recorded; only this read is demoted
                    withhold_current = true;
                }
                _ => {}
            }
        }

        let cards = self.cards.deck_cards(user_id, session.deck_id)?;
        Ok(project(&session, &cards, withhold_current))
    }

    /// Apply one event to the session and commit the result atomically.
    pub fn apply_event(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        event: SessionEvent,
    ) -> Result<SessionView> {
        let mut session = self.load_owned(user_id, session_id)?;

        // The scheduler consumes the stored schedule only on a live answer;
        // outcome overrides replay from the snapshot taken at answer time.
        let prior = match (&event, session.state.position()) {
            (SessionEvent::Answer { .. }, Some(position)) => self
                .storage
                .schedule(user_id, session.items[position].card_id)?,
            _ => None,
        };

        let expected = session.version;
        let updated_schedule = machine::apply(&mut session, &event, prior.as_ref(), Utc::now())?;

        session.updated_at = Utc::now();
        session.version += 1;
        self.storage
            .update_session(&session, expected, updated_schedule.as_ref())?;

        if session.is_completed() {
            log::info!("session {} completed", session.id);
        }
        self.notifier.notify_changed(user_id);

        let cards = self.cards.deck_cards(user_id, session.deck_id)?;
        Ok(project(&session, &cards, false))
    }

    fn load_owned(&self, user_id: Uuid, session_id: Uuid) -> Result<Session> {
        let session = self
            .storage
            .session(session_id)?
            .ok_or(PracticeError::NotFound)?;
        // Foreign sessions are indistinguishable from absent ones
        if session.user_id != user_id {
            return Err(PracticeError::NotFound);
        }
        Ok(session)
    }
}

// ==================== View projection ====================

fn project(session: &Session, cards: &[Card], withhold_current: bool) -> SessionView {
    let by_id: HashMap<Uuid, &Card> = cards.iter().map(|c| (c.id, c)).collect();
    let answered = session.answered_count();

    let position = session.state.position();
    let (card, outcome, elapsed_ms) = match position {
        Some(position) => {
            let item = &session.items[position];
            let revealed = !withhold_current
                && matches!(
                    session.state,
                    MachineState::Revealed { .. } | MachineState::Answered { .. }
                );
            let card = by_id
                .get(&item.card_id)
                .map(|c| project_card(c, revealed));
            let visible_outcome = (revealed && item.outcome != Outcome::Unset)
                .then_some(item.outcome);
            let elapsed = if revealed { item.elapsed_ms } else { None };
            (card, visible_outcome, elapsed)
        }
        None => (None, None, None),
    };

    SessionView {
        session_id: session.id,
        deck_id: session.deck_id,
        // The phase always mirrors the persisted state; withholding only
        // redacts content, so clients never see a phase whose events the
        // machine would reject.
        phase: session.state.name().to_string(),
        position,
        farthest_answered: session.farthest_answered,
        total: session.items.len(),
        answered,
        remaining: session.items.len() - answered,
        card,
        outcome,
        elapsed_ms,
    }
}

/// The back of the card (and the MCQ answer index) is withheld until the
/// item has been revealed.
fn project_card(card: &Card, revealed: bool) -> CardView {
    CardView {
        card_id: card.id,
        front: card.front.clone(),
        kind: card.kind,
        back: revealed.then(|| card.back.clone()),
        mcq_options: card.mcq.as_ref().map(|m| m.options.clone()),
        mcq_correct_index: card
            .mcq
            .as_ref()
            .and_then(|m| revealed.then_some(m.correct_index)),
        sketch: card.sketch.clone(),
    }
}
