//! In-memory practice storage
//!
//! Backs tests and single-process embedding. One mutex over all tables
//! gives the multi-row atomicity the storage contract requires; version
//! checks on sessions and counters give the optimistic concurrency a
//! relational backend would get from compare-and-swap updates.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::practice::error::{PracticeError, Result};
use crate::practice::models::{CardSchedule, DailyCounters, Session, SessionStatus};
use crate::practice::store::PracticeStorage;

#[derive(Default)]
struct Tables {
    sessions: HashMap<Uuid, Session>,
    /// (user, deck) -> active session id; the "one active session per
    /// user and deck" invariant lives here
    active: HashMap<(Uuid, Uuid), Uuid>,
    schedules: HashMap<(Uuid, Uuid), CardSchedule>,
    counters: HashMap<(Uuid, Uuid, NaiveDate), DailyCounters>,
}

pub struct MemoryStorage {
    tables: Mutex<Tables>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl PracticeStorage for MemoryStorage {
    fn active_session(&self, user_id: Uuid, deck_id: Uuid) -> Result<Option<Session>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .active
            .get(&(user_id, deck_id))
            .and_then(|id| tables.sessions.get(id))
            .cloned())
    }

    fn session(&self, session_id: Uuid) -> Result<Option<Session>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.sessions.get(&session_id).cloned())
    }

    fn schedule(&self, user_id: Uuid, card_id: Uuid) -> Result<Option<CardSchedule>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.schedules.get(&(user_id, card_id)).cloned())
    }

    fn schedules(&self, user_id: Uuid, card_ids: &[Uuid]) -> Result<HashMap<Uuid, CardSchedule>> {
        let tables = self.tables.lock().unwrap();
        Ok(card_ids
            .iter()
            .filter_map(|card_id| {
                tables
                    .schedules
                    .get(&(user_id, *card_id))
                    .map(|s| (*card_id, s.clone()))
            })
            .collect())
    }

    fn counters(&self, user_id: Uuid, deck_id: Uuid, date: NaiveDate) -> Result<DailyCounters> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .counters
            .get(&(user_id, deck_id, date))
            .cloned()
            .unwrap_or_else(|| DailyCounters::zero(user_id, deck_id, date)))
    }

    fn insert_session(
        &self,
        session: &Session,
        counters: &DailyCounters,
        expected_counter_version: u64,
    ) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();

        let active_key = (session.user_id, session.deck_id);
        if tables.active.contains_key(&active_key) {
            return Err(PracticeError::ConcurrencyConflict);
        }

        let counter_key = (counters.user_id, counters.deck_id, counters.date);
        let stored_version = tables
            .counters
            .get(&counter_key)
            .map(|c| c.version)
            .unwrap_or(0);
        if stored_version != expected_counter_version {
            return Err(PracticeError::ConcurrencyConflict);
        }

        tables.counters.insert(counter_key, counters.clone());
        tables.active.insert(active_key, session.id);
        tables.sessions.insert(session.id, session.clone());
        Ok(())
    }

    fn update_session(
        &self,
        session: &Session,
        expected_version: u64,
        schedule: Option<&CardSchedule>,
    ) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();

        let stored = tables
            .sessions
            .get(&session.id)
            .ok_or(PracticeError::NotFound)?;
        if stored.version != expected_version {
            return Err(PracticeError::ConcurrencyConflict);
        }

        if session.status == SessionStatus::Completed {
            tables.active.remove(&(session.user_id, session.deck_id));
        }
        if let Some(schedule) = schedule {
            tables
                .schedules
                .insert((schedule.user_id, schedule.card_id), schedule.clone());
        }
        tables.sessions.insert(session.id, session.clone());
        Ok(())
    }
}
