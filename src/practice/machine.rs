//! Session state machine
//!
//! Drives one session through `Idle → Presenting → Revealed → Answered`
//! per item, ending in `Completed`. The machine is pure over the session,
//! the event, the current card's schedule, and the clock: it mutates the
//! session in place and hands back the schedule that must be persisted in
//! the same commit, but never touches storage itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::algorithm;
use super::error::{PracticeError, Result};
use super::models::{CardSchedule, MachineState, Outcome, Session, SessionStatus};

/// An event applied to a session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    Start,
    RevealBack,
    Answer { correct: bool },
    Advance,
    Navigate { to: i64 },
    SetOutcome { correct: bool },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::RevealBack => "revealBack",
            Self::Answer { .. } => "answer",
            Self::Advance => "advance",
            Self::Navigate { .. } => "navigate",
            Self::SetOutcome { .. } => "setOutcome",
        }
    }
}

/// Apply one event to the session.
///
/// `prior_schedule` is the stored schedule for the card at the cursor; it
/// is only consulted by `Answer`. Returns the updated schedule to persist
/// atomically with the session, when the event produced one.
pub fn apply(
    session: &mut Session,
    event: &SessionEvent,
    prior_schedule: Option<&CardSchedule>,
    now: DateTime<Utc>,
) -> Result<Option<CardSchedule>> {
    if session.is_completed() || session.state == MachineState::Completed {
        return Err(PracticeError::SessionCompleted);
    }

    match *event {
        SessionEvent::Start => start(session, now),
        SessionEvent::RevealBack => reveal(session, event, now),
        SessionEvent::Answer { correct } => answer(session, event, correct, prior_schedule, now),
        SessionEvent::Advance => advance(session, event, now),
        SessionEvent::Navigate { to } => navigate(session, to),
        SessionEvent::SetOutcome { correct } => set_outcome(session, correct),
    }
}

fn invalid(event: &SessionEvent, session: &Session) -> PracticeError {
    PracticeError::InvalidTransition {
        event: event.name(),
        state: session.state.name(),
    }
}

fn start(session: &mut Session, now: DateTime<Utc>) -> Result<Option<CardSchedule>> {
    // Idempotent: a session that is already underway stays where it is
    if session.state != MachineState::Idle {
        return Ok(None);
    }
    session.items[0].presented_at = Some(now);
    session.state = MachineState::Presenting { position: 0 };
    Ok(None)
}

fn reveal(
    session: &mut Session,
    event: &SessionEvent,
    now: DateTime<Utc>,
) -> Result<Option<CardSchedule>> {
    let MachineState::Presenting { position } = session.state else {
        return Err(invalid(event, session));
    };
    session.items[position].revealed_at = Some(now);
    session.state = MachineState::Revealed { position };
    Ok(None)
}

fn answer(
    session: &mut Session,
    event: &SessionEvent,
    correct: bool,
    prior_schedule: Option<&CardSchedule>,
    now: DateTime<Utc>,
) -> Result<Option<CardSchedule>> {
    let MachineState::Revealed { position } = session.state else {
        return Err(invalid(event, session));
    };

    let revealed_at = session.items[position]
        .revealed_at
        .ok_or_else(|| invalid(event, session))?;
    let elapsed_ms = (now - revealed_at).num_milliseconds().max(0);

    let user_id = session.user_id;
    let config = session.config.clone();
    let item = &mut session.items[position];
    let updated = algorithm::apply_answer(
        prior_schedule,
        user_id,
        item.card_id,
        correct,
        elapsed_ms,
        now,
        &config,
    );

    item.schedule_before = prior_schedule.cloned();
    item.answered_at = Some(now);
    item.elapsed_ms = Some(elapsed_ms);
    item.outcome = if correct {
        Outcome::Correct
    } else {
        Outcome::Incorrect
    };

    session.farthest_answered = Some(
        session
            .farthest_answered
            .map_or(position, |f| f.max(position)),
    );
    session.state = MachineState::Answered { position };
    Ok(Some(updated))
}

fn advance(
    session: &mut Session,
    event: &SessionEvent,
    now: DateTime<Utc>,
) -> Result<Option<CardSchedule>> {
    let MachineState::Answered { position } = session.state else {
        return Err(invalid(event, session));
    };

    let next = position + 1;
    if next == session.items.len() {
        session.state = MachineState::Completed;
        session.status = SessionStatus::Completed;
        return Ok(None);
    }

    // Walking forward through already-answered history stays read-only
    let farthest = session.farthest_answered.unwrap_or(position);
    if next <= farthest {
        session.state = MachineState::Answered { position: next };
    } else {
        let item = &mut session.items[next];
        if item.presented_at.is_none() {
            item.presented_at = Some(now);
        }
        session.state = MachineState::Presenting { position: next };
    }
    Ok(None)
}

fn navigate(session: &mut Session, to: i64) -> Result<Option<CardSchedule>> {
    if session.state == MachineState::Idle {
        return Err(PracticeError::InvalidTransition {
            event: "navigate",
            state: session.state.name(),
        });
    }

    let farthest = session
        .farthest_answered
        .ok_or(PracticeError::InvalidNavigation { to })?;
    if to < 0 || to as usize >= session.items.len() || to as usize > farthest {
        return Err(PracticeError::InvalidNavigation { to });
    }

    // Pure cursor movement over the item log; every reachable target has
    // already been answered.
    session.state = MachineState::Answered {
        position: to as usize,
    };
    Ok(None)
}

fn set_outcome(session: &mut Session, correct: bool) -> Result<Option<CardSchedule>> {
    let MachineState::Answered { position } = session.state else {
        return Err(PracticeError::InvalidOverride);
    };
    if session.farthest_answered != Some(position) {
        // Recomputing an earlier item after later answers already advanced
        // the schedule would desynchronize streaks and due ordering.
        return Err(PracticeError::InvalidOverride);
    }

    let user_id = session.user_id;
    let config = session.config.clone();
    let item = &mut session.items[position];
    let (elapsed_ms, answered_at) = match (item.elapsed_ms, item.answered_at) {
        (Some(e), Some(a)) => (e, a),
        _ => return Err(PracticeError::InvalidOverride),
    };

    // Recompute from scratch with the recorded latency and the original
    // answer instant, as if this had been the original answer. A repeat
    // override with the same correctness therefore yields an identical
    // schedule.
    let updated = algorithm::apply_answer(
        item.schedule_before.as_ref(),
        user_id,
        item.card_id,
        correct,
        elapsed_ms,
        answered_at,
        &config,
    );

    item.outcome = if correct {
        Outcome::Correct
    } else {
        Outcome::Incorrect
    };

    Ok(Some(updated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::practice::models::StudyConfig;
    use uuid::Uuid;

    fn session_with(n: usize) -> Session {
        let cards = (0..n).map(|_| Uuid::new_v4()).collect();
        Session::new(Uuid::new_v4(), Uuid::new_v4(), cards, StudyConfig::default())
    }

    fn answer_current(session: &mut Session, correct: bool) -> Option<CardSchedule> {
        let now = Utc::now();
        apply(session, &SessionEvent::RevealBack, None, now).unwrap();
        apply(session, &SessionEvent::Answer { correct }, None, now).unwrap()
    }

    #[test]
    fn test_start_presents_first_item() {
        let mut session = session_with(3);
        let now = Utc::now();
        apply(&mut session, &SessionEvent::Start, None, now).unwrap();

        assert_eq!(session.state, MachineState::Presenting { position: 0 });
        assert_eq!(session.items[0].presented_at, Some(now));
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut session = session_with(3);
        let now = Utc::now();
        apply(&mut session, &SessionEvent::Start, None, now).unwrap();
        apply(&mut session, &SessionEvent::RevealBack, None, now).unwrap();
        apply(&mut session, &SessionEvent::Start, None, now).unwrap();

        assert_eq!(session.state, MachineState::Revealed { position: 0 });
    }

    #[test]
    fn test_reveal_requires_presenting() {
        let mut session = session_with(3);
        let err = apply(&mut session, &SessionEvent::RevealBack, None, Utc::now()).unwrap_err();
        assert!(matches!(err, PracticeError::InvalidTransition { .. }));
    }

    #[test]
    fn test_answer_records_outcome_and_schedule() {
        let mut session = session_with(3);
        apply(&mut session, &SessionEvent::Start, None, Utc::now()).unwrap();
        let schedule = answer_current(&mut session, true);

        let schedule = schedule.expect("answer produces a schedule");
        assert_eq!(schedule.card_id, session.items[0].card_id);
        assert_eq!(session.items[0].outcome, Outcome::Correct);
        assert!(session.items[0].elapsed_ms.is_some());
        assert_eq!(session.state, MachineState::Answered { position: 0 });
        assert_eq!(session.farthest_answered, Some(0));
    }

    #[test]
    fn test_answer_requires_revealed() {
        let mut session = session_with(3);
        apply(&mut session, &SessionEvent::Start, None, Utc::now()).unwrap();
        let err = apply(
            &mut session,
            &SessionEvent::Answer { correct: true },
            None,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, PracticeError::InvalidTransition { .. }));
    }

    #[test]
    fn test_advance_past_last_item_completes() {
        let mut session = session_with(1);
        apply(&mut session, &SessionEvent::Start, None, Utc::now()).unwrap();
        answer_current(&mut session, true);
        apply(&mut session, &SessionEvent::Advance, None, Utc::now()).unwrap();

        assert_eq!(session.state, MachineState::Completed);
        assert!(session.is_completed());
    }

    #[test]
    fn test_events_on_completed_session_fail() {
        let mut session = session_with(1);
        apply(&mut session, &SessionEvent::Start, None, Utc::now()).unwrap();
        answer_current(&mut session, true);
        apply(&mut session, &SessionEvent::Advance, None, Utc::now()).unwrap();

        for event in [
            SessionEvent::Start,
            SessionEvent::RevealBack,
            SessionEvent::Advance,
            SessionEvent::Navigate { to: 0 },
        ] {
            let err = apply(&mut session, &event, None, Utc::now()).unwrap_err();
            assert!(matches!(err, PracticeError::SessionCompleted));
        }
    }

    #[test]
    fn test_navigate_beyond_farthest_fails_in_every_state() {
        let mut session = session_with(3);
        let nav = SessionEvent::Navigate { to: 2 };

        apply(&mut session, &SessionEvent::Start, None, Utc::now()).unwrap();
        // Presenting(0), nothing answered yet
        assert!(matches!(
            apply(&mut session, &nav, None, Utc::now()).unwrap_err(),
            PracticeError::InvalidNavigation { to: 2 }
        ));

        apply(&mut session, &SessionEvent::RevealBack, None, Utc::now()).unwrap();
        assert!(matches!(
            apply(&mut session, &nav, None, Utc::now()).unwrap_err(),
            PracticeError::InvalidNavigation { to: 2 }
        ));

        // Already Revealed(0) from the step above, so answer directly
        apply(
            &mut session,
            &SessionEvent::Answer { correct: true },
            None,
            Utc::now(),
        )
        .unwrap();
        // Answered(0): farthest is 0, target 2 still out of reach
        assert!(matches!(
            apply(&mut session, &nav, None, Utc::now()).unwrap_err(),
            PracticeError::InvalidNavigation { to: 2 }
        ));
    }

    #[test]
    fn test_navigate_rejects_out_of_range_targets() {
        let mut session = session_with(2);
        apply(&mut session, &SessionEvent::Start, None, Utc::now()).unwrap();
        answer_current(&mut session, true);

        for to in [-1i64, 2, 99] {
            let err = apply(&mut session, &SessionEvent::Navigate { to }, None, Utc::now())
                .unwrap_err();
            assert!(matches!(err, PracticeError::InvalidNavigation { .. }));
        }
    }

    #[test]
    fn test_navigate_back_is_read_only_answered_view() {
        let mut session = session_with(3);
        apply(&mut session, &SessionEvent::Start, None, Utc::now()).unwrap();
        answer_current(&mut session, true);
        apply(&mut session, &SessionEvent::Advance, None, Utc::now()).unwrap();
        answer_current(&mut session, false);

        apply(&mut session, &SessionEvent::Navigate { to: 0 }, None, Utc::now()).unwrap();
        assert_eq!(session.state, MachineState::Answered { position: 0 });
        // History untouched
        assert_eq!(session.items[0].outcome, Outcome::Correct);
        assert_eq!(session.items[1].outcome, Outcome::Incorrect);

        // No answering from a navigated position
        let err = apply(
            &mut session,
            &SessionEvent::Answer { correct: true },
            None,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, PracticeError::InvalidTransition { .. }));
    }

    #[test]
    fn test_advance_through_navigated_history_returns_to_frontier() {
        let mut session = session_with(3);
        apply(&mut session, &SessionEvent::Start, None, Utc::now()).unwrap();
        answer_current(&mut session, true);
        apply(&mut session, &SessionEvent::Advance, None, Utc::now()).unwrap();
        answer_current(&mut session, true);
        apply(&mut session, &SessionEvent::Navigate { to: 0 }, None, Utc::now()).unwrap();

        // 0 -> 1 stays a read-only answered view, 1 -> 2 presents fresh
        apply(&mut session, &SessionEvent::Advance, None, Utc::now()).unwrap();
        assert_eq!(session.state, MachineState::Answered { position: 1 });
        apply(&mut session, &SessionEvent::Advance, None, Utc::now()).unwrap();
        assert_eq!(session.state, MachineState::Presenting { position: 2 });
    }

    #[test]
    fn test_set_outcome_only_on_farthest_item() {
        let mut session = session_with(3);
        apply(&mut session, &SessionEvent::Start, None, Utc::now()).unwrap();
        answer_current(&mut session, true);
        apply(&mut session, &SessionEvent::Advance, None, Utc::now()).unwrap();
        answer_current(&mut session, true);
        apply(&mut session, &SessionEvent::Navigate { to: 0 }, None, Utc::now()).unwrap();

        let err = apply(
            &mut session,
            &SessionEvent::SetOutcome { correct: false },
            None,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, PracticeError::InvalidOverride));
    }

    #[test]
    fn test_set_outcome_recomputes_from_recorded_answer() {
        let mut session = session_with(2);
        apply(&mut session, &SessionEvent::Start, None, Utc::now()).unwrap();
        let original = answer_current(&mut session, true).unwrap();

        let flipped = apply(
            &mut session,
            &SessionEvent::SetOutcome { correct: false },
            None,
            Utc::now(),
        )
        .unwrap()
        .expect("override produces a schedule");

        assert_eq!(session.items[0].outcome, Outcome::Incorrect);
        assert_eq!(flipped.streak_count, 0);
        assert!(flipped.interval_ms <= original.interval_ms);
        // Latency is reused, not re-measured
        assert_eq!(
            flipped.response_time_history,
            original.response_time_history
        );
    }

    #[test]
    fn test_noop_set_outcome_is_byte_identical() {
        let mut session = session_with(2);
        apply(&mut session, &SessionEvent::Start, None, Utc::now()).unwrap();
        let original = answer_current(&mut session, true).unwrap();

        let replayed = apply(
            &mut session,
            &SessionEvent::SetOutcome { correct: true },
            None,
            Utc::now(),
        )
        .unwrap()
        .unwrap();

        assert_eq!(replayed, original);
        assert_eq!(
            serde_json::to_vec(&replayed).unwrap(),
            serde_json::to_vec(&original).unwrap()
        );
    }

    #[test]
    fn test_set_outcome_requires_answered_state() {
        let mut session = session_with(2);
        apply(&mut session, &SessionEvent::Start, None, Utc::now()).unwrap();
        let err = apply(
            &mut session,
            &SessionEvent::SetOutcome { correct: true },
            None,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, PracticeError::InvalidOverride));
    }
}
