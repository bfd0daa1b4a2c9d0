//! Response-time-aware spaced repetition algorithm
//!
//! Intervals grow and shrink multiplicatively: a correct answer delivered
//! fast enough (on recent average) multiplies the interval by a reward
//! factor, a correct-but-slow answer leaves it unchanged, and an incorrect
//! answer shrinks it by a penalty factor. Repeated fast-correct answers
//! therefore grow geometrically, while a single miss collapses progress by
//! a fixed fraction instead of resetting it, so partial credit for prior
//! learning is preserved.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::models::{CardSchedule, Outcome, StudyConfig};

/// Ceiling on any interval: one year. Prevents unbounded growth.
pub const MAX_INTERVAL_MS: i64 = 365 * 24 * 60 * 60 * 1000;

/// Apply one answer to a card's schedule and return the updated schedule.
///
/// `prior` is `None` on a card's first answer, in which case the current
/// interval defaults to `base_interval_ms`. `now` is passed explicitly so
/// an outcome override can replay the original answer instant and arrive
/// at a byte-identical schedule.
pub fn apply_answer(
    prior: Option<&CardSchedule>,
    user_id: Uuid,
    card_id: Uuid,
    correct: bool,
    elapsed_ms: i64,
    now: DateTime<Utc>,
    config: &StudyConfig,
) -> CardSchedule {
    let history_limit = config.history_limit.max(1);

    let mut history = prior
        .map(|s| s.response_time_history.clone())
        .unwrap_or_default();
    history.push(elapsed_ms);
    while history.len() > history_limit {
        history.remove(0);
    }

    let avg_recent = history.iter().sum::<i64>() as f64 / history.len() as f64;

    let prior_streak = prior.map(|s| s.streak_count).unwrap_or(0);
    let (multiplier, streak_count) = if !correct {
        (config.penalty_multiplier, 0)
    } else if avg_recent <= config.required_time_ms as f64 {
        (config.reward_multiplier, prior_streak + 1)
    } else {
        // Correct but slow: acknowledge without growing the interval
        (1.0, prior_streak + 1)
    };

    let current_ms = prior
        .map(|s| s.interval_ms)
        .unwrap_or(config.base_interval_ms);
    let interval_ms = clamp_interval(current_ms as f64 * multiplier, config.base_interval_ms);

    CardSchedule {
        user_id,
        card_id,
        due_at: now + Duration::milliseconds(interval_ms),
        interval_ms,
        streak_count,
        response_time_history: history,
        last_outcome: if correct {
            Outcome::Correct
        } else {
            Outcome::Incorrect
        },
    }
}

fn clamp_interval(raw: f64, floor_ms: i64) -> i64 {
    let capped = raw.min(MAX_INTERVAL_MS as f64);
    (capped as i64).max(floor_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StudyConfig {
        StudyConfig {
            base_interval_ms: 1_800_000,
            reward_multiplier: 1.8,
            penalty_multiplier: 0.6,
            required_time_ms: 10_000,
            history_limit: 5,
            ..StudyConfig::default()
        }
    }

    fn ids() -> (Uuid, Uuid) {
        (Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn test_first_fast_correct_answer() {
        let (user, card) = ids();
        let now = Utc::now();
        let schedule = apply_answer(None, user, card, true, 4_000, now, &config());

        assert_eq!(schedule.interval_ms, 3_240_000);
        assert_eq!(schedule.streak_count, 1);
        assert_eq!(schedule.last_outcome, Outcome::Correct);
        assert_eq!(schedule.due_at, now + Duration::milliseconds(3_240_000));
    }

    #[test]
    fn test_incorrect_after_correct_shrinks_and_resets_streak() {
        let (user, card) = ids();
        let now = Utc::now();
        let first = apply_answer(None, user, card, true, 4_000, now, &config());
        let second = apply_answer(Some(&first), user, card, false, 9_000, now, &config());

        assert_eq!(second.interval_ms, 1_944_000);
        assert_eq!(second.streak_count, 0);
        assert_eq!(second.last_outcome, Outcome::Incorrect);
        assert!(second.interval_ms < first.interval_ms);
    }

    #[test]
    fn test_consecutive_fast_correct_grows_geometrically() {
        let (user, card) = ids();
        let cfg = config();
        let now = Utc::now();

        let mut schedule = None;
        for n in 1..=4u32 {
            let next = apply_answer(schedule.as_ref(), user, card, true, 2_000, now, &cfg);
            let expected = (1_800_000f64 * 1.8f64.powi(n as i32)) as i64;
            assert_eq!(next.interval_ms, expected);
            assert_eq!(next.streak_count, n);
            schedule = Some(next);
        }
    }

    #[test]
    fn test_correct_but_slow_keeps_interval_flat() {
        let (user, card) = ids();
        let now = Utc::now();
        let schedule = apply_answer(None, user, card, true, 25_000, now, &config());

        assert_eq!(schedule.interval_ms, 1_800_000);
        // Correctness is still credited to the streak
        assert_eq!(schedule.streak_count, 1);
    }

    #[test]
    fn test_interval_never_drops_below_base() {
        let (user, card) = ids();
        let cfg = config();
        let now = Utc::now();

        let mut schedule = apply_answer(None, user, card, false, 5_000, now, &cfg);
        for _ in 0..5 {
            schedule = apply_answer(Some(&schedule), user, card, false, 5_000, now, &cfg);
            assert_eq!(schedule.interval_ms, cfg.base_interval_ms);
        }
    }

    #[test]
    fn test_interval_clamped_at_ceiling() {
        let (user, card) = ids();
        let cfg = config();
        let now = Utc::now();

        let mut schedule = None;
        for _ in 0..60 {
            schedule = Some(apply_answer(schedule.as_ref(), user, card, true, 1_000, now, &cfg));
        }
        assert_eq!(schedule.unwrap().interval_ms, MAX_INTERVAL_MS);
    }

    #[test]
    fn test_history_is_bounded_fifo() {
        let (user, card) = ids();
        let cfg = StudyConfig {
            history_limit: 3,
            ..config()
        };
        let now = Utc::now();

        let mut schedule = None;
        for elapsed in [100, 200, 300, 400, 500] {
            schedule = Some(apply_answer(schedule.as_ref(), user, card, true, elapsed, now, &cfg));
        }
        let schedule = schedule.unwrap();
        assert_eq!(schedule.response_time_history, vec![300, 400, 500]);
    }

    #[test]
    fn test_slow_average_blocks_reward_despite_fast_latest() {
        let (user, card) = ids();
        let cfg = config();
        let now = Utc::now();

        // Three slow answers drag the average above the threshold, so one
        // fast answer does not earn the reward multiplier.
        let mut schedule = None;
        for elapsed in [30_000, 30_000, 30_000] {
            schedule = Some(apply_answer(schedule.as_ref(), user, card, true, elapsed, now, &cfg));
        }
        let before = schedule.clone().unwrap().interval_ms;
        let after = apply_answer(schedule.as_ref(), user, card, true, 1_000, now, &cfg);
        assert_eq!(after.interval_ms, before);
    }

    #[test]
    fn test_replay_with_same_inputs_is_deterministic() {
        let (user, card) = ids();
        let cfg = config();
        let now = Utc::now();
        let prior = apply_answer(None, user, card, true, 4_000, now, &cfg);

        let a = apply_answer(Some(&prior), user, card, true, 6_000, now, &cfg);
        let b = apply_answer(Some(&prior), user, card, true, 6_000, now, &cfg);
        assert_eq!(a, b);
    }
}
