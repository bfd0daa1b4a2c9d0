//! Quota-aware queue construction
//!
//! Selects which cards enter a session: due reviews first, novel cards
//! second, each pool capped by the day's remaining budget, merged so that
//! neither pool produces arbitrarily long homogeneous runs.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::models::{Card, CardSchedule, DailyCounters, StudyConfig};

/// Longest run of same-pool entries before a slot is yielded to the other
/// pool, when the other pool still has candidates.
const MAX_RUN: usize = 3;

/// One planned slot in a session queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub card_id: Uuid,
    /// True when the card has no scheduling history yet
    pub novel: bool,
}

/// Result of queue construction. An empty plan means nothing is due and no
/// novel budget remains. That is a legitimate outcome, not an error.
#[derive(Debug, Clone, Default)]
pub struct QueuePlan {
    pub entries: Vec<QueueEntry>,
    pub novel_taken: u32,
    pub review_taken: u32,
}

impl QueuePlan {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn card_ids(&self) -> Vec<Uuid> {
        self.entries.iter().map(|e| e.card_id).collect()
    }
}

/// Build the queue for one session.
///
/// Pure: counters are only read here; they are incremented by the store in
/// the same transaction that materializes the session, so concurrent
/// creations cannot both allocate cards against a stale count.
pub fn build_queue(
    cards: &[Card],
    schedules: &HashMap<Uuid, CardSchedule>,
    counters: &DailyCounters,
    config: &StudyConfig,
    now: DateTime<Utc>,
) -> QueuePlan {
    // Review pool: due cards, soonest-due first, creation order as the
    // deterministic tie-break.
    let mut reviews: Vec<&Card> = cards
        .iter()
        .filter(|card| {
            schedules
                .get(&card.id)
                .map(|s| s.due_at <= now)
                .unwrap_or(false)
        })
        .collect();
    reviews.sort_by(|a, b| {
        let due_a = schedules[&a.id].due_at;
        let due_b = schedules[&b.id].due_at;
        due_a
            .cmp(&due_b)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });

    // Novel pool: cards with no schedule, creation order.
    let mut novels: Vec<&Card> = cards
        .iter()
        .filter(|card| !schedules.contains_key(&card.id))
        .collect();
    novels.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    let review_take = remaining(config.daily_review_limit, counters.review_shown)
        .min(reviews.len());
    let novel_take = remaining(config.daily_novel_limit, counters.novel_shown).min(novels.len());
    reviews.truncate(review_take);
    novels.truncate(novel_take);

    QueuePlan {
        entries: interleave(&reviews, &novels),
        novel_taken: novel_take as u32,
        review_taken: review_take as u32,
    }
}

fn remaining(limit: u32, shown: u32) -> usize {
    limit.saturating_sub(shown) as usize
}

/// Merge the two pools. Reviews are preferred while both pools are
/// non-empty, but after `MAX_RUN` consecutive entries from one pool a
/// single slot goes to the other.
fn interleave(reviews: &[&Card], novels: &[&Card]) -> Vec<QueueEntry> {
    let mut entries = Vec::with_capacity(reviews.len() + novels.len());
    let (mut ri, mut ni) = (0usize, 0usize);
    let mut run_novel = false;
    let mut run_len = 0usize;

    while ri < reviews.len() || ni < novels.len() {
        let take_novel = if ri >= reviews.len() {
            true
        } else if ni >= novels.len() {
            false
        } else if run_len >= MAX_RUN {
            // Run cap reached: yield one slot to the other pool
            !run_novel
        } else {
            // Reviews win any tie the run cap did not decide
            false
        };

        if take_novel {
            entries.push(QueueEntry {
                card_id: novels[ni].id,
                novel: true,
            });
            ni += 1;
        } else {
            entries.push(QueueEntry {
                card_id: reviews[ri].id,
                novel: false,
            });
            ri += 1;
        }

        if take_novel == run_novel {
            run_len += 1;
        } else {
            run_novel = take_novel;
            run_len = 1;
        }
    }

    entries
}
