use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::srs::mastery::review_urgency;
use crate::srs::types::{ItemMemoryState, LearnerParameterSet, LearningState};

/// What the learner already did today, counted by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailyUsage {
    pub new_introduced: u32,
    pub reviews_done: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedItem {
    pub item_id: String,
    pub urgency: f64,
    pub due_at: DateTime<Utc>,
    pub state: LearningState,
}

/// Builds today's study queue: new items and due items, most urgent first,
/// limited by the learner's remaining daily allowance for each kind.
pub fn build_review_queue(
    items: &[(String, ItemMemoryState)],
    params: &LearnerParameterSet,
    usage: DailyUsage,
    now: DateTime<Utc>,
) -> Vec<QueuedItem> {
    let mut candidates: Vec<QueuedItem> = items
        .iter()
        .filter(|(_, s)| s.is_new() || s.due_at <= now)
        .map(|(item_id, s)| QueuedItem {
            item_id: item_id.clone(),
            urgency: review_urgency(s, now),
            due_at: s.due_at,
            state: s.state,
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.urgency
            .total_cmp(&a.urgency)
            .then(a.due_at.cmp(&b.due_at))
            .then_with(|| a.item_id.cmp(&b.item_id))
    });

    let mut new_left = params.new_cards_per_day.saturating_sub(usage.new_introduced);
    let mut reviews_left = params.max_reviews_per_day.saturating_sub(usage.reviews_done);

    candidates
        .into_iter()
        .filter(|item| {
            let budget = if item.state == LearningState::New {
                &mut new_left
            } else {
                &mut reviews_left
            };
            if *budget == 0 {
                return false;
            }
            *budget -= 1;
            true
        })
        .collect()
}

/// Items grouped by when they come due.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSchedule {
    pub today: Vec<String>,
    pub tomorrow: Vec<String>,
    pub this_week: Vec<String>,
    pub next_week: Vec<String>,
    pub future: Vec<String>,
}

impl ReviewSchedule {
    pub fn total(&self) -> usize {
        self.today.len()
            + self.tomorrow.len()
            + self.this_week.len()
            + self.next_week.len()
            + self.future.len()
    }
}

/// Buckets are relative to `now`: overdue and new items count as today,
/// then +1 day, +7 days, +14 days, and everything later.
pub fn review_schedule(items: &[(String, ItemMemoryState)], now: DateTime<Utc>) -> ReviewSchedule {
    let tomorrow = now + Duration::days(1);
    let week = now + Duration::days(7);
    let two_weeks = now + Duration::days(14);

    let mut schedule = ReviewSchedule::default();
    for (item_id, state) in items {
        let bucket = if state.is_new() || state.due_at <= now {
            &mut schedule.today
        } else if state.due_at <= tomorrow {
            &mut schedule.tomorrow
        } else if state.due_at <= week {
            &mut schedule.this_week
        } else if state.due_at <= two_weeks {
            &mut schedule.next_week
        } else {
            &mut schedule.future
        };
        bucket.push(item_id.clone());
    }
    schedule
}
