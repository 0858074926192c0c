use crate::{CardStage, ReviewCard, ReviewLog, UPCOMING_DEFAULT_DAYS};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, Serialize)]
pub struct Totals {
    pub total: u32,
    pub passing: u32,
    pub failing: u32,
    score_sum: u64,
}

impl Totals {
    pub fn record(&mut self, r: &ReviewLog) {
        self.total += 1;
        self.score_sum += r.score.value() as u64;
        if r.grade.is_passing() {
            self.passing += 1;
        } else {
            self.failing += 1;
        }
    }

    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.passing as f64 / self.total as f64
        }
    }

    pub fn mean_score(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.score_sum as f64 / self.total as f64
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct StatsSummary {
    pub totals: Totals,
    pub per_day: BTreeMap<NaiveDate, Totals>,
}

pub fn summarize(reviews: &[ReviewLog]) -> StatsSummary {
    let mut summary = StatsSummary::default();
    for r in reviews {
        summary.totals.record(r);
        let d = r.reviewed_at.date_naive();
        summary.per_day.entry(d).or_default().record(r);
    }
    summary
}

/// Consecutive days with at least one review, counting back from `today`.
pub fn daily_streak(reviews: &[ReviewLog], today: NaiveDate) -> u32 {
    let per_day = summarize(reviews).per_day;
    let mut streak = 0u32;
    let mut day = today;
    while per_day.get(&day).map(|t| t.total > 0).unwrap_or(false) {
        streak += 1;
        day -= Duration::days(1);
    }
    streak
}

#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct QueueSummary {
    pub total: usize,
    pub due_now: usize,
    pub upcoming_week: usize,
    pub new: usize,
    pub learning: usize,
    pub young: usize,
    pub mature: usize,
}

impl QueueSummary {
    pub fn all_caught_up(&self) -> bool {
        self.due_now == 0
    }
}

pub fn queue_summary(cards: &[ReviewCard], now: DateTime<Utc>) -> QueueSummary {
    let horizon = now + Duration::days(UPCOMING_DEFAULT_DAYS as i64);
    let mut q = QueueSummary {
        total: cards.len(),
        ..QueueSummary::default()
    };
    for c in cards {
        if c.is_due(now) {
            q.due_now += 1;
        } else if c.due_at <= horizon {
            q.upcoming_week += 1;
        }
        match c.stage() {
            CardStage::New => q.new += 1,
            CardStage::Learning => q.learning += 1,
            CardStage::Young => q.young += 1,
            CardStage::Mature => q.mature += 1,
        }
    }
    q
}
