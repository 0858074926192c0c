use crate::{
    CoreError, Grade, ReviewCard, ReviewLog, Score, SubjectRef, EASE_MIN, ERROR_TAG_MAX_CHARS,
    INTERVAL_MAX_DAYS,
};
use chrono::{DateTime, Days, Duration, TimeZone, Utc};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NextReview {
    pub interval_days: u32,
    pub ease: f64,
}

pub struct GradeOutcome {
    pub card: ReviewCard,
    pub review: ReviewLog,
}

fn decay(ease: f64, by: f64) -> f64 {
    (ease - by).max(EASE_MIN)
}

/// SM-2 step on a 0-100 score. Ease has a floor but no ceiling; the
/// interval is capped at 365 days.
pub fn compute_next_review(current_interval: u32, ease: f64, score: Score) -> NextReview {
    let grade = score.grade();

    let (interval, new_ease) = if !grade.is_passing() {
        (1, decay(ease, 0.2))
    } else if current_interval == 0 {
        (1, ease)
    } else if current_interval == 1 {
        (6, ease)
    } else {
        let grown = (current_interval as f64 * ease).round();
        let grown = if grown >= INTERVAL_MAX_DAYS as f64 { INTERVAL_MAX_DAYS } else { grown as u32 };
        let new_ease = match grade {
            Grade::Perfect => ease + 0.1,
            Grade::Difficult => decay(ease, 0.14),
            _ => ease,
        };
        (grown, new_ease)
    };

    NextReview {
        interval_days: interval.min(INTERVAL_MAX_DAYS),
        ease: new_ease,
    }
}

pub fn create_card(subject: SubjectRef, now: DateTime<Utc>) -> ReviewCard {
    ReviewCard::new(subject, now)
}

/// Whole calendar days added to the caller's wall clock. Falls back to
/// 24-hour days when that local time does not exist on the target day.
fn add_calendar_days<Tz: TimeZone>(now: &DateTime<Tz>, days: u32) -> Result<DateTime<Utc>, CoreError> {
    now.clone()
        .checked_add_days(Days::new(days as u64))
        .map(|d| d.with_timezone(&Utc))
        .or_else(|| now.with_timezone(&Utc).checked_add_signed(Duration::days(days as i64)))
        .ok_or(CoreError::Invalid("due date out of range"))
}

/// Grades a card and returns the replacement record. The input card is left
/// untouched; the caller persists the result.
pub fn grade_card<Tz: TimeZone>(
    card: &ReviewCard,
    score: Score,
    error_tags: Vec<String>,
    now: DateTime<Tz>,
) -> Result<GradeOutcome, CoreError> {
    card.validate()?;

    let next = compute_next_review(card.interval_days, card.ease, score);
    let due_at = add_calendar_days(&now, next.interval_days)?;
    let reviewed_at = now.with_timezone(&Utc);

    tracing::debug!(
        card = %card.id,
        score = score.value(),
        grade = score.grade().value(),
        from_interval = card.interval_days,
        to_interval = next.interval_days,
        ease = next.ease,
        "graded card"
    );

    let updated = ReviewCard {
        interval_days: next.interval_days,
        ease: next.ease,
        last_score: score,
        due_at,
        error_tags,
        ..card.clone()
    };
    let review = ReviewLog::new(card.id, score, reviewed_at, next.interval_days, next.ease);

    Ok(GradeOutcome { card: updated, review })
}

pub fn is_due(card: &ReviewCard, now: DateTime<Utc>) -> bool {
    card.is_due(now)
}

/// Due cards, oldest due first. Ties keep input order.
pub fn select_due(cards: &[ReviewCard], now: DateTime<Utc>) -> Vec<ReviewCard> {
    let mut due: Vec<ReviewCard> = cards.iter().filter(|c| c.is_due(now)).cloned().collect();
    due.sort_by_key(|c| c.due_at);
    due
}

/// Cards coming due after `now` and no later than `horizon_days` from it.
/// A horizon past the representable calendar has no upper bound.
pub fn select_upcoming(cards: &[ReviewCard], now: DateTime<Utc>, horizon_days: u32) -> Vec<ReviewCard> {
    let horizon = now.checked_add_signed(Duration::days(horizon_days as i64));
    let mut upcoming: Vec<ReviewCard> = cards
        .iter()
        .filter(|c| c.due_at > now && horizon.map_or(true, |h| c.due_at <= h))
        .cloned()
        .collect();
    upcoming.sort_by_key(|c| c.due_at);
    upcoming
}

pub fn truncate_error_tag(mistake: &str) -> String {
    mistake.chars().take(ERROR_TAG_MAX_CHARS).collect()
}

/// Feedback mistakes as stored error tags: each cut to 50 characters, order kept.
pub fn error_tags_from_mistakes<I, S>(mistakes: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    mistakes
        .into_iter()
        .map(|m| truncate_error_tag(m.as_ref()))
        .collect()
}
