//! Drill-completion and session-start flows on top of a [`Repository`].
//!
//! The caller brings a score and mistake list from the feedback service; this
//! module turns them into a graded card and persists the replacement record.

use crate::{
    error_tags_from_mistakes, grade_card, select_due, select_upcoming, CardId, CoreError, GradeOutcome,
    Repository, ReviewCard, Score, SubjectRef, UserId,
};
use chrono::{DateTime, TimeZone, Utc};

/// Returns the user's card for `subject`, creating it on first engagement.
pub async fn ensure_card(
    repo: &dyn Repository,
    user: &UserId,
    subject: SubjectRef,
    now: DateTime<Utc>,
) -> Result<ReviewCard, CoreError> {
    if let Some(card) = repo.find_card_by_subject(user, &subject).await? {
        return Ok(card);
    }
    let card = ReviewCard::new(subject, now);
    repo.insert_card(user, &card).await?;
    tracing::info!(user = %user, card = %card.id, subject = %card.subject, "created review card");
    Ok(card)
}

pub async fn record_attempt<Tz>(
    repo: &dyn Repository,
    user: &UserId,
    card_id: CardId,
    score: Score,
    mistakes: &[String],
    now: DateTime<Tz>,
) -> Result<GradeOutcome, CoreError>
where
    Tz: TimeZone + Send + Sync,
    Tz::Offset: Send + Sync,
{
    let card = repo.get_card(user, card_id).await?;
    let tags = error_tags_from_mistakes(mistakes);
    let outcome = grade_card(&card, score, tags, now)?;
    repo.record_review(user, &outcome.card, &outcome.review).await?;
    tracing::debug!(
        user = %user,
        card = %card_id,
        interval_days = outcome.card.interval_days,
        due_at = %outcome.card.due_at,
        "recorded attempt"
    );
    Ok(outcome)
}

pub async fn record_attempt_for_subject<Tz>(
    repo: &dyn Repository,
    user: &UserId,
    subject: SubjectRef,
    score: Score,
    mistakes: &[String],
    now: DateTime<Tz>,
) -> Result<GradeOutcome, CoreError>
where
    Tz: TimeZone + Send + Sync,
    Tz::Offset: Send + Sync,
{
    let card = ensure_card(repo, user, subject, now.with_timezone(&Utc)).await?;
    record_attempt(repo, user, card.id, score, mistakes, now).await
}

/// Oldest-due first, truncated to `limit` when given.
pub async fn due_queue(
    repo: &dyn Repository,
    user: &UserId,
    now: DateTime<Utc>,
    limit: Option<usize>,
) -> Result<Vec<ReviewCard>, CoreError> {
    let cards = repo.list_cards(user).await?;
    let mut due = select_due(&cards, now);
    if let Some(n) = limit {
        due.truncate(n);
    }
    Ok(due)
}

pub async fn upcoming(
    repo: &dyn Repository,
    user: &UserId,
    now: DateTime<Utc>,
    horizon_days: u32,
) -> Result<Vec<ReviewCard>, CoreError> {
    let cards = repo.list_cards(user).await?;
    Ok(select_upcoming(&cards, now, horizon_days))
}

/// Drops the cards of a prompt or phrase the user removed.
pub async fn forget_subject(repo: &dyn Repository, user: &UserId, subject: &SubjectRef) -> Result<usize, CoreError> {
    let n = repo.delete_cards_for_subject(user, subject).await?;
    tracing::info!(user = %user, subject = %subject, removed = n, "forgot subject");
    Ok(n)
}
