use crate::{CardId, CoreError, ReviewCard, ReviewLog, SubjectRef, UserId};
use async_trait::async_trait;

pub mod memory;

/// Card storage scoped by user. Writes replace a card wholesale by id.
#[async_trait]
pub trait Repository: Send + Sync {
    // Cards
    async fn insert_card(&self, user: &UserId, card: &ReviewCard) -> Result<(), CoreError>;
    async fn get_card(&self, user: &UserId, id: CardId) -> Result<ReviewCard, CoreError>;
    async fn find_card_by_subject(
        &self,
        user: &UserId,
        subject: &SubjectRef,
    ) -> Result<Option<ReviewCard>, CoreError>;
    async fn list_cards(&self, user: &UserId) -> Result<Vec<ReviewCard>, CoreError>;
    async fn put_card(&self, user: &UserId, card: &ReviewCard) -> Result<(), CoreError>;
    async fn delete_card(&self, user: &UserId, id: CardId) -> Result<(), CoreError>;
    async fn delete_cards_for_subject(&self, user: &UserId, subject: &SubjectRef) -> Result<usize, CoreError>;

    // Reviews
    /// Appends a review log. A review whose id is already stored is skipped.
    async fn insert_review(&self, user: &UserId, review: &ReviewLog) -> Result<(), CoreError>;
    /// Replaces a graded card and appends its review log as one write.
    async fn record_review(&self, user: &UserId, card: &ReviewCard, review: &ReviewLog) -> Result<(), CoreError>;
    async fn list_reviews(&self, user: &UserId) -> Result<Vec<ReviewLog>, CoreError>;
    async fn list_reviews_for_card(&self, user: &UserId, card_id: CardId) -> Result<Vec<ReviewLog>, CoreError>;
}
