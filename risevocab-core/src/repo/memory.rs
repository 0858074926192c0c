use crate::{CardId, CoreError, ReviewCard, ReviewLog, SubjectRef, UserId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
struct UserData {
    cards: HashMap<CardId, ReviewCard>,
    reviews: HashMap<CardId, Vec<ReviewLog>>,
}

impl UserData {
    fn push_review(&mut self, review: &ReviewLog) {
        if self.reviews.values().flatten().any(|r| r.id == review.id) {
            return;
        }
        self.reviews.entry(review.card_id).or_default().push(review.clone());
    }
}

#[derive(Default)]
pub struct MemoryRepo {
    users: RwLock<HashMap<UserId, UserData>>,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl crate::repo::Repository for MemoryRepo {
    async fn insert_card(&self, user: &UserId, card: &ReviewCard) -> Result<(), CoreError> {
        card.validate()?;
        let mut users = self.users.write();
        let data = users.entry(user.clone()).or_default();
        if data.cards.contains_key(&card.id) {
            return Err(CoreError::Conflict("card id already exists"));
        }
        if data.cards.values().any(|c| c.subject == card.subject) {
            return Err(CoreError::Conflict("subject already has a card"));
        }
        data.cards.insert(card.id, card.clone());
        Ok(())
    }

    async fn get_card(&self, user: &UserId, id: CardId) -> Result<ReviewCard, CoreError> {
        self.users
            .read()
            .get(user)
            .and_then(|d| d.cards.get(&id))
            .cloned()
            .ok_or(CoreError::NotFound("card"))
    }

    async fn find_card_by_subject(
        &self,
        user: &UserId,
        subject: &SubjectRef,
    ) -> Result<Option<ReviewCard>, CoreError> {
        Ok(self
            .users
            .read()
            .get(user)
            .and_then(|d| d.cards.values().find(|c| &c.subject == subject))
            .cloned())
    }

    async fn list_cards(&self, user: &UserId) -> Result<Vec<ReviewCard>, CoreError> {
        let users = self.users.read();
        let mut v: Vec<ReviewCard> = users
            .get(user)
            .map(|d| d.cards.values().cloned().collect())
            .unwrap_or_default();
        v.sort_by_key(|c| c.created_at);
        Ok(v)
    }

    async fn put_card(&self, user: &UserId, card: &ReviewCard) -> Result<(), CoreError> {
        card.validate()?;
        let mut users = self.users.write();
        let Some(slot) = users.get_mut(user).and_then(|d| d.cards.get_mut(&card.id)) else {
            return Err(CoreError::NotFound("card"));
        };
        *slot = card.clone();
        Ok(())
    }

    async fn delete_card(&self, user: &UserId, id: CardId) -> Result<(), CoreError> {
        let mut users = self.users.write();
        let data = users.get_mut(user).ok_or(CoreError::NotFound("card"))?;
        data.cards.remove(&id).ok_or(CoreError::NotFound("card"))?;
        data.reviews.remove(&id);
        Ok(())
    }

    async fn delete_cards_for_subject(&self, user: &UserId, subject: &SubjectRef) -> Result<usize, CoreError> {
        let mut users = self.users.write();
        let Some(data) = users.get_mut(user) else {
            return Ok(0);
        };
        let ids: Vec<CardId> = data
            .cards
            .values()
            .filter(|c| &c.subject == subject)
            .map(|c| c.id)
            .collect();
        for id in &ids {
            data.cards.remove(id);
            data.reviews.remove(id);
        }
        Ok(ids.len())
    }

    async fn insert_review(&self, user: &UserId, review: &ReviewLog) -> Result<(), CoreError> {
        let mut users = self.users.write();
        let data = users.get_mut(user).ok_or(CoreError::NotFound("card"))?;
        if !data.cards.contains_key(&review.card_id) {
            return Err(CoreError::NotFound("card"));
        }
        data.push_review(review);
        Ok(())
    }

    async fn record_review(&self, user: &UserId, card: &ReviewCard, review: &ReviewLog) -> Result<(), CoreError> {
        card.validate()?;
        if review.card_id != card.id {
            return Err(CoreError::Invalid("review belongs to another card"));
        }
        let mut users = self.users.write();
        let data = users.get_mut(user).ok_or(CoreError::NotFound("card"))?;
        let slot = data.cards.get_mut(&card.id).ok_or(CoreError::NotFound("card"))?;
        *slot = card.clone();
        data.push_review(review);
        Ok(())
    }

    async fn list_reviews(&self, user: &UserId) -> Result<Vec<ReviewLog>, CoreError> {
        let users = self.users.read();
        let mut v: Vec<ReviewLog> = users
            .get(user)
            .map(|d| d.reviews.values().flat_map(|r| r.iter().cloned()).collect())
            .unwrap_or_default();
        v.sort_by_key(|r| r.reviewed_at);
        Ok(v)
    }

    async fn list_reviews_for_card(&self, user: &UserId, card_id: CardId) -> Result<Vec<ReviewLog>, CoreError> {
        Ok(self
            .users
            .read()
            .get(user)
            .and_then(|d| d.reviews.get(&card_id))
            .cloned()
            .unwrap_or_default())
    }
}
