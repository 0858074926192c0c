use crate::{CardStage, ReviewCard, SubjectKind};

pub fn filter_by_kind(cards: &[ReviewCard], kind: SubjectKind) -> Vec<ReviewCard> {
    cards
        .iter()
        .filter(|c| c.subject.kind() == kind)
        .cloned()
        .collect()
}

pub fn filter_by_error_tag(cards: &[ReviewCard], query: &str) -> Vec<ReviewCard> {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return cards.to_vec();
    }
    cards
        .iter()
        .filter(|c| c.error_tags.iter().any(|t| t.to_lowercase().contains(&q)))
        .cloned()
        .collect()
}

pub fn filter_by_stage(cards: &[ReviewCard], stage: CardStage) -> Vec<ReviewCard> {
    cards.iter().filter(|c| c.stage() == stage).cloned().collect()
}
