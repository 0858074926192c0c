use chrono::{DateTime, Utc};
use risevocab_core::{ReviewCard, SubjectKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug)]
pub struct CardOut {
    pub id: Uuid,
    pub prompt_id: Option<String>,
    pub phrase_id: Option<String>,
    pub due_at: DateTime<Utc>,
    pub interval_days: u32,
    pub ease: f64,
    pub last_score: u8,
    pub error_tags: Vec<String>,
}

impl From<ReviewCard> for CardOut {
    fn from(c: ReviewCard) -> Self {
        Self {
            id: c.id,
            prompt_id: c.subject.prompt_id().map(str::to_string),
            phrase_id: c.subject.phrase_id().map(str::to_string),
            due_at: c.due_at,
            interval_days: c.interval_days,
            ease: c.ease,
            last_score: c.last_score.value(),
            error_tags: c.error_tags,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct SubjectIn {
    pub prompt_id: Option<String>,
    pub phrase_id: Option<String>,
}

/// Drill result posted after feedback: `error_tags` are the raw mistake
/// descriptions and get truncated server-side.
#[derive(Deserialize, Debug)]
pub struct GradeIn {
    pub item_id: Uuid,
    pub score: f64,
    #[serde(default)]
    pub error_tags: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct GradeOut {
    pub success: bool,
    pub interval_days: u32,
    pub ease: f64,
    pub due_at: DateTime<Utc>,
}

#[derive(Deserialize, Debug, Default)]
pub struct CardsQuery {
    pub kind: Option<String>,
    pub error_tag: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct DueQuery {
    pub limit: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
pub struct UpcomingQuery {
    pub days: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct StatsOut {
    pub cards: usize,
    pub due_now: usize,
    pub upcoming_week: usize,
    pub reviews: u32,
    pub accuracy: f64,
    pub mean_score: f64,
    pub streak_days: u32,
}

pub fn parse_kind(s: &str) -> Option<SubjectKind> {
    match s.to_lowercase().as_str() {
        "prompt" | "prompts" => Some(SubjectKind::Prompt),
        "phrase" | "phrases" => Some(SubjectKind::Phrase),
        _ => None,
    }
}
