//! Export bundles and the legacy anonymous-progress snapshot.

use chrono::{DateTime, Utc};
use risevocab_core::{
    error_tags_from_mistakes, CoreError, ReviewCard, ReviewLog, Score, SubjectRef, UserId, INTERVAL_MAX_DAYS,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const BUNDLE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
pub struct ExportBundle {
    pub version: u32,
    pub user: UserId,
    pub exported_at: DateTime<Utc>,
    pub cards: Vec<ReviewCard>,
    pub reviews: Vec<ReviewLog>,
}

/// Browser-side progress dump. Only the `srs` list matters here; attempts,
/// phrasebook and counters are ignored.
#[derive(Deserialize, Default)]
pub struct LegacySnapshot {
    #[serde(default)]
    pub srs: Vec<LegacySrsItem>,
}

#[derive(Deserialize, Clone)]
pub struct LegacySrsItem {
    pub id: String,
    #[serde(default)]
    pub prompt_id: Option<String>,
    #[serde(default)]
    pub phrase_id: Option<String>,
    pub due_at: String,
    pub interval_days: i64,
    pub ease: f64,
    pub last_score: f64,
    #[serde(default)]
    pub error_tags: Vec<String>,
}

impl LegacySrsItem {
    /// Local ids such as `local_k3j2...` are not UUIDs and get a fresh id.
    pub fn into_card(self, imported_at: DateTime<Utc>) -> Result<ReviewCard, CoreError> {
        let subject = SubjectRef::from_parts(self.prompt_id, self.phrase_id)?;
        let due_at = DateTime::parse_from_rfc3339(&self.due_at)
            .map_err(|_| CoreError::Invalid("due_at is not an RFC 3339 timestamp"))?
            .with_timezone(&Utc);
        let interval_days = u32::try_from(self.interval_days)
            .ok()
            .filter(|d| *d <= INTERVAL_MAX_DAYS)
            .ok_or(CoreError::Invalid("interval_days out of range"))?;
        let card = ReviewCard {
            id: Uuid::parse_str(&self.id).unwrap_or_else(|_| Uuid::new_v4()),
            subject,
            due_at,
            interval_days,
            ease: self.ease,
            last_score: Score::from_f64(self.last_score)?,
            error_tags: error_tags_from_mistakes(&self.error_tags),
            created_at: imported_at,
        };
        card.validate()?;
        Ok(card)
    }
}

pub fn parse_legacy_snapshot(data: &str) -> Result<LegacySnapshot, serde_json::Error> {
    serde_json::from_str(data)
}
