use crate::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type CardId = Uuid;
pub type ReviewId = Uuid;

pub const EASE_MIN: f64 = 1.3;
pub const EASE_DEFAULT: f64 = 2.5;
pub const INTERVAL_MAX_DAYS: u32 = 365;
pub const ERROR_TAG_MAX_CHARS: usize = 50;
pub const UPCOMING_DEFAULT_DAYS: u32 = 7;

/// Identity handed over by the auth layer. Only used to scope storage.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(CoreError::Invalid("empty user id"));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    Prompt,
    Phrase,
}

impl SubjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::Prompt => "prompt",
            SubjectKind::Phrase => "phrase",
        }
    }
}

/// What a card reviews: a drill prompt or a saved phrase, never both.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SubjectRef {
    Prompt(String),
    Phrase(String),
}

impl SubjectRef {
    pub fn prompt(id: impl Into<String>) -> Result<Self, CoreError> {
        Self::from_parts(Some(id.into()), None)
    }

    pub fn phrase(id: impl Into<String>) -> Result<Self, CoreError> {
        Self::from_parts(None, Some(id.into()))
    }

    /// Builds a reference from the two-optional-columns shape used by
    /// storage rows and request bodies.
    pub fn from_parts(prompt_id: Option<String>, phrase_id: Option<String>) -> Result<Self, CoreError> {
        let prompt_id = prompt_id.filter(|s| !s.trim().is_empty());
        let phrase_id = phrase_id.filter(|s| !s.trim().is_empty());
        match (prompt_id, phrase_id) {
            (Some(p), None) => Ok(SubjectRef::Prompt(p)),
            (None, Some(p)) => Ok(SubjectRef::Phrase(p)),
            (Some(_), Some(_)) => Err(CoreError::Invalid("subject refers to both a prompt and a phrase")),
            (None, None) => Err(CoreError::Invalid("subject refers to neither a prompt nor a phrase")),
        }
    }

    pub fn kind(&self) -> SubjectKind {
        match self {
            SubjectRef::Prompt(_) => SubjectKind::Prompt,
            SubjectRef::Phrase(_) => SubjectKind::Phrase,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            SubjectRef::Prompt(id) | SubjectRef::Phrase(id) => id,
        }
    }

    pub fn prompt_id(&self) -> Option<&str> {
        match self {
            SubjectRef::Prompt(id) => Some(id),
            SubjectRef::Phrase(_) => None,
        }
    }

    pub fn phrase_id(&self) -> Option<&str> {
        match self {
            SubjectRef::Phrase(id) => Some(id),
            SubjectRef::Prompt(_) => None,
        }
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind().as_str(), self.id())
    }
}

/// Raw feedback score, an integer in 0..=100.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(try_from = "i64", into = "i64")]
pub struct Score(u8);

impl Score {
    pub const ZERO: Score = Score(0);
    pub const MAX: Score = Score(100);

    pub fn new(raw: i64) -> Result<Self, CoreError> {
        if (0..=100).contains(&raw) {
            Ok(Self(raw as u8))
        } else {
            Err(CoreError::ScoreOutOfRange(raw.to_string()))
        }
    }

    /// Scores arriving as JSON numbers. Fractions, NaN and infinities are
    /// rejected rather than rounded.
    pub fn from_f64(raw: f64) -> Result<Self, CoreError> {
        if !raw.is_finite() || raw.fract() != 0.0 || !(0.0..=100.0).contains(&raw) {
            return Err(CoreError::ScoreOutOfRange(raw.to_string()));
        }
        Ok(Self(raw as u8))
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn grade(&self) -> Grade {
        Grade::from_score(*self)
    }
}

impl TryFrom<i64> for Score {
    type Error = CoreError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        Score::new(raw)
    }
}

impl From<Score> for i64 {
    fn from(s: Score) -> Self {
        s.0 as i64
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Discrete 0-5 recall grade derived from a raw score.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Blackout,
    Incorrect,
    Familiar,
    Difficult,
    Hesitant,
    Perfect,
}

impl Grade {
    /// `round(score / 100 * 5)` with halves rounded up, in integer math so
    /// that 50 lands on 3 and 49 on 2.
    pub fn from_score(score: Score) -> Self {
        let g = (score.value() as u32 * 5 + 50) / 100;
        Self::from_value(g as u8).unwrap_or(Grade::Perfect)
    }

    pub fn from_value(v: u8) -> Option<Self> {
        match v {
            0 => Some(Grade::Blackout),
            1 => Some(Grade::Incorrect),
            2 => Some(Grade::Familiar),
            3 => Some(Grade::Difficult),
            4 => Some(Grade::Hesitant),
            5 => Some(Grade::Perfect),
            _ => None,
        }
    }

    pub fn value(&self) -> u8 {
        match self {
            Grade::Blackout => 0,
            Grade::Incorrect => 1,
            Grade::Familiar => 2,
            Grade::Difficult => 3,
            Grade::Hesitant => 4,
            Grade::Perfect => 5,
        }
    }

    pub fn is_passing(&self) -> bool {
        self.value() >= 3
    }
}

/// Where a card sits in its review lifecycle, read off `interval_days`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CardStage {
    New,
    Learning,
    Young,
    Mature,
}

impl CardStage {
    pub fn from_interval(interval_days: u32) -> Self {
        match interval_days {
            0 => CardStage::New,
            1 => CardStage::Learning,
            2..=6 => CardStage::Young,
            _ => CardStage::Mature,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReviewCard {
    pub id: CardId,
    pub subject: SubjectRef,
    pub due_at: DateTime<Utc>,
    pub interval_days: u32,
    pub ease: f64,
    pub last_score: Score,
    pub error_tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ReviewCard {
    pub fn new(subject: SubjectRef, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject,
            due_at: now,
            interval_days: 0,
            ease: EASE_DEFAULT,
            last_score: Score::ZERO,
            error_tags: Vec::new(),
            created_at: now,
        }
    }

    pub fn stage(&self) -> CardStage {
        CardStage::from_interval(self.interval_days)
    }

    pub fn is_new(&self) -> bool {
        self.interval_days == 0
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.due_at
    }

    /// Checks the invariants every stored card must hold.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.ease.is_finite() {
            return Err(CoreError::Invalid("ease is not a finite number"));
        }
        if self.ease < EASE_MIN {
            return Err(CoreError::Invalid("ease below 1.3"));
        }
        if self.interval_days > INTERVAL_MAX_DAYS {
            return Err(CoreError::Invalid("interval above 365 days"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReviewLog {
    pub id: ReviewId,
    pub card_id: CardId,
    pub score: Score,
    pub grade: Grade,
    pub reviewed_at: DateTime<Utc>,
    pub interval_applied: u32,
    pub ease_after: f64,
}

impl ReviewLog {
    pub fn new(
        card_id: CardId,
        score: Score,
        reviewed_at: DateTime<Utc>,
        interval_applied: u32,
        ease_after: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            card_id,
            score,
            grade: score.grade(),
            reviewed_at,
            interval_applied,
            ease_after,
        }
    }
}
