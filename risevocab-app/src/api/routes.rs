use axum::{
    async_trait,
    extract::{FromRequestParts, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

use risevocab_core::{
    daily_streak,
    filters::{filter_by_error_tag, filter_by_kind},
    practice, queue_summary, summarize, CoreError, Repository, Score, SubjectRef, UserId, UPCOMING_DEFAULT_DAYS,
};

use crate::api::dto::{parse_kind, CardOut, CardsQuery, DueQuery, GradeIn, GradeOut, StatsOut, SubjectIn, UpcomingQuery};

pub const USER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    Core(CoreError),
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        ApiError::Core(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            ApiError::Core(e) => {
                let status = match &e {
                    CoreError::Invalid(_) | CoreError::ScoreOutOfRange(_) => StatusCode::BAD_REQUEST,
                    CoreError::NotFound(_) => StatusCode::NOT_FOUND,
                    CoreError::Conflict(_) => StatusCode::CONFLICT,
                    CoreError::Storage(_) => {
                        tracing::error!(error = %e, "storage failure");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, e.to_string())
            }
        };
        (status, Json(json!({ "error": msg }))).into_response()
    }
}

/// Caller identity, taken from the `x-user-id` header set by the auth proxy.
#[derive(Debug)]
pub struct CurrentUser(pub UserId);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .ok_or(ApiError::Unauthorized)?;
        UserId::new(raw).map(CurrentUser).map_err(|_| ApiError::Unauthorized)
    }
}

pub async fn list_cards(
    State(st): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Query(q): Query<CardsQuery>,
) -> Result<Json<Vec<CardOut>>, ApiError> {
    let mut cards = st.repo.list_cards(&user).await?;
    if let Some(k) = q.kind.as_deref() {
        let kind = parse_kind(k).ok_or(CoreError::Invalid("kind must be prompt or phrase"))?;
        cards = filter_by_kind(&cards, kind);
    }
    if let Some(tag) = q.error_tag.as_deref() {
        cards = filter_by_error_tag(&cards, tag);
    }
    Ok(Json(cards.into_iter().map(CardOut::from).collect()))
}

pub async fn create_card(
    State(st): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<SubjectIn>,
) -> Result<Json<CardOut>, ApiError> {
    let subject = SubjectRef::from_parts(body.prompt_id, body.phrase_id)?;
    let card = practice::ensure_card(&*st.repo, &user, subject, Utc::now()).await?;
    Ok(Json(card.into()))
}

pub async fn due_cards(
    State(st): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Query(q): Query<DueQuery>,
) -> Result<Json<Vec<CardOut>>, ApiError> {
    let due = practice::due_queue(&*st.repo, &user, Utc::now(), q.limit).await?;
    Ok(Json(due.into_iter().map(CardOut::from).collect()))
}

pub async fn upcoming_cards(
    State(st): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Query(q): Query<UpcomingQuery>,
) -> Result<Json<Vec<CardOut>>, ApiError> {
    let days = q.days.unwrap_or(UPCOMING_DEFAULT_DAYS);
    let cards = practice::upcoming(&*st.repo, &user, Utc::now(), days).await?;
    Ok(Json(cards.into_iter().map(CardOut::from).collect()))
}

pub async fn post_grade(
    State(st): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<GradeIn>,
) -> Result<Json<GradeOut>, ApiError> {
    let score = Score::from_f64(body.score)?;
    let out = practice::record_attempt(&*st.repo, &user, body.item_id, score, &body.error_tags, Utc::now()).await?;
    Ok(Json(GradeOut {
        success: true,
        interval_days: out.card.interval_days,
        ease: out.card.ease,
        due_at: out.card.due_at,
    }))
}

pub async fn stats(State(st): State<Arc<AppState>>, CurrentUser(user): CurrentUser) -> Result<Json<StatsOut>, ApiError> {
    let now = Utc::now();
    let cards = st.repo.list_cards(&user).await?;
    let reviews = st.repo.list_reviews(&user).await?;
    let q = queue_summary(&cards, now);
    let s = summarize(&reviews);
    Ok(Json(StatsOut {
        cards: q.total,
        due_now: q.due_now,
        upcoming_week: q.upcoming_week,
        reviews: s.totals.total,
        accuracy: s.totals.accuracy(),
        mean_score: s.totals.mean_score(),
        streak_days: daily_streak(&reviews, now.date_naive()),
    }))
}
