use axum::{
    extract::{FromRequestParts, Query, State},
    http::{Request, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use risevocab_app::api::dto::{CardsQuery, DueQuery, GradeIn, SubjectIn, UpcomingQuery};
use risevocab_app::api::routes::{
    create_card, due_cards, list_cards, post_grade, stats, upcoming_cards, ApiError, AppState, CurrentUser,
};
use risevocab_core::{repo::memory::MemoryRepo, CoreError, UserId};

fn state() -> Arc<AppState> {
    Arc::new(AppState { repo: Arc::new(MemoryRepo::new()) })
}

fn who(id: &str) -> CurrentUser {
    CurrentUser(UserId::new(id).unwrap())
}

fn status_of(e: ApiError) -> StatusCode {
    e.into_response().status()
}

#[tokio::test]
async fn identity_comes_from_header() {
    let (mut parts, _) = Request::builder()
        .uri("/due")
        .header("x-user-id", "user_42")
        .body(())
        .unwrap()
        .into_parts();
    let CurrentUser(user) = CurrentUser::from_request_parts(&mut parts, &()).await.unwrap();
    assert_eq!(user.as_str(), "user_42");

    let (mut parts, _) = Request::builder().uri("/due").body(()).unwrap().into_parts();
    let err = CurrentUser::from_request_parts(&mut parts, &()).await.unwrap_err();
    assert_eq!(status_of(err), StatusCode::UNAUTHORIZED);

    let (mut parts, _) = Request::builder()
        .uri("/due")
        .header("x-user-id", "   ")
        .body(())
        .unwrap()
        .into_parts();
    assert!(CurrentUser::from_request_parts(&mut parts, &()).await.is_err());
}

#[test]
fn core_errors_map_to_status_codes() {
    assert_eq!(status_of(CoreError::Invalid("x").into()), StatusCode::BAD_REQUEST);
    assert_eq!(status_of(CoreError::ScoreOutOfRange("120".into()).into()), StatusCode::BAD_REQUEST);
    assert_eq!(status_of(CoreError::NotFound("card").into()), StatusCode::NOT_FOUND);
    assert_eq!(status_of(CoreError::Conflict("card").into()), StatusCode::CONFLICT);
    assert_eq!(status_of(CoreError::Storage("io").into()), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn create_then_grade_new_card() {
    let st = state();
    let Json(card) = create_card(
        State(st.clone()),
        who("u1"),
        Json(SubjectIn { prompt_id: Some("prompt_meeting_1".into()), phrase_id: None }),
    )
    .await
    .unwrap();
    assert_eq!(card.interval_days, 0);
    assert_eq!(card.ease, 2.5);
    assert_eq!(card.prompt_id.as_deref(), Some("prompt_meeting_1"));

    // same subject again returns the same card
    let Json(again) = create_card(
        State(st.clone()),
        who("u1"),
        Json(SubjectIn { prompt_id: Some("prompt_meeting_1".into()), phrase_id: None }),
    )
    .await
    .unwrap();
    assert_eq!(again.id, card.id);

    // a new card is due immediately
    let Json(due) = due_cards(State(st.clone()), who("u1"), Query(DueQuery::default())).await.unwrap();
    assert_eq!(due.len(), 1);

    let Json(out) = post_grade(
        State(st.clone()),
        who("u1"),
        Json(GradeIn { item_id: card.id, score: 85.0, error_tags: vec!["Used 'make a decision' too often".into()] }),
    )
    .await
    .unwrap();
    assert!(out.success);
    assert_eq!(out.interval_days, 1);
    assert_eq!(out.ease, 2.5);

    let Json(due) = due_cards(State(st.clone()), who("u1"), Query(DueQuery::default())).await.unwrap();
    assert!(due.is_empty());
    let Json(soon) = upcoming_cards(State(st.clone()), who("u1"), Query(UpcomingQuery::default())).await.unwrap();
    assert_eq!(soon.len(), 1);
    assert_eq!(soon[0].error_tags, vec!["Used 'make a decision' too often".to_string()]);

    let Json(s) = stats(State(st), who("u1")).await.unwrap();
    assert_eq!(s.cards, 1);
    assert_eq!(s.reviews, 1);
    assert_eq!(s.due_now, 0);
    assert_eq!(s.streak_days, 1);
}

#[tokio::test]
async fn grade_rejects_bad_input() {
    let st = state();
    let Json(card) = create_card(
        State(st.clone()),
        who("u1"),
        Json(SubjectIn { prompt_id: None, phrase_id: Some("phrase_follow_up".into()) }),
    )
    .await
    .unwrap();

    let err = post_grade(
        State(st.clone()),
        who("u1"),
        Json(GradeIn { item_id: card.id, score: 150.0, error_tags: vec![] }),
    )
    .await
    .unwrap_err();
    assert_eq!(status_of(err), StatusCode::BAD_REQUEST);

    // other users cannot see or grade the card
    let err = post_grade(
        State(st.clone()),
        who("u2"),
        Json(GradeIn { item_id: card.id, score: 90.0, error_tags: vec![] }),
    )
    .await
    .unwrap_err();
    assert_eq!(status_of(err), StatusCode::NOT_FOUND);

    let err = create_card(State(st), who("u1"), Json(SubjectIn::default())).await.unwrap_err();
    assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_filters_by_kind_and_tag() {
    let st = state();
    for (p, f) in [(Some("prompt_a"), None), (None, Some("phrase_b"))] {
        create_card(
            State(st.clone()),
            who("u1"),
            Json(SubjectIn { prompt_id: p.map(String::from), phrase_id: f.map(String::from) }),
        )
        .await
        .unwrap();
    }

    let Json(all) = list_cards(State(st.clone()), who("u1"), Query(CardsQuery::default())).await.unwrap();
    assert_eq!(all.len(), 2);

    let q = CardsQuery { kind: Some("phrase".into()), error_tag: None };
    let Json(phrases) = list_cards(State(st.clone()), who("u1"), Query(q)).await.unwrap();
    assert_eq!(phrases.len(), 1);
    assert_eq!(phrases[0].phrase_id.as_deref(), Some("phrase_b"));

    let q = CardsQuery { kind: Some("deck".into()), error_tag: None };
    let err = list_cards(State(st), who("u1"), Query(q)).await.unwrap_err();
    assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
}
