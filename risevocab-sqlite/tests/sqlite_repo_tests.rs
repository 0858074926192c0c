use chrono::{Duration, TimeZone, Utc};
use risevocab_core::{practice, CoreError, Repository, ReviewCard, Score, SubjectRef, UserId};
use risevocab_sqlite::SqliteRepo;

#[tokio::test]
async fn grading_round_trips_through_sqlite() {
    let repo = SqliteRepo::open_memory().await.unwrap();
    let user = UserId::new("user-42").unwrap();
    let now = Utc.with_ymd_and_hms(2024, 9, 2, 14, 5, 0).unwrap();

    let card = practice::ensure_card(&repo, &user, SubjectRef::prompt("prompt_pm_1").unwrap(), now)
        .await
        .unwrap();
    assert_eq!(repo.get_card(&user, card.id).await.unwrap(), card);

    let out = practice::record_attempt(
        &repo,
        &user,
        card.id,
        Score::new(95).unwrap(),
        &["Mention the blocker first".to_string()],
        now,
    )
    .await
    .unwrap();

    let stored = repo.get_card(&user, card.id).await.unwrap();
    assert_eq!(stored, out.card);
    assert_eq!(stored.due_at, now + Duration::days(1));

    let reviews = repo.list_reviews_for_card(&user, card.id).await.unwrap();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0], out.review);

    let found = repo
        .find_card_by_subject(&user, &SubjectRef::prompt("prompt_pm_1").unwrap())
        .await
        .unwrap();
    assert_eq!(found.map(|c| c.id), Some(card.id));
}

#[tokio::test]
async fn one_card_per_subject_and_user_scoping() {
    let repo = SqliteRepo::open_memory().await.unwrap();
    let alice = UserId::new("alice").unwrap();
    let bob = UserId::new("bob").unwrap();
    let now = Utc::now();

    let card = ReviewCard::new(SubjectRef::phrase("phrase_3").unwrap(), now);
    repo.insert_card(&alice, &card).await.unwrap();

    let dup = ReviewCard::new(SubjectRef::phrase("phrase_3").unwrap(), now);
    assert!(matches!(repo.insert_card(&alice, &dup).await, Err(CoreError::Conflict(_))));
    repo.insert_card(&bob, &dup).await.unwrap();

    assert!(matches!(repo.get_card(&bob, card.id).await, Err(CoreError::NotFound(_))));
    assert_eq!(repo.list_cards(&alice).await.unwrap().len(), 1);

    let removed = repo
        .delete_cards_for_subject(&alice, &SubjectRef::phrase("phrase_3").unwrap())
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(repo.list_cards(&alice).await.unwrap().is_empty());
    assert_eq!(repo.list_cards(&bob).await.unwrap().len(), 1);
}

#[tokio::test]
async fn review_ids_are_stored_once() {
    let repo = SqliteRepo::open_memory().await.unwrap();
    let user = UserId::new("user-42").unwrap();
    let now = Utc.with_ymd_and_hms(2024, 9, 2, 14, 5, 0).unwrap();

    let out = practice::record_attempt_for_subject(
        &repo,
        &user,
        SubjectRef::phrase("phrase_9").unwrap(),
        Score::new(60).unwrap(),
        &[],
        now,
    )
    .await
    .unwrap();

    repo.insert_review(&user, &out.review).await.unwrap();
    repo.record_review(&user, &out.card, &out.review).await.unwrap();
    assert_eq!(repo.list_reviews(&user).await.unwrap(), vec![out.review]);
}
