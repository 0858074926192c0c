use chrono::{Duration, TimeZone, Utc};
use risevocab_core::{practice, CoreError, Repository, ReviewCard, Score, SubjectRef, UserId};
use std::sync::Arc;
use risevocab_json::JsonStore;

#[tokio::test]
async fn progress_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("progress.json");
    let backups = dir.path().join("backups");
    let user = UserId::new("local").unwrap();
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap();

    let card_id = {
        let store = JsonStore::open_with(file.clone(), backups.clone(), 3).await.unwrap();
        let out = practice::record_attempt_for_subject(
            &store,
            &user,
            SubjectRef::prompt("prompt_status_update").unwrap(),
            Score::new(85).unwrap(),
            &["Use past tense".to_string()],
            now,
        )
        .await
        .unwrap();
        out.card.id
    };

    let store = JsonStore::open_with(file, backups.clone(), 3).await.unwrap();
    let card = store.get_card(&user, card_id).await.unwrap();
    assert_eq!(card.interval_days, 1);
    assert_eq!(card.due_at, now + Duration::days(1));
    assert_eq!(card.error_tags, vec!["Use past tense".to_string()]);
    assert_eq!(store.list_reviews(&user).await.unwrap().len(), 1);

    let backups_kept = std::fs::read_dir(&backups)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("json"))
        .count();
    assert!(backups_kept >= 1 && backups_kept <= 3);
}

#[tokio::test]
async fn users_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStore::open_at(dir.path().join("progress.json")).await.unwrap();
    let alice = UserId::new("alice").unwrap();
    let bob = UserId::new("bob").unwrap();

    let card = practice::ensure_card(&store, &alice, SubjectRef::phrase("phrase_1").unwrap(), Utc::now())
        .await
        .unwrap();

    assert!(store.list_cards(&bob).await.unwrap().is_empty());
    assert!(matches!(store.get_card(&bob, card.id).await, Err(CoreError::NotFound(_))));
    assert_eq!(store.list_cards(&alice).await.unwrap().len(), 1);
}

#[tokio::test]
async fn corrupt_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("progress.json");
    std::fs::write(&file, "{ not json").unwrap();
    assert!(matches!(
        JsonStore::open_at(file).await,
        Err(CoreError::Storage(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writes_all_reach_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("progress.json");
    let store = Arc::new(JsonStore::open_at(file.clone()).await.unwrap());
    let user = UserId::new("local").unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        let user = user.clone();
        handles.push(tokio::spawn(async move {
            let card = ReviewCard::new(SubjectRef::prompt(format!("prompt_{i}")).unwrap(), Utc::now());
            store.insert_card(&user, &card).await.unwrap();
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    drop(store);

    let reopened = JsonStore::open_at(file).await.unwrap();
    assert_eq!(reopened.list_cards(&user).await.unwrap().len(), 16);
}

#[tokio::test]
async fn failed_write_leaves_state_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("progress.json");
    let store = JsonStore::open_at(file.clone()).await.unwrap();
    let user = UserId::new("local").unwrap();
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap();
    let card = practice::ensure_card(&store, &user, SubjectRef::prompt("prompt_a").unwrap(), now)
        .await
        .unwrap();

    // a directory in place of the store file makes the atomic rename fail
    std::fs::remove_file(&file).unwrap();
    std::fs::create_dir(&file).unwrap();

    let attempt =
        practice::record_attempt(&store, &user, card.id, Score::new(100).unwrap(), &[], now).await;
    assert!(matches!(attempt, Err(CoreError::Storage(_))));
    assert_eq!(store.get_card(&user, card.id).await.unwrap(), card);
    assert!(store.list_reviews(&user).await.unwrap().is_empty());

    let other = ReviewCard::new(SubjectRef::prompt("prompt_b").unwrap(), now);
    assert!(matches!(store.insert_card(&user, &other).await, Err(CoreError::Storage(_))));
    assert_eq!(store.list_cards(&user).await.unwrap().len(), 1);
}
