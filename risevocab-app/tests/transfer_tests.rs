use chrono::{TimeZone, Utc};
use risevocab_app::cli::commands::{import_progress, ImportReport};
use risevocab_app::cli::transfer::parse_legacy_snapshot;
use risevocab_core::{
    practice, repo::memory::MemoryRepo, Repository, Score, SubjectRef, UserId, ERROR_TAG_MAX_CHARS,
};

const SNAPSHOT: &str = r#"{
  "attempts": [{"id": "local_1", "prompt_id": "prompt_meeting_1", "score": 80}],
  "srs": [
    {"id": "local_k3j2", "prompt_id": "prompt_meeting_1", "due_at": "2024-01-16T10:00:00.000Z",
     "interval_days": 1, "ease": 2.5, "last_score": 80, "error_tags": ["Missing article"]},
    {"id": "local_x9", "phrase_id": "phrase_follow_up", "due_at": "2024-01-21T10:00:00.000Z",
     "interval_days": 6, "ease": 2.6, "last_score": 100, "error_tags": []},
    {"id": "local_bad", "due_at": "2024-01-21T10:00:00.000Z",
     "interval_days": 6, "ease": 2.6, "last_score": 100, "error_tags": []},
    {"id": "local_worse", "prompt_id": "prompt_x", "due_at": "not a date",
     "interval_days": 6, "ease": 2.6, "last_score": 100}
  ],
  "phrasebook": []
}"#;

#[test]
fn legacy_items_convert_or_fail_individually() {
    let now = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
    let snap = parse_legacy_snapshot(SNAPSHOT).unwrap();
    assert_eq!(snap.srs.len(), 4);

    let results: Vec<_> = snap.srs.into_iter().map(|i| i.into_card(now)).collect();
    let first = results[0].as_ref().unwrap();
    assert_eq!(first.subject, SubjectRef::prompt("prompt_meeting_1").unwrap());
    assert_eq!(first.due_at, Utc.with_ymd_and_hms(2024, 1, 16, 10, 0, 0).unwrap());
    assert_eq!(first.interval_days, 1);
    assert_eq!(first.last_score.value(), 80);
    assert_eq!(first.error_tags, vec!["Missing article".to_string()]);
    assert_eq!(first.created_at, now);

    assert!(results[1].is_ok());
    assert!(results[2].is_err());
    assert!(results[3].is_err());
}

#[test]
fn missing_srs_list_is_empty() {
    let snap = parse_legacy_snapshot(r#"{"attempts": []}"#).unwrap();
    assert!(snap.srs.is_empty());
}

#[tokio::test]
async fn import_keeps_existing_progress() {
    let now = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
    let repo = MemoryRepo::new();
    let user = UserId::new("user_1").unwrap();

    let existing = risevocab_core::ReviewCard::new(SubjectRef::prompt("prompt_meeting_1").unwrap(), now);
    repo.insert_card(&user, &existing).await.unwrap();

    let cards: Vec<_> = parse_legacy_snapshot(SNAPSHOT)
        .unwrap()
        .srs
        .into_iter()
        .filter_map(|i| i.into_card(now).ok())
        .collect();
    let report = import_progress(&repo, &user, cards, Vec::new()).await.unwrap();
    assert_eq!(report, ImportReport { cards: 1, reviews: 0, skipped: 1 });

    let kept = repo
        .find_card_by_subject(&user, &SubjectRef::prompt("prompt_meeting_1").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kept.id, existing.id);
    assert_eq!(kept.interval_days, 0);
    assert_eq!(repo.list_cards(&user).await.unwrap().len(), 2);
}

#[test]
fn legacy_error_tags_are_truncated() {
    let now = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
    let long = "Passive voice hides who owns the action item in the second paragraph";
    let data = format!(
        r#"{{"srs": [{{"id": "local_1", "phrase_id": "phrase_1", "due_at": "2024-01-16T10:00:00Z",
            "interval_days": 1, "ease": 2.5, "last_score": 70, "error_tags": ["{long}", "Tone"]}}]}}"#
    );
    let card = parse_legacy_snapshot(&data).unwrap().srs.remove(0).into_card(now).unwrap();
    assert_eq!(card.error_tags.len(), 2);
    assert_eq!(card.error_tags[0].chars().count(), ERROR_TAG_MAX_CHARS);
    assert!(long.starts_with(&card.error_tags[0]));
    assert_eq!(card.error_tags[1], "Tone");
}

#[tokio::test]
async fn importing_the_same_bundle_twice_adds_nothing() {
    let now = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
    let source = MemoryRepo::new();
    let user = UserId::new("user_1").unwrap();
    for (subject, s) in [("prompt_a", 90), ("prompt_b", 40)] {
        practice::record_attempt_for_subject(
            &source,
            &user,
            SubjectRef::prompt(subject).unwrap(),
            Score::new(s).unwrap(),
            &[],
            now,
        )
        .await
        .unwrap();
    }
    let cards = source.list_cards(&user).await.unwrap();
    let reviews = source.list_reviews(&user).await.unwrap();

    let target = MemoryRepo::new();
    let first = import_progress(&target, &user, cards.clone(), reviews.clone()).await.unwrap();
    assert_eq!(first, ImportReport { cards: 2, reviews: 2, skipped: 0 });

    let second = import_progress(&target, &user, cards, reviews).await.unwrap();
    assert_eq!(second, ImportReport { cards: 0, reviews: 0, skipped: 2 });
    assert_eq!(target.list_reviews(&user).await.unwrap().len(), 2);
}
