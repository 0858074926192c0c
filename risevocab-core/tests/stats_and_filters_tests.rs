use chrono::{Duration, TimeZone, Utc};
use risevocab_core::{
    daily_streak, filter_by_error_tag, filter_by_kind, filter_by_stage, queue_summary, summarize, CardStage,
    ReviewCard, ReviewLog, Score, SubjectKind, SubjectRef,
};

#[test]
fn filters_kind_tag_and_stage() {
    let now = Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap();
    let mut c1 = ReviewCard::new(SubjectRef::prompt("prompt_standup").unwrap(), now);
    c1.error_tags = vec!["Missing greeting".into(), "Too informal".into()];
    c1.interval_days = 6;
    let c2 = ReviewCard::new(SubjectRef::phrase("phrase_follow_up").unwrap(), now);

    let v = vec![c1.clone(), c2.clone()];

    let prompts = filter_by_kind(&v, SubjectKind::Prompt);
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].id, c1.id);

    let by_tag = filter_by_error_tag(&v, "informal");
    assert_eq!(by_tag.len(), 1);
    assert_eq!(by_tag[0].id, c1.id);
    assert_eq!(filter_by_error_tag(&v, " ").len(), 2);

    assert_eq!(filter_by_stage(&v, CardStage::Young).len(), 1);
    assert_eq!(filter_by_stage(&v, CardStage::New)[0].id, c2.id);
}

#[test]
fn queue_summary_counts() {
    let now = Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap();
    let fresh = ReviewCard::new(SubjectRef::prompt("a").unwrap(), now);

    let mut soon = ReviewCard::new(SubjectRef::prompt("b").unwrap(), now);
    soon.interval_days = 1;
    soon.due_at = now + Duration::days(1);

    let mut later = ReviewCard::new(SubjectRef::prompt("c").unwrap(), now);
    later.interval_days = 39;
    later.due_at = now + Duration::days(30);

    let q = queue_summary(&[fresh, soon, later], now);
    assert_eq!(q.total, 3);
    assert_eq!(q.due_now, 1);
    assert_eq!(q.upcoming_week, 1);
    assert_eq!(q.new, 1);
    assert_eq!(q.learning, 1);
    assert_eq!(q.mature, 1);
    assert!(!q.all_caught_up());

    assert!(queue_summary(&[], now).all_caught_up());
}

#[test]
fn stats_and_streak() {
    let card = ReviewCard::new(SubjectRef::prompt("p").unwrap(), Utc::now());
    let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();

    let r0 = ReviewLog::new(card.id, Score::new(90).unwrap(), now - Duration::days(2), 1, 2.5);
    let r1 = ReviewLog::new(card.id, Score::new(70).unwrap(), now - Duration::days(1), 6, 2.5);
    let r2 = ReviewLog::new(card.id, Score::new(20).unwrap(), now, 1, 2.3);

    let s = summarize(&[r0.clone(), r1.clone(), r2.clone()]);
    assert_eq!(s.totals.total, 3);
    assert_eq!(s.totals.passing, 2);
    assert_eq!(s.totals.failing, 1);
    assert!((s.totals.mean_score() - 60.0).abs() < 1e-9);
    assert!((s.totals.accuracy() - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(s.per_day.len(), 3);

    let today = now.date_naive();
    assert_eq!(daily_streak(&[r0.clone(), r1.clone(), r2], today), 3);
    assert_eq!(daily_streak(&[r0, r1], today), 0);
}
