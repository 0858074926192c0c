use crate::api::server as api_server;
use crate::cli::opts::*;
use crate::cli::transfer::{parse_legacy_snapshot, ExportBundle, BUNDLE_VERSION};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, Utc};
use risevocab_core::{
    daily_streak,
    filters::{filter_by_error_tag, filter_by_kind},
    practice, queue_summary, summarize, CoreError, Repository, ReviewCard, ReviewLog, Score, SubjectKind,
    SubjectRef, UserId,
};
use risevocab_json::paths::data_root;
use risevocab_json::JsonStore;
use risevocab_pg::PostgresRepo;
use risevocab_sqlite::SqliteRepo;
use std::collections::HashSet;
use std::io::{stdin, stdout, Write};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

pub async fn run_cli(args: Cli) -> Result<()> {
    let repo = open_repo(&args).await?;
    let user = UserId::new(args.user.clone())?;
    match args.cmd {
        Command::Api(api) => {
            let addr: std::net::SocketAddr = api.addr.parse()?;
            api_server::run(repo, addr).await
        }
        Command::Card(cmd) => card_cmd(repo, &user, cmd).await,
        Command::Drill(cmd) => drill_cmd(repo, &user, cmd).await,
        Command::Review(cmd) => review_cmd(repo, &user, cmd).await,
        Command::Due(cmd) => due_cmd(repo, &user, cmd).await,
        Command::Upcoming(cmd) => upcoming_cmd(repo, &user, cmd).await,
        Command::Stats => stats_cmd(repo, &user).await,
        Command::Forget(sel) => forget_cmd(repo, &user, sel).await,
        Command::Export(cmd) => export_cmd(repo, &user, cmd).await,
        Command::Import(cmd) => import_cmd(repo, &user, cmd).await,
    }
}

pub async fn open_repo(args: &Cli) -> Result<Arc<dyn Repository>> {
    match args.store {
        StoreKind::Json => {
            let s = match &args.json_path {
                Some(p) => JsonStore::open_at(p.clone()).await?,
                None => JsonStore::open_default().await?,
            };
            Ok(Arc::new(s))
        }
        StoreKind::Sqlite => {
            let p = args
                .db_path
                .clone()
                .unwrap_or_else(|| data_root().join("risevocab.sqlite3"));
            if let Some(parent) = p.parent() {
                std::fs::create_dir_all(parent).ok();
            }
            let s = SqliteRepo::open_file(&p).await?;
            Ok(Arc::new(s))
        }
        StoreKind::Postgres => {
            let url = args
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow!("--database-url or RISEVOCAB_DATABASE_URL is required for --store postgres"))?;
            let s = PostgresRepo::connect(url).await?;
            Ok(Arc::new(s))
        }
    }
}

async fn card_cmd(repo: Arc<dyn Repository>, user: &UserId, cmd: CardCmd) -> Result<()> {
    match cmd {
        CardCmd::Add(sel) => {
            let card = practice::ensure_card(&*repo, user, subject_from_args(sel)?, Utc::now()).await?;
            println!("{}", card.id);
        }
        CardCmd::List { kind, error_tag } => {
            let mut cards = repo.list_cards(user).await?;
            if let Some(k) = kind {
                cards = filter_by_kind(&cards, kind_from_arg(k));
            }
            if let Some(q) = error_tag {
                cards = filter_by_error_tag(&cards, &q);
            }
            for c in cards {
                print_card_line(&c);
            }
        }
        CardCmd::Show { card_id } => {
            let id = parse_uuid(&card_id)?;
            let card = repo.get_card(user, id).await?;
            print_card_line(&card);
            let tags = if card.error_tags.is_empty() { "-".to_string() } else { card.error_tags.join("; ") };
            println!("error tags: {tags}");
            for r in repo.list_reviews_for_card(user, id).await? {
                println!(
                    "  {}\tscore={}\tgrade={}\tinterval={}d\tease={:.2}",
                    r.reviewed_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                    r.score,
                    r.grade.value(),
                    r.interval_applied,
                    r.ease_after
                );
            }
        }
        CardCmd::Rm { card_id } => {
            let id = parse_uuid(&card_id)?;
            repo.delete_card(user, id).await?;
            println!("ok");
        }
    }
    Ok(())
}

async fn drill_cmd(repo: Arc<dyn Repository>, user: &UserId, cmd: DrillCmd) -> Result<()> {
    let score = Score::new(cmd.score)?;
    let now = Local::now();
    let out = match (cmd.card, cmd.prompt, cmd.phrase) {
        (Some(id), None, None) => {
            practice::record_attempt(&*repo, user, parse_uuid(&id)?, score, &cmd.mistakes, now).await?
        }
        (None, prompt, phrase) if prompt.is_some() || phrase.is_some() => {
            let subject = SubjectRef::from_parts(prompt, phrase)?;
            practice::record_attempt_for_subject(&*repo, user, subject, score, &cmd.mistakes, now).await?
        }
        _ => bail!("pass one of --card, --prompt or --phrase"),
    };
    println!(
        "{}\tgrade={}\tnext due in {} day(s) ({})\tease={:.2}",
        out.card.id,
        out.review.grade.value(),
        out.card.interval_days,
        out.card.due_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
        out.card.ease
    );
    Ok(())
}

async fn review_cmd(repo: Arc<dyn Repository>, user: &UserId, cmd: ReviewCmd) -> Result<()> {
    let pool = practice::due_queue(&*repo, user, Utc::now(), Some(cmd.max)).await?;
    if pool.is_empty() {
        println!("all caught up, nothing due");
        return Ok(());
    }

    let total = pool.len();
    let mut count = 0usize;
    for card in pool {
        println!("\n[{}/{}] {} ({:?})", count + 1, total, card.subject, card.stage());
        if !card.error_tags.is_empty() {
            println!("last time: {}", card.error_tags.join("; "));
        }
        println!("[0-100 = score from feedback, s=skip, q=quit]");
        let score = loop {
            let line = read_line("score> ")?;
            match line.trim().to_lowercase().as_str() {
                "s" | "skip" => break None,
                "q" | "quit" => {
                    println!("\nreviewed {count}");
                    return Ok(());
                }
                other => match other.parse::<i64>().map_err(|_| ()).and_then(|v| Score::new(v).map_err(|_| ())) {
                    Ok(s) => break Some(s),
                    Err(()) => println!("enter a score between 0 and 100, s, or q"),
                },
            }
        };

        if let Some(score) = score {
            let line = read_line("mistakes (separate with ';', blank for none)> ")?;
            let mistakes: Vec<String> = line
                .split(';')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            let out = practice::record_attempt(&*repo, user, card.id, score, &mistakes, Local::now()).await?;
            count += 1;
            println!("-> next due in {} day(s)", out.card.interval_days);
        }
    }

    println!("\nreviewed {count}");
    Ok(())
}

async fn due_cmd(repo: Arc<dyn Repository>, user: &UserId, cmd: DueCmd) -> Result<()> {
    let due = practice::due_queue(&*repo, user, Utc::now(), cmd.limit).await?;
    if due.is_empty() {
        println!("all caught up");
    }
    for c in due {
        print_card_line(&c);
    }
    Ok(())
}

async fn upcoming_cmd(repo: Arc<dyn Repository>, user: &UserId, cmd: UpcomingCmd) -> Result<()> {
    for c in practice::upcoming(&*repo, user, Utc::now(), cmd.days).await? {
        print_card_line(&c);
    }
    Ok(())
}

async fn stats_cmd(repo: Arc<dyn Repository>, user: &UserId) -> Result<()> {
    let now = Utc::now();
    let cards = repo.list_cards(user).await?;
    let reviews = repo.list_reviews(user).await?;
    let q = queue_summary(&cards, now);
    let s = summarize(&reviews);
    let streak = daily_streak(&reviews, Local::now().date_naive());

    println!(
        "cards={}\tdue={}\tnext 7 days={}\tnew={}\tlearning={}\tyoung={}\tmature={}",
        q.total, q.due_now, q.upcoming_week, q.new, q.learning, q.young, q.mature
    );
    println!(
        "reviews={}\tpassing={}\taccuracy={:.0}%\tmean score={:.1}\tstreak={}d",
        s.totals.total,
        s.totals.passing,
        s.totals.accuracy() * 100.0,
        s.totals.mean_score(),
        streak
    );
    Ok(())
}

async fn forget_cmd(repo: Arc<dyn Repository>, user: &UserId, sel: SubjectArgs) -> Result<()> {
    let subject = subject_from_args(sel)?;
    let n = practice::forget_subject(&*repo, user, &subject).await?;
    println!("removed {n}");
    Ok(())
}

async fn export_cmd(repo: Arc<dyn Repository>, user: &UserId, cmd: ExportCmd) -> Result<()> {
    match cmd {
        ExportCmd::Json { path } => {
            let bundle = ExportBundle {
                version: BUNDLE_VERSION,
                user: user.clone(),
                exported_at: Utc::now(),
                cards: repo.list_cards(user).await?,
                reviews: repo.list_reviews(user).await?,
            };
            let s = serde_json::to_string_pretty(&bundle)?;
            std::fs::write(&path, s)?;
            println!("wrote {}", path.display());
        }
        ExportCmd::Csv { path } => {
            let cards = repo.list_cards(user).await?;
            let mut wtr = csv::Writer::from_path(&path)?;
            wtr.write_record([
                "id", "kind", "subject", "due_at", "interval_days", "ease", "last_score", "error_tags",
            ])?;
            for c in cards {
                wtr.write_record([
                    c.id.to_string(),
                    c.subject.kind().as_str().to_string(),
                    c.subject.id().to_string(),
                    c.due_at.to_rfc3339(),
                    c.interval_days.to_string(),
                    format!("{:.2}", c.ease),
                    c.last_score.to_string(),
                    c.error_tags.join(";"),
                ])?;
            }
            wtr.flush()?;
            println!("wrote {}", path.display());
        }
    }
    Ok(())
}

async fn import_cmd(repo: Arc<dyn Repository>, user: &UserId, cmd: ImportCmd) -> Result<()> {
    let (cards, reviews) = match cmd {
        ImportCmd::Json { path } => {
            let data = read_file(&path)?;
            let bundle: ExportBundle = serde_json::from_str(&data)?;
            if bundle.version != BUNDLE_VERSION {
                bail!("unsupported bundle version {}", bundle.version);
            }
            (bundle.cards, bundle.reviews)
        }
        ImportCmd::Local { path } => {
            let data = read_file(&path)?;
            let snapshot = parse_legacy_snapshot(&data)?;
            let now = Utc::now();
            let mut cards = Vec::with_capacity(snapshot.srs.len());
            for item in snapshot.srs {
                let id = item.id.clone();
                match item.into_card(now) {
                    Ok(c) => cards.push(c),
                    Err(e) => tracing::warn!(item = %id, error = %e, "skipping local srs item"),
                }
            }
            (cards, Vec::new())
        }
    };

    let report = import_progress(&*repo, user, cards, reviews).await?;
    println!(
        "imported {} card(s), {} review(s); skipped {} existing",
        report.cards, report.reviews, report.skipped
    );
    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub cards: usize,
    pub reviews: usize,
    pub skipped: usize,
}

/// Inserts cards whose subject has no card yet; existing progress wins.
/// Reviews are only taken for cards inserted by this import.
pub async fn import_progress(
    repo: &dyn Repository,
    user: &UserId,
    cards: Vec<ReviewCard>,
    reviews: Vec<ReviewLog>,
) -> Result<ImportReport> {
    let mut report = ImportReport::default();
    let mut inserted = HashSet::new();
    for card in cards {
        if repo.find_card_by_subject(user, &card.subject).await?.is_some() {
            report.skipped += 1;
            continue;
        }
        match repo.insert_card(user, &card).await {
            Ok(()) => {
                inserted.insert(card.id);
                report.cards += 1;
            }
            Err(CoreError::Conflict(_)) => report.skipped += 1,
            Err(e) => return Err(e.into()),
        }
    }

    for r in reviews {
        if !inserted.contains(&r.card_id) {
            tracing::debug!(review = %r.id, card = %r.card_id, "skipping review for card not imported");
            continue;
        }
        repo.insert_review(user, &r).await?;
        report.reviews += 1;
    }
    Ok(report)
}

// ===== Helpers =====
fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|_| anyhow!("invalid card id: {s}"))
}

fn subject_from_args(sel: SubjectArgs) -> Result<SubjectRef> {
    Ok(SubjectRef::from_parts(sel.prompt, sel.phrase)?)
}

fn kind_from_arg(k: KindArg) -> SubjectKind {
    match k {
        KindArg::Prompt => SubjectKind::Prompt,
        KindArg::Phrase => SubjectKind::Phrase,
    }
}

fn print_card_line(c: &ReviewCard) {
    println!(
        "{}\t{}\tdue={}\tinterval={}d\tease={:.2}\tlast={}",
        c.id,
        c.subject,
        c.due_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
        c.interval_days,
        c.ease,
        c.last_score
    );
}

fn read_file(path: &PathBuf) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn read_line(prompt: &str) -> Result<String> {
    print!("{prompt}");
    stdout().flush().ok();
    let mut s = String::new();
    stdin().read_line(&mut s)?;
    Ok(s)
}
