use chrono::{DateTime, SecondsFormat, Utc};
use risevocab_core::{
    repo::Repository, CardId, CoreError, Grade, ReviewCard, ReviewLog, Score, SubjectRef, UserId,
};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};
use std::path::Path;

pub struct SqliteRepo {
    pool: SqlitePool,
}

const CARD_COLUMNS: &str =
    "id,prompt_id,phrase_id,due_at,interval_days,ease,last_score,error_tags,created_at";

impl SqliteRepo {
    pub async fn open_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let url = format!("sqlite://{}?mode=rwc", path.as_ref().to_string_lossy());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(|_| CoreError::Storage("sqlite connect"))?;
        let repo = Self { pool };
        repo.ensure_schema().await?;
        tracing::info!(path = %path.as_ref().display(), "opened sqlite store");
        Ok(repo)
    }

    /// Single connection: every pooled connection would otherwise get its
    /// own empty in-memory database.
    pub async fn open_memory() -> Result<Self, CoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|_| CoreError::Storage("sqlite connect"))?;
        let repo = Self { pool };
        repo.ensure_schema().await?;
        Ok(repo)
    }

    async fn ensure_schema(&self) -> Result<(), CoreError> {
        const STMT: &str = r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS srs_items (
          id             TEXT PRIMARY KEY,
          user_id        TEXT NOT NULL,
          prompt_id      TEXT,
          phrase_id      TEXT,
          due_at         TEXT NOT NULL,
          interval_days  INTEGER NOT NULL DEFAULT 0,
          ease           REAL    NOT NULL DEFAULT 2.5,
          last_score     INTEGER NOT NULL DEFAULT 0,
          error_tags     TEXT    NOT NULL DEFAULT '[]',
          created_at     TEXT NOT NULL,
          updated_at     TEXT NOT NULL,
          CHECK ((prompt_id IS NULL) <> (phrase_id IS NULL)),
          UNIQUE (user_id, prompt_id),
          UNIQUE (user_id, phrase_id)
        );

        CREATE TABLE IF NOT EXISTS srs_reviews (
          id               TEXT PRIMARY KEY,
          user_id          TEXT NOT NULL,
          card_id          TEXT NOT NULL,
          score            INTEGER NOT NULL,
          grade            INTEGER NOT NULL,
          reviewed_at      TEXT NOT NULL,
          interval_applied INTEGER NOT NULL,
          ease_after       REAL NOT NULL,
          FOREIGN KEY(card_id) REFERENCES srs_items(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_srs_items_user_due ON srs_items (user_id, due_at);
        CREATE INDEX IF NOT EXISTS idx_srs_reviews_card_time ON srs_reviews (card_id, reviewed_at);
        "#;

        // Execute statements one by one for compatibility.
        for chunk in STMT.split(';') {
            let sql = chunk.trim();
            if sql.is_empty() {
                continue;
            }
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|_| CoreError::Storage("sqlite schema"))?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Repository for SqliteRepo {
    // ===== Cards =====
    async fn insert_card(&self, user: &UserId, card: &ReviewCard) -> Result<(), CoreError> {
        card.validate()?;
        if self.find_card_by_subject(user, &card.subject).await?.is_some() {
            return Err(CoreError::Conflict("subject already has a card"));
        }

        let res = sqlx::query(
            r#"
            INSERT INTO srs_items (
              id, user_id, prompt_id, phrase_id, due_at, interval_days, ease,
              last_score, error_tags, created_at, updated_at
            )
            VALUES (?,?,?,?,?,?,?,?,?,?,?)
            "#,
        )
        .bind(card.id.to_string())
        .bind(user.as_str())
        .bind(card.subject.prompt_id())
        .bind(card.subject.phrase_id())
        .bind(dt_to_str(card.due_at))
        .bind(card.interval_days as i64)
        .bind(card.ease)
        .bind(card.last_score.value() as i64)
        .bind(tags_to_json(&card.error_tags)?)
        .bind(dt_to_str(card.created_at))
        .bind(dt_to_str(Utc::now()))
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(CoreError::Conflict("card id already exists"))
            }
            Err(_) => Err(CoreError::Storage("insert card")),
        }
    }

    async fn get_card(&self, user: &UserId, id: CardId) -> Result<ReviewCard, CoreError> {
        let row = sqlx::query(&format!(
            "SELECT {CARD_COLUMNS} FROM srs_items WHERE id=? AND user_id=?"
        ))
        .bind(id.to_string())
        .bind(user.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|_| CoreError::Storage("read card"))?;
        let row = row.ok_or(CoreError::NotFound("card"))?;
        row_into_card(row)
    }

    async fn find_card_by_subject(
        &self,
        user: &UserId,
        subject: &SubjectRef,
    ) -> Result<Option<ReviewCard>, CoreError> {
        let column = match subject {
            SubjectRef::Prompt(_) => "prompt_id",
            SubjectRef::Phrase(_) => "phrase_id",
        };
        let row = sqlx::query(&format!(
            "SELECT {CARD_COLUMNS} FROM srs_items WHERE user_id=? AND {column}=? LIMIT 1"
        ))
        .bind(user.as_str())
        .bind(subject.id())
        .fetch_optional(&self.pool)
        .await
        .map_err(|_| CoreError::Storage("read card"))?;
        row.map(row_into_card).transpose()
    }

    async fn list_cards(&self, user: &UserId) -> Result<Vec<ReviewCard>, CoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {CARD_COLUMNS} FROM srs_items WHERE user_id=? ORDER BY created_at ASC"
        ))
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|_| CoreError::Storage("list cards"))?;
        let mut v = Vec::with_capacity(rows.len());
        for row in rows {
            v.push(row_into_card(row)?);
        }
        Ok(v)
    }

    async fn put_card(&self, user: &UserId, card: &ReviewCard) -> Result<(), CoreError> {
        card.validate()?;
        let res = update_card_query(user, card)?
            .execute(&self.pool)
            .await
            .map_err(|_| CoreError::Storage("update card"))?;
        if res.rows_affected() == 0 {
            return Err(CoreError::NotFound("card"));
        }
        Ok(())
    }

    async fn delete_card(&self, user: &UserId, id: CardId) -> Result<(), CoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|_| CoreError::Storage("tx"))?;
        sqlx::query("DELETE FROM srs_reviews WHERE card_id=? AND user_id=?")
            .bind(id.to_string())
            .bind(user.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|_| CoreError::Storage("del reviews"))?;
        let res = sqlx::query("DELETE FROM srs_items WHERE id=? AND user_id=?")
            .bind(id.to_string())
            .bind(user.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|_| CoreError::Storage("del card"))?;
        if res.rows_affected() == 0 {
            tx.rollback().await.ok();
            return Err(CoreError::NotFound("card"));
        }
        tx.commit()
            .await
            .map_err(|_| CoreError::Storage("tx commit"))
    }

    async fn delete_cards_for_subject(&self, user: &UserId, subject: &SubjectRef) -> Result<usize, CoreError> {
        let column = match subject {
            SubjectRef::Prompt(_) => "prompt_id",
            SubjectRef::Phrase(_) => "phrase_id",
        };
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|_| CoreError::Storage("tx"))?;

        // Manual cascade (robust even if PRAGMA foreign_keys is off)
        sqlx::query(&format!(
            "DELETE FROM srs_reviews WHERE card_id IN \
             (SELECT id FROM srs_items WHERE user_id=? AND {column}=?)"
        ))
        .bind(user.as_str())
        .bind(subject.id())
        .execute(&mut *tx)
        .await
        .map_err(|_| CoreError::Storage("del reviews"))?;

        let res = sqlx::query(&format!("DELETE FROM srs_items WHERE user_id=? AND {column}=?"))
            .bind(user.as_str())
            .bind(subject.id())
            .execute(&mut *tx)
            .await
            .map_err(|_| CoreError::Storage("del cards"))?;

        tx.commit()
            .await
            .map_err(|_| CoreError::Storage("tx commit"))?;
        Ok(res.rows_affected() as usize)
    }

    // ===== Reviews =====
    async fn insert_review(&self, user: &UserId, review: &ReviewLog) -> Result<(), CoreError> {
        let owned = sqlx::query("SELECT 1 FROM srs_items WHERE id=? AND user_id=? LIMIT 1")
            .bind(review.card_id.to_string())
            .bind(user.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|_| CoreError::Storage("read card"))?
            .is_some();
        if !owned {
            return Err(CoreError::NotFound("card"));
        }

        insert_review_query(user, review)
            .execute(&self.pool)
            .await
            .map_err(|_| CoreError::Storage("insert review"))?;
        Ok(())
    }

    async fn record_review(&self, user: &UserId, card: &ReviewCard, review: &ReviewLog) -> Result<(), CoreError> {
        card.validate()?;
        if review.card_id != card.id {
            return Err(CoreError::Invalid("review belongs to another card"));
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|_| CoreError::Storage("tx"))?;
        let res = update_card_query(user, card)?
            .execute(&mut *tx)
            .await
            .map_err(|_| CoreError::Storage("update card"))?;
        if res.rows_affected() == 0 {
            tx.rollback().await.ok();
            return Err(CoreError::NotFound("card"));
        }
        insert_review_query(user, review)
            .execute(&mut *tx)
            .await
            .map_err(|_| CoreError::Storage("insert review"))?;
        tx.commit()
            .await
            .map_err(|_| CoreError::Storage("tx commit"))
    }

    async fn list_reviews(&self, user: &UserId) -> Result<Vec<ReviewLog>, CoreError> {
        let rows = sqlx::query(
            r#"SELECT id,card_id,score,grade,reviewed_at,interval_applied,ease_after
               FROM srs_reviews WHERE user_id=? ORDER BY reviewed_at ASC"#,
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|_| CoreError::Storage("list reviews"))?;
        rows.into_iter().map(row_into_review).collect()
    }

    async fn list_reviews_for_card(&self, user: &UserId, card_id: CardId) -> Result<Vec<ReviewLog>, CoreError> {
        let rows = sqlx::query(
            r#"SELECT id,card_id,score,grade,reviewed_at,interval_applied,ease_after
               FROM srs_reviews WHERE user_id=? AND card_id=? ORDER BY reviewed_at ASC"#,
        )
        .bind(user.as_str())
        .bind(card_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|_| CoreError::Storage("list reviews"))?;
        rows.into_iter().map(row_into_review).collect()
    }
}

// ===== Helpers =====
fn uuid_from_str(s: String) -> Result<uuid::Uuid, CoreError> {
    uuid::Uuid::parse_str(&s).map_err(|_| CoreError::Invalid("uuid"))
}

/// Fixed-width nanosecond timestamps so text ordering matches time ordering.
type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

fn update_card_query<'q>(user: &'q UserId, card: &ReviewCard) -> Result<SqliteQuery<'q>, CoreError> {
    Ok(sqlx::query(
        r#"
        UPDATE srs_items SET
          due_at=?, interval_days=?, ease=?, last_score=?, error_tags=?, updated_at=?
        WHERE id=? AND user_id=?
        "#,
    )
    .bind(dt_to_str(card.due_at))
    .bind(card.interval_days as i64)
    .bind(card.ease)
    .bind(card.last_score.value() as i64)
    .bind(tags_to_json(&card.error_tags)?)
    .bind(dt_to_str(Utc::now()))
    .bind(card.id.to_string())
    .bind(user.as_str()))
}

// Re-inserting a known review id is a no-op.
fn insert_review_query<'q>(user: &'q UserId, review: &ReviewLog) -> SqliteQuery<'q> {
    sqlx::query(
        r#"INSERT INTO srs_reviews
             (id,user_id,card_id,score,grade,reviewed_at,interval_applied,ease_after)
           VALUES (?,?,?,?,?,?,?,?)
           ON CONFLICT(id) DO NOTHING"#,
    )
    .bind(review.id.to_string())
    .bind(user.as_str())
    .bind(review.card_id.to_string())
    .bind(review.score.value() as i64)
    .bind(review.grade.value() as i64)
    .bind(dt_to_str(review.reviewed_at))
    .bind(review.interval_applied as i64)
    .bind(review.ease_after)
}

fn dt_to_str(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn dt_from_str(s: String) -> Result<DateTime<Utc>, CoreError> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map_err(|_| CoreError::Invalid("datetime"))
        .map(|dt| dt.with_timezone(&Utc))
}

fn tags_to_json(tags: &[String]) -> Result<String, CoreError> {
    serde_json::to_string(tags).map_err(|_| CoreError::Storage("encode error tags"))
}

fn row_into_card(row: sqlx::sqlite::SqliteRow) -> Result<ReviewCard, CoreError> {
    let tags_json: String = row.get("error_tags");
    let error_tags: Vec<String> =
        serde_json::from_str(&tags_json).map_err(|_| CoreError::Invalid("error tags"))?;
    let interval: i64 = row.get("interval_days");

    let card = ReviewCard {
        id: uuid_from_str(row.get::<String, _>("id"))?,
        subject: SubjectRef::from_parts(
            row.get::<Option<String>, _>("prompt_id"),
            row.get::<Option<String>, _>("phrase_id"),
        )?,
        due_at: dt_from_str(row.get::<String, _>("due_at"))?,
        interval_days: u32::try_from(interval).map_err(|_| CoreError::Invalid("interval"))?,
        ease: row.get::<f64, _>("ease"),
        last_score: Score::new(row.get::<i64, _>("last_score"))?,
        error_tags,
        created_at: dt_from_str(row.get::<String, _>("created_at"))?,
    };
    card.validate()?;
    Ok(card)
}

fn row_into_review(row: sqlx::sqlite::SqliteRow) -> Result<ReviewLog, CoreError> {
    let grade = u8::try_from(row.get::<i64, _>("grade"))
        .ok()
        .and_then(Grade::from_value)
        .ok_or(CoreError::Invalid("grade"))?;
    Ok(ReviewLog {
        id: uuid_from_str(row.get::<String, _>("id"))?,
        card_id: uuid_from_str(row.get::<String, _>("card_id"))?,
        score: Score::new(row.get::<i64, _>("score"))?,
        grade,
        reviewed_at: dt_from_str(row.get::<String, _>("reviewed_at"))?,
        interval_applied: u32::try_from(row.get::<i64, _>("interval_applied"))
            .map_err(|_| CoreError::Invalid("interval"))?,
        ease_after: row.get::<f64, _>("ease_after"),
    })
}
