use chrono::{DateTime, Utc};
use risevocab_core::{
    repo::Repository, CardId, CoreError, Grade, ReviewCard, ReviewLog, Score, SubjectRef, UserId,
};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

pub struct PostgresRepo {
    pool: PgPool,
}

const CARD_COLUMNS: &str =
    "id,prompt_id,phrase_id,due_at,interval_days,ease,last_score,error_tags,created_at";

impl PostgresRepo {
    pub async fn connect(url: &str) -> Result<Self, CoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(|_| CoreError::Storage("pg connect"))?;
        let repo = Self { pool };
        repo.ensure_schema().await?;
        tracing::info!("connected postgres store");
        Ok(repo)
    }

    async fn ensure_schema(&self) -> Result<(), CoreError> {
        const STMT: &str = r#"
        CREATE TABLE IF NOT EXISTS srs_items (
          id             uuid PRIMARY KEY,
          user_id        text NOT NULL,
          prompt_id      text,
          phrase_id      text,
          due_at         timestamptz NOT NULL,
          interval_days  integer NOT NULL DEFAULT 0 CHECK (interval_days BETWEEN 0 AND 365),
          ease           double precision NOT NULL DEFAULT 2.5 CHECK (ease >= 1.3),
          last_score     smallint NOT NULL DEFAULT 0 CHECK (last_score BETWEEN 0 AND 100),
          error_tags     text[] NOT NULL DEFAULT '{}',
          created_at     timestamptz NOT NULL,
          updated_at     timestamptz NOT NULL,
          CHECK ((prompt_id IS NULL) <> (phrase_id IS NULL)),
          UNIQUE (user_id, prompt_id),
          UNIQUE (user_id, phrase_id)
        );

        CREATE TABLE IF NOT EXISTS srs_reviews (
          id               uuid PRIMARY KEY,
          user_id          text NOT NULL,
          card_id          uuid NOT NULL REFERENCES srs_items(id) ON DELETE CASCADE,
          score            smallint NOT NULL,
          grade            smallint NOT NULL,
          reviewed_at      timestamptz NOT NULL,
          interval_applied integer NOT NULL,
          ease_after       double precision NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_srs_items_user_due ON srs_items (user_id, due_at);
        CREATE INDEX IF NOT EXISTS idx_srs_reviews_card_time ON srs_reviews (card_id, reviewed_at);
        "#;

        for chunk in STMT.split(';') {
            let sql = chunk.trim();
            if sql.is_empty() {
                continue;
            }
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|_| CoreError::Storage("pg schema"))?;
        }
        Ok(())
    }
}

fn subject_column(subject: &SubjectRef) -> &'static str {
    match subject {
        SubjectRef::Prompt(_) => "prompt_id",
        SubjectRef::Phrase(_) => "phrase_id",
    }
}

#[async_trait::async_trait]
impl Repository for PostgresRepo {
    // ===== Cards =====
    async fn insert_card(&self, user: &UserId, card: &ReviewCard) -> Result<(), CoreError> {
        card.validate()?;
        let res = sqlx::query(
            r#"
            INSERT INTO srs_items (
              id, user_id, prompt_id, phrase_id, due_at, interval_days, ease,
              last_score, error_tags, created_at, updated_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,now())
            "#,
        )
        .bind(card.id)
        .bind(user.as_str())
        .bind(card.subject.prompt_id())
        .bind(card.subject.phrase_id())
        .bind(card.due_at)
        .bind(card.interval_days as i32)
        .bind(card.ease)
        .bind(card.last_score.value() as i16)
        .bind(&card.error_tags) // text[]
        .bind(card.created_at)
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(CoreError::Conflict("card already exists"))
            }
            Err(_) => Err(CoreError::Storage("pg insert card")),
        }
    }

    async fn get_card(&self, user: &UserId, id: CardId) -> Result<ReviewCard, CoreError> {
        let row = sqlx::query(&format!(
            "SELECT {CARD_COLUMNS} FROM srs_items WHERE id=$1 AND user_id=$2"
        ))
        .bind(id)
        .bind(user.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|_| CoreError::Storage("pg read card"))?;
        let row = row.ok_or(CoreError::NotFound("card"))?;
        row_into_card(row)
    }

    async fn find_card_by_subject(
        &self,
        user: &UserId,
        subject: &SubjectRef,
    ) -> Result<Option<ReviewCard>, CoreError> {
        let row = sqlx::query(&format!(
            "SELECT {CARD_COLUMNS} FROM srs_items WHERE user_id=$1 AND {}=$2 LIMIT 1",
            subject_column(subject)
        ))
        .bind(user.as_str())
        .bind(subject.id())
        .fetch_optional(&self.pool)
        .await
        .map_err(|_| CoreError::Storage("pg read card"))?;
        row.map(row_into_card).transpose()
    }

    async fn list_cards(&self, user: &UserId) -> Result<Vec<ReviewCard>, CoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {CARD_COLUMNS} FROM srs_items WHERE user_id=$1 ORDER BY created_at ASC"
        ))
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|_| CoreError::Storage("pg list cards"))?;
        rows.into_iter().map(row_into_card).collect()
    }

    async fn put_card(&self, user: &UserId, card: &ReviewCard) -> Result<(), CoreError> {
        card.validate()?;
        let res = update_card_query(user, card)
            .execute(&self.pool)
            .await
            .map_err(|_| CoreError::Storage("pg update card"))?;
        if res.rows_affected() == 0 {
            return Err(CoreError::NotFound("card"));
        }
        Ok(())
    }

    async fn delete_card(&self, user: &UserId, id: CardId) -> Result<(), CoreError> {
        let res = sqlx::query("DELETE FROM srs_items WHERE id=$1 AND user_id=$2")
            .bind(id)
            .bind(user.as_str())
            .execute(&self.pool)
            .await
            .map_err(|_| CoreError::Storage("pg del card"))?;
        if res.rows_affected() == 0 {
            return Err(CoreError::NotFound("card"));
        }
        Ok(())
    }

    async fn delete_cards_for_subject(&self, user: &UserId, subject: &SubjectRef) -> Result<usize, CoreError> {
        let res = sqlx::query(&format!(
            "DELETE FROM srs_items WHERE user_id=$1 AND {}=$2",
            subject_column(subject)
        ))
        .bind(user.as_str())
        .bind(subject.id())
        .execute(&self.pool)
        .await
        .map_err(|_| CoreError::Storage("pg del cards"))?;
        Ok(res.rows_affected() as usize)
    }

    // ===== Reviews =====
    async fn insert_review(&self, user: &UserId, review: &ReviewLog) -> Result<(), CoreError> {
        let owned = sqlx::query("SELECT 1 FROM srs_items WHERE id=$1 AND user_id=$2")
            .bind(review.card_id)
            .bind(user.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|_| CoreError::Storage("pg read card"))?
            .is_some();
        if !owned {
            return Err(CoreError::NotFound("card"));
        }
        insert_review_query(user, review)
            .execute(&self.pool)
            .await
            .map_err(|_| CoreError::Storage("pg insert review"))?;
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
            .map_err(|_| CoreError::Storage("pg tx"))?;
        let res = update_card_query(user, card)
            .execute(&mut *tx)
            .await
            .map_err(|_| CoreError::Storage("pg update card"))?;
        if res.rows_affected() == 0 {
            tx.rollback().await.ok();
            return Err(CoreError::NotFound("card"));
        }
        insert_review_query(user, review)
            .execute(&mut *tx)
            .await
            .map_err(|_| CoreError::Storage("pg insert review"))?;
        tx.commit()
            .await
            .map_err(|_| CoreError::Storage("pg tx commit"))
    }

    async fn list_reviews(&self, user: &UserId) -> Result<Vec<ReviewLog>, CoreError> {
        let rows = sqlx::query(
            r#"SELECT id,card_id,score,grade,reviewed_at,interval_applied,ease_after
               FROM srs_reviews WHERE user_id=$1 ORDER BY reviewed_at ASC"#,
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|_| CoreError::Storage("pg list reviews"))?;
        rows.into_iter().map(row_into_review).collect()
    }

    async fn list_reviews_for_card(&self, user: &UserId, card_id: CardId) -> Result<Vec<ReviewLog>, CoreError> {
        let rows = sqlx::query(
            r#"SELECT id,card_id,score,grade,reviewed_at,interval_applied,ease_after
               FROM srs_reviews WHERE user_id=$1 AND card_id=$2 ORDER BY reviewed_at ASC"#,
        )
        .bind(user.as_str())
        .bind(card_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|_| CoreError::Storage("pg list reviews"))?;
        rows.into_iter().map(row_into_review).collect()
    }
}

// ===== helpers =====
type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;

fn update_card_query<'q>(user: &'q UserId, card: &'q ReviewCard) -> PgQuery<'q> {
    sqlx::query(
        r#"
        UPDATE srs_items SET
          due_at=$1, interval_days=$2, ease=$3, last_score=$4, error_tags=$5, updated_at=now()
        WHERE id=$6 AND user_id=$7
        "#,
    )
    .bind(card.due_at)
    .bind(card.interval_days as i32)
    .bind(card.ease)
    .bind(card.last_score.value() as i16)
    .bind(&card.error_tags)
    .bind(card.id)
    .bind(user.as_str())
}

// Re-inserting a known review id is a no-op.
fn insert_review_query<'q>(user: &'q UserId, review: &ReviewLog) -> PgQuery<'q> {
    sqlx::query(
        r#"INSERT INTO srs_reviews
             (id,user_id,card_id,score,grade,reviewed_at,interval_applied,ease_after)
           VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
           ON CONFLICT (id) DO NOTHING"#,
    )
    .bind(review.id)
    .bind(user.as_str())
    .bind(review.card_id)
    .bind(review.score.value() as i16)
    .bind(review.grade.value() as i16)
    .bind(review.reviewed_at)
    .bind(review.interval_applied as i32)
    .bind(review.ease_after)
}

fn row_into_card(row: sqlx::postgres::PgRow) -> Result<ReviewCard, CoreError> {
    let card = ReviewCard {
        id: row.get::<uuid::Uuid, _>("id"),
        subject: SubjectRef::from_parts(
            row.get::<Option<String>, _>("prompt_id"),
            row.get::<Option<String>, _>("phrase_id"),
        )?,
        due_at: row.get::<DateTime<Utc>, _>("due_at"),
        interval_days: u32::try_from(row.get::<i32, _>("interval_days"))
            .map_err(|_| CoreError::Invalid("interval"))?,
        ease: row.get::<f64, _>("ease"),
        last_score: Score::new(row.get::<i16, _>("last_score") as i64)?,
        error_tags: row.get::<Vec<String>, _>("error_tags"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    };
    card.validate()?;
    Ok(card)
}

fn row_into_review(row: sqlx::postgres::PgRow) -> Result<ReviewLog, CoreError> {
    let grade = u8::try_from(row.get::<i16, _>("grade"))
        .ok()
        .and_then(Grade::from_value)
        .ok_or(CoreError::Invalid("grade"))?;
    Ok(ReviewLog {
        id: row.get::<uuid::Uuid, _>("id"),
        card_id: row.get::<uuid::Uuid, _>("card_id"),
        score: Score::new(row.get::<i16, _>("score") as i64)?,
        grade,
        reviewed_at: row.get::<DateTime<Utc>, _>("reviewed_at"),
        interval_applied: u32::try_from(row.get::<i32, _>("interval_applied"))
            .map_err(|_| CoreError::Invalid("interval"))?,
        ease_after: row.get::<f64, _>("ease_after"),
    })
}
