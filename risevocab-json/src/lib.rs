use chrono::{DateTime, Utc};
use risevocab_core::{repo::Repository, CardId, CoreError, ReviewCard, ReviewLog, SubjectRef, UserId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tokio::task;

pub mod paths;

const FILE_VERSION: u32 = 1;

#[derive(Clone, Serialize, Deserialize)]
struct UserImage {
    user: UserId,
    cards: Vec<ReviewCard>,
    reviews: Vec<ReviewLog>,
}

#[derive(Clone, Serialize, Deserialize)]
struct FileImage {
    version: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    users: Vec<UserImage>,
}

#[derive(Default, Clone)]
struct UserData {
    cards: HashMap<CardId, ReviewCard>,
    reviews: HashMap<CardId, Vec<ReviewLog>>,
}

impl UserData {
    fn push_review(&mut self, review: &ReviewLog) {
        if self.reviews.values().flatten().any(|r| r.id == review.id) {
            return;
        }
        self.reviews.entry(review.card_id).or_default().push(review.clone());
    }
}

#[derive(Clone)]
struct State {
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    users: HashMap<UserId, UserData>,
}

impl State {
    fn new_empty() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            users: HashMap::new(),
        }
    }

    fn to_image(&self) -> FileImage {
        let mut users: Vec<UserImage> = self
            .users
            .iter()
            .map(|(user, data)| {
                let mut cards: Vec<ReviewCard> = data.cards.values().cloned().collect();
                cards.sort_by_key(|c| c.created_at);
                let mut reviews: Vec<ReviewLog> =
                    data.reviews.values().flat_map(|v| v.iter().cloned()).collect();
                reviews.sort_by_key(|r| r.reviewed_at);
                UserImage {
                    user: user.clone(),
                    cards,
                    reviews,
                }
            })
            .collect();
        users.sort_by(|a, b| a.user.cmp(&b.user));
        FileImage {
            version: FILE_VERSION,
            created_at: self.created_at,
            updated_at: self.updated_at,
            users,
        }
    }

    fn from_image(img: FileImage) -> Result<Self, CoreError> {
        if img.version != FILE_VERSION {
            return Err(CoreError::Storage("unsupported store file version"));
        }
        let mut users = HashMap::new();
        for u in img.users {
            let mut data = UserData::default();
            for c in u.cards {
                c.validate()?;
                data.cards.insert(c.id, c);
            }
            for r in u.reviews {
                data.reviews.entry(r.card_id).or_default().push(r);
            }
            users.insert(u.user, data);
        }
        Ok(Self {
            created_at: img.created_at,
            updated_at: img.updated_at,
            users,
        })
    }
}

/// All users' progress in one JSON file, rewritten atomically on every change.
///
/// Writers queue on `write_gate` so the file always holds the latest state;
/// a failed write restores the in-memory state it replaced.
pub struct JsonStore {
    path: PathBuf,
    backups_dir: PathBuf,
    max_backups: usize,
    state: RwLock<State>,
    write_gate: Mutex<()>,
}

impl JsonStore {
    pub async fn open_default() -> Result<Self, CoreError> {
        let (file, backups) = paths::default_store_file();
        Self::open_with(file, backups, 10).await
    }

    pub async fn open_at(file: PathBuf) -> Result<Self, CoreError> {
        let (file, backups) = paths::store_files_at(file);
        Self::open_with(file, backups, 10).await
    }

    pub async fn open_with(path: PathBuf, backups_dir: PathBuf, max_backups: usize) -> Result<Self, CoreError> {
        ensure_parent_dirs(&path)?;
        ensure_dir(&backups_dir)?;
        let state = load_or_init(&path, &backups_dir).await?;
        tracing::info!(path = %path.display(), users = state.users.len(), "opened json store");
        Ok(Self {
            path,
            backups_dir,
            max_backups: max_backups.max(1),
            state: RwLock::new(state),
            write_gate: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applies `change` to the state and persists the result before the
    /// next writer runs.
    async fn commit<T, F>(&self, change: F) -> Result<T, CoreError>
    where
        F: FnOnce(&mut State) -> Result<T, CoreError> + Send,
        T: Send,
    {
        let _gate = self.write_gate.lock().await;
        let (out, previous, snapshot) = {
            let mut s = self.state.write();
            let previous = s.clone();
            let out = match change(&mut *s) {
                Ok(out) => out,
                Err(e) => {
                    *s = previous;
                    return Err(e);
                }
            };
            s.updated_at = Utc::now();
            (out, previous, s.to_image())
        };

        if let Err(e) = self.persist(snapshot).await {
            *self.state.write() = previous;
            return Err(e);
        }
        Ok(out)
    }

    async fn persist(&self, snapshot: FileImage) -> Result<(), CoreError> {
        let path = self.path.clone();
        let backups = self.backups_dir.clone();
        let keep = self.max_backups;

        task::spawn_blocking(move || write_with_backup(&path, &backups, keep, &snapshot))
            .await
            .map_err(|_| CoreError::Storage("io"))?
            .map_err(|e| {
                tracing::warn!(error = %e, "json store write failed");
                CoreError::Storage("io")
            })
    }
}

fn ensure_parent_dirs(path: &Path) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    Ok(())
}

fn ensure_dir(path: &Path) -> Result<(), CoreError> {
    fs::create_dir_all(path).map_err(|_| CoreError::Storage("io"))
}

async fn load_or_init(path: &Path, backups_dir: &Path) -> Result<State, CoreError> {
    if path.exists() {
        let p = path.to_path_buf();
        let img: FileImage = task::spawn_blocking(move || {
            let buf = fs::read_to_string(&p)?;
            let v = serde_json::from_str::<FileImage>(&buf)?;
            Ok::<FileImage, std::io::Error>(v)
        })
        .await
        .map_err(|_| CoreError::Storage("io"))
        .and_then(|r| r.map_err(|_| CoreError::Storage("corrupt store file")))?;
        State::from_image(img)
    } else {
        let st = State::new_empty();
        let img = st.to_image();
        write_with_backup(path, backups_dir, 1, &img).map_err(|_| CoreError::Storage("io"))?;
        Ok(st)
    }
}

fn write_with_backup(path: &Path, backups_dir: &Path, max_backups: usize, img: &FileImage) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::create_dir_all(backups_dir)?;

    let json = serde_json::to_vec_pretty(img)?;
    let mut tmp = NamedTempFile::new_in(path.parent().unwrap_or_else(|| Path::new(".")))?;
    tmp.write_all(&json)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;

    // Backup rotation
    let ts = chrono::Local::now().format("%Y%m%d-%H%M%S%.3f");
    let backup_path = backups_dir.join(format!("progress-{ts}.json"));
    let mut btmp = NamedTempFile::new_in(backups_dir)?;
    btmp.write_all(&json)?;
    btmp.flush()?;
    btmp.persist(&backup_path).map_err(|e| e.error)?;

    rotate_backups(backups_dir, max_backups)?;

    Ok(())
}

fn rotate_backups(dir: &Path, keep: usize) -> Result<(), std::io::Error> {
    let mut entries: Vec<_> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    entries.sort_by_key(|e| e.file_name());
    if entries.len() > keep {
        for e in &entries[0..entries.len() - keep] {
            let _ = fs::remove_file(e.path());
        }
    }
    Ok(())
}

use async_trait::async_trait;

#[async_trait]
impl Repository for JsonStore {
    async fn insert_card(&self, user: &UserId, card: &ReviewCard) -> Result<(), CoreError> {
        card.validate()?;
        self.commit(|s| {
            let data = s.users.entry(user.clone()).or_default();
            if data.cards.contains_key(&card.id) {
                return Err(CoreError::Conflict("card id already exists"));
            }
            if data.cards.values().any(|c| c.subject == card.subject) {
                return Err(CoreError::Conflict("subject already has a card"));
            }
            data.cards.insert(card.id, card.clone());
            Ok(())
        })
        .await
    }

    async fn get_card(&self, user: &UserId, id: CardId) -> Result<ReviewCard, CoreError> {
        let s = self.state.read();
        s.users
            .get(user)
            .and_then(|d| d.cards.get(&id))
            .cloned()
            .ok_or(CoreError::NotFound("card"))
    }

    async fn find_card_by_subject(
        &self,
        user: &UserId,
        subject: &SubjectRef,
    ) -> Result<Option<ReviewCard>, CoreError> {
        let s = self.state.read();
        Ok(s.users
            .get(user)
            .and_then(|d| d.cards.values().find(|c| &c.subject == subject))
            .cloned())
    }

    async fn list_cards(&self, user: &UserId) -> Result<Vec<ReviewCard>, CoreError> {
        let s = self.state.read();
        let mut v: Vec<ReviewCard> = s
            .users
            .get(user)
            .map(|d| d.cards.values().cloned().collect())
            .unwrap_or_default();
        v.sort_by_key(|c| c.created_at);
        Ok(v)
    }

    async fn put_card(&self, user: &UserId, card: &ReviewCard) -> Result<(), CoreError> {
        card.validate()?;
        self.commit(|s| {
            let slot = s
                .users
                .get_mut(user)
                .and_then(|d| d.cards.get_mut(&card.id))
                .ok_or(CoreError::NotFound("card"))?;
            *slot = card.clone();
            Ok(())
        })
        .await
    }

    async fn delete_card(&self, user: &UserId, id: CardId) -> Result<(), CoreError> {
        self.commit(|s| {
            let data = s.users.get_mut(user).ok_or(CoreError::NotFound("card"))?;
            data.cards.remove(&id).ok_or(CoreError::NotFound("card"))?;
            data.reviews.remove(&id);
            Ok(())
        })
        .await
    }

    async fn delete_cards_for_subject(&self, user: &UserId, subject: &SubjectRef) -> Result<usize, CoreError> {
        let known = self
            .state
            .read()
            .users
            .get(user)
            .is_some_and(|d| d.cards.values().any(|c| &c.subject == subject));
        if !known {
            return Ok(0);
        }
        self.commit(|s| {
            let Some(data) = s.users.get_mut(user) else {
                return Ok(0);
            };
            let ids: Vec<CardId> = data
                .cards
                .values()
                .filter(|c| &c.subject == subject)
                .map(|c| c.id)
                .collect();
            for id in &ids {
                data.cards.remove(id);
                data.reviews.remove(id);
            }
            Ok(ids.len())
        })
        .await
    }

    async fn insert_review(&self, user: &UserId, review: &ReviewLog) -> Result<(), CoreError> {
        self.commit(|s| {
            let data = s
                .users
                .get_mut(user)
                .filter(|d| d.cards.contains_key(&review.card_id))
                .ok_or(CoreError::NotFound("card"))?;
            data.push_review(review);
            Ok(())
        })
        .await
    }

    async fn record_review(&self, user: &UserId, card: &ReviewCard, review: &ReviewLog) -> Result<(), CoreError> {
        card.validate()?;
        if review.card_id != card.id {
            return Err(CoreError::Invalid("review belongs to another card"));
        }
        self.commit(|s| {
            let data = s.users.get_mut(user).ok_or(CoreError::NotFound("card"))?;
            let slot = data.cards.get_mut(&card.id).ok_or(CoreError::NotFound("card"))?;
            *slot = card.clone();
            data.push_review(review);
            Ok(())
        })
        .await
    }

    async fn list_reviews(&self, user: &UserId) -> Result<Vec<ReviewLog>, CoreError> {
        let s = self.state.read();
        let mut v: Vec<ReviewLog> = s
            .users
            .get(user)
            .map(|d| d.reviews.values().flat_map(|r| r.iter().cloned()).collect())
            .unwrap_or_default();
        v.sort_by_key(|r| r.reviewed_at);
        Ok(v)
    }

    async fn list_reviews_for_card(&self, user: &UserId, card_id: CardId) -> Result<Vec<ReviewLog>, CoreError> {
        let s = self.state.read();
        Ok(s.users
            .get(user)
            .and_then(|d| d.reviews.get(&card_id))
            .cloned()
            .unwrap_or_default())
    }
}
