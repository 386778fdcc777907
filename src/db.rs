use chrono::Utc;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;

use crate::models::{Attachment, Paste, ATTACHMENT_COLUMNS, PASTE_COLUMNS};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS paste (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        code TEXT NOT NULL,
        language TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        user_hash TEXT NOT NULL,
        private BOOLEAN NOT NULL DEFAULT 0,
        parent_id INTEGER,
        created_at DATETIME NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS paste_parent_id ON paste (parent_id)",
    "CREATE INDEX IF NOT EXISTS paste_created_at ON paste (created_at, id)",
    "CREATE TABLE IF NOT EXISTS attachment (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        paste_id INTEGER NOT NULL,
        file_name TEXT NOT NULL,
        stored_name TEXT NOT NULL,
        created_at DATETIME NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS attachment_paste_id ON attachment (paste_id)",
];

/// Fields of a paste row about to be inserted.
#[derive(Debug, Clone)]
pub struct NewPaste<'a> {
    pub code: &'a str,
    pub language: &'a str,
    pub password_hash: &'a str,
    pub user_hash: &'a str,
    pub private: bool,
    pub parent_id: Option<i64>,
}

/// An attachment record to insert alongside a new paste.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub file_name: String,
    pub stored_name: String,
}

/// Which pastes a listing includes.
#[derive(Debug, Clone, Default)]
pub struct PasteFilter {
    /// Restrict to pastes submitted by this fingerprint, private ones
    /// included. Without it only public pastes are listed.
    pub user_hash: Option<String>,
}

impl PasteFilter {
    fn where_clause(&self) -> &'static str {
        match self.user_hash {
            Some(_) => "WHERE user_hash = ?",
            None => "WHERE private = ?",
        }
    }
}

#[derive(Clone)]
pub struct Database {
    pool: AnyPool,
}

impl Database {
    /// Connect to a database by URL and make sure the schema exists.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let database = Self {
            pool: AnyPool::connect(url).await?,
        };
        database.migrate().await?;
        Ok(database)
    }

    /// A private in-memory SQLite database. The pool holds exactly one
    /// connection that is never recycled, since every new connection would
    /// see an empty database.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let pool = AnyPoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let database = Self { pool };
        database.migrate().await?;
        Ok(database)
    }

    /// Create tables and indexes that do not exist yet.
    pub async fn migrate(&self) -> crate::AppResult<()> {
        let mut conn = self.pool.acquire().await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut conn).await?;
        }
        Ok(())
    }

    /// Get a paste by internal key.
    pub async fn get_paste(&mut self, id: i64) -> crate::AppResult<Option<Paste>> {
        let mut conn = self.pool.acquire().await?;
        let paste =
            sqlx::query_as::<_, Paste>(&format!("SELECT {PASTE_COLUMNS} FROM paste WHERE id = ?"))
                .bind(id)
                .fetch_optional(&mut conn)
                .await?;
        Ok(paste)
    }

    /// Get the direct revisions of a paste, oldest first.
    pub async fn get_children(&mut self, parent_id: i64) -> crate::AppResult<Vec<Paste>> {
        let mut conn = self.pool.acquire().await?;
        let pastes = sqlx::query_as::<_, Paste>(&format!(
            "SELECT {PASTE_COLUMNS} FROM paste WHERE parent_id = ? ORDER BY created_at, id"
        ))
        .bind(parent_id)
        .fetch_all(&mut conn)
        .await?;
        Ok(pastes)
    }

    /// Get the attachments of a paste in upload order.
    pub async fn get_attachments(&mut self, paste_id: i64) -> crate::AppResult<Vec<Attachment>> {
        let mut conn = self.pool.acquire().await?;
        let attachments = sqlx::query_as::<_, Attachment>(&format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM attachment WHERE paste_id = ? ORDER BY id"
        ))
        .bind(paste_id)
        .fetch_all(&mut conn)
        .await?;
        Ok(attachments)
    }

    /// Insert a paste together with its attachment records in one
    /// transaction.
    pub async fn insert_paste(
        &mut self,
        paste: &NewPaste<'_>,
        attachments: &[NewAttachment],
    ) -> crate::AppResult<Paste> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, Paste>(&format!(
            "INSERT INTO paste (code, language, password_hash, user_hash, private, parent_id, \
             created_at) VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING {PASTE_COLUMNS}"
        ))
        .bind(paste.code)
        .bind(paste.language)
        .bind(paste.password_hash)
        .bind(paste.user_hash)
        .bind(paste.private)
        .bind(paste.parent_id)
        .bind(now)
        .fetch_one(&mut tx)
        .await?;

        for attachment in attachments {
            sqlx::query(
                "INSERT INTO attachment (paste_id, file_name, stored_name, created_at) VALUES \
                 (?, ?, ?, ?)",
            )
            .bind(inserted.id)
            .bind(&attachment.file_name)
            .bind(&attachment.stored_name)
            .bind(now)
            .execute(&mut tx)
            .await?;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// List pastes newest first. Ties on the timestamp fall back to the key
    /// so pages stay stable between requests.
    pub async fn find_pastes(
        &mut self,
        filter: &PasteFilter,
        limit: u32,
        offset: u64,
    ) -> crate::AppResult<Vec<Paste>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            "SELECT {PASTE_COLUMNS} FROM paste {} ORDER BY created_at DESC, id DESC LIMIT ? \
             OFFSET ?",
            filter.where_clause()
        );
        let query = sqlx::query_as::<_, Paste>(&sql);
        let query = match &filter.user_hash {
            Some(user_hash) => query.bind(user_hash.clone()),
            None => query.bind(false),
        };
        let pastes = query
            .bind(i64::from(limit))
            .bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .fetch_all(&mut conn)
            .await?;
        Ok(pastes)
    }

    /// Count the pastes a listing with this filter covers.
    pub async fn count_pastes(&mut self, filter: &PasteFilter) -> crate::AppResult<u64> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!("SELECT COUNT(*) FROM paste {}", filter.where_clause());
        let query = sqlx::query_scalar::<_, i64>(&sql);
        let query = match &filter.user_hash {
            Some(user_hash) => query.bind(user_hash.clone()),
            None => query.bind(false),
        };
        let count = query.fetch_one(&mut conn).await?;
        Ok(count.max(0) as u64)
    }

    /// Delete a paste and its attachment records in one transaction,
    /// returning the removed attachments. Revisions of the paste are left in
    /// place with their `parent_id` unchanged.
    pub async fn delete_paste(&mut self, id: i64) -> crate::AppResult<Vec<Attachment>> {
        let mut tx = self.pool.begin().await?;

        let attachments = sqlx::query_as::<_, Attachment>(&format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM attachment WHERE paste_id = ? ORDER BY id"
        ))
        .bind(id)
        .fetch_all(&mut tx)
        .await?;

        sqlx::query("DELETE FROM attachment WHERE paste_id = ?")
            .bind(id)
            .execute(&mut tx)
            .await?;

        let result = sqlx::query("DELETE FROM paste WHERE id = ?")
            .bind(id)
            .execute(&mut tx)
            .await?;

        if result.rows_affected() == 0 {
            // dropping the transaction rolls it back
            return Err(crate::AppError::NotFound);
        }

        tx.commit().await?;
        Ok(attachments)
    }
}
