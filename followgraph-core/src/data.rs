use crate::model::{FollowEdge, NewUser, User};
use crate::store::{EdgeStore, StoreResult, UserStore};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

// Keeps IN (...) lists well under SQLite's bound-parameter limit.
const EXTERNAL_ID_CHUNK: usize = 500;

const USER_COLUMNS: &str = "id, external_id, handle, name, headline, gender, avatar_url, user_type, \
     is_advertiser, is_org, follower_count, answer_count, articles_count, created_at";

pub struct Database {
    conn: Connection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(SessionStatus::Running),
            "completed" => Some(SessionStatus::Completed),
            "failed" => Some(SessionStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSession {
    pub id: String,
    pub root_handle: String,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub status: SessionStatus,
    pub pages_fetched: u64,
    pub users_added: u64,
    pub error: Option<String>,
}

fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        external_id: row.get(1)?,
        handle: row.get(2)?,
        name: row.get(3)?,
        headline: row.get(4)?,
        gender: row.get(5)?,
        avatar_url: row.get(6)?,
        user_type: row.get(7)?,
        is_advertiser: row.get(8)?,
        is_org: row.get(9)?,
        follower_count: row.get::<_, i64>(10)? as u64,
        answer_count: row.get::<_, i64>(11)? as u64,
        articles_count: row.get::<_, i64>(12)? as u64,
        created_at: row.get(13)?,
    })
}

impl Database {
    pub fn drop(path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn new(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> StoreResult<()> {
        self.conn.execute_batch(
            "
            -- One row per crawl invocation
            CREATE TABLE IF NOT EXISTS crawl_sessions (
    id TEXT PRIMARY KEY,
    root_handle TEXT NOT NULL,
    start_time INTEGER NOT NULL,
    end_time INTEGER,
    status TEXT NOT NULL CHECK(status IN ('running', 'completed', 'failed')),
    pages_fetched INTEGER NOT NULL DEFAULT 0,
    users_added INTEGER NOT NULL DEFAULT 0,
    error TEXT
);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id TEXT NOT NULL UNIQUE,
    handle TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL DEFAULT '',
    headline TEXT NOT NULL DEFAULT '',
    gender INTEGER NOT NULL DEFAULT -1,
    avatar_url TEXT,
    user_type TEXT,
    is_advertiser BOOLEAN NOT NULL DEFAULT 0,
    is_org BOOLEAN NOT NULL DEFAULT 0,
    follower_count INTEGER NOT NULL DEFAULT 0,
    answer_count INTEGER NOT NULL DEFAULT 0,
    articles_count INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL
);

-- follower_id follows followee_id
CREATE TABLE IF NOT EXISTS follow_edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    followee_id INTEGER NOT NULL,
    follower_id INTEGER NOT NULL,
    discovered_at INTEGER NOT NULL,

    FOREIGN KEY(followee_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY(follower_id) REFERENCES users(id) ON DELETE CASCADE,
    UNIQUE(followee_id, follower_id)
);

CREATE INDEX IF NOT EXISTS idx_follow_edges_followee ON follow_edges(followee_id);
CREATE INDEX IF NOT EXISTS idx_follow_edges_follower ON follow_edges(follower_id);
CREATE INDEX IF NOT EXISTS idx_crawl_sessions_root ON crawl_sessions(root_handle);
            ",
        )?;
        Ok(())
    }

    // Session management
    pub fn create_session(&self, root_handle: &str) -> StoreResult<String> {
        let session_id = uuid::Uuid::new_v4().to_string();

        self.conn.execute(
            "INSERT INTO crawl_sessions (id, root_handle, start_time, status) VALUES (?1, ?2, ?3, ?4)",
            params![
                &session_id,
                root_handle,
                current_timestamp(),
                SessionStatus::Running.as_str()
            ],
        )?;

        Ok(session_id)
    }

    pub fn complete_session(
        &self,
        session_id: &str,
        pages_fetched: u64,
        users_added: u64,
    ) -> StoreResult<()> {
        self.conn.execute(
            "UPDATE crawl_sessions SET status = ?1, end_time = ?2, pages_fetched = ?3, users_added = ?4 WHERE id = ?5",
            params![
                SessionStatus::Completed.as_str(),
                current_timestamp(),
                pages_fetched as i64,
                users_added as i64,
                session_id
            ],
        )?;
        Ok(())
    }

    pub fn fail_session(&self, session_id: &str, error: &str) -> StoreResult<()> {
        self.conn.execute(
            "UPDATE crawl_sessions SET status = ?1, end_time = ?2, error = ?3 WHERE id = ?4",
            params![
                SessionStatus::Failed.as_str(),
                current_timestamp(),
                error,
                session_id
            ],
        )?;
        Ok(())
    }

    pub fn get_session(&self, session_id: &str) -> StoreResult<Option<CrawlSession>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, root_handle, start_time, end_time, status, pages_fetched, users_added, error
             FROM crawl_sessions WHERE id = ?1",
        )?;

        let session = stmt
            .query_row(params![session_id], |row| {
                let status: String = row.get(4)?;
                Ok(CrawlSession {
                    id: row.get(0)?,
                    root_handle: row.get(1)?,
                    start_time: row.get(2)?,
                    end_time: row.get(3)?,
                    status: SessionStatus::parse(&status).unwrap_or(SessionStatus::Failed),
                    pages_fetched: row.get::<_, i64>(5)? as u64,
                    users_added: row.get::<_, i64>(6)? as u64,
                    error: row.get(7)?,
                })
            })
            .optional()?;
        Ok(session)
    }

    // Query methods
    pub fn count_users(&self) -> StoreResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn count_edges(&self) -> StoreResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM follow_edges", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Followers of `followee_id` in insertion order.
    pub fn get_followers(&self, followee_id: i64) -> StoreResult<Vec<User>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM users u
             JOIN follow_edges e ON e.follower_id = u.id
             WHERE e.followee_id = ?1
             ORDER BY e.id",
            prefixed_user_columns("u")
        ))?;

        let users = stmt
            .query_map(params![followee_id], user_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    /// Users that take part in no follow edge and were never crawled as a root.
    /// These are left behind when the edge write after a user insert fails, or
    /// were seeded but not crawled yet.
    pub fn find_orphan_users(&self) -> StoreResult<Vec<User>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM users u
             WHERE NOT EXISTS (SELECT 1 FROM follow_edges e WHERE e.follower_id = u.id)
               AND NOT EXISTS (SELECT 1 FROM follow_edges e WHERE e.followee_id = u.id)
               AND NOT EXISTS (SELECT 1 FROM crawl_sessions s WHERE s.root_handle = u.handle)
             ORDER BY u.id",
            prefixed_user_columns("u")
        ))?;

        let users = stmt
            .query_map([], user_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    pub fn get_connection(&self) -> &Connection {
        &self.conn
    }
}

fn prefixed_user_columns(alias: &str) -> String {
    USER_COLUMNS
        .split(", ")
        .map(|c| format!("{}.{}", alias, c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

impl UserStore for Database {
    fn find_by_handle(&self, handle: &str) -> StoreResult<Option<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM users WHERE handle = ?1", USER_COLUMNS))?;

        let user = stmt
            .query_row(params![handle], user_from_row)
            .optional()?;
        Ok(user)
    }

    fn find_all_by_external_ids(&self, external_ids: &HashSet<String>) -> StoreResult<Vec<User>> {
        let ids: Vec<&String> = external_ids.iter().collect();
        let mut users = Vec::new();

        for chunk in ids.chunks(EXTERNAL_ID_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {} FROM users WHERE external_id IN ({})",
                USER_COLUMNS, placeholders
            ))?;

            let found = stmt
                .query_map(params_from_iter(chunk.iter()), user_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            users.extend(found);
        }

        Ok(users)
    }

    fn insert_user(&self, user: &NewUser) -> StoreResult<User> {
        let created_at = current_timestamp();

        self.conn.execute(
            "INSERT INTO users (
                external_id, handle, name, headline, gender, avatar_url, user_type,
                is_advertiser, is_org, follower_count, answer_count, articles_count, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                &user.external_id,
                &user.handle,
                &user.name,
                &user.headline,
                user.gender,
                &user.avatar_url,
                &user.user_type,
                user.is_advertiser,
                user.is_org,
                user.follower_count as i64,
                user.answer_count as i64,
                user.articles_count as i64,
                created_at,
            ],
        )?;

        Ok(User {
            id: self.conn.last_insert_rowid(),
            external_id: user.external_id.clone(),
            handle: user.handle.clone(),
            name: user.name.clone(),
            headline: user.headline.clone(),
            gender: user.gender,
            avatar_url: user.avatar_url.clone(),
            user_type: user.user_type.clone(),
            is_advertiser: user.is_advertiser,
            is_org: user.is_org,
            follower_count: user.follower_count,
            answer_count: user.answer_count,
            articles_count: user.articles_count,
            created_at,
        })
    }
}

impl EdgeStore for Database {
    fn insert_edge(&self, edge: &FollowEdge) -> StoreResult<FollowEdge> {
        self.conn.execute(
            "INSERT INTO follow_edges (followee_id, follower_id, discovered_at) VALUES (?1, ?2, ?3)",
            params![edge.followee_id, edge.follower_id, current_timestamp()],
        )?;
        Ok(*edge)
    }
}

