//! Account storage, next to the records in the server database.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use keeper_core::db::Database;
use keeper_core::models::UserInfo;
use keeper_core::{util, Error, Result};
use libsql::{params, Row};
use tokio::sync::Mutex;
use uuid::Uuid;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY NOT NULL,
    username TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
";

#[derive(Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password_hash", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl User {
    pub fn info(&self) -> UserInfo {
        UserInfo {
            id: self.id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            created_at: self.created_at,
        }
    }
}

#[derive(Clone)]
pub struct UserRepository {
    db: Arc<Mutex<Database>>,
}

impl UserRepository {
    /// Wrap the shared database, creating the `users` table if needed.
    pub async fn new(db: Arc<Mutex<Database>>) -> Result<Self> {
        db.lock().await.connection().execute(SCHEMA, ()).await?;
        Ok(Self { db })
    }

    /// Insert a new account. Usernames and emails are unique.
    pub async fn create(&self, username: &str, email: &str, password_hash: &str) -> Result<User> {
        let db = self.db.lock().await;
        let conn = db.connection();

        let mut rows = conn
            .query(
                "SELECT username = ?1 FROM users WHERE username = ?1 OR email = ?2 LIMIT 1",
                params![username, email],
            )
            .await?;
        if let Some(row) = rows.next().await? {
            let field = if row.get::<i64>(0)? == 1 {
                "username"
            } else {
                "email"
            };
            return Err(Error::validation(format!("{field} already exists")));
        }

        let now = util::now();
        let user = User {
            id: Uuid::now_v7().to_string(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
        };
        conn.execute(
            "INSERT INTO users (id, username, email, password_hash, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                user.id.as_str(),
                user.username.as_str(),
                user.email.as_str(),
                user.password_hash.as_str(),
                util::to_micros(&now)
            ],
        )
        .await?;

        tracing::info!(user = %user.id, "Registered user");
        Ok(user)
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                "SELECT id, username, email, password_hash, created_at
                 FROM users WHERE username = ?1",
                params![username],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_user(&row)?)),
            None => Ok(None),
        }
    }
}

fn parse_user(row: &Row) -> Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        created_at: util::from_micros(row.get(4)?),
    })
}
