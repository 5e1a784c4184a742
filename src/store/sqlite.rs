use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use time::OffsetDateTime;

use super::{SessionStore, UserRepository};
use crate::error::Error;
use crate::types::{Email, SessionData, SessionId, UserRecord};

/// Open (creating if missing) a SQLite database and apply migrations.
///
/// # Errors
///
/// Returns [`Error::StorageUnavailable`] if the URL is invalid, the database
/// cannot be opened, or a migration fails.
pub async fn connect(database_url: &str) -> Result<SqlitePool, Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory database, migrated. Lives as long as the pool.
///
/// # Errors
///
/// Returns [`Error::StorageUnavailable`] if the database cannot be opened.
pub async fn connect_in_memory() -> Result<SqlitePool, Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

/// Apply the embedded migrations.
///
/// # Errors
///
/// Returns [`Error::StorageUnavailable`] if a migration fails.
pub async fn migrate(pool: &SqlitePool) -> Result<(), Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Sessions persisted in the `sessions` table.
#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl SessionStore for SqliteSessionStore {
    async fn create(&self, data: SessionData) -> Result<SessionId, Error> {
        let id = SessionId::generate();

        sqlx::query(
            r"
            INSERT INTO sessions (id, access_token, user_email, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(id.as_str())
        .bind(&data.access_token)
        .bind(data.user_email.as_ref().map(Email::as_str))
        .bind(data.expires_at.unix_timestamp())
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn get(&self, id: &SessionId) -> Result<Option<SessionData>, Error> {
        let row: Option<(String, Option<String>, i64)> = sqlx::query_as(
            r"
            SELECT access_token, user_email, expires_at
            FROM sessions
            WHERE id = ?1 AND expires_at > ?2
            ",
        )
        .bind(id.as_str())
        .bind(OffsetDateTime::now_utc().unix_timestamp())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|(access_token, user_email, expires_at)| {
            let expires_at = OffsetDateTime::from_unix_timestamp(expires_at).ok()?;
            Some(SessionData {
                access_token,
                user_email: user_email.map(Email::new),
                expires_at,
            })
        }))
    }

    async fn destroy(&self, id: &SessionId) -> Result<(), Error> {
        sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?1")
            .bind(OffsetDateTime::now_utc().unix_timestamp())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }
}

/// Users persisted in the `users` table, unique on email.
#[derive(Clone)]
pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn user_from_row((username, email, display_name): (String, String, String)) -> UserRecord {
    UserRecord {
        username,
        email: Email::new(email),
        display_name,
    }
}

impl UserRepository for SqliteUserRepository {
    async fn find_by_email(&self, email: &Email) -> Result<Option<UserRecord>, Error> {
        let row: Option<(String, String, String)> = sqlx::query_as(
            "SELECT username, email, display_name FROM users WHERE email = ?1",
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(user_from_row))
    }

    async fn upsert_if_absent(&self, candidate: UserRecord) -> Result<UserRecord, Error> {
        // The UNIQUE constraint arbitrates concurrent first logins; losers insert nothing.
        let inserted = sqlx::query(
            r"
            INSERT INTO users (username, email, display_name)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(email) DO NOTHING
            ",
        )
        .bind(&candidate.username)
        .bind(candidate.email.as_str())
        .bind(&candidate.display_name)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 1 {
            tracing::info!(email = %candidate.email, "Created user record");
        }

        self.find_by_email(&candidate.email).await?.ok_or_else(|| {
            Error::StorageUnavailable(format!("user {} missing after insert", candidate.email))
        })
    }
}
