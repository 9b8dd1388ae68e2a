//! User lookups and the last-active-key invariant.

use waypoint_core::{CostLimits, Role, User, UserId};

use crate::errors::StorageError;
use crate::pool::Pool;

/// Repository over the `users` table.
pub struct UserRepository {
    pool: Pool,
}

impl UserRepository {
    /// Wrap a pool.
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Fetch a user by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no such user exists.
    pub fn find_by_id(&self, id: &UserId) -> Result<User, StorageError> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT id, name, role, limits, provider_group, enabled, expires_at FROM users WHERE id = ?1",
            [id.to_string()],
            |row| {
                Ok(User {
                    id: UserId::from(row.get::<_, String>(0)?),
                    name: row.get(1)?,
                    role: if row.get::<_, String>(2)? == "admin" {
                        Role::Admin
                    } else {
                        Role::User
                    },
                    limits: serde_json::from_str::<CostLimits>(&row.get::<_, String>(3)?)
                        .unwrap_or_default(),
                    provider_group: row.get(4)?,
                    enabled: row.get(5)?,
                    expires_at: row
                        .get::<_, Option<String>>(6)?
                        .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
                        .map(|dt| dt.with_timezone(&chrono::Utc)),
                })
            },
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StorageError::NotFound(format!("user {id}"))
            }
            other => other.into(),
        })
    }

    /// Count a user's currently enabled keys.
    ///
    /// Used to enforce "a user always has at least one active key" before a
    /// key deletion is allowed.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool or query fails.
    pub fn active_key_count(&self, user_id: &UserId) -> Result<i64, StorageError> {
        let conn = self.pool.get()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM keys WHERE user_id = ?1 AND enabled = 1",
            [user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
