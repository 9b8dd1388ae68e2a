//! Key + user lookup, and the storage-side adapter for the auth guard's
//! [`waypoint_auth::KeyDirectory`] port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use waypoint_auth::directory::KeyDirectory;
use waypoint_auth::errors::DirectoryError;
use waypoint_core::{CostLimits, DailyResetMode, Key, KeyId, Role, User, UserId};

use crate::errors::StorageError;
use crate::pool::Pool;

/// Repository over the `keys`/`users` tables.
pub struct KeyRepository {
    pool: Pool,
}

impl KeyRepository {
    /// Wrap a pool.
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Look up a key and its owning user by the key's lookup hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool or query fails for a reason other than
    /// "no matching row".
    pub fn find_by_hash(&self, key_hash: &str) -> Result<Option<(Key, User)>, StorageError> {
        let conn = self.pool.get()?;
        let row = conn.query_row(
            "SELECT k.id, k.user_id, k.enabled, k.expires_at, k.limits, \
                    k.daily_reset_mode, k.daily_reset_time, k.provider_group, \
                    u.name, u.role, u.limits, u.provider_group, u.enabled, u.expires_at \
             FROM keys k JOIN users u ON u.id = k.user_id \
             WHERE k.key_hash = ?1",
            [key_hash],
            |row| {
                let key = Key {
                    id: KeyId::from(row.get::<_, String>(0)?),
                    user_id: UserId::from(row.get::<_, String>(1)?),
                    secret: String::new(),
                    enabled: row.get(2)?,
                    expires_at: parse_optional_ts(row.get::<_, Option<String>>(3)?),
                    limits: parse_limits(&row.get::<_, String>(4)?),
                    daily_reset_mode: parse_reset_mode(&row.get::<_, String>(5)?),
                    daily_reset_time: row.get(6)?,
                    provider_group: row.get(7)?,
                };
                let user = User {
                    id: key.user_id.clone(),
                    name: row.get(8)?,
                    role: parse_role(&row.get::<_, String>(9)?),
                    limits: parse_limits(&row.get::<_, String>(10)?),
                    provider_group: row.get(11)?,
                    enabled: row.get(12)?,
                    expires_at: parse_optional_ts(row.get::<_, Option<String>>(13)?),
                };
                Ok((key, user))
            },
        );

        match row {
            Ok(pair) => Ok(Some(pair)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl KeyDirectory for KeyRepository {
    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<(Key, User)>, DirectoryError> {
        Self::find_by_hash(self, key_hash)
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))
    }
}

fn parse_optional_ts(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_limits(raw: &str) -> CostLimits {
    serde_json::from_str(raw).unwrap_or_default()
}

fn parse_reset_mode(raw: &str) -> DailyResetMode {
    match raw {
        "rolling" => DailyResetMode::Rolling,
        _ => DailyResetMode::Fixed,
    }
}

fn parse_role(raw: &str) -> Role {
    match raw {
        "admin" => Role::Admin,
        _ => Role::User,
    }
}
