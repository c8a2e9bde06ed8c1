//! Bearer Token Issuer
//! Mission: Issue, resolve and revoke opaque personal access tokens

use crate::auth::{
    models::{PersonalAccessToken, User},
    user_store::UserStore,
};
use anyhow::{Context, Result};
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};

const SECRET_LEN: usize = 40;

/// Name recorded for tokens issued by login and registration
pub const DEFAULT_TOKEN_NAME: &str = "auth-token";

/// A freshly issued token. `plain_text` is shown to the client once.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub id: i64,
    pub plain_text: String,
}

/// Token issuer backed by the `personal_access_tokens` table
pub struct TokenIssuer {
    store: Arc<UserStore>,
}

impl TokenIssuer {
    pub fn new(store: Arc<UserStore>) -> Self {
        Self { store }
    }

    /// Issue a new token for `user_id`. The plain text is `{id}|{secret}`.
    pub fn issue(&self, user_id: i64, name: &str) -> Result<IssuedToken> {
        let secret = generate_secret();
        let conn = self.store.connection()?;
        conn.execute(
            "INSERT INTO personal_access_tokens (user_id, name, token_hash, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, name, hash_secret(&secret), Utc::now().to_rfc3339()],
        )
        .context("Failed to store token")?;

        let id = conn.last_insert_rowid();
        debug!("Issued token {} for user {}", id, user_id);

        Ok(IssuedToken {
            id,
            plain_text: format!("{}|{}", id, secret),
        })
    }

    /// Resolve a presented bearer token to its owner.
    /// Returns `None` for unknown, revoked or malformed tokens.
    pub fn authenticate(&self, plain_text: &str) -> Result<Option<(User, PersonalAccessToken)>> {
        let token = match plain_text.split_once('|') {
            Some((id, secret)) => match id.parse::<i64>() {
                Ok(id) => self
                    .find(id)?
                    .filter(|t| t.token_hash == hash_secret(secret)),
                Err(_) => None,
            },
            None => self.find_by_hash(&hash_secret(plain_text))?,
        };

        let Some(token) = token else {
            return Ok(None);
        };

        let Some(user) = self.store.get_user(token.user_id)? else {
            return Ok(None);
        };

        self.touch(token.id)?;
        Ok(Some((user, token)))
    }

    /// Revoke a single token
    pub fn revoke(&self, token_id: i64) -> Result<bool> {
        let conn = self.store.connection()?;
        let rows = conn.execute(
            "DELETE FROM personal_access_tokens WHERE id = ?1",
            params![token_id],
        )?;
        debug!("Revoked token {}", token_id);
        Ok(rows > 0)
    }

    /// Revoke every token issued to `user_id`, returning how many were removed
    pub fn revoke_all(&self, user_id: i64) -> Result<usize> {
        let conn = self.store.connection()?;
        let rows = conn.execute(
            "DELETE FROM personal_access_tokens WHERE user_id = ?1",
            params![user_id],
        )?;
        info!("🔒 Revoked {} tokens for user {}", rows, user_id);
        Ok(rows)
    }

    #[cfg(test)]
    fn count_for_user(&self, user_id: i64) -> Result<usize> {
        let conn = self.store.connection()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM personal_access_tokens WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn find(&self, token_id: i64) -> Result<Option<PersonalAccessToken>> {
        let conn = self.store.connection()?;
        let token = conn
            .query_row(
                "SELECT id, user_id, name, token_hash, created_at, last_used_at
                 FROM personal_access_tokens WHERE id = ?1",
                params![token_id],
                token_from_row,
            )
            .optional()?;
        Ok(token)
    }

    fn find_by_hash(&self, token_hash: &str) -> Result<Option<PersonalAccessToken>> {
        let conn = self.store.connection()?;
        let token = conn
            .query_row(
                "SELECT id, user_id, name, token_hash, created_at, last_used_at
                 FROM personal_access_tokens WHERE token_hash = ?1",
                params![token_hash],
                token_from_row,
            )
            .optional()?;
        Ok(token)
    }

    fn touch(&self, token_id: i64) -> Result<()> {
        let conn = self.store.connection()?;
        conn.execute(
            "UPDATE personal_access_tokens SET last_used_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), token_id],
        )?;
        Ok(())
    }
}

fn token_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PersonalAccessToken> {
    Ok(PersonalAccessToken {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        token_hash: row.get(3)?,
        created_at: row.get(4)?,
        last_used_at: row.get(5)?,
    })
}

fn generate_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect()
}

fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}
