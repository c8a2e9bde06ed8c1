//! User Storage
//! Mission: Persist accounts, roles and fixture data in SQLite

use crate::auth::models::{CreditCard, Role, RoleId, User, UserStatus};
use anyhow::{Context, Result};
use bcrypt::{hash, verify};
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::time::Duration;
use tracing::{debug, info, warn};

const USER_COLUMNS: &str = "id, name, email, password_hash, role_id, status, created_at, updated_at";

/// Fields required to insert a user
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub role_id: RoleId,
}

/// User storage with SQLite backend
pub struct UserStore {
    db_path: String,
    bcrypt_cost: u32,
}

impl UserStore {
    /// Open the store with the given bcrypt work factor and initialize the database
    pub fn with_cost(db_path: &str, bcrypt_cost: u32) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
            bcrypt_cost,
        };
        store.init_db()?;
        Ok(store)
    }

    /// Open a connection with foreign keys enforced.
    pub(crate) fn connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)
            .with_context(|| format!("Failed to open database at {}", self.db_path))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    /// Initialize database schema
    fn init_db(&self) -> Result<()> {
        let conn = self.connection()?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("SQLite journal mode: {}", mode);

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS roles (
                id INTEGER PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                description TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password_hash TEXT NOT NULL,
                role_id INTEGER NOT NULL REFERENCES roles(id),
                status TEXT NOT NULL DEFAULT 'active',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS personal_access_tokens (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                token_hash TEXT UNIQUE NOT NULL,
                created_at TEXT NOT NULL,
                last_used_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_tokens_user ON personal_access_tokens(user_id);

            CREATE TABLE IF NOT EXISTS credit_cards (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                token TEXT NOT NULL,
                last4 TEXT NOT NULL,
                brand TEXT NOT NULL,
                exp_month INTEGER NOT NULL,
                exp_year INTEGER NOT NULL,
                holder_name TEXT,
                is_default INTEGER NOT NULL DEFAULT 0
            );",
        )
        .context("Failed to create schema")?;

        self.seed_roles(&conn)?;

        Ok(())
    }

    /// Roles are reference data; admin must be id 1 and user id 2.
    fn seed_roles(&self, conn: &Connection) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        for (role, name, description) in [
            (RoleId::ADMIN, "admin", "Full system access"),
            (RoleId::USER, "user", "Limited access"),
        ] {
            conn.execute(
                "INSERT OR IGNORE INTO roles (id, name, description, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![role.0, name, description, now],
            )
            .context("Failed to seed roles")?;
        }
        Ok(())
    }

    /// Populate demo accounts and fixture cards on an empty database.
    pub fn seed_demo_data(&self) -> Result<()> {
        let conn = self.connection()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .context("Failed to count users")?;

        if count > 0 {
            debug!("Skipping demo seed, {} users already present", count);
            return Ok(());
        }

        let admin = self.create_user(NewUser {
            name: "Admin User",
            email: "admin@example.com",
            password: "password",
            role_id: RoleId::ADMIN,
        })?;
        let first = self.create_user(NewUser {
            name: "User One",
            email: "user1@example.com",
            password: "password",
            role_id: RoleId::USER,
        })?;
        let second = self.create_user(NewUser {
            name: "User Two",
            email: "user2@example.com",
            password: "password",
            role_id: RoleId::USER,
        })?;
        self.create_user(NewUser {
            name: "Test User",
            email: "test@example.com",
            password: "password",
            role_id: RoleId::USER,
        })?;

        let cards = [
            CreditCard {
                id: 0,
                user_id: first.id,
                token: "tok_test_visa_1".to_string(),
                last4: "4242".to_string(),
                brand: "visa".to_string(),
                exp_month: 12,
                exp_year: 2028,
                holder_name: Some(first.name.clone()),
                is_default: true,
            },
            CreditCard {
                id: 0,
                user_id: second.id,
                token: "tok_test_mc_1".to_string(),
                last4: "4444".to_string(),
                brand: "mastercard".to_string(),
                exp_month: 7,
                exp_year: 2027,
                holder_name: Some(second.name.clone()),
                is_default: true,
            },
        ];
        for card in &cards {
            conn.execute(
                "INSERT INTO credit_cards
                    (user_id, token, last4, brand, exp_month, exp_year, holder_name, is_default)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    card.user_id,
                    card.token,
                    card.last4,
                    card.brand,
                    card.exp_month,
                    card.exp_year,
                    card.holder_name,
                    card.is_default,
                ],
            )
            .context("Failed to insert fixture card")?;
        }

        info!("🔐 Demo data seeded (admin: {}, password: password)", admin.email);
        warn!("⚠️  Demo accounts use a shared password; do not seed in production");

        Ok(())
    }

    pub fn list_roles(&self) -> Result<Vec<Role>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, description, created_at, updated_at FROM roles ORDER BY id",
        )?;

        let roles = stmt
            .query_map([], |row| {
                Ok(Role {
                    id: RoleId(row.get(0)?),
                    name: row.get(1)?,
                    description: row.get(2)?,
                    created_at: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(roles)
    }

    pub fn role_exists(&self, role_id: i64) -> Result<bool> {
        let conn = self.connection()?;
        let found = conn
            .query_row("SELECT 1 FROM roles WHERE id = ?1", params![role_id], |_| {
                Ok(())
            })
            .optional()?;
        Ok(found.is_some())
    }

    /// Get user by id
    pub fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let conn = self.connection()?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                params![user_id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Get user by email (case-insensitive)
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.connection()?;
        let user = conn
            .query_row(
                &format!(
                    "SELECT {} FROM users WHERE email = ?1 COLLATE NOCASE",
                    USER_COLUMNS
                ),
                params![email.trim()],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Whether `email` belongs to any user other than `except`
    pub fn email_taken(&self, email: &str, except: Option<i64>) -> Result<bool> {
        Ok(match self.get_user_by_email(email)? {
            Some(user) => Some(user.id) != except,
            None => false,
        })
    }

    /// Active user matching email and password
    pub fn verify_credentials(&self, email: &str, password: &str) -> Result<Option<User>> {
        let Some(user) = self.get_user_by_email(email)? else {
            return Ok(None);
        };
        if !user.is_active() {
            debug!("Credential check for inactive user {}", user.id);
            return Ok(None);
        }
        if self.check_password(&user, password)? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    pub fn check_password(&self, user: &User, password: &str) -> Result<bool> {
        verify(password, &user.password_hash).context("Failed to verify password")
    }

    /// Create a new user
    pub fn create_user(&self, new_user: NewUser<'_>) -> Result<User> {
        let password_hash =
            hash(new_user.password, self.bcrypt_cost).context("Failed to hash password")?;
        let now = Utc::now().to_rfc3339();

        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO users (name, email, password_hash, role_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                new_user.name.trim(),
                new_user.email.trim(),
                password_hash,
                new_user.role_id.0,
                UserStatus::Active.as_str(),
                now,
            ],
        )
        .context("Failed to insert user")?;

        let user = User {
            id: conn.last_insert_rowid(),
            name: new_user.name.trim().to_string(),
            email: new_user.email.trim().to_string(),
            password_hash,
            role_id: new_user.role_id,
            status: UserStatus::Active,
            created_at: now.clone(),
            updated_at: now,
        };

        info!("✅ Created user {} ({}), role {}", user.id, user.email, user.role_id.0);

        Ok(user)
    }

    /// Replace name and email, returning the updated record
    pub fn update_profile(&self, user_id: i64, name: &str, email: &str) -> Result<User> {
        let conn = self.connection()?;
        let rows = conn
            .execute(
                "UPDATE users SET name = ?1, email = ?2, updated_at = ?3 WHERE id = ?4",
                params![name.trim(), email.trim(), Utc::now().to_rfc3339(), user_id],
            )
            .context("Failed to update profile")?;

        if rows == 0 {
            anyhow::bail!("User {} not found", user_id);
        }

        self.get_user(user_id)?
            .with_context(|| format!("User {} vanished after update", user_id))
    }

    pub fn update_password(&self, user_id: i64, password: &str) -> Result<()> {
        let password_hash = hash(password, self.bcrypt_cost).context("Failed to hash password")?;
        let conn = self.connection()?;
        let rows = conn.execute(
            "UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE id = ?3",
            params![password_hash, Utc::now().to_rfc3339(), user_id],
        )?;

        if rows == 0 {
            anyhow::bail!("User {} not found", user_id);
        }
        Ok(())
    }

    /// List all users (admin only)
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS))?;

        let users = stmt
            .query_map([], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(users)
    }

    /// Delete a user and every token issued to it in one transaction.
    /// Returns false when no such user exists.
    pub fn delete_user(&self, user_id: i64) -> Result<bool> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;

        let revoked = tx.execute(
            "DELETE FROM personal_access_tokens WHERE user_id = ?1",
            params![user_id],
        )?;
        let rows = tx.execute("DELETE FROM users WHERE id = ?1", params![user_id])?;
        tx.commit()?;

        if rows == 0 {
            return Ok(false);
        }

        info!("🗑️  Deleted user {} ({} tokens revoked)", user_id, revoked);
        Ok(true)
    }

    #[cfg(test)]
    pub(crate) fn set_status(&self, user_id: i64, status: UserStatus) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "UPDATE users SET status = ?1 WHERE id = ?2",
            params![status.as_str(), user_id],
        )?;
        Ok(())
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let status: String = row.get(5)?;
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role_id: RoleId(row.get(4)?),
        status: UserStatus::from_str(&status).unwrap_or(UserStatus::Inactive),
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// True when `err` wraps a SQLite UNIQUE/constraint violation.
pub fn is_constraint_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<rusqlite::Error>(),
            Some(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_test_store() -> (UserStore, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap();
        let store = UserStore::with_cost(db_path, 4).unwrap();
        (store, temp_file)
    }

    fn ana() -> NewUser<'static> {
        NewUser {
            name: "Ana",
            email: "ana@x.com",
            password: "password1",
            role_id: RoleId::USER,
        }
    }

    #[test]
    fn test_roles_seeded() {
        let (store, _temp) = create_test_store();

        let roles = store.list_roles().unwrap();
        assert_eq!(roles.len(), 2);
        assert_eq!(roles[0].id, RoleId::ADMIN);
        assert_eq!(roles[0].name, "admin");
        assert_eq!(roles[1].id, RoleId::USER);

        assert!(store.role_exists(1).unwrap());
        assert!(store.role_exists(2).unwrap());
        assert!(!store.role_exists(3).unwrap());
    }

    #[test]
    fn test_reopen_keeps_roles_unique() {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap();
        UserStore::with_cost(db_path, 4).unwrap();
        let store = UserStore::with_cost(db_path, 4).unwrap();
        assert_eq!(store.list_roles().unwrap().len(), 2);
    }

    #[test]
    fn test_create_and_retrieve_user() {
        let (store, _temp) = create_test_store();

        let user = store.create_user(ana()).unwrap();
        assert_ne!(user.password_hash, "password1");
        assert!(user.is_active());

        let by_email = store.get_user_by_email("ANA@x.com").unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
        assert_eq!(store.get_user(user.id).unwrap().unwrap().name, "Ana");
        assert!(store.get_user(user.id + 100).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_email_is_constraint_violation() {
        let (store, _temp) = create_test_store();

        store.create_user(ana()).unwrap();
        let err = store.create_user(ana()).unwrap_err();
        assert!(is_constraint_violation(&err));
        assert!(!is_constraint_violation(&anyhow::anyhow!("other")));
    }

    #[test]
    fn test_email_unique_ignores_case() {
        let (store, _temp) = create_test_store();

        store.create_user(ana()).unwrap();
        let err = store
            .create_user(NewUser {
                email: "ANA@x.com",
                password: "otherpass",
                ..ana()
            })
            .unwrap_err();
        assert!(is_constraint_violation(&err));
        assert_eq!(store.list_users().unwrap().len(), 1);

        let bob = store
            .create_user(NewUser {
                name: "Bob",
                email: "bob@x.com",
                ..ana()
            })
            .unwrap();
        let err = store
            .update_profile(bob.id, "Bob", "Ana@X.com")
            .unwrap_err();
        assert!(is_constraint_violation(&err));
    }

    #[test]
    fn test_unknown_role_rejected_by_foreign_key() {
        let (store, _temp) = create_test_store();

        let err = store
            .create_user(NewUser {
                role_id: RoleId(99),
                ..ana()
            })
            .unwrap_err();
        assert!(is_constraint_violation(&err));
    }

    #[test]
    fn test_password_verification() {
        let (store, _temp) = create_test_store();
        let user = store.create_user(ana()).unwrap();

        assert!(store.verify_credentials("ana@x.com", "password1").unwrap().is_some());
        assert!(store.verify_credentials("ana@x.com", "wrongpass").unwrap().is_none());
        assert!(store.verify_credentials("nobody@x.com", "password1").unwrap().is_none());

        store.set_status(user.id, UserStatus::Inactive).unwrap();
        assert!(store.verify_credentials("ana@x.com", "password1").unwrap().is_none());
    }

    #[test]
    fn test_email_taken_excludes_self() {
        let (store, _temp) = create_test_store();
        let user = store.create_user(ana()).unwrap();

        assert!(store.email_taken("ana@x.com", None).unwrap());
        assert!(!store.email_taken("ana@x.com", Some(user.id)).unwrap());
        assert!(!store.email_taken("free@x.com", None).unwrap());
    }

    #[test]
    fn test_update_profile_and_password() {
        let (store, _temp) = create_test_store();
        let user = store.create_user(ana()).unwrap();

        let updated = store.update_profile(user.id, "Ana B", "anab@x.com").unwrap();
        assert_eq!(updated.name, "Ana B");
        assert_eq!(updated.email, "anab@x.com");

        store.update_password(user.id, "newpassword").unwrap();
        assert!(store.verify_credentials("anab@x.com", "password1").unwrap().is_none());
        assert!(store.verify_credentials("anab@x.com", "newpassword").unwrap().is_some());
    }

    #[test]
    fn test_delete_user() {
        let (store, _temp) = create_test_store();
        let user = store.create_user(ana()).unwrap();

        assert!(store.delete_user(user.id).unwrap());
        assert!(store.get_user(user.id).unwrap().is_none());
        assert!(!store.delete_user(user.id).unwrap());
    }

    #[test]
    fn test_seed_demo_data_once() {
        let (store, _temp) = create_test_store();

        store.seed_demo_data().unwrap();
        store.seed_demo_data().unwrap();

        let users = store.list_users().unwrap();
        assert_eq!(users.len(), 4);
        assert!(users[0].is_admin());
        assert!(users[1..].iter().all(|u| !u.is_admin()));

        let conn = store.connection().unwrap();
        let cards: i64 = conn
            .query_row("SELECT COUNT(*) FROM credit_cards", [], |row| row.get(0))
            .unwrap();
        assert_eq!(cards, 2);
    }
}
