//! Authentication Models
//! Mission: Define user, role and token records plus the request/response shapes

use serde::{Deserialize, Serialize};

/// Reference to a row in the `roles` table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct RoleId(pub i64);

impl RoleId {
    pub const ADMIN: RoleId = RoleId(1);
    pub const USER: RoleId = RoleId(2);

    /// The single capability rule for admin-gated operations.
    pub fn is_admin(self) -> bool {
        self == Self::ADMIN
    }
}

/// Account status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UserStatus {
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "inactive")]
    Inactive,
}

impl UserStatus {
    pub fn as_str(&self) -> &str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(UserStatus::Active),
            "inactive" => Some(UserStatus::Inactive),
            _ => None,
        }
    }
}

/// User account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // bcrypt hash - never serialize
    pub role_id: RoleId,
    pub status: UserStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role_id.is_admin()
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// Role reference data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Persisted bearer token. Only the sha256 of the secret is stored.
#[derive(Debug, Clone)]
pub struct PersonalAccessToken {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub token_hash: String,
    pub created_at: String,
    pub last_used_at: Option<String>,
}

/// Fixture-only card record; nothing reads it beyond the seeder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditCard {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub last4: String,
    pub brand: String,
    pub exp_month: u32,
    pub exp_year: u32,
    pub holder_name: Option<String>,
    pub is_default: bool,
}

/// Login request body
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Registration request body
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role_id: Option<i64>,
}

/// Profile update body
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateProfileRequest {
    pub name: String,
    pub email: String,
}

/// Password change body
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub password: String,
    pub password_confirmation: String,
}

/// Self-deletion body
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeleteAccountRequest {
    pub password: String,
    pub confirmation: String,
}

/// User summary returned alongside freshly issued tokens
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role_id: RoleId,
}

impl UserSummary {
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role_id: user.role_id,
        }
    }
}

/// Login / registration response
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: String,
    pub user: UserSummary,
    pub token: String,
    pub token_type: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: 7,
            name: "Ana".to_string(),
            email: "ana@x.com".to_string(),
            password_hash: "$2b$04$secret".to_string(),
            role_id: RoleId::USER,
            status: UserStatus::Active,
            created_at: "2025-01-01T00:00:00Z".to_string(),
            updated_at: "2025-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_password_hash_never_serialized() {
        let json = serde_json::to_value(sample_user()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role_id"], 2);
        assert_eq!(json["status"], "active");
    }

    #[test]
    fn test_admin_capability() {
        assert!(RoleId::ADMIN.is_admin());
        assert!(!RoleId::USER.is_admin());
        assert!(!RoleId(3).is_admin());
    }

    #[test]
    fn test_user_status_string_conversion() {
        assert_eq!(UserStatus::Active.as_str(), "active");
        assert_eq!(UserStatus::from_str("INACTIVE"), Some(UserStatus::Inactive));
        assert_eq!(UserStatus::from_str("banned"), None);
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        let req: RegisterRequest = serde_json::from_str(r#"{"name":"Ana"}"#).unwrap();
        assert_eq!(req.name, "Ana");
        assert!(req.email.is_empty());
        assert!(req.role_id.is_none());
    }
}
