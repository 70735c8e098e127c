//! User identity as reported by the backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account role. The backend creates every self-registered account as `User`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    User,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::User => "user",
        }
    }
}

/// Profile of the authenticated user, returned by `/api/auth/me` and
/// `/api/auth/register`.
///
/// A profile is always replaced as a whole; nothing in the crate mutates one
/// in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub role: UserRole,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    #[serde(with = "naive_utc")]
    pub created_at: DateTime<Utc>,
}

/// The backend stores `datetime.utcnow()` values and serializes them without
/// an offset; accept both forms and treat offset-less values as UTC.
mod naive_utc {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if let Ok(with_offset) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(with_offset.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

impl UserProfile {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// "Full Name (username)" for status lines.
    pub fn display_name(&self) -> String {
        if self.full_name.trim().is_empty() {
            self.username.clone()
        } else {
            format!("{} ({})", self.full_name, self.username)
        }
    }
}
