use serde::{Deserialize, Serialize};

/// Default currency when the profile does not name one.
const DEFAULT_CURRENCY: &str = "TOP";

/// Signed-in user's profile and organization settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    pub username: Option<String>,
    pub role: Option<String>,
    pub currency: Option<String>,
    pub logo_url: Option<String>,
}

impl Profile {
    pub fn role(&self) -> &str {
        self.role.as_deref().unwrap_or("user")
    }

    pub fn currency(&self) -> &str {
        self.currency.as_deref().unwrap_or(DEFAULT_CURRENCY)
    }

    /// Managers and admins may approve or reject leave. This only decides what
    /// to offer; the server enforces it with 403.
    pub fn can_approve_leave(&self) -> bool {
        matches!(self.role(), "manager" | "admin")
    }
}

/// Response of the organization logo upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoUpload {
    pub logo_url: String,
}

/// Response of the unauthenticated health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub db: Option<String>,
}

impl HealthStatus {
    /// What to show when the health endpoint cannot be reached at all.
    pub fn unreachable() -> Self {
        Self {
            status: "degraded".to_string(),
            db: Some("unavailable".to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}
