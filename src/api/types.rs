use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A credential's secret token plus a non-secret label for logs.
///
/// `Debug` and `Display` never print the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiToken {
    label: Arc<str>,
    secret: Arc<str>,
}

impl ApiToken {
    pub fn new(label: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            label: Arc::from(label.into()),
            secret: Arc::from(secret.into()),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn expose(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiToken")
            .field("label", &self.label)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl fmt::Display for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Identity-lookup response: riot id to puuid in the caller's namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub puuid: String,
    #[serde(default)]
    pub game_name: Option<String>,
    #[serde(default)]
    pub tag_line: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summoner {
    /// Encrypted summoner id; newer upstream versions omit it.
    #[serde(default)]
    pub id: Option<String>,
    pub puuid: String,
    #[serde(default)]
    pub summoner_level: u64,
    #[serde(default)]
    pub profile_icon_id: Option<u32>,
}

/// Ranked entry as returned by both the per-summoner endpoint and the
/// paginated league listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueEntry {
    pub queue_type: String,
    pub tier: String,
    /// Division within the tier (`I`..`IV`).
    pub rank: String,
    #[serde(default)]
    pub league_points: i32,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub losses: u32,
    #[serde(default)]
    pub summoner_id: Option<String>,
    #[serde(default)]
    pub puuid: Option<String>,
}
