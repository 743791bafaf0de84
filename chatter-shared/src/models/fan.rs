use serde::{Deserialize, Deserializer, Serialize};

use super::Timestamp;

/// Fan identifier.
pub type FanId = i64;

/// Profile shown next to a conversation (`GET /fan/{id}`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fan {
    pub id: FanId,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Lifetime spend as a decimal string (e.g. `"129.50"`).
    #[serde(default, deserialize_with = "decimal_string")]
    pub total_spent: Option<String>,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
}

impl Fan {
    /// Name to show in the sidebar: display name, then username, then `"Fan"`.
    #[must_use]
    pub fn name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .or_else(|| Some(self.username.as_str()).filter(|name| !name.trim().is_empty()))
            .unwrap_or("Fan")
    }
}

fn decimal_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Decimal {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<Decimal>::deserialize(deserializer)?.map(|value| match value {
        Decimal::Text(text) => text,
        Decimal::Number(number) => number.to_string(),
    }))
}
