use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One accepted request, as shown in the dashboard's recent-connections table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionLogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub key_id: String,
    pub key_name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Country code supplied by an edge proxy (e.g. `cf-ipcountry`), when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<String>,
}

/// Daily request counter. One row per day, incremented per forwarded request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageStat {
    pub date: NaiveDate,
    pub requests: u64,
}
