use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a key may be used to authenticate requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Revoked,
}

/// A bearer credential issued to a gateway client.
///
/// `secret` is the opaque token presented in the Authorization header. It is
/// generated server-side on issuance and unique among stored keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub name: String,
    pub secret: String,
    pub status: KeyStatus,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub usage_count: u64,
    /// Advisory requests-per-minute figure shown on the dashboard. Not enforced.
    pub rate_limit: u32,
}

impl ApiKey {
    /// Issue a fresh key with a server-generated `ks_`-prefixed secret.
    pub fn issue(name: impl Into<String>, rate_limit: u32) -> Self {
        let mut random = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut random);

        Self {
            id: format!("key_{}", Uuid::new_v4().simple()),
            name: name.into(),
            secret: format!("ks_{}", hex::encode(random)),
            status: KeyStatus::Active,
            created_at: Utc::now(),
            last_used_at: None,
            usage_count: 0,
            rate_limit,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == KeyStatus::Active
    }
}
