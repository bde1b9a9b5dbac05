use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two backend families the gateway can front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceKind {
    TextGeneration,
    ImageGeneration,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::TextGeneration => "text-generation",
            ServiceKind::ImageGeneration => "image-generation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Active,
    Inactive,
}

/// An admin-configured backend endpoint.
///
/// Only one endpoint per kind is consulted at forward time; when several are
/// active the most recently created one wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub id: String,
    pub name: String,
    pub kind: ServiceKind,
    pub base_url: String,
    pub status: ServiceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_models_hint: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ServiceEndpoint {
    pub fn is_active(&self) -> bool {
        self.status == ServiceStatus::Active
    }
}
