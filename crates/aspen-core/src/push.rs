//! Push notification info types.

/// The tuple needed to wake one enrollment over APNs.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PushInfo {
    /// APNs push token (raw bytes).
    pub token: Vec<u8>,
    /// Push magic string.
    pub push_magic: String,
    /// APNs topic from the identity certificate.
    pub topic: String,
}

/// Why push info could not be resolved for one enrollment id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PushInfoError {
    #[error("enrollment not found")]
    NotFound,
    #[error("enrollment not enabled")]
    NotEnabled,
    #[error("enrollment has no push token")]
    MissingToken,
}

/// Outcome of one push attempt, keyed by enrollment id.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PushResult {
    /// Enrollment id the push targeted.
    pub id: String,
    /// APNs response id, when the push was accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_id: Option<String>,
    /// Failure detail, when it was not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PushResult {
    pub fn success(id: impl Into<String>, push_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            push_id: Some(push_id.into()),
            error: None,
        }
    }

    pub fn failure(id: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            id: id.into(),
            push_id: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
