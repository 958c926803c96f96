//! Push traits.

use aspen_core::{EnrollId, PushInfo, PushResult};

/// One resolved push recipient.
#[derive(Debug, Clone)]
pub struct PushTarget {
    /// Enrollment id the info belongs to.
    pub id: String,
    /// The push tuple.
    pub info: PushInfo,
}

impl PushTarget {
    /// Push token as the lowercase hex APNs device token.
    pub fn token_hex(&self) -> String {
        hex::encode(&self.info.token)
    }
}

/// Low-level push sender, implemented by an external APNs dispatcher.
#[trait_variant::make(Send)]
pub trait Pusher: Send + Sync {
    /// Send one wake-up per target, reporting per-target outcomes.
    async fn push(&self, targets: &[PushTarget]) -> Vec<PushResult>;
}

/// High-level provider that resolves enrollment ids before pushing.
#[trait_variant::make(Send)]
pub trait PushProvider: Send + Sync {
    /// Push notifications to the given enrollments.
    async fn push(&self, ids: &[EnrollId]) -> color_eyre::eyre::Result<Vec<PushResult>>;
}
