//! Push-info provider over storage.

use color_eyre::eyre::WrapErr as _;

use aspen_core::{EnrollId, PushResult};
use aspen_storage::PushStore;

use crate::{PushProvider, PushTarget, Pusher};

/// Resolves enrollment ids through a [`PushStore`] and forwards the
/// resolvable ones to the pusher. Per-id resolution failures become
/// per-id results, not a whole-call failure.
#[derive(Clone)]
pub struct PushService<S, P> {
    store: S,
    pusher: P,
}

impl<S, P> PushService<S, P> {
    pub fn new(store: S, pusher: P) -> Self {
        Self { store, pusher }
    }
}

impl<S, P> PushProvider for PushService<S, P>
where
    S: PushStore,
    P: Pusher,
{
    async fn push(&self, ids: &[EnrollId]) -> color_eyre::eyre::Result<Vec<PushResult>> {
        let lookup = self
            .store
            .retrieve_push_info(ids)
            .wrap_err("resolving push info")?;

        let mut results = Vec::with_capacity(lookup.len());
        let mut targets = Vec::new();
        for (id, entry) in lookup {
            match entry {
                Ok(info) => targets.push(PushTarget { id, info }),
                Err(err) => {
                    tracing::warn!(enrollment_id = %id, error = %err, "push info unresolved");
                    results.push(PushResult::failure(id, err));
                }
            }
        }
        results.extend(self.pusher.push(&targets).await);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aspen_core::{EnrollType, Request, TokenUpdate};
    use aspen_storage::{CheckinStore as _, InMemoryStorage};
    use std::sync::Mutex;

    struct RecordingPusher {
        seen: Mutex<Vec<String>>,
    }

    impl Pusher for RecordingPusher {
        async fn push(&self, targets: &[PushTarget]) -> Vec<PushResult> {
            let mut seen = self.seen.lock().unwrap();
            targets
                .iter()
                .map(|t| {
                    seen.push(t.id.clone());
                    PushResult::success(t.id.clone(), format!("apns-{}", t.token_hex()))
                })
                .collect()
        }
    }

    fn enroll(store: &InMemoryStorage, id: &str) -> EnrollId {
        let req = Request::new().with_enroll_id(EnrollId {
            enroll_type: EnrollType::Device,
            id: id.into(),
            parent_id: None,
        });
        let msg = TokenUpdate {
            enrollment: Default::default(),
            topic: "com.apple.mgmt.example".into(),
            token: vec![0xab, 0xcd],
            push_magic: "magic".into(),
            unlock_token: None,
            awaiting_configuration: false,
            raw: b"<tokenupdate/>".to_vec(),
        };
        store.store_token_update(&req, &msg).unwrap();
        req.enroll_id.unwrap()
    }

    #[tokio::test]
    async fn pushes_resolvable_and_reports_unresolvable() {
        let store = InMemoryStorage::new();
        let enrolled = enroll(&store, "AAA");
        let ghost = EnrollId {
            enroll_type: EnrollType::Device,
            id: "GHOST".into(),
            parent_id: None,
        };

        let service = PushService::new(
            store,
            RecordingPusher {
                seen: Mutex::new(Vec::new()),
            },
        );
        let results = service.push(&[enrolled, ghost]).await.unwrap();

        let ok: Vec<_> = results.iter().filter(|r| r.is_success()).collect();
        assert_eq!(ok.len(), 1);
        assert_eq!(ok[0].id, "AAA");
        assert_eq!(ok[0].push_id.as_deref(), Some("apns-abcd"));

        let failed: Vec<_> = results.iter().filter(|r| !r.is_success()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, "GHOST");
    }
}
