//! In-memory storage backend.
//!
//! Reference semantics for the contract, used by tests and small
//! single-process deployments. One mutex-guarded critical section per
//! operation gives the per-enrollment linearizability the contract
//! asks of backends.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use aspen_core::{
    Authenticate, BootstrapToken, Command, CommandResults, CommandStatus, EnrollId, EnrollType,
    Error, PushInfo, PushInfoError, Request, SetBootstrapToken, TokenUpdate,
};

use crate::traits::*;

#[derive(Debug, Clone)]
struct EnrollmentState {
    enroll_type: EnrollType,
    parent_id: Option<String>,
    topic: Option<String>,
    serial_number: Option<String>,
    identity_cert: Option<Vec<u8>>,
    push_token: Option<Vec<u8>>,
    push_magic: Option<String>,
    unlock_token: Option<Vec<u8>>,
    bootstrap_token: Option<Vec<u8>>,
    authenticate_raw: Option<Vec<u8>>,
    token_update_raw: Option<Vec<u8>>,
    enabled: bool,
    token_update_tally: u32,
    last_seen_at: DateTime<Utc>,
}

impl EnrollmentState {
    fn new(id: &EnrollId) -> Self {
        Self {
            enroll_type: id.enroll_type,
            parent_id: id.parent_id.clone(),
            topic: None,
            serial_number: None,
            identity_cert: None,
            push_token: None,
            push_magic: None,
            unlock_token: None,
            bootstrap_token: None,
            authenticate_raw: None,
            token_update_raw: None,
            enabled: false,
            token_update_tally: 0,
            last_seen_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
struct QueueEntry {
    command_uuid: String,
    status: Option<CommandStatus>,
    result: Option<Vec<u8>>,
    seq: u64,
}

#[derive(Debug, Clone, Copy)]
struct Association {
    #[allow(dead_code)]
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    enrollments: BTreeMap<String, EnrollmentState>,
    queues: HashMap<String, Vec<QueueEntry>>,
    commands: HashMap<String, Command>,
    // enrollment id -> cert hash -> association timestamps
    cert_auth: BTreeMap<String, BTreeMap<String, Association>>,
    seq: u64,
}

/// Mutex-guarded map storage.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Test hook: the association's `updated_at`, if the pair exists.
    pub fn association_updated_at(&self, id: &str, hash: &str) -> Option<DateTime<Utc>> {
        self.lock()
            .cert_auth
            .get(id)
            .and_then(|hashes| hashes.get(hash))
            .map(|a| a.updated_at)
    }

    /// Test hook: enabled flag and token-update tally.
    pub fn enrollment_status(&self, id: &str) -> Option<(bool, u32)> {
        self.lock()
            .enrollments
            .get(id)
            .map(|e| (e.enabled, e.token_update_tally))
    }

    /// Test hook: the enrollment's last-seen timestamp.
    pub fn last_seen(&self, id: &str) -> Option<DateTime<Utc>> {
        self.lock().enrollments.get(id).map(|e| e.last_seen_at)
    }

    /// Test hook: the enrollment's parent device id, if any.
    pub fn parent_of(&self, id: &str) -> Option<String> {
        self.lock()
            .enrollments
            .get(id)
            .and_then(|e| e.parent_id.clone())
    }
}

impl Inner {
    fn state_mut(&mut self, id: &EnrollId) -> color_eyre::eyre::Result<&mut EnrollmentState> {
        id.validate()?;
        if let Some(parent) = &id.parent_id {
            if !self.enrollments.contains_key(parent) {
                return Err(Error::InvalidEnrollment(format!(
                    "user channel {id} has no device enrollment {parent}"
                ))
                .into());
            }
        }
        Ok(self
            .enrollments
            .entry(id.id.clone())
            .or_insert_with(|| EnrollmentState::new(id)))
    }

    fn child_ids(&self, device_id: &str) -> Vec<String> {
        self.enrollments
            .iter()
            .filter(|(_, state)| state.parent_id.as_deref() == Some(device_id))
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn touch(&mut self, id: &str) {
        if let Some(state) = self.enrollments.get_mut(id) {
            state.last_seen_at = Utc::now();
        }
    }
}

impl CheckinStore for InMemoryStorage {
    fn store_authenticate(
        &self,
        req: &Request,
        msg: &Authenticate,
    ) -> color_eyre::eyre::Result<()> {
        let id = req.enroll_id()?.clone();
        let cert = req.certificate.clone();
        let mut inner = self.lock();
        let state = inner.state_mut(&id)?;
        state.topic = Some(msg.topic.clone());
        state.serial_number = msg.serial_number.clone();
        state.identity_cert = cert;
        state.authenticate_raw = Some(msg.raw.clone());
        state.last_seen_at = Utc::now();
        Ok(())
    }

    fn store_token_update(
        &self,
        req: &Request,
        msg: &TokenUpdate,
    ) -> color_eyre::eyre::Result<()> {
        let id = req.enroll_id()?.clone();
        let mut inner = self.lock();
        let state = inner.state_mut(&id)?;
        state.topic = Some(msg.topic.clone());
        state.push_token = Some(msg.token.clone());
        state.push_magic = Some(msg.push_magic.clone());
        if !id.enroll_type.is_user_channel() {
            state.unlock_token = msg.unlock_token.clone();
        }
        state.token_update_raw = Some(msg.raw.clone());
        state.enabled = true;
        state.token_update_tally += 1;
        state.last_seen_at = Utc::now();

        // Trust-on-first-use: the binding commits together with the
        // enablement, inside the same critical section. Keyed on the
        // device channel, which both channels' certs identify.
        if let Some(cert) = &req.certificate {
            let auth_id = id.device_channel();
            let hashes = inner.cert_auth.entry(auth_id.id).or_default();
            if hashes.is_empty() {
                let now = Utc::now();
                hashes.insert(
                    aspen_crypto::cert_hash(cert),
                    Association {
                        created_at: now,
                        updated_at: now,
                    },
                );
            }
        }
        Ok(())
    }

    fn disable(&self, req: &Request) -> color_eyre::eyre::Result<()> {
        let id = req.enroll_id()?;
        let mut inner = self.lock();
        for child in inner.child_ids(&id.id) {
            if let Some(state) = inner.enrollments.get_mut(&child) {
                state.enabled = false;
            }
        }
        if let Some(state) = inner.enrollments.get_mut(&id.id) {
            state.enabled = false;
            state.last_seen_at = Utc::now();
        }
        Ok(())
    }

    fn store_bootstrap_token(
        &self,
        req: &Request,
        msg: &SetBootstrapToken,
    ) -> color_eyre::eyre::Result<()> {
        let id = req.enroll_id()?.clone();
        let mut inner = self.lock();
        let state = inner.state_mut(&id)?;
        state.bootstrap_token = Some(msg.bootstrap_token.clone());
        state.last_seen_at = Utc::now();
        Ok(())
    }

    fn retrieve_bootstrap_token(
        &self,
        req: &Request,
    ) -> color_eyre::eyre::Result<Option<BootstrapToken>> {
        let id = req.enroll_id()?;
        let inner = self.lock();
        Ok(inner
            .enrollments
            .get(&id.id)
            .and_then(|state| state.bootstrap_token.clone())
            .map(|bootstrap_token| BootstrapToken { bootstrap_token }))
    }
}

impl CommandStore for InMemoryStorage {
    fn store_command_report(
        &self,
        req: &Request,
        results: &CommandResults,
    ) -> color_eyre::eyre::Result<()> {
        let id = req.enroll_id()?;
        let mut inner = self.lock();
        inner.touch(&id.id);
        if results.command_uuid.is_empty() {
            return Ok(());
        }
        if let Some(queue) = inner.queues.get_mut(&id.id) {
            if let Some(entry) = queue
                .iter_mut()
                .find(|e| e.command_uuid == results.command_uuid)
            {
                entry.status = Some(results.status);
                entry.result = Some(results.raw.clone());
            }
        }
        Ok(())
    }

    fn retrieve_next_command(
        &self,
        req: &Request,
        skip_not_now: bool,
    ) -> color_eyre::eyre::Result<Option<Command>> {
        let id = req.enroll_id()?;
        let inner = self.lock();
        let Some(queue) = inner.queues.get(&id.id) else {
            return Ok(None);
        };
        let next = queue
            .iter()
            .filter(|e| match e.status {
                None => true,
                Some(CommandStatus::NotNow) => !skip_not_now,
                Some(_) => false,
            })
            .min_by_key(|e| e.seq);
        Ok(next.and_then(|e| inner.commands.get(&e.command_uuid).cloned()))
    }

    fn clear_queue(&self, req: &Request) -> color_eyre::eyre::Result<()> {
        let id = req.enroll_id()?;
        let mut inner = self.lock();
        for child in inner.child_ids(&id.id) {
            inner.queues.remove(&child);
        }
        inner.queues.remove(&id.id);
        Ok(())
    }

    fn enqueue_command(
        &self,
        ids: &[EnrollId],
        command: &Command,
    ) -> color_eyre::eyre::Result<()> {
        let mut inner = self.lock();
        inner
            .commands
            .insert(command.command_uuid.clone(), command.clone());
        for id in ids {
            id.validate()?;
            let seq = inner.seq;
            inner.seq += 1;
            let queue = inner.queues.entry(id.id.clone()).or_default();
            if queue.iter().any(|e| e.command_uuid == command.command_uuid) {
                return Err(Error::storage(format!(
                    "command {} already queued for {}",
                    command.command_uuid, id.id
                ))
                .into());
            }
            queue.push(QueueEntry {
                command_uuid: command.command_uuid.clone(),
                status: None,
                result: None,
                seq,
            });
        }
        Ok(())
    }
}

impl CertAuthStore for InMemoryStorage {
    fn has_cert_hash(&self, _req: &Request, hash: &str) -> color_eyre::eyre::Result<bool> {
        let inner = self.lock();
        Ok(inner
            .cert_auth
            .values()
            .any(|hashes| hashes.contains_key(hash)))
    }

    fn enrollment_has_cert_hash(&self, req: &Request) -> color_eyre::eyre::Result<bool> {
        let id = req.enroll_id()?;
        let inner = self.lock();
        Ok(inner
            .cert_auth
            .get(&id.id)
            .is_some_and(|hashes| !hashes.is_empty()))
    }

    fn is_cert_hash_associated(
        &self,
        req: &Request,
        hash: &str,
    ) -> color_eyre::eyre::Result<bool> {
        let id = req.enroll_id()?;
        let inner = self.lock();
        Ok(inner
            .cert_auth
            .get(&id.id)
            .is_some_and(|hashes| hashes.contains_key(hash)))
    }

    fn associate_cert_hash(&self, req: &Request, hash: &str) -> color_eyre::eyre::Result<()> {
        let id = req.enroll_id()?;
        let mut inner = self.lock();
        let now = Utc::now();
        inner
            .cert_auth
            .entry(id.id.clone())
            .or_default()
            .entry(hash.to_lowercase())
            .and_modify(|a| a.updated_at = now)
            .or_insert(Association {
                created_at: now,
                updated_at: now,
            });
        Ok(())
    }

    fn enrollment_from_hash(&self, hash: &str) -> color_eyre::eyre::Result<Option<String>> {
        let inner = self.lock();
        Ok(inner
            .cert_auth
            .iter()
            .find(|(_, hashes)| hashes.contains_key(hash))
            .map(|(id, _)| id.clone()))
    }

    fn retire_cert_hashes(
        &self,
        req: &Request,
        keep_hash: &str,
    ) -> color_eyre::eyre::Result<()> {
        let id = req.enroll_id()?;
        let mut inner = self.lock();
        if let Some(hashes) = inner.cert_auth.get_mut(&id.id) {
            hashes.retain(|hash, _| hash == keep_hash);
        }
        Ok(())
    }
}

impl PushStore for InMemoryStorage {
    fn retrieve_push_info(&self, ids: &[EnrollId]) -> color_eyre::eyre::Result<PushInfoLookup> {
        let inner = self.lock();
        let mut lookup = PushInfoLookup::new();
        for id in ids {
            let result = match inner.enrollments.get(&id.id) {
                None => Err(PushInfoError::NotFound),
                Some(state) if !state.enabled => Err(PushInfoError::NotEnabled),
                Some(state) => match (&state.push_token, &state.push_magic, &state.topic) {
                    (Some(token), Some(push_magic), Some(topic)) => Ok(PushInfo {
                        token: token.clone(),
                        push_magic: push_magic.clone(),
                        topic: topic.clone(),
                    }),
                    _ => Err(PushInfoError::MissingToken),
                },
            };
            lookup.insert(id.id.clone(), result);
        }
        Ok(lookup)
    }
}

impl MigrationStore for InMemoryStorage {
    fn retrieve_migration_checkins(
        &self,
        sink: &mut MigrationSink<'_>,
    ) -> color_eyre::eyre::Result<()> {
        let inner = self.lock();
        let mut emit = |id: &str, state: &EnrollmentState,
                        raw: &Option<Vec<u8>>|
         -> color_eyre::eyre::Result<()> {
            if let Some(raw) = raw {
                sink(MigrationCheckin {
                    enroll_id: EnrollId {
                        enroll_type: state.enroll_type,
                        id: id.to_string(),
                        parent_id: state.parent_id.clone(),
                    },
                    raw: raw.clone(),
                })?;
            }
            Ok(())
        };
        // Devices first, Authenticate before TokenUpdate, then each
        // device's user channels.
        for (id, state) in &inner.enrollments {
            if state.parent_id.is_some() {
                continue;
            }
            emit(id, state, &state.authenticate_raw)?;
            emit(id, state, &state.token_update_raw)?;
            for (child_id, child) in &inner.enrollments {
                if child.parent_id.as_deref() == Some(id.as_str()) {
                    emit(child_id, child, &child.token_update_raw)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device_req(id: &str) -> Request {
        Request::new().with_enroll_id(EnrollId {
            enroll_type: EnrollType::Device,
            id: id.into(),
            parent_id: None,
        })
    }

    fn user_req(device: &str, user: &str) -> Request {
        Request::new().with_enroll_id(EnrollId {
            enroll_type: EnrollType::User,
            id: format!("{device}:{user}"),
            parent_id: Some(device.into()),
        })
    }

    fn authenticate(topic: &str) -> Authenticate {
        Authenticate {
            enrollment: Default::default(),
            topic: topic.into(),
            build_version: None,
            os_version: None,
            product_name: None,
            serial_number: Some("SER1AL".into()),
            device_name: None,
            model: None,
            model_name: None,
            raw: b"<authenticate/>".to_vec(),
        }
    }

    fn token_update(topic: &str, token: &[u8]) -> TokenUpdate {
        TokenUpdate {
            enrollment: Default::default(),
            topic: topic.into(),
            token: token.to_vec(),
            push_magic: "magic".into(),
            unlock_token: None,
            awaiting_configuration: false,
            raw: b"<tokenupdate/>".to_vec(),
        }
    }

    fn idle_results() -> CommandResults {
        CommandResults {
            enrollment: Default::default(),
            command_uuid: String::new(),
            status: CommandStatus::Idle,
            error_chain: vec![],
            raw: b"<idle/>".to_vec(),
        }
    }

    fn report(uuid: &str, status: CommandStatus) -> CommandResults {
        CommandResults {
            enrollment: Default::default(),
            command_uuid: uuid.into(),
            status,
            error_chain: vec![],
            raw: b"<report/>".to_vec(),
        }
    }

    #[test]
    fn token_update_enables_and_tallies() {
        let store = InMemoryStorage::new();
        let req = device_req("AAA");
        store.store_authenticate(&req, &authenticate("t")).unwrap();
        assert_eq!(store.enrollment_status("AAA"), Some((false, 0)));

        store.store_token_update(&req, &token_update("t", b"T1")).unwrap();
        assert_eq!(store.enrollment_status("AAA"), Some((true, 1)));

        store.store_token_update(&req, &token_update("t", b"T2")).unwrap();
        assert_eq!(store.enrollment_status("AAA"), Some((true, 2)));
    }

    #[test]
    fn token_update_binds_cert_on_first_use_only() {
        let store = InMemoryStorage::new();
        let req = device_req("AAA").with_certificate(b"C1".to_vec());
        store.store_token_update(&req, &token_update("t", b"T1")).unwrap();

        let h1 = aspen_crypto::cert_hash(b"C1");
        assert!(store.is_cert_hash_associated(&req, &h1).unwrap());

        // A later token update with another cert does not widen the set.
        let req2 = device_req("AAA").with_certificate(b"C2".to_vec());
        store.store_token_update(&req2, &token_update("t", b"T1")).unwrap();
        let h2 = aspen_crypto::cert_hash(b"C2");
        assert!(!store.is_cert_hash_associated(&req2, &h2).unwrap());
        assert!(store.is_cert_hash_associated(&req, &h1).unwrap());
    }

    #[test]
    fn associate_is_idempotent_and_refreshes_updated_at() {
        let store = InMemoryStorage::new();
        let req = device_req("AAA");
        store.associate_cert_hash(&req, "abc123").unwrap();
        let first = store.association_updated_at("AAA", "abc123").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.associate_cert_hash(&req, "abc123").unwrap();
        let second = store.association_updated_at("AAA", "abc123").unwrap();
        assert!(second > first);
        assert_eq!(store.enrollment_from_hash("abc123").unwrap().as_deref(), Some("AAA"));
    }

    #[test]
    fn retire_keeps_only_current_hash() {
        let store = InMemoryStorage::new();
        let req = device_req("AAA");
        store.associate_cert_hash(&req, "old1").unwrap();
        store.associate_cert_hash(&req, "old2").unwrap();
        store.associate_cert_hash(&req, "new").unwrap();
        store.retire_cert_hashes(&req, "new").unwrap();
        assert!(store.is_cert_hash_associated(&req, "new").unwrap());
        assert!(!store.is_cert_hash_associated(&req, "old1").unwrap());
        assert!(!store.is_cert_hash_associated(&req, "old2").unwrap());
    }

    #[test]
    fn queue_not_now_deferral() {
        let store = InMemoryStorage::new();
        let req = device_req("AAA");
        store.store_authenticate(&req, &authenticate("t")).unwrap();
        let cmd = Command::new("DeviceInformation");
        store.enqueue_command(&[req.enroll_id().unwrap().clone()], &cmd).unwrap();

        // Pending: delivered.
        let next = store.retrieve_next_command(&req, false).unwrap().unwrap();
        assert_eq!(next.command_uuid, cmd.command_uuid);

        // Device defers: not redelivered in the same poll...
        store
            .store_command_report(&req, &report(&cmd.command_uuid, CommandStatus::NotNow))
            .unwrap();
        assert!(store.retrieve_next_command(&req, true).unwrap().is_none());

        // ...but again on the next one.
        let again = store.retrieve_next_command(&req, false).unwrap().unwrap();
        assert_eq!(again.command_uuid, cmd.command_uuid);
    }

    #[test]
    fn terminal_statuses_never_reemerge() {
        let store = InMemoryStorage::new();
        let req = device_req("AAA");
        store.store_authenticate(&req, &authenticate("t")).unwrap();
        for status in [
            CommandStatus::Acknowledged,
            CommandStatus::Error,
            CommandStatus::CommandFormatError,
        ] {
            let cmd = Command::new("DeviceLock");
            store.enqueue_command(&[req.enroll_id().unwrap().clone()], &cmd).unwrap();
            store.store_command_report(&req, &report(&cmd.command_uuid, status)).unwrap();
            assert!(
                store.retrieve_next_command(&req, false).unwrap().is_none(),
                "{status} must be terminal"
            );
        }
    }

    #[test]
    fn queue_is_fifo() {
        let store = InMemoryStorage::new();
        let req = device_req("AAA");
        store.store_authenticate(&req, &authenticate("t")).unwrap();
        let first = Command::new("DeviceInformation");
        let second = Command::new("DeviceLock");
        let id = req.enroll_id().unwrap().clone();
        store.enqueue_command(&[id.clone()], &first).unwrap();
        store.enqueue_command(&[id], &second).unwrap();

        let next = store.retrieve_next_command(&req, false).unwrap().unwrap();
        assert_eq!(next.command_uuid, first.command_uuid);
        store
            .store_command_report(&req, &report(&first.command_uuid, CommandStatus::Acknowledged))
            .unwrap();
        let next = store.retrieve_next_command(&req, false).unwrap().unwrap();
        assert_eq!(next.command_uuid, second.command_uuid);
    }

    #[test]
    fn clear_queue_cascades_to_user_channels() {
        let store = InMemoryStorage::new();
        let device = device_req("AAA");
        store.store_authenticate(&device, &authenticate("t")).unwrap();
        store.store_token_update(&device, &token_update("t", b"T")).unwrap();
        let user = user_req("AAA", "BBB");
        store.store_token_update(&user, &token_update("t", b"U")).unwrap();

        let cmd = Command::new("DeviceInformation");
        store
            .enqueue_command(
                &[
                    device.enroll_id().unwrap().clone(),
                    user.enroll_id().unwrap().clone(),
                ],
                &cmd,
            )
            .unwrap();

        store.clear_queue(&device).unwrap();
        assert!(store.retrieve_next_command(&device, false).unwrap().is_none());
        assert!(store.retrieve_next_command(&user, false).unwrap().is_none());
    }

    #[test]
    fn disable_cascades_to_user_channels() {
        let store = InMemoryStorage::new();
        let device = device_req("AAA");
        store.store_token_update(&device, &token_update("t", b"T")).unwrap();
        let user = user_req("AAA", "BBB");
        store.store_token_update(&user, &token_update("t", b"U")).unwrap();

        store.disable(&device).unwrap();
        assert_eq!(store.enrollment_status("AAA").map(|s| s.0), Some(false));
        assert_eq!(store.enrollment_status("AAA:BBB").map(|s| s.0), Some(false));
    }

    #[test]
    fn user_channel_requires_device() {
        let store = InMemoryStorage::new();
        let user = user_req("NOPE", "BBB");
        assert!(store.store_token_update(&user, &token_update("t", b"U")).is_err());
    }

    #[test]
    fn idle_report_touches_last_seen() {
        let store = InMemoryStorage::new();
        let req = device_req("AAA");
        store.store_authenticate(&req, &authenticate("t")).unwrap();
        let before = store.last_seen("AAA").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.store_command_report(&req, &idle_results()).unwrap();
        assert!(store.last_seen("AAA").unwrap() > before);
    }

    #[test]
    fn push_info_partial_results() {
        let store = InMemoryStorage::new();
        let enabled = device_req("AAA");
        store.store_token_update(&enabled, &token_update("topic", b"T1")).unwrap();
        let disabled = device_req("CCC");
        store.store_token_update(&disabled, &token_update("topic", b"T2")).unwrap();
        store.disable(&disabled).unwrap();

        let ids = [
            enabled.enroll_id().unwrap().clone(),
            disabled.enroll_id().unwrap().clone(),
            EnrollId {
                enroll_type: EnrollType::Device,
                id: "GHOST".into(),
                parent_id: None,
            },
        ];
        let lookup = store.retrieve_push_info(&ids).unwrap();
        assert_eq!(
            lookup["AAA"].as_ref().unwrap(),
            &PushInfo {
                token: b"T1".to_vec(),
                push_magic: "magic".into(),
                topic: "topic".into(),
            }
        );
        assert_eq!(lookup["CCC"], Err(PushInfoError::NotEnabled));
        assert_eq!(lookup["GHOST"], Err(PushInfoError::NotFound));
    }

    #[test]
    fn migration_replays_in_state_order() {
        let store = InMemoryStorage::new();
        let device = device_req("AAA");
        store.store_authenticate(&device, &authenticate("t")).unwrap();
        store.store_token_update(&device, &token_update("t", b"T")).unwrap();
        let user = user_req("AAA", "BBB");
        store.store_token_update(&user, &token_update("t", b"U")).unwrap();

        let mut seen = Vec::new();
        store
            .retrieve_migration_checkins(&mut |checkin| {
                seen.push((checkin.enroll_id.id.clone(), checkin.raw.clone()));
                Ok(())
            })
            .unwrap();
        assert_eq!(
            seen,
            vec![
                ("AAA".to_string(), b"<authenticate/>".to_vec()),
                ("AAA".to_string(), b"<tokenupdate/>".to_vec()),
                ("AAA:BBB".to_string(), b"<tokenupdate/>".to_vec()),
            ]
        );
    }
}
