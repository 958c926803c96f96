//! Multi-storage router.
//!
//! Selects one of several named backends per request from a URL
//! parameter, falling through to a default. Intended for controlled
//! migration between backends, not sharding; operations with no
//! device request (bulk enqueue, push lookup, migration reads) go to
//! the default.

use std::collections::HashMap;
use std::sync::Arc;

use aspen_core::{
    Authenticate, BootstrapToken, Command, CommandResults, EnrollId, Request, SetBootstrapToken,
    TokenUpdate,
};

use crate::traits::*;

/// Default URL parameter consulted for backend selection.
pub const DEFAULT_STORAGE_PARAM: &str = "storage";

/// Router over named storage backends.
pub struct MultiStorage {
    default: Arc<dyn AllStorage>,
    backends: HashMap<String, Arc<dyn AllStorage>>,
    param: String,
}

impl MultiStorage {
    pub fn new(default: Arc<dyn AllStorage>) -> Self {
        Self {
            default,
            backends: HashMap::new(),
            param: DEFAULT_STORAGE_PARAM.to_string(),
        }
    }

    /// Register a named backend.
    pub fn with_backend(mut self, name: impl Into<String>, backend: Arc<dyn AllStorage>) -> Self {
        self.backends.insert(name.into(), backend);
        self
    }

    /// Change the URL parameter consulted for selection.
    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.param = param.into();
        self
    }

    fn select(&self, req: &Request) -> &dyn AllStorage {
        match req.params.get(&self.param) {
            Some(name) => match self.backends.get(name) {
                Some(backend) => backend.as_ref(),
                None => {
                    tracing::warn!(backend = %name, "unknown storage backend, using default");
                    self.default.as_ref()
                }
            },
            None => self.default.as_ref(),
        }
    }
}

impl CheckinStore for MultiStorage {
    fn store_authenticate(
        &self,
        req: &Request,
        msg: &Authenticate,
    ) -> color_eyre::eyre::Result<()> {
        self.select(req).store_authenticate(req, msg)
    }

    fn store_token_update(
        &self,
        req: &Request,
        msg: &TokenUpdate,
    ) -> color_eyre::eyre::Result<()> {
        self.select(req).store_token_update(req, msg)
    }

    fn disable(&self, req: &Request) -> color_eyre::eyre::Result<()> {
        self.select(req).disable(req)
    }

    fn store_bootstrap_token(
        &self,
        req: &Request,
        msg: &SetBootstrapToken,
    ) -> color_eyre::eyre::Result<()> {
        self.select(req).store_bootstrap_token(req, msg)
    }

    fn retrieve_bootstrap_token(
        &self,
        req: &Request,
    ) -> color_eyre::eyre::Result<Option<BootstrapToken>> {
        self.select(req).retrieve_bootstrap_token(req)
    }
}

impl CommandStore for MultiStorage {
    fn store_command_report(
        &self,
        req: &Request,
        results: &CommandResults,
    ) -> color_eyre::eyre::Result<()> {
        self.select(req).store_command_report(req, results)
    }

    fn retrieve_next_command(
        &self,
        req: &Request,
        skip_not_now: bool,
    ) -> color_eyre::eyre::Result<Option<Command>> {
        self.select(req).retrieve_next_command(req, skip_not_now)
    }

    fn clear_queue(&self, req: &Request) -> color_eyre::eyre::Result<()> {
        self.select(req).clear_queue(req)
    }

    fn enqueue_command(
        &self,
        ids: &[EnrollId],
        command: &Command,
    ) -> color_eyre::eyre::Result<()> {
        self.default.enqueue_command(ids, command)
    }
}

impl CertAuthStore for MultiStorage {
    fn has_cert_hash(&self, req: &Request, hash: &str) -> color_eyre::eyre::Result<bool> {
        self.select(req).has_cert_hash(req, hash)
    }

    fn enrollment_has_cert_hash(&self, req: &Request) -> color_eyre::eyre::Result<bool> {
        self.select(req).enrollment_has_cert_hash(req)
    }

    fn is_cert_hash_associated(
        &self,
        req: &Request,
        hash: &str,
    ) -> color_eyre::eyre::Result<bool> {
        self.select(req).is_cert_hash_associated(req, hash)
    }

    fn associate_cert_hash(&self, req: &Request, hash: &str) -> color_eyre::eyre::Result<()> {
        self.select(req).associate_cert_hash(req, hash)
    }

    fn enrollment_from_hash(&self, hash: &str) -> color_eyre::eyre::Result<Option<String>> {
        self.default.enrollment_from_hash(hash)
    }

    fn retire_cert_hashes(
        &self,
        req: &Request,
        keep_hash: &str,
    ) -> color_eyre::eyre::Result<()> {
        self.select(req).retire_cert_hashes(req, keep_hash)
    }
}

impl PushStore for MultiStorage {
    fn retrieve_push_info(&self, ids: &[EnrollId]) -> color_eyre::eyre::Result<PushInfoLookup> {
        self.default.retrieve_push_info(ids)
    }
}

impl MigrationStore for MultiStorage {
    fn retrieve_migration_checkins(
        &self,
        sink: &mut MigrationSink<'_>,
    ) -> color_eyre::eyre::Result<()> {
        self.default.retrieve_migration_checkins(sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inmem::InMemoryStorage;
    use aspen_core::EnrollType;

    fn device_req(id: &str) -> Request {
        Request::new().with_enroll_id(EnrollId {
            enroll_type: EnrollType::Device,
            id: id.into(),
            parent_id: None,
        })
    }

    #[test]
    fn routes_by_url_parameter() {
        let primary = InMemoryStorage::new();
        let secondary = InMemoryStorage::new();
        let multi = MultiStorage::new(Arc::new(primary.clone()))
            .with_backend("next", Arc::new(secondary.clone()));

        let default_req = device_req("AAA");
        multi.associate_cert_hash(&default_req, "hash1").unwrap();
        assert!(primary.is_cert_hash_associated(&default_req, "hash1").unwrap());
        assert!(!secondary.is_cert_hash_associated(&default_req, "hash1").unwrap());

        let routed_req = device_req("AAA").with_param("storage", "next");
        multi.associate_cert_hash(&routed_req, "hash2").unwrap();
        assert!(secondary.is_cert_hash_associated(&routed_req, "hash2").unwrap());
        assert!(!primary.is_cert_hash_associated(&routed_req, "hash2").unwrap());
    }

    #[test]
    fn unknown_backend_falls_through_to_default() {
        let primary = InMemoryStorage::new();
        let multi = MultiStorage::new(Arc::new(primary.clone()));

        let req = device_req("AAA").with_param("storage", "missing");
        multi.associate_cert_hash(&req, "hash").unwrap();
        assert!(primary.is_cert_hash_associated(&req, "hash").unwrap());
    }

    #[test]
    fn custom_parameter_name() {
        let primary = InMemoryStorage::new();
        let secondary = InMemoryStorage::new();
        let multi = MultiStorage::new(Arc::new(primary.clone()))
            .with_backend("next", Arc::new(secondary.clone()))
            .with_param("backend");

        let req = device_req("AAA").with_param("backend", "next");
        multi.associate_cert_hash(&req, "hash").unwrap();
        assert!(secondary.is_cert_hash_associated(&req, "hash").unwrap());
    }
}
