//! The storage contract.
//!
//! Device-scoped operations take the resolved [`Request`] so backends
//! can key on the enrollment id and, where relevant, the presented
//! certificate. Each multi-step method must be atomic against
//! concurrent readers; cross-method atomicity is not required.

use std::collections::HashMap;

use aspen_core::{
    Authenticate, BootstrapToken, Command, CommandResults, EnrollId, PushInfo, PushInfoError,
    Request, SetBootstrapToken, TokenUpdate,
};

/// Per-id outcome of a bulk push-info lookup.
pub type PushInfoLookup = HashMap<String, Result<PushInfo, PushInfoError>>;

/// One stored check-in replayed during migration.
#[derive(Debug, Clone)]
pub struct MigrationCheckin {
    /// The enrollment the check-in belongs to.
    pub enroll_id: EnrollId,
    /// The stored raw check-in plist.
    pub raw: Vec<u8>,
}

/// Callback receiving migration check-ins in replay order.
pub type MigrationSink<'a> =
    dyn FnMut(MigrationCheckin) -> color_eyre::eyre::Result<()> + 'a;

/// Check-in (identity) storage operations.
pub trait CheckinStore: Send + Sync {
    /// Persist an Authenticate message's identity fields.
    ///
    /// Creates the enrollment when it does not exist. The caller is
    /// responsible for the follow-up queue clear and disable.
    fn store_authenticate(
        &self,
        req: &Request,
        msg: &Authenticate,
    ) -> color_eyre::eyre::Result<()>;

    /// Persist a TokenUpdate: push token, magic, topic, unlock token;
    /// enable the enrollment; increment its token-update tally; and
    /// bind the presented certificate hash if the enrollment has none
    /// (committed together with the enablement).
    fn store_token_update(&self, req: &Request, msg: &TokenUpdate)
    -> color_eyre::eyre::Result<()>;

    /// Disable the enrollment and any sub-enrollments.
    fn disable(&self, req: &Request) -> color_eyre::eyre::Result<()>;

    /// Persist a bootstrap token blob against the enrollment.
    fn store_bootstrap_token(
        &self,
        req: &Request,
        msg: &SetBootstrapToken,
    ) -> color_eyre::eyre::Result<()>;

    /// Retrieve the enrollment's bootstrap token blob.
    fn retrieve_bootstrap_token(
        &self,
        req: &Request,
    ) -> color_eyre::eyre::Result<Option<BootstrapToken>>;
}

/// Command queue storage operations.
pub trait CommandStore: Send + Sync {
    /// Record a command report: set the queue entry's status and
    /// result for the reported UUID and refresh `last_seen`. An empty
    /// UUID (idle poll) only refreshes `last_seen`.
    fn store_command_report(
        &self,
        req: &Request,
        results: &CommandResults,
    ) -> color_eyre::eyre::Result<()>;

    /// The next deliverable command for the enrollment.
    ///
    /// Entries with a terminal status are never returned. Entries
    /// deferred with NotNow are skipped when `skip_not_now` is set
    /// (the poll that reported the deferral) and deliverable again on
    /// later polls.
    fn retrieve_next_command(
        &self,
        req: &Request,
        skip_not_now: bool,
    ) -> color_eyre::eyre::Result<Option<Command>>;

    /// Remove all queue entries for the enrollment and, for a device
    /// channel, its user-channel children.
    fn clear_queue(&self, req: &Request) -> color_eyre::eyre::Result<()>;

    /// Enqueue one command for each of the given enrollments.
    fn enqueue_command(
        &self,
        ids: &[EnrollId],
        command: &Command,
    ) -> color_eyre::eyre::Result<()>;
}

/// Certificate-hash association storage.
pub trait CertAuthStore: Send + Sync {
    /// Is this hash associated with any enrollment?
    fn has_cert_hash(&self, req: &Request, hash: &str) -> color_eyre::eyre::Result<bool>;

    /// Does this enrollment have any associated hash?
    fn enrollment_has_cert_hash(&self, req: &Request) -> color_eyre::eyre::Result<bool>;

    /// Exact binding check for (enrollment, hash).
    fn is_cert_hash_associated(
        &self,
        req: &Request,
        hash: &str,
    ) -> color_eyre::eyre::Result<bool>;

    /// Idempotent upsert; refreshes `updated_at` when the pair exists.
    fn associate_cert_hash(&self, req: &Request, hash: &str) -> color_eyre::eyre::Result<()>;

    /// Reverse lookup: which enrollment id owns this hash, if any.
    fn enrollment_from_hash(&self, hash: &str) -> color_eyre::eyre::Result<Option<String>>;

    /// Delete the enrollment's associations other than `keep_hash`
    /// (retirement policy).
    fn retire_cert_hashes(&self, req: &Request, keep_hash: &str)
    -> color_eyre::eyre::Result<()>;
}

/// Push-info bulk lookup.
pub trait PushStore: Send + Sync {
    /// Resolve push info for each id, with per-id errors; absent or
    /// disabled enrollments fail individually, not the whole call.
    fn retrieve_push_info(&self, ids: &[EnrollId]) -> color_eyre::eyre::Result<PushInfoLookup>;
}

/// Migration read: replay stored check-ins in an order that
/// reconstructs a valid state (a device's Authenticate before its
/// TokenUpdate, devices before their users).
pub trait MigrationStore: Send + Sync {
    fn retrieve_migration_checkins(
        &self,
        sink: &mut MigrationSink<'_>,
    ) -> color_eyre::eyre::Result<()>;
}

/// The full storage contract.
pub trait AllStorage:
    CheckinStore + CommandStore + CertAuthStore + PushStore + MigrationStore
{
}

impl<T> AllStorage for T where
    T: CheckinStore + CommandStore + CertAuthStore + PushStore + MigrationStore
{
}
