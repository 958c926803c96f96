//! Core MDM service: dispatches check-in messages and command
//! reports to storage and the optional handlers.

use color_eyre::eyre::WrapErr as _;

use aspen_core::{
    Authenticate, BootstrapToken, CheckOut, Command, CommandResults, CommandStatus,
    DeclarativeManagement, Enrollment, GetBootstrapToken, GetToken, GetTokenResponse, Request,
    SetBootstrapToken, TokenUpdate, UserAuthenticate,
};
use aspen_storage::AllStorage;

use crate::{
    Checkin, CommandAndReportResults, DeclarativeManagementHandler, GetTokenHandler,
    NotConfigured, UserAuthenticateHandler,
};

/// The main MDM service.
///
/// Holds the storage backend and the optional Declarative Management,
/// UserAuthenticate, and GetToken handlers, which default to
/// [`NotConfigured`].
#[derive(Clone)]
pub struct AspenMdm<S, DM = NotConfigured, UA = NotConfigured, GT = NotConfigured> {
    store: S,
    dm: DM,
    ua: UA,
    gt: GT,
}

impl<S> AspenMdm<S> {
    /// Create a new service over the given storage.
    pub fn new(store: S) -> Self {
        Self {
            store,
            dm: NotConfigured,
            ua: NotConfigured,
            gt: NotConfigured,
        }
    }
}

impl<S, DM, UA, GT> AspenMdm<S, DM, UA, GT> {
    /// Configure a Declarative Management handler.
    pub fn with_declarative_management<D>(self, dm: D) -> AspenMdm<S, D, UA, GT> {
        AspenMdm {
            store: self.store,
            dm,
            ua: self.ua,
            gt: self.gt,
        }
    }

    /// Configure a UserAuthenticate handler.
    pub fn with_user_authenticate<U>(self, ua: U) -> AspenMdm<S, DM, U, GT> {
        AspenMdm {
            store: self.store,
            dm: self.dm,
            ua,
            gt: self.gt,
        }
    }

    /// Configure a GetToken handler.
    pub fn with_get_token<G>(self, gt: G) -> AspenMdm<S, DM, UA, G> {
        AspenMdm {
            store: self.store,
            dm: self.dm,
            ua: self.ua,
            gt,
        }
    }

    /// Run the normalizer and install the enrollment id on a copy of
    /// the request; every message dispatch starts here.
    fn setup_request(
        &self,
        req: &Request,
        enrollment: &Enrollment,
    ) -> color_eyre::eyre::Result<Request> {
        if req.enroll_id.is_some() {
            tracing::debug!("overwriting enrollment id");
        }
        let id = enrollment.resolve()?;
        Ok(req.clone().with_enroll_id(id))
    }
}

impl<S, DM, UA, GT> Checkin for AspenMdm<S, DM, UA, GT>
where
    S: AllStorage,
    DM: DeclarativeManagementHandler,
    UA: UserAuthenticateHandler,
    GT: GetTokenHandler,
{
    async fn authenticate(
        &self,
        req: &Request,
        msg: &Authenticate,
    ) -> color_eyre::eyre::Result<()> {
        let req = self.setup_request(req, &msg.enrollment)?;
        let id = req.enroll_id()?;
        tracing::info!(
            enrollment_id = %id,
            serial_number = msg.serial_number.as_deref().unwrap_or_default(),
            "Authenticate"
        );
        self.store
            .store_authenticate(&req, msg)
            .wrap_err("storing authenticate")?;
        // Clear the queue for the enrollment and any sub-enrollment
        // so commands queued before unenrollment don't survive it.
        self.store.clear_queue(&req).wrap_err("clearing queue")?;
        // The enrollment is only commandable again after a
        // TokenUpdate.
        self.store.disable(&req).wrap_err("disabling enrollment")
    }

    async fn token_update(&self, req: &Request, msg: &TokenUpdate) -> color_eyre::eyre::Result<()> {
        let req = self.setup_request(req, &msg.enrollment)?;
        tracing::info!(enrollment_id = %req.enroll_id()?, "TokenUpdate");
        self.store
            .store_token_update(&req, msg)
            .wrap_err("storing token update")
    }

    async fn checkout(&self, req: &Request, msg: &CheckOut) -> color_eyre::eyre::Result<()> {
        let req = self.setup_request(req, &msg.enrollment)?;
        tracing::info!(enrollment_id = %req.enroll_id()?, "CheckOut");
        self.store.disable(&req).wrap_err("disabling enrollment")
    }

    async fn user_authenticate(
        &self,
        req: &Request,
        msg: &UserAuthenticate,
    ) -> color_eyre::eyre::Result<Option<Vec<u8>>> {
        let req = self.setup_request(req, &msg.enrollment)?;
        tracing::info!(
            enrollment_id = %req.enroll_id()?,
            digest_response = msg.digest_response.is_some(),
            "UserAuthenticate"
        );
        self.ua.user_authenticate(&req, msg).await
    }

    async fn set_bootstrap_token(
        &self,
        req: &Request,
        msg: &SetBootstrapToken,
    ) -> color_eyre::eyre::Result<()> {
        let req = self.setup_request(req, &msg.enrollment)?;
        tracing::info!(enrollment_id = %req.enroll_id()?, "SetBootstrapToken");
        self.store
            .store_bootstrap_token(&req, msg)
            .wrap_err("storing bootstrap token")
    }

    async fn get_bootstrap_token(
        &self,
        req: &Request,
        msg: &GetBootstrapToken,
    ) -> color_eyre::eyre::Result<Option<BootstrapToken>> {
        let req = self.setup_request(req, &msg.enrollment)?;
        tracing::info!(enrollment_id = %req.enroll_id()?, "GetBootstrapToken");
        self.store
            .retrieve_bootstrap_token(&req)
            .wrap_err("retrieving bootstrap token")
    }

    async fn declarative_management(
        &self,
        req: &Request,
        msg: &DeclarativeManagement,
    ) -> color_eyre::eyre::Result<Vec<u8>> {
        let req = self.setup_request(req, &msg.enrollment)?;
        tracing::info!(
            enrollment_id = %req.enroll_id()?,
            endpoint = msg.endpoint.as_deref().unwrap_or_default(),
            "DeclarativeManagement"
        );
        self.dm.declarative_management(&req, msg).await
    }

    async fn get_token(
        &self,
        req: &Request,
        msg: &GetToken,
    ) -> color_eyre::eyre::Result<GetTokenResponse> {
        let req = self.setup_request(req, &msg.enrollment)?;
        tracing::info!(
            enrollment_id = %req.enroll_id()?,
            token_service_type = %msg.token_service_type,
            "GetToken"
        );
        self.gt.get_token(&req, msg).await
    }
}

impl<S, DM, UA, GT> CommandAndReportResults for AspenMdm<S, DM, UA, GT>
where
    S: AllStorage,
    DM: DeclarativeManagementHandler,
    UA: UserAuthenticateHandler,
    GT: GetTokenHandler,
{
    async fn command_and_report_results(
        &self,
        req: &Request,
        results: &CommandResults,
    ) -> color_eyre::eyre::Result<Option<Command>> {
        let req = self.setup_request(req, &results.enrollment)?;
        let id = req.enroll_id()?;
        tracing::info!(
            enrollment_id = %id,
            status = %results.status,
            command_uuid = %results.command_uuid,
            "command report"
        );

        self.store
            .store_command_report(&req, results)
            .wrap_err("storing command report")?;

        let next = self
            .store
            .retrieve_next_command(&req, results.status == CommandStatus::NotNow)
            .wrap_err("retrieving next command")?;

        match &next {
            Some(cmd) => tracing::debug!(
                enrollment_id = %id,
                command_uuid = %cmd.command_uuid,
                request_type = %cmd.request_type,
                "command retrieved"
            ),
            None => tracing::debug!(enrollment_id = %id, "no command retrieved"),
        }
        Ok(next)
    }
}
