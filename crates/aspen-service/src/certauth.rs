//! Certificate-authorization middleware service.
//!
//! Wraps an inner service and gates every request on the
//! trust-on-first-use binding between an enrollment and the SHA-256
//! of the certificate that performed its first TokenUpdate.

use color_eyre::eyre::WrapErr as _;

use aspen_core::{
    Authenticate, BootstrapToken, CheckOut, Command, CommandResults, DeclarativeManagement,
    Enrollment, Error, GetBootstrapToken, GetToken, GetTokenResponse, Request, SetBootstrapToken,
    TokenUpdate, UserAuthenticate,
};
use aspen_storage::CertAuthStore;

use crate::{Checkin, CommandAndReportResults};

/// Policy knobs for the gate.
///
/// The all-off default is the safe `allow` policy: a certificate hash
/// already bound to another enrollment may still Authenticate, so a
/// wiped device can re-enroll with the same identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct CertAuthPolicy {
    /// Log violations instead of rejecting.
    pub warn_only: bool,

    /// Bind an unassociated certificate on any message kind, not just
    /// TokenUpdate. For migrated enrollments that predate cert-auth.
    pub allow_retroactive: bool,

    /// Widen the association set when a bound enrollment's
    /// TokenUpdate presents a new certificate (identity renewal).
    pub allow_rotation: bool,

    /// Refuse an Authenticate whose certificate hash is already bound
    /// to a different enrollment. Catches cloned identities at the
    /// cost of breaking legitimate re-enrollment.
    pub reject_rebind: bool,

    /// After a successful new association, delete the enrollment's
    /// prior hashes.
    pub retire: bool,
}

/// Certificate-authorization wrapper around an inner service.
pub struct CertAuthService<S, I> {
    store: S,
    inner: I,
    policy: CertAuthPolicy,
}

impl<S, I> CertAuthService<S, I> {
    pub fn new(store: S, inner: I) -> Self {
        Self {
            store,
            inner,
            policy: CertAuthPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: CertAuthPolicy) -> Self {
        self.policy = policy;
        self
    }
}

fn status_for(err: &Error) -> u16 {
    match err {
        Error::MissingCert => 400,
        Error::Unbound => 401,
        _ => 403,
    }
}

impl<S, I> CertAuthService<S, I>
where
    S: CertAuthStore,
{
    /// Normalize the enrollment block onto a copy of the request,
    /// keyed on the device channel: both channels of one device
    /// present the same identity certificate, so associations are
    /// per device, not per channel.
    fn auth_request(
        &self,
        req: &Request,
        enrollment: &Enrollment,
    ) -> color_eyre::eyre::Result<Request> {
        let id = enrollment.resolve()?;
        Ok(req.clone().with_enroll_id(id.device_channel()))
    }

    /// Lowercase-hex SHA-256 of the presented certificate.
    fn hash(&self, req: &Request) -> color_eyre::eyre::Result<String> {
        match &req.certificate {
            Some(cert) => Ok(aspen_crypto::cert_hash(cert)),
            None => Err(Error::http(400, Error::MissingCert).into()),
        }
    }

    fn violation(&self, req: &Request, err: Error, detail: &str) -> color_eyre::eyre::Result<()> {
        if self.policy.warn_only {
            tracing::warn!(
                enrollment_id = %req.enroll_id()?,
                error = %err,
                detail,
                "cert-auth violation allowed by warn-only policy"
            );
            return Ok(());
        }
        let status = status_for(&err);
        Err(Error::http(status, err).into())
    }

    /// Gate branch for Authenticate: by default a hash bound
    /// elsewhere may re-enroll.
    fn validate_authenticate(&self, req: &Request) -> color_eyre::eyre::Result<()> {
        let hash = self.hash(req)?;
        if !self.policy.reject_rebind {
            return Ok(());
        }
        if let Some(other) = self
            .store
            .enrollment_from_hash(&hash)
            .wrap_err("cert-auth reverse lookup")?
        {
            if other != req.enroll_id()?.id {
                return self.violation(
                    req,
                    Error::ForbiddenCertMismatch,
                    "certificate hash bound to another enrollment",
                );
            }
        }
        Ok(())
    }

    /// Gate branch for every other message kind.
    fn validate_associated(
        &self,
        req: &Request,
        is_token_update: bool,
    ) -> color_eyre::eyre::Result<()> {
        let hash = self.hash(req)?;
        if self
            .store
            .is_cert_hash_associated(req, &hash)
            .wrap_err("cert-auth association check")?
        {
            return Ok(());
        }
        if self
            .store
            .enrollment_has_cert_hash(req)
            .wrap_err("cert-auth enrollment check")?
        {
            if is_token_update && self.policy.allow_rotation {
                self.store
                    .associate_cert_hash(req, &hash)
                    .wrap_err("rotating cert association")?;
                return Ok(());
            }
            return self.violation(
                req,
                Error::ForbiddenCertMismatch,
                "enrollment bound to a different certificate",
            );
        }
        if self
            .store
            .has_cert_hash(req, &hash)
            .wrap_err("cert-auth hash check")?
        {
            return self.violation(
                req,
                Error::ForbiddenCertMismatch,
                "certificate bound to a different enrollment",
            );
        }
        if is_token_update {
            // Unbound both ways: storage performs the
            // trust-on-first-use bind inside the TokenUpdate write.
            return Ok(());
        }
        if self.policy.allow_retroactive {
            self.store
                .associate_cert_hash(req, &hash)
                .wrap_err("retroactive cert association")?;
            return Ok(());
        }
        self.violation(req, Error::Unbound, "no certificate association")
    }

    fn retire_if_configured(&self, req: &Request) -> color_eyre::eyre::Result<()> {
        if !self.policy.retire {
            return Ok(());
        }
        let hash = self.hash(req)?;
        // Only prune once the presented hash actually holds the
        // association.
        if !self
            .store
            .is_cert_hash_associated(req, &hash)
            .wrap_err("cert-auth association check")?
        {
            return Ok(());
        }
        self.store
            .retire_cert_hashes(req, &hash)
            .wrap_err("retiring prior cert hashes")
    }
}

impl<S, I> Checkin for CertAuthService<S, I>
where
    S: CertAuthStore,
    I: Checkin,
{
    async fn authenticate(
        &self,
        req: &Request,
        msg: &Authenticate,
    ) -> color_eyre::eyre::Result<()> {
        let auth_req = self.auth_request(req, &msg.enrollment)?;
        self.validate_authenticate(&auth_req)?;
        self.inner.authenticate(req, msg).await
    }

    async fn token_update(&self, req: &Request, msg: &TokenUpdate) -> color_eyre::eyre::Result<()> {
        let auth_req = self.auth_request(req, &msg.enrollment)?;
        self.validate_associated(&auth_req, true)?;
        self.inner.token_update(req, msg).await?;
        self.retire_if_configured(&auth_req)
    }

    async fn checkout(&self, req: &Request, msg: &CheckOut) -> color_eyre::eyre::Result<()> {
        let auth_req = self.auth_request(req, &msg.enrollment)?;
        self.validate_associated(&auth_req, false)?;
        self.inner.checkout(req, msg).await
    }

    async fn user_authenticate(
        &self,
        req: &Request,
        msg: &UserAuthenticate,
    ) -> color_eyre::eyre::Result<Option<Vec<u8>>> {
        let auth_req = self.auth_request(req, &msg.enrollment)?;
        self.validate_associated(&auth_req, false)?;
        self.inner.user_authenticate(req, msg).await
    }

    async fn set_bootstrap_token(
        &self,
        req: &Request,
        msg: &SetBootstrapToken,
    ) -> color_eyre::eyre::Result<()> {
        let auth_req = self.auth_request(req, &msg.enrollment)?;
        self.validate_associated(&auth_req, false)?;
        self.inner.set_bootstrap_token(req, msg).await
    }

    async fn get_bootstrap_token(
        &self,
        req: &Request,
        msg: &GetBootstrapToken,
    ) -> color_eyre::eyre::Result<Option<BootstrapToken>> {
        let auth_req = self.auth_request(req, &msg.enrollment)?;
        self.validate_associated(&auth_req, false)?;
        self.inner.get_bootstrap_token(req, msg).await
    }

    async fn declarative_management(
        &self,
        req: &Request,
        msg: &DeclarativeManagement,
    ) -> color_eyre::eyre::Result<Vec<u8>> {
        let auth_req = self.auth_request(req, &msg.enrollment)?;
        self.validate_associated(&auth_req, false)?;
        self.inner.declarative_management(req, msg).await
    }

    async fn get_token(
        &self,
        req: &Request,
        msg: &GetToken,
    ) -> color_eyre::eyre::Result<GetTokenResponse> {
        let auth_req = self.auth_request(req, &msg.enrollment)?;
        self.validate_associated(&auth_req, false)?;
        self.inner.get_token(req, msg).await
    }
}

impl<S, I> CommandAndReportResults for CertAuthService<S, I>
where
    S: CertAuthStore,
    I: CommandAndReportResults,
{
    async fn command_and_report_results(
        &self,
        req: &Request,
        results: &CommandResults,
    ) -> color_eyre::eyre::Result<Option<Command>> {
        let auth_req = self.auth_request(req, &results.enrollment)?;
        self.validate_associated(&auth_req, false)?;
        self.inner.command_and_report_results(req, results).await
    }
}
