//! Service traits.

use aspen_core::{
    Authenticate, BootstrapToken, CheckOut, Command, CommandResults, DeclarativeManagement, Error,
    GetBootstrapToken, GetToken, GetTokenResponse, Request, SetBootstrapToken, TokenUpdate,
    UserAuthenticate,
};

/// Check-in service trait.
#[trait_variant::make(Send)]
pub trait Checkin: Send + Sync {
    /// Handle an Authenticate message.
    async fn authenticate(&self, req: &Request, msg: &Authenticate)
    -> color_eyre::eyre::Result<()>;

    /// Handle a TokenUpdate message.
    async fn token_update(&self, req: &Request, msg: &TokenUpdate) -> color_eyre::eyre::Result<()>;

    /// Handle a CheckOut message.
    async fn checkout(&self, req: &Request, msg: &CheckOut) -> color_eyre::eyre::Result<()>;

    /// Handle a UserAuthenticate message.
    async fn user_authenticate(
        &self,
        req: &Request,
        msg: &UserAuthenticate,
    ) -> color_eyre::eyre::Result<Option<Vec<u8>>>;

    /// Handle a SetBootstrapToken message.
    async fn set_bootstrap_token(
        &self,
        req: &Request,
        msg: &SetBootstrapToken,
    ) -> color_eyre::eyre::Result<()>;

    /// Handle a GetBootstrapToken message.
    async fn get_bootstrap_token(
        &self,
        req: &Request,
        msg: &GetBootstrapToken,
    ) -> color_eyre::eyre::Result<Option<BootstrapToken>>;

    /// Handle a DeclarativeManagement message.
    async fn declarative_management(
        &self,
        req: &Request,
        msg: &DeclarativeManagement,
    ) -> color_eyre::eyre::Result<Vec<u8>>;

    /// Handle a GetToken message.
    async fn get_token(
        &self,
        req: &Request,
        msg: &GetToken,
    ) -> color_eyre::eyre::Result<GetTokenResponse>;
}

/// Command-report and next-command service trait.
#[trait_variant::make(Send)]
pub trait CommandAndReportResults: Send + Sync {
    /// Record reported results and return the next queued command.
    async fn command_and_report_results(
        &self,
        req: &Request,
        results: &CommandResults,
    ) -> color_eyre::eyre::Result<Option<Command>>;
}

/// Combined check-in and command service.
pub trait CheckinAndCommand: Checkin + CommandAndReportResults {}

impl<T: Checkin + CommandAndReportResults> CheckinAndCommand for T {}

/// Pluggable Declarative Management handler.
#[trait_variant::make(Send)]
pub trait DeclarativeManagementHandler: Send + Sync {
    /// Process a declarative sync for the given endpoint and body.
    async fn declarative_management(
        &self,
        req: &Request,
        msg: &DeclarativeManagement,
    ) -> color_eyre::eyre::Result<Vec<u8>>;
}

/// Pluggable UserAuthenticate handler.
#[trait_variant::make(Send)]
pub trait UserAuthenticateHandler: Send + Sync {
    /// Process a UserAuthenticate message, optionally returning a
    /// digest challenge body.
    async fn user_authenticate(
        &self,
        req: &Request,
        msg: &UserAuthenticate,
    ) -> color_eyre::eyre::Result<Option<Vec<u8>>>;
}

/// Pluggable GetToken handler.
#[trait_variant::make(Send)]
pub trait GetTokenHandler: Send + Sync {
    /// Produce token data for the requested service type.
    async fn get_token(
        &self,
        req: &Request,
        msg: &GetToken,
    ) -> color_eyre::eyre::Result<GetTokenResponse>;
}

/// Null default for the optional handlers.
///
/// Every operation fails with `NotImplemented`, which the HTTP
/// boundary maps like any other error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotConfigured;

impl DeclarativeManagementHandler for NotConfigured {
    async fn declarative_management(
        &self,
        _req: &Request,
        _msg: &DeclarativeManagement,
    ) -> color_eyre::eyre::Result<Vec<u8>> {
        Err(Error::NotImplemented("DeclarativeManagement").into())
    }
}

impl UserAuthenticateHandler for NotConfigured {
    async fn user_authenticate(
        &self,
        _req: &Request,
        _msg: &UserAuthenticate,
    ) -> color_eyre::eyre::Result<Option<Vec<u8>>> {
        Err(Error::NotImplemented("UserAuthenticate").into())
    }
}

impl GetTokenHandler for NotConfigured {
    async fn get_token(
        &self,
        _req: &Request,
        _msg: &GetToken,
    ) -> color_eyre::eyre::Result<GetTokenResponse> {
        Err(Error::NotImplemented("GetToken").into())
    }
}
