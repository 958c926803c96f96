//! MDM protocol handlers.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use color_eyre::eyre::WrapErr as _;

use aspen_core::{parse_checkin, parse_command_results, CheckinMessage, Error, Request};
use aspen_service::{Checkin, CommandAndReportResults};

/// Content type marking a check-in request on the combined handler.
pub const CHECKIN_CONTENT_TYPE: &str = "application/x-apple-aspen-mdm-checkin";

/// Serialize a value to XML plist bytes.
fn to_plist_xml<T: serde::Serialize>(value: &T) -> color_eyre::eyre::Result<Vec<u8>> {
    let mut buf = Vec::new();
    plist::to_writer_xml(&mut buf, value).wrap_err("failed to serialize plist")?;
    Ok(buf)
}

/// Adapt the HTTP pieces into the core request context.
fn request_from_http(headers: &HeaderMap, params: HashMap<String, String>) -> Request {
    let mut req = Request::new();
    req.params = params;
    if let Some(cert) = extract_certificate(headers) {
        req = req.with_certificate(cert);
    }
    req
}

/// Map an error chain onto an HTTP status, logging the detail.
///
/// The first `HttpStatus` in the chain picks the status; a `Parse`
/// error enriches the log with the offending content; everything
/// else stays a 500 with the generic status text.
fn error_response(context: &'static str, err: &color_eyre::eyre::Report) -> (StatusCode, String) {
    let mut status = StatusCode::INTERNAL_SERVER_ERROR;
    let mut status_set = false;
    let mut parse_content: Option<String> = None;

    for cause in err.chain() {
        if let Some(core_err) = cause.downcast_ref::<Error>() {
            match core_err {
                Error::HttpStatus { status: s, .. } if !status_set => {
                    status = StatusCode::from_u16(*s)
                        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                    status_set = true;
                }
                Error::Parse(parse) => {
                    parse_content =
                        Some(String::from_utf8_lossy(&parse.content).into_owned());
                }
                _ => {}
            }
        }
    }

    match parse_content {
        Some(content) => tracing::info!(
            msg = context,
            http_status = status.as_u16(),
            content,
            error = %format!("{err:#}"),
            "request failed"
        ),
        None => tracing::info!(
            msg = context,
            http_status = status.as_u16(),
            error = %format!("{err:#}"),
            "request failed"
        ),
    }

    let body = status
        .canonical_reason()
        .unwrap_or("Internal Server Error")
        .to_string();
    (status, body)
}

/// Handle `POST /mdm/checkin`.
pub async fn checkin_handler<S>(
    State(service): State<S>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse
where
    S: Checkin,
{
    let req = request_from_http(&headers, params);
    match handle_checkin(&service, req, &body).await {
        Ok(response) => (StatusCode::OK, response).into_response(),
        Err(e) => error_response("check-in request", &e).into_response(),
    }
}

async fn handle_checkin<S: Checkin>(
    service: &S,
    req: Request,
    body: &[u8],
) -> color_eyre::eyre::Result<Vec<u8>> {
    let msg =
        parse_checkin(body).map_err(|e| Error::http(400, Error::from(e)))?;

    let response = match &msg {
        CheckinMessage::Authenticate(m) => {
            service.authenticate(&req, m).await?;
            None
        }
        CheckinMessage::TokenUpdate(m) => {
            service.token_update(&req, m).await?;
            None
        }
        CheckinMessage::CheckOut(m) => {
            service.checkout(&req, m).await?;
            None
        }
        CheckinMessage::UserAuthenticate(m) => service.user_authenticate(&req, m).await?,
        CheckinMessage::SetBootstrapToken(m) => {
            service.set_bootstrap_token(&req, m).await?;
            None
        }
        CheckinMessage::GetBootstrapToken(m) => {
            let token = service.get_bootstrap_token(&req, m).await?;
            match token {
                Some(token) => Some(to_plist_xml(&token)?),
                None => None,
            }
        }
        CheckinMessage::DeclarativeManagement(m) => {
            Some(service.declarative_management(&req, m).await?)
        }
        CheckinMessage::GetToken(m) => {
            let token = service.get_token(&req, m).await?;
            Some(to_plist_xml(&token)?)
        }
    };

    Ok(response.unwrap_or_default())
}

/// Handle `POST /mdm/command`.
pub async fn command_handler<S>(
    State(service): State<S>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse
where
    S: CommandAndReportResults,
{
    let req = request_from_http(&headers, params);
    match handle_command(&service, req, &body).await {
        Ok(response) => (StatusCode::OK, response).into_response(),
        Err(e) => error_response("command report", &e).into_response(),
    }
}

async fn handle_command<S: CommandAndReportResults>(
    service: &S,
    req: Request,
    body: &[u8],
) -> color_eyre::eyre::Result<Vec<u8>> {
    let results =
        parse_command_results(body).map_err(|e| Error::http(400, Error::from(e)))?;

    let next = service.command_and_report_results(&req, &results).await?;

    // The stored plist bytes are the response body; an empty body
    // means an empty queue.
    Ok(next.map(|cmd| cmd.raw).unwrap_or_default())
}

/// Combined handler: check-in content type dispatches to check-in,
/// anything else is treated as command traffic.
pub async fn checkin_and_command_handler<S>(
    state: State<S>,
    query: Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response
where
    S: Checkin + CommandAndReportResults,
{
    let is_checkin = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with(CHECKIN_CONTENT_TYPE));

    if is_checkin {
        checkin_handler(state, query, headers, body)
            .await
            .into_response()
    } else {
        command_handler(state, query, headers, body)
            .await
            .into_response()
    }
}

/// Decode one forwarded-certificate header value to DER.
///
/// RFC 9440 wraps base64 DER in colons (`:base64:`); older proxies
/// send URL-escaped PEM instead.
fn decode_cert_header(value: &str) -> color_eyre::eyre::Result<Vec<u8>> {
    let value = value.trim();

    if let Some(b64) = value
        .strip_prefix(':')
        .and_then(|rest| rest.strip_suffix(':'))
    {
        use base64::Engine as _;
        return base64::engine::general_purpose::STANDARD
            .decode(b64)
            .wrap_err("invalid RFC 9440 certificate header");
    }

    let pem_str = urlencoding::decode(value).wrap_err("certificate header is not URL-escaped")?;
    let block = ::pem::parse(pem_str.as_bytes())
        .map_err(|e| color_eyre::eyre::eyre!("certificate header is not PEM: {e}"))?;
    if block.tag() != "CERTIFICATE" {
        color_eyre::eyre::bail!("expected a CERTIFICATE block, got {}", block.tag());
    }
    Ok(block.into_contents())
}

/// Extract the client certificate from request headers.
///
/// Mutual-TLS terminating proxies forward the verified leaf in one of
/// a few conventional headers. An `Mdm-Signature` header carries a
/// CMS blob instead; extracting its signer is the external verifier's
/// job, so only the transport encoding is checked here.
fn extract_certificate(headers: &HeaderMap) -> Option<Vec<u8>> {
    if let Some(sig) = headers.get("Mdm-Signature").and_then(|v| v.to_str().ok()) {
        match aspen_crypto::decode_mdm_signature(sig) {
            Ok(_) => tracing::debug!("Mdm-Signature present, leaving extraction to the verifier"),
            Err(e) => tracing::warn!(error = %e, "malformed Mdm-Signature header"),
        }
    }
    for header_name in ["X-Ssl-Client-Cert", "X-Client-Cert", "Ssl-Client-Cert"] {
        let Some(value) = headers.get(header_name) else {
            continue;
        };
        let Ok(value_str) = value.to_str() else {
            tracing::warn!(header = header_name, "client cert header is not ASCII");
            continue;
        };

        match decode_cert_header(value_str) {
            Ok(cert) => return Some(cert),
            Err(e) => {
                tracing::warn!(header = header_name, error = %e, "failed to decode client cert header");
            }
        }
    }
    None
}
