//! The two-round-trip NTLM handshake.

use tracing::{debug, instrument};

use crm_client::{HttpClient, RequestBuilder, RequestMethod, Response};

use crate::credentials::NtlmCredentials;
use crate::error::{Error, ErrorKind, Result};
use crate::message::{authenticate_message, negotiate_message, ServerChallenge};

/// Which round trip of the handshake a request shape is being built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeRound {
    /// Round one: the negotiate (type 1) message.
    Negotiate,
    /// Round two: the authenticate (type 3) message.
    Authenticate,
}

/// Caller-supplied shape for one handshake round trip.
///
/// The shaper is a pure function invoked once per round; the two rounds
/// carry different connection headers, so nothing is memoized. `Connection`
/// and `Authorization` are owned by the handshake itself and layered on top
/// of whatever the shape provides.
#[derive(Debug, Default)]
pub struct RequestShape {
    /// HTTP method; defaults to GET.
    pub method: RequestMethod,
    /// Extra headers (e.g. `Prefer`, `Content-Type`).
    pub headers: Vec<(String, String)>,
    /// Optional request body.
    pub body: Option<String>,
}

/// Perform one NTLM-authenticated request: exactly two sequential round
/// trips against `url`.
///
/// Round one sends the negotiate message over a kept-alive connection; the
/// server's `www-authenticate` challenge is required; its absence is a hard
/// protocol error and no second request is issued. Round two sends the
/// computed authenticate message and asks the server to close the connection.
/// The result is round two's raw response, whatever its status.
#[instrument(skip(http, credentials, shaper), fields(url = %url))]
pub async fn ntlm_handshake<F>(
    http: &HttpClient,
    url: &str,
    credentials: &NtlmCredentials,
    shaper: F,
) -> Result<Response>
where
    F: Fn(HandshakeRound, Option<&ServerChallenge>) -> RequestShape,
{
    let shape = shaper(HandshakeRound::Negotiate, None);
    let request = shaped_request(http, url, shape)
        .header("Connection", "keep-alive")
        .header("Authorization", negotiate_message(credentials));
    let response = http.execute(request).await?;

    let challenge_header = response.header("www-authenticate").ok_or_else(|| {
        Error::new(ErrorKind::Protocol(
            "www-authenticate header missing from challenge response".to_string(),
        ))
    })?;
    let challenge = ServerChallenge::parse(challenge_header)?;
    debug!(status = response.status(), "Challenge received");

    // Give other pending work a turn before the second round trip.
    tokio::task::yield_now().await;

    let shape = shaper(HandshakeRound::Authenticate, Some(&challenge));
    let request = shaped_request(http, url, shape)
        .header("Connection", "Close")
        .header("Authorization", authenticate_message(&challenge, credentials));
    let response = http.execute(request).await?;
    debug!(status = response.status(), "Handshake complete");

    Ok(response)
}

fn shaped_request(http: &HttpClient, url: &str, shape: RequestShape) -> RequestBuilder {
    let request = http.request(shape.method, url).headers(shape.headers);
    match shape.body {
        Some(body) => request.text(body),
        None => request,
    }
}
