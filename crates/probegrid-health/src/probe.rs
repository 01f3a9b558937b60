//! Health probe: one bounded HTTP GET through a local port.
//!
//! The whole round trip (connect, handshake, request, body) runs under a
//! single timeout. The response body is read in full, capped at
//! [`MAX_BODY_BYTES`], and kept raw alongside whatever the parser makes
//! of it.

use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Empty, LengthLimitError, Limited};
use thiserror::Error;
use tracing::debug;

use probegrid_core::{Classification, Endpoint, HealthSnapshot, HealthStatus, OutputMode};

use crate::parser;

/// Upper bound on a health response body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

const USER_AGENT: &str = concat!("probegrid-health/", env!("CARGO_PKG_VERSION"));

/// Errors that prevent a probe from producing a response.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("connect to {addr} failed: {reason}")]
    Connect { addr: String, reason: String },

    #[error("HTTP handshake failed: {0}")]
    Handshake(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("reading response body failed: {0}")]
    Body(String),

    #[error("response body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
}

/// What to request and how to interpret it.
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub endpoint: Endpoint,
    pub timeout: Duration,
    pub output: OutputMode,
}

/// A response as received, before interpretation.
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// A classified response.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub classification: Classification,
    pub snapshot: Option<HealthSnapshot>,
    pub raw: Bytes,
    pub error: Option<String>,
}

impl ProbeResponse {
    /// Classify the response.
    ///
    /// A parseable body decides the classification whatever the HTTP
    /// status (actuators answer DOWN with 503). An unparseable body is a
    /// probe failure, except for a 2xx in raw mode which reads as UNKNOWN.
    pub fn into_outcome(self, output: OutputMode) -> ProbeOutcome {
        let raw = self.body.clone();
        match parser::parse(self.body) {
            Ok(snapshot) => ProbeOutcome {
                classification: Classification::from_status(&snapshot.status),
                snapshot: Some(snapshot),
                raw,
                error: None,
            },
            Err(e) if !self.status.is_success() => ProbeOutcome {
                classification: Classification::ProbeFailure,
                snapshot: None,
                raw,
                error: Some(format!("unexpected HTTP status {}: {e}", self.status)),
            },
            Err(_) if !output.requires_parse() => ProbeOutcome {
                classification: Classification::Status(HealthStatus::Unknown),
                snapshot: None,
                raw,
                error: None,
            },
            Err(e) => ProbeOutcome {
                classification: Classification::ProbeFailure,
                snapshot: None,
                raw,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Probe `127.0.0.1:<port>` and classify the answer.
pub async fn probe(port: u16, options: &ProbeOptions) -> Result<ProbeOutcome, ProbeError> {
    let response = http_get(port, &options.endpoint.path(), options.timeout).await?;
    Ok(response.into_outcome(options.output))
}

/// Issue one GET against `127.0.0.1:<port><path>`.
pub async fn http_get(port: u16, path: &str, timeout: Duration) -> Result<ProbeResponse, ProbeError> {
    let addr = format!("127.0.0.1:{port}");

    match tokio::time::timeout(timeout, round_trip(&addr, path)).await {
        Ok(result) => result,
        Err(_) => {
            debug!(%addr, path, ?timeout, "health probe timed out");
            Err(ProbeError::Timeout(timeout))
        }
    }
}

async fn round_trip(addr: &str, path: &str) -> Result<ProbeResponse, ProbeError> {
    let stream = tokio::net::TcpStream::connect(addr)
        .await
        .map_err(|e| ProbeError::Connect {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;

    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| ProbeError::Handshake(e.to_string()))?;

    // Drive the connection until the response body has been read.
    let conn_task = tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "health probe connection ended with error");
        }
    });

    let result = send(&mut sender, addr, path).await;
    conn_task.abort();
    result
}

async fn send(
    sender: &mut hyper::client::conn::http1::SendRequest<Empty<Bytes>>,
    addr: &str,
    path: &str,
) -> Result<ProbeResponse, ProbeError> {
    let req = http::Request::builder()
        .method("GET")
        .uri(path)
        .header("host", addr)
        .header("user-agent", USER_AGENT)
        .header("accept", "application/json")
        .body(Empty::<Bytes>::new())
        .map_err(|e| ProbeError::Request(e.to_string()))?;

    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| ProbeError::Request(e.to_string()))?;

    let status = resp.status();
    let body = Limited::new(resp.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                ProbeError::BodyTooLarge(MAX_BODY_BYTES)
            } else {
                ProbeError::Body(e.to_string())
            }
        })?
        .to_bytes();

    debug!(%addr, path, %status, bytes = body.len(), "health probe response");
    Ok(ProbeResponse { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on an ephemeral port.
    async fn serve_once(status_line: &'static str, body: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        port
    }

    fn options(output: OutputMode) -> ProbeOptions {
        ProbeOptions {
            endpoint: Endpoint::Health,
            timeout: Duration::from_secs(2),
            output,
        }
    }

    fn response(status: u16, body: &'static str) -> ProbeResponse {
        ProbeResponse {
            status: StatusCode::from_u16(status).unwrap(),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[tokio::test]
    async fn probe_parses_up_response() {
        let port = serve_once("200 OK", r#"{"status":"UP","components":{}}"#).await;
        let outcome = probe(port, &options(OutputMode::Parsed)).await.unwrap();
        assert_eq!(outcome.classification, Classification::Healthy);
        assert!(outcome.snapshot.is_some());
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn probe_classifies_down_on_503() {
        let port = serve_once("503 Service Unavailable", r#"{"status":"DOWN"}"#).await;
        let outcome = probe(port, &options(OutputMode::Parsed)).await.unwrap();
        assert_eq!(outcome.classification, Classification::Status(HealthStatus::Down));
    }

    #[tokio::test]
    async fn probe_to_closed_port_fails_to_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = probe(port, &options(OutputMode::Parsed)).await.unwrap_err();
        assert!(matches!(err, ProbeError::Connect { .. }));
    }

    #[tokio::test]
    async fn probe_times_out_on_silent_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let mut opts = options(OutputMode::Parsed);
        opts.timeout = Duration::from_millis(100);
        let err = probe(port, &opts).await.unwrap_err();
        assert!(matches!(err, ProbeError::Timeout(d) if d == Duration::from_millis(100)));
    }

    #[test]
    fn malformed_body_is_probe_failure_with_raw_kept() {
        let outcome = response(200, "not json").into_outcome(OutputMode::Parsed);
        assert_eq!(outcome.classification, Classification::ProbeFailure);
        assert_eq!(&outcome.raw[..], b"not json");
        assert!(outcome.error.unwrap().contains("malformed"));
    }

    #[test]
    fn raw_mode_tolerates_unparseable_2xx() {
        let outcome = response(200, "OK").into_outcome(OutputMode::Raw);
        assert_eq!(
            outcome.classification,
            Classification::Status(HealthStatus::Unknown)
        );
        assert!(outcome.error.is_none());
        assert_eq!(&outcome.raw[..], b"OK");
    }

    #[test]
    fn non_success_without_body_is_probe_failure() {
        let outcome = response(404, "").into_outcome(OutputMode::Raw);
        assert_eq!(outcome.classification, Classification::ProbeFailure);
        assert!(outcome.error.unwrap().contains("404"));
    }

    #[test]
    fn parsed_mode_keeps_snapshot_and_raw() {
        let outcome = response(200, r#"{"status":"DEGRADED"}"#).into_outcome(OutputMode::Json);
        assert_eq!(outcome.classification.label(), "DEGRADED");
        assert_eq!(outcome.snapshot.unwrap().raw, outcome.raw);
    }
}
