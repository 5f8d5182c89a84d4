//! HTTP/1.1 upgrade handshake, both sides.
//!
//! Request/response line and header parsing is delegated to `httparse`;
//! this module only does the WebSocket-specific validation and response
//! construction around it.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::{DialerConfig, HookOutcome, ListenerConfig};
use crate::error::{Error, Result};
use crate::util;

const MAX_HEADER_BYTES: usize = 16 * 1024;

/// A parsed, still-unvalidated upgrade request, handed to the policy hook.
#[derive(Debug, Clone)]
pub struct ServerRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
}

impl ServerRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Read bytes from `stream` until a full HTTP header block (terminated by
/// `\r\n\r\n`) has arrived, growing the buffer as needed up to
/// `MAX_HEADER_BYTES`.
async fn read_header_block<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 512];
    loop {
        if buf.len() >= MAX_HEADER_BYTES {
            return Err(Error::Invalid("handshake header too large".into()));
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::Invalid("connection closed during handshake".into()));
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            return Ok(buf);
        }
    }
}

async fn write_error_response<S: AsyncWrite + Unpin>(stream: &mut S, status: u16) -> Result<()> {
    let reason = match status {
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        505 => "HTTP Version Not Supported",
        _ => "Error",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nConnection: close\r\nContent-Length: 0\r\n\r\n"
    );
    stream.write_all(response.as_bytes()).await?;
    Ok(())
}

/// Validate an upgrade request against RFC 6455's handshake requirements,
/// in order, and on success write the 101 response. Returns the negotiated
/// subprotocol (if any). On any validation failure the appropriate error
/// status is written back and the function returns `Err`.
pub async fn perform_server_handshake<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    registered_path: &str,
    config: &ListenerConfig,
) -> Result<Option<String>> {
    let raw = read_header_block(stream).await?;

    let mut headers_buf = [httparse::EMPTY_HEADER; 64];
    let mut req = httparse::Request::new(&mut headers_buf);
    let status = req.parse(&raw)?;
    if status.is_partial() {
        write_error_response(stream, 400).await?;
        return Err(Error::Invalid("incomplete HTTP request".into()));
    }

    // 1. HTTP version must be 1.1.
    if req.version != Some(1) {
        write_error_response(stream, 505).await?;
        return Err(Error::Proto);
    }

    // 2. Method must be GET.
    if req.method != Some("GET") {
        write_error_response(stream, 400).await?;
        return Err(Error::Proto);
    }

    let path = req.path.unwrap_or("/").to_string();
    let headers: Vec<(String, String)> = req
        .headers
        .iter()
        .map(|h| {
            (
                h.name.to_string(),
                String::from_utf8_lossy(h.value).into_owned(),
            )
        })
        .collect();
    let find = |name: &str| -> Option<String> {
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    };

    // 3. No request body.
    let has_body = find("content-length")
        .map(|v| v.trim().parse::<u64>().unwrap_or(0) > 0)
        .unwrap_or(false)
        || find("transfer-encoding")
            .map(|v| util::contains_word(&v, "chunked"))
            .unwrap_or(false);
    if has_body {
        write_error_response(stream, 413).await?;
        return Err(Error::Invalid("upgrade request carries a body".into()));
    }

    // 4. Upgrade: websocket.
    let upgrade_ok = find("upgrade")
        .map(|v| util::contains_word(&v, "websocket"))
        .unwrap_or(false);
    if !upgrade_ok {
        write_error_response(stream, 400).await?;
        return Err(Error::Proto);
    }

    // 5. Connection: Upgrade.
    let connection_ok = find("connection")
        .map(|v| util::contains_word(&v, "upgrade"))
        .unwrap_or(false);
    if !connection_ok {
        write_error_response(stream, 400).await?;
        return Err(Error::Proto);
    }

    // 6. Sec-WebSocket-Version: 13.
    if find("sec-websocket-version").as_deref() != Some("13") {
        write_error_response(stream, 400).await?;
        return Err(Error::Proto);
    }

    // 7. Sec-WebSocket-Key well-formed.
    let client_key = match find("sec-websocket-key") {
        Some(k) if util::validate_client_key(&k) => k.trim().to_string(),
        _ => {
            write_error_response(stream, 400).await?;
            return Err(Error::Invalid("missing or invalid Sec-WebSocket-Key".into()));
        }
    };

    // 8. Subprotocol negotiation.
    let requested_proto = find("sec-websocket-protocol");
    let negotiated = match (&config.subprotocol, &requested_proto) {
        (Some(configured), Some(requested)) => {
            let matched = requested
                .split(',')
                .map(|t| t.trim())
                .any(|t| configured.split([',', ' ']).any(|c| c.eq_ignore_ascii_case(t)));
            if !matched {
                write_error_response(stream, 400).await?;
                return Err(Error::Proto);
            }
            Some(configured.clone())
        }
        (None, None) => None,
        _ => {
            write_error_response(stream, 400).await?;
            return Err(Error::Proto);
        }
    };

    if path != registered_path {
        write_error_response(stream, 404).await?;
        return Err(Error::Refused);
    }

    let server_request = ServerRequest {
        method: "GET".to_string(),
        path,
        headers,
    };

    if let Some(hook) = &config.hook {
        match hook(&server_request) {
            HookOutcome::Accept => {}
            HookOutcome::Reject(status) => {
                write_error_response(stream, status).await?;
                return Err(Error::Perm);
            }
        }
    }

    let accept = util::accept_key(&client_key);
    let mut response = format!(
        "HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: websocket\r\nSec-WebSocket-Accept: {accept}\r\n"
    );
    if let Some(proto) = &negotiated {
        response.push_str(&format!("Sec-WebSocket-Protocol: {proto}\r\n"));
    }
    response.push_str("\r\n");
    stream.write_all(response.as_bytes()).await?;

    Ok(negotiated)
}

/// Build the upgrade request, send it, and validate the 101 reply. Returns
/// the negotiated subprotocol (if any).
pub async fn perform_client_handshake<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    host: &str,
    path_and_query: &str,
    config: &DialerConfig,
) -> Result<Option<String>> {
    let client_key = util::generate_client_key();

    let mut request = format!(
        "GET {path_and_query} HTTP/1.1\r\nHost: {host}\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: {client_key}\r\nSec-WebSocket-Version: 13\r\n"
    );
    if let Some(proto) = &config.subprotocol {
        request.push_str(&format!("Sec-WebSocket-Protocol: {proto}\r\n"));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await?;

    let raw = read_header_block(stream).await?;
    let mut headers_buf = [httparse::EMPTY_HEADER; 64];
    let mut resp = httparse::Response::new(&mut headers_buf);
    let status = resp.parse(&raw)?;
    if status.is_partial() {
        return Err(Error::Invalid("incomplete HTTP response".into()));
    }

    let code = resp.code.unwrap_or(0);
    if code != 101 {
        return Err(match code {
            401 | 403 => Error::Perm,
            404 | 405 => Error::Refused,
            _ => Error::Proto,
        });
    }

    let find = |name: &str| -> Option<String> {
        resp.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| String::from_utf8_lossy(h.value).into_owned())
    };

    let connection_ok = find("connection")
        .map(|v| util::contains_word(&v, "upgrade"))
        .unwrap_or(false);
    let upgrade_ok = find("upgrade")
        .map(|v| v.trim().eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    let accept_ok = find("sec-websocket-accept")
        .map(|v| v.trim() == util::accept_key(&client_key))
        .unwrap_or(false);

    if !connection_ok || !upgrade_ok || !accept_ok {
        send_protocol_error_close(stream).await;
        return Err(Error::Proto);
    }

    let negotiated = find("sec-websocket-protocol");
    if let Some(requested) = &config.subprotocol {
        match &negotiated {
            Some(n) if requested.split([',', ' ']).any(|t| t.eq_ignore_ascii_case(n)) => {}
            _ => {
                send_protocol_error_close(stream).await;
                return Err(Error::Proto);
            }
        }
    }

    Ok(negotiated)
}

/// A 101 response that fails WebSocket-specific validation has already
/// entered framing mode as far as the peer is concerned, so the dialer
/// answers with a masked close(1002) frame rather than just dropping the
/// socket.
async fn send_protocol_error_close<S: AsyncWrite + Unpin>(stream: &mut S) {
    use crate::frame::{Frame, Role};
    let _ = Frame::close(1002).write(Role::Dialer, stream).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request(extra_headers: &str) -> Vec<u8> {
        format!(
            "GET /test HTTP/1.1\r\nHost: example.com\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n{extra_headers}\r\n"
        )
        .into_bytes()
    }

    /// Drives `perform_server_handshake` over an in-memory duplex pipe and
    /// returns its result alongside whatever bytes it wrote back.
    async fn run_server_handshake(
        request: Vec<u8>,
        path: &str,
        config: ListenerConfig,
    ) -> (Result<Option<String>>, Vec<u8>) {
        let (mut client, mut server) = tokio::io::duplex(8192);
        let client_task = tokio::spawn(async move {
            client.write_all(&request).await.unwrap();
            client.shutdown().await.unwrap();
            let mut response = Vec::new();
            client.read_to_end(&mut response).await.unwrap();
            response
        });
        let result = perform_server_handshake(&mut server, path, &config).await;
        drop(server);
        let response = client_task.await.unwrap();
        (result, response)
    }

    #[tokio::test]
    async fn accepts_well_formed_upgrade_request() {
        let (result, response) =
            run_server_handshake(make_request(""), "/test", ListenerConfig::default()).await;
        assert!(result.is_ok());
        let response = String::from_utf8_lossy(&response);
        assert!(response.contains("101 Switching Protocols"));
        assert!(response.contains("s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));
    }

    #[tokio::test]
    async fn rejects_missing_websocket_key() {
        let request = b"GET /test HTTP/1.1\r\nHost: example.com\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Version: 13\r\n\r\n".to_vec();
        let (result, _) = run_server_handshake(request, "/test", ListenerConfig::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn rejects_path_mismatch_with_refused() {
        let (result, _) =
            run_server_handshake(make_request(""), "/nothere", ListenerConfig::default()).await;
        assert!(matches!(result, Err(Error::Refused)));
    }

    #[tokio::test]
    async fn rejects_request_with_body() {
        let (result, response) = run_server_handshake(
            make_request("Content-Length: 5\r\n"),
            "/test",
            ListenerConfig::default(),
        )
        .await;
        assert!(result.is_err());
        assert!(String::from_utf8_lossy(&response).contains("413"));
    }

    #[tokio::test]
    async fn rejects_wrong_http_version() {
        let request = b"GET /test HTTP/1.0\r\nHost: example.com\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n".to_vec();
        let (result, response) =
            run_server_handshake(request, "/test", ListenerConfig::default()).await;
        assert!(result.is_err());
        assert!(String::from_utf8_lossy(&response).contains("505"));
    }
}
