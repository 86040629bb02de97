//! `reqwest` binding for [`Endpoint`].

use super::{CallOptions, CallType, Endpoint, Response};
use crate::errors::CollaboratorError;
use async_trait::async_trait;
use std::time::Duration;

/// Calls a real data-plane listener over HTTP(S).
///
/// The listener is reached by address and the target host is carried in the
/// `Host` header, so routing is exercised without DNS.
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    client: reqwest::Client,
}

impl HttpEndpoint {
    /// Creates an endpoint with a per-call timeout.
    pub fn new(timeout: Duration) -> Result<Self, CollaboratorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| CollaboratorError::Transport {
                address: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }

    fn url(options: &CallOptions) -> String {
        let scheme = match options.call_type {
            CallType::PlainText => "http",
            CallType::Tls => "https",
        };
        format!("{scheme}://{}{}", options.address, options.path)
    }
}

#[async_trait]
impl Endpoint for HttpEndpoint {
    async fn call(&self, options: &CallOptions) -> Result<Response, CollaboratorError> {
        let transport = |e: reqwest::Error| CollaboratorError::Transport {
            address: options.address.clone(),
            message: e.to_string(),
        };

        let response = self
            .client
            .get(Self::url(options))
            .header(reqwest::header::HOST, options.host.as_str())
            .send()
            .await
            .map_err(transport)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport)?;

        Ok(Response::new(status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_uses_address_and_scheme() {
        let options = CallOptions::plain_text("server", "/get", "127.0.0.1:8080");
        assert_eq!(HttpEndpoint::url(&options), "http://127.0.0.1:8080/get");

        let options = options.with_call_type(CallType::Tls);
        assert_eq!(HttpEndpoint::url(&options), "https://127.0.0.1:8080/get");
    }

    #[tokio::test]
    async fn test_host_header_and_response_mapping() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let body = "backend=server";
            let response = format!(
                "HTTP/1.1 418 I'm a teapot\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).to_ascii_lowercase()
        });

        let endpoint = HttpEndpoint::new(Duration::from_secs(5)).unwrap();
        let response = endpoint
            .call(&CallOptions::plain_text("my.domain.example", "/get", address))
            .await
            .unwrap();
        let request = server.await.unwrap();

        assert_eq!(response, Response::new(418, "backend=server"));
        assert!(request.starts_with("get /get http/1.1\r\n"), "{request}");
        assert!(request.contains("\r\nhost: my.domain.example\r\n"), "{request}");
        assert_eq!(request.matches("\r\nhost:").count(), 1, "{request}");
    }

    #[tokio::test]
    async fn test_unreachable_address_is_transport_error() {
        let endpoint = HttpEndpoint::new(Duration::from_millis(200)).unwrap();
        let options = CallOptions::plain_text("server", "/", "127.0.0.1:1");

        let result = endpoint.call(&options).await;
        assert!(matches!(result, Err(CollaboratorError::Transport { .. })));
    }
}
