//! Instrumented hyper client wiring the taps onto real traffic
//!
//! This is the transport boundary: requests are created here with their
//! head resolved at send time (scheme, host, injected `host` header), the
//! writable body is the request tap, and arriving responses are wrapped by
//! the response tap. The capture core never originates network I/O itself.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use hyper::header::HeaderMap;
use hyper::{Method, Request, Uri};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::{Connect, HttpConnector};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{Result, TapError};
use crate::interceptor::Interceptor;
use crate::record::{headers_to_pairs, RequestHead, Scheme};
use crate::tap::{tap_response, CapturedBody, ChannelBody, RequestBodyWriter};

/// HTTP client whose requests are observed by an [`Interceptor`].
///
/// While the interceptor is enabled every request gets a request tap and a
/// response tap; while disabled requests pass through with no taps
/// installed. The caller-visible behavior is identical either way.
pub struct CapturedClient<C = HttpConnector> {
    client: Client<C, ChannelBody>,
    interceptor: Interceptor,
}

impl CapturedClient<HttpConnector> {
    /// Plaintext client with default pool tuning
    #[must_use]
    pub fn http(interceptor: Interceptor) -> Self {
        Self::http_with(interceptor, &ClientConfig::default())
    }

    /// Plaintext client with explicit pool tuning
    #[must_use]
    pub fn http_with(interceptor: Interceptor, config: &ClientConfig) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build_http();

        Self {
            client,
            interceptor,
        }
    }
}

impl CapturedClient<HttpsConnector<HttpConnector>> {
    /// TLS-capable client (also serves plaintext URLs) with default tuning
    ///
    /// # Errors
    ///
    /// Returns error if the native root certificate store cannot be loaded
    pub fn https(interceptor: Interceptor) -> Result<Self> {
        Self::https_with(interceptor, &ClientConfig::default())
    }

    /// TLS-capable client with explicit pool tuning
    ///
    /// # Errors
    ///
    /// Returns error if the native root certificate store cannot be loaded
    pub fn https_with(interceptor: Interceptor, config: &ClientConfig) -> Result<Self> {
        let connector = HttpsConnectorBuilder::new()
            .with_native_roots()?
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build(connector);

        Ok(Self {
            client,
            interceptor,
        })
    }
}

impl<C> CapturedClient<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    /// The controller observing this client
    #[must_use]
    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    /// Begin a request with a streaming body.
    ///
    /// Returns the body writer and a future resolving to the response once
    /// headers arrive. The writer must be ended (explicitly or by drop) for
    /// the request to complete on the wire.
    ///
    /// # Errors
    ///
    /// Returns error if the method, URL, or headers are invalid
    pub fn start(
        &self,
        method: &str,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<(
        RequestBodyWriter,
        impl Future<Output = Result<hyper::Response<CapturedBody>>> + Send,
    )> {
        let method = method
            .parse::<Method>()
            .map_err(|e| TapError::InvalidRequest(format!("invalid method: {e}")))?;
        let uri = url
            .parse::<Uri>()
            .map_err(|e| TapError::InvalidRequest(format!("invalid url '{url}': {e}")))?;

        let mut builder = Request::builder().method(method.clone()).uri(uri.clone());
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        // The transport injects a host header when the caller supplied
        // none; do it before capture so the final header set is observed.
        if !headers.iter().any(|(n, _)| n.eq_ignore_ascii_case("host")) {
            let scheme = resolve_scheme(&uri)?;
            builder = builder.header(hyper::header::HOST, resolve_host(&uri, scheme)?);
        }

        let exchange = if self.interceptor.is_enabled() {
            let header_map = builder.headers_ref().ok_or_else(|| {
                TapError::InvalidRequest("invalid header name or value".to_string())
            })?;
            let mut head = resolve_head(method.as_str(), &uri, header_map)?;
            // The channel-backed body has no known length, so the transport
            // frames it as chunked unless the caller fixed the framing;
            // the capture must carry that injected header too.
            if head.header("content-length").is_none()
                && head.header("transfer-encoding").is_none()
            {
                head.headers
                    .push(("transfer-encoding".to_string(), "chunked".to_string()));
            }
            debug!(method = %head.method, host = %head.host, path = %head.path, "tapping request");
            self.interceptor.begin_exchange(head)
        } else {
            None
        };

        let (writer, body) = ChannelBody::channel(exchange.clone());
        let request = builder
            .body(body)
            .map_err(|e| TapError::InvalidRequest(e.to_string()))?;

        let client = self.client.clone();
        let response_future = async move {
            match client.request(request).await {
                Ok(response) => Ok(match exchange {
                    Some(exchange) => tap_response(response, exchange),
                    None => response.map(CapturedBody::direct),
                }),
                Err(e) => {
                    if let Some(exchange) = &exchange {
                        exchange.fail();
                    }
                    Err(TapError::Transport(e.to_string()))
                }
            }
        };

        Ok((writer, response_future))
    }

    /// Send a request with a fully buffered body.
    ///
    /// The body length is known up front, so the request goes out with an
    /// explicit `content-length` instead of chunked framing.
    ///
    /// # Errors
    ///
    /// Returns error if the request is invalid or the transport fails
    pub async fn send(
        &self,
        method: &str,
        url: &str,
        headers: &[(&str, &str)],
        body: impl Into<Bytes>,
    ) -> Result<hyper::Response<CapturedBody>> {
        let body = body.into();
        let length = body.len().to_string();
        let mut headers = headers.to_vec();
        if !headers.iter().any(|(n, _)| {
            n.eq_ignore_ascii_case("content-length") || n.eq_ignore_ascii_case("transfer-encoding")
        }) {
            headers.push(("content-length", length.as_str()));
        }

        let (mut writer, response) = self.start(method, url, &headers)?;
        if body.is_empty() {
            writer.end();
        } else {
            writer.end_with(body);
        }
        response.await
    }
}

/// Request head as resolved at send time: scheme and host filled in from
/// the URI, headers as they will actually be transmitted.
fn resolve_head(method: &str, uri: &Uri, headers: &HeaderMap) -> Result<RequestHead> {
    let scheme = resolve_scheme(uri)?;
    Ok(RequestHead {
        method: method.to_string(),
        scheme,
        host: resolve_host(uri, scheme)?,
        path: uri
            .path_and_query()
            .map_or_else(|| "/".to_string(), |pq| pq.as_str().to_string()),
        headers: headers_to_pairs(headers),
    })
}

fn resolve_scheme(uri: &Uri) -> Result<Scheme> {
    match uri.scheme_str() {
        Some("https") => Ok(Scheme::Https),
        Some("http") | None => Ok(Scheme::Http),
        Some(other) => Err(TapError::InvalidRequest(format!(
            "unsupported scheme '{other}'"
        ))),
    }
}

/// Host with the port elided when it is the scheme default
fn resolve_host(uri: &Uri, scheme: Scheme) -> Result<String> {
    let authority = uri
        .authority()
        .ok_or_else(|| TapError::InvalidRequest(format!("url '{uri}' has no host")))?;

    let host = authority.host();
    Ok(match uri.port_u16() {
        Some(port) if port != scheme.default_port() => format!("{host}:{port}"),
        _ => host.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head_for(url: &str) -> RequestHead {
        let uri: Uri = url.parse().unwrap();
        resolve_head("GET", &uri, &HeaderMap::new()).unwrap()
    }

    #[test]
    fn resolves_scheme_host_and_path() {
        let head = head_for("http://example.com/a/b?q=1");
        assert_eq!(head.scheme, Scheme::Http);
        assert_eq!(head.host, "example.com");
        assert_eq!(head.path, "/a/b?q=1");
    }

    #[test]
    fn default_ports_are_elided() {
        assert_eq!(head_for("http://example.com:80/").host, "example.com");
        assert_eq!(head_for("https://example.com:443/").host, "example.com");
    }

    #[test]
    fn non_default_ports_are_kept() {
        assert_eq!(head_for("http://example.com:8080/").host, "example.com:8080");
        assert_eq!(head_for("https://example.com:80/").host, "example.com:80");
    }

    #[test]
    fn empty_path_becomes_root() {
        assert_eq!(head_for("http://example.com").path, "/");
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        let uri: Uri = "ftp://example.com/".parse().unwrap();
        assert!(matches!(
            resolve_head("GET", &uri, &HeaderMap::new()),
            Err(TapError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn start_rejects_invalid_input() {
        let client = CapturedClient::http(Interceptor::new());
        assert!(client.start("NOT A METHOD", "http://example.com/", &[]).is_err());
        assert!(client.start("GET", "not a url", &[]).is_err());
    }
}
