//! Signed HTTP client for control-plane operations

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, Url};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::resolver::{AddressResolver, Resolve};

/// Header carrying the short-lived site-restricted auth token.
pub const SITE_RESTRICTED_TOKEN_HEADER: &str = "x-ms-site-restricted-token";
/// Header carrying the caller-supplied correlation id.
pub const REQUEST_ID_HEADER: &str = "x-ms-request-id";

/// Product/version identifier sent on every outbound request.
const USER_AGENT: &str = concat!("deploy-harness/", env!("CARGO_PKG_VERSION"));
/// Validity window for signed request tokens.
const TOKEN_VALIDITY: Duration = Duration::from_secs(5 * 60);

/// Signs short-lived tokens for site-restricted control-plane calls.
///
/// The token cryptography is a collaborator concern; implementations only
/// need to honor the requested validity window.
pub trait TokenSigner: Send + Sync {
    /// Produce a token valid for `validity` from now
    fn sign(&self, validity: Duration) -> std::result::Result<String, String>;
}

/// Connection settings for the control-plane endpoint
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Public host name of the site's management endpoint
    pub host_name: String,
    /// Explicit authority when running against a local development endpoint;
    /// forces plain HTTP
    pub local_authority: Option<String>,
    /// Home stamp identity used for fallback address derivation
    pub home_stamp: Option<String>,
    /// When false, certificate validation is skipped and plain HTTP is used
    pub validate_ssl: bool,
}

/// Builds and sends signed requests to the control-plane host.
///
/// HTTP clients are not reused across calls; each request gets a fresh,
/// scoped client so connection state cannot leak between operations.
pub struct ControlPlaneClient {
    config: ClientConfig,
    resolver: Arc<dyn Resolve>,
    signer: Arc<dyn TokenSigner>,
}

impl ControlPlaneClient {
    /// Create a client resolving hosts through the standard [`AddressResolver`]
    pub fn new(config: ClientConfig, signer: Arc<dyn TokenSigner>) -> Self {
        let resolver = Arc::new(AddressResolver::new(config.home_stamp.clone()));
        Self::with_resolver(config, signer, resolver)
    }

    /// Create a client with an explicit resolver seam
    pub fn with_resolver(
        config: ClientConfig,
        signer: Arc<dyn TokenSigner>,
        resolver: Arc<dyn Resolve>,
    ) -> Self {
        Self {
            config,
            resolver,
            signer,
        }
    }

    /// Base URL of the management endpoint: plain HTTP against a local
    /// development authority, otherwise HTTPS unless SSL validation is
    /// explicitly disabled.
    fn base_url(&self) -> String {
        if let Some(authority) = &self.config.local_authority {
            format!("http://{authority}")
        } else if self.config.validate_ssl {
            format!("https://{}", self.config.host_name)
        } else {
            format!("http://{}", self.config.host_name)
        }
    }

    /// POST an operation path under the site's management endpoint
    pub async fn post(&self, path: &str, request_id: &str, body: Option<Value>) -> Result<()> {
        let url = format!("{}{}", self.base_url(), path);
        self.send(Method::POST, &url, request_id, body).await
    }

    /// PUT a JSON document to an absolute external URL
    pub async fn put(&self, url: &str, request_id: &str, body: Value) -> Result<()> {
        self.send(Method::PUT, url, request_id, Some(body)).await
    }

    /// GET an absolute URL
    pub async fn get(&self, url: &str, request_id: &str) -> Result<()> {
        self.send(Method::GET, url, request_id, None).await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        request_id: &str,
        body: Option<Value>,
    ) -> Result<()> {
        let parsed = Url::parse(url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| Error::InvalidUrl(format!("no host in {url}")))?
            .to_string();

        let mut builder = Client::builder().user_agent(USER_AGENT);
        if !self.config.validate_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }
        // Numeric authorities resolve trivially; only consult the resolver
        // for real host names. A fallback address pins the connection target
        // while the URL keeps the hostname, so the Host header (and SNI)
        // still carry the original authority for virtual-host routing.
        if parsed.domain().is_some() {
            if let Some(addr) = self.resolver.resolve(&host).await {
                debug!(%host, %addr, "using fallback address for unresolvable host");
                builder = builder.resolve(&host, SocketAddr::new(addr, 0));
            }
        }
        let client = builder.build()?;

        let token = self.signer.sign(TOKEN_VALIDITY).map_err(Error::Token)?;
        let mut request = client
            .request(method.clone(), parsed)
            .header(SITE_RESTRICTED_TOKEN_HEADER, token)
            .header(REQUEST_ID_HEADER, request_id);
        if let Some(body) = body {
            request = request.json(&body);
        }

        debug!(%method, %url, %request_id, "sending control-plane request");
        let outcome = match request.send().await {
            Ok(response) => {
                let status = response.status();
                debug!(%method, %url, %status, "control-plane request completed");
                if status.is_success() {
                    Ok(())
                } else {
                    Err(Error::UnexpectedStatus {
                        method: method.to_string(),
                        url: url.to_string(),
                        status,
                    })
                }
            }
            Err(e) => Err(Error::Transport(e)),
        };

        // Outcome summary runs on both paths before the result propagates.
        match &outcome {
            Ok(()) => info!(%method, %url, "control-plane call succeeded"),
            Err(e) => info!(%method, %url, error = %e, "control-plane call failed"),
        }
        outcome
    }
}
