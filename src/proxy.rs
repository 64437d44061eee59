//! Network paths and session rotation.
//!
//! A [`SessionProvider`] owns one current [`NetworkPath`] and the
//! `reqwest::Client` bound to it. Rotation rebuilds the client with a new
//! identity (User-Agent, proxy session id, cookie jar) on the same path;
//! changing the path itself goes through [`SessionProvider::configure`].

use crate::cookies::{seed_jar, Cookie};
use crate::error::{Result, ScholarError};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, Proxy, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Liveness probe used for proxy paths
pub const DEFAULT_PROBE_URL: &str = "http://httpbin.org/ip";

/// Account status endpoint for the authenticated gateway
pub const DEFAULT_ACCOUNT_URL: &str = "http://api.scraperapi.com/account";

const ROTATING_PROXY_HOST: &str = "zproxy.lum-superproxy.io";
const GATEWAY_PROXY_HOST: &str = "proxy-server.scraperapi.com";
const GATEWAY_PROXY_PORT: u16 = 8001;

/// The gateway renders pages server side and asks for a minute per request
const GATEWAY_TIMEOUT: Duration = Duration::from_secs(60);

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Desktop browser signatures picked from on every rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36 Edg/130.0.0.0",
];

/// Pick a random desktop User-Agent
pub fn random_user_agent() -> &'static str {
    let idx = rand::thread_rng().gen_range(0..USER_AGENTS.len());
    USER_AGENTS[idx]
}

fn new_session_id() -> u64 {
    rand::thread_rng().gen()
}

/// Mode tag of a network path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyMode {
    /// Direct connection
    None,
    /// One fixed HTTP(S) proxy
    SingleProxy,
    /// Commercial super-proxy that hands out a new exit per session id
    RotatingProxy,
    /// Commercial scraping gateway authenticated with an API key
    AuthenticatedGateway,
}

/// Parameters describing how to reach the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathDescriptor {
    Direct,
    SingleProxy {
        http: String,
        /// Defaults to `http` when absent
        https: Option<String>,
    },
    RotatingProxy {
        username: String,
        password: String,
        port: u16,
    },
    AuthenticatedGateway {
        api_key: String,
        country_code: Option<String>,
        premium: bool,
        render: bool,
    },
}

impl PathDescriptor {
    pub fn mode(&self) -> ProxyMode {
        match self {
            PathDescriptor::Direct => ProxyMode::None,
            PathDescriptor::SingleProxy { .. } => ProxyMode::SingleProxy,
            PathDescriptor::RotatingProxy { .. } => ProxyMode::RotatingProxy,
            PathDescriptor::AuthenticatedGateway { .. } => ProxyMode::AuthenticatedGateway,
        }
    }

    /// Reject parameters that can never work, without touching the network
    pub fn validate(&self) -> Result<()> {
        match self {
            PathDescriptor::Direct => Ok(()),
            PathDescriptor::SingleProxy { http, .. } => {
                if http.trim().is_empty() {
                    return Err(ScholarError::Config("Proxy URL must not be empty".to_string()));
                }
                Ok(())
            }
            PathDescriptor::RotatingProxy {
                username,
                password,
                port,
            } => {
                if username.is_empty() || password.is_empty() || *port == 0 {
                    return Err(ScholarError::Config(
                        "Rotating proxy needs username, password and port".to_string(),
                    ));
                }
                Ok(())
            }
            PathDescriptor::AuthenticatedGateway { api_key, .. } => {
                if api_key.trim().is_empty() {
                    return Err(ScholarError::Config("Gateway API key is required".to_string()));
                }
                Ok(())
            }
        }
    }

    /// Where to send proxied traffic, `None` for direct connections
    fn proxy_endpoint(&self, session_id: u64) -> Option<ProxyEndpoint> {
        match self {
            PathDescriptor::Direct => None,
            PathDescriptor::SingleProxy { http, https } => {
                let http = with_scheme(http);
                let https = https.as_deref().map(with_scheme).unwrap_or_else(|| http.clone());
                Some(ProxyEndpoint {
                    http,
                    https,
                    credentials: None,
                })
            }
            PathDescriptor::RotatingProxy {
                username,
                password,
                port,
            } => Some(ProxyEndpoint::shared(
                format!("http://{}:{}", ROTATING_PROXY_HOST, port),
                format!("{}-session-{}", username, session_id),
                password.clone(),
            )),
            PathDescriptor::AuthenticatedGateway {
                api_key,
                country_code,
                premium,
                render,
            } => {
                let mut user = String::from("scraperapi.retry_404=true");
                if let Some(cc) = country_code {
                    user.push_str(&format!(".country_code={}", cc));
                }
                if *premium {
                    user.push_str(".premium=true");
                }
                if *render {
                    user.push_str(".render=true");
                }
                Some(ProxyEndpoint::shared(
                    format!("http://{}:{}", GATEWAY_PROXY_HOST, GATEWAY_PROXY_PORT),
                    user,
                    api_key.clone(),
                ))
            }
        }
    }
}

/// Proxy URLs for http and https traffic.
///
/// Credentials travel as basic auth, never inside the URL.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ProxyEndpoint {
    http: String,
    https: String,
    credentials: Option<(String, String)>,
}

impl ProxyEndpoint {
    fn shared(url: String, username: String, password: String) -> Self {
        Self {
            https: url.clone(),
            http: url,
            credentials: Some((username, password)),
        }
    }

    fn proxies(&self) -> Result<(Proxy, Proxy)> {
        let invalid = |e: reqwest::Error| ScholarError::Config(format!("Invalid proxy URL: {}", e));
        let mut http = Proxy::http(self.http.as_str()).map_err(invalid)?;
        let mut https = Proxy::https(self.https.as_str()).map_err(invalid)?;
        if let Some((user, pass)) = &self.credentials {
            http = http.basic_auth(user, pass);
            https = https.basic_auth(user, pass);
        }
        Ok((http, https))
    }
}

fn with_scheme(url: &str) -> String {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") || url.starts_with("socks") {
        url.to_string()
    } else {
        format!("http://{}", url)
    }
}

/// A path plus whether its liveness check passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPath {
    pub descriptor: PathDescriptor,
    pub verified: bool,
}

impl NetworkPath {
    pub fn direct() -> Self {
        Self {
            descriptor: PathDescriptor::Direct,
            verified: false,
        }
    }

    pub fn mode(&self) -> ProxyMode {
        self.descriptor.mode()
    }
}

/// Endpoints used to validate a path before adopting it
#[derive(Debug, Clone)]
pub struct ProbeEndpoints {
    pub probe_url: String,
    pub account_url: String,
}

impl Default for ProbeEndpoints {
    fn default() -> Self {
        Self {
            probe_url: DEFAULT_PROBE_URL.to_string(),
            account_url: DEFAULT_ACCOUNT_URL.to_string(),
        }
    }
}

struct ProviderState {
    path: NetworkPath,
    session_id: u64,
    client: Option<Client>,
    rotations: u64,
}

/// Owns the current network path and the client bound to it.
pub struct SessionProvider {
    endpoints: ProbeEndpoints,
    cookies: Vec<Cookie>,
    state: Mutex<ProviderState>,
}

impl Default for SessionProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionProvider {
    /// Direct connection, default probe endpoints, no cookies
    pub fn new() -> Self {
        Self::with_endpoints(ProbeEndpoints::default())
    }

    pub fn with_endpoints(endpoints: ProbeEndpoints) -> Self {
        Self {
            endpoints,
            cookies: Vec::new(),
            state: Mutex::new(ProviderState {
                path: NetworkPath::direct(),
                session_id: new_session_id(),
                client: None,
                rotations: 0,
            }),
        }
    }

    /// Seed every client this provider builds with `cookies`
    pub fn with_cookies(mut self, cookies: Vec<Cookie>) -> Self {
        self.cookies = cookies;
        self
    }

    fn state(&self) -> MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current_path(&self) -> NetworkPath {
        self.state().path.clone()
    }

    pub fn mode(&self) -> ProxyMode {
        self.state().path.mode()
    }

    /// True once a proxy path passed validation
    pub fn has_proxy(&self) -> bool {
        let state = self.state();
        state.path.verified && state.path.mode() != ProxyMode::None
    }

    /// Number of identity rotations performed on this provider
    pub fn rotations(&self) -> u64 {
        self.state().rotations
    }

    /// Per-request timeout the current path needs at minimum
    pub fn recommended_timeout(&self) -> Option<Duration> {
        match self.mode() {
            ProxyMode::AuthenticatedGateway => Some(GATEWAY_TIMEOUT),
            _ => None,
        }
    }

    /// Validate `descriptor` and adopt it when it works.
    ///
    /// Invalid parameters are a [`ScholarError::Config`]. A path that fails its
    /// probe yields `Ok(false)` and leaves the current path untouched, so the
    /// caller can keep going unproxied.
    pub async fn configure(&self, descriptor: PathDescriptor) -> Result<bool> {
        descriptor.validate()?;
        let mode = descriptor.mode();
        let session_id = new_session_id();

        let works = match &descriptor {
            PathDescriptor::Direct => true,
            PathDescriptor::AuthenticatedGateway { api_key, .. } => {
                self.check_account(api_key).await
            }
            _ => {
                let client = self.build_client(&descriptor, session_id)?;
                self.probe(&client, mode).await
            }
        };

        if !works {
            warn!(mode = ?mode, "Unable to set up network path, keeping the current one");
            return Ok(false);
        }

        let mut state = self.state();
        state.path = NetworkPath {
            descriptor,
            verified: true,
        };
        state.session_id = session_id;
        state.client = None;
        info!(mode = ?mode, "Network path set up successfully");
        Ok(true)
    }

    /// Current client, built on first use
    pub fn client(&self) -> Result<Client> {
        let mut state = self.state();
        if let Some(client) = &state.client {
            return Ok(client.clone());
        }
        let client = self.build_client(&state.path.descriptor, state.session_id)?;
        state.client = Some(client.clone());
        Ok(client)
    }

    /// Drop the current client and build one with a fresh identity on the same path
    pub fn rotate(&self) -> Result<Client> {
        let mut state = self.state();
        state.client = None;
        if state.path.mode() == ProxyMode::RotatingProxy {
            state.session_id = new_session_id();
        }
        let client = self.build_client(&state.path.descriptor, state.session_id)?;
        state.client = Some(client.clone());
        state.rotations += 1;
        debug!(rotations = state.rotations, mode = ?state.path.mode(), "Rotated session");
        Ok(client)
    }

    fn build_client(&self, descriptor: &PathDescriptor, session_id: u64) -> Result<Client> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml"),
        );

        let mut builder = Client::builder()
            .user_agent(random_user_agent())
            .default_headers(headers)
            .cookie_provider(Arc::new(seed_jar(&self.cookies)));

        match descriptor.proxy_endpoint(session_id) {
            Some(endpoint) => {
                let (http_proxy, https_proxy) = endpoint.proxies()?;
                builder = builder.proxy(http_proxy).proxy(https_proxy);
            }
            // ignore HTTP_PROXY and friends
            None => builder = builder.no_proxy(),
        }

        if descriptor.mode() == ProxyMode::AuthenticatedGateway {
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder
            .build()
            .map_err(|e| ScholarError::Config(format!("Failed to build HTTP client: {}", e)))
    }

    async fn probe(&self, client: &Client, mode: ProxyMode) -> bool {
        let response = client
            .get(&self.endpoints.probe_url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status() == StatusCode::OK => {
                let origin = resp
                    .json::<serde_json::Value>()
                    .await
                    .ok()
                    .and_then(|v| v.get("origin").and_then(|o| o.as_str()).map(String::from))
                    .unwrap_or_default();
                info!(ip = %origin, "Proxy works");
                true
            }
            Ok(resp) if resp.status() == StatusCode::UNAUTHORIZED => {
                warn!("Incorrect credentials for proxy");
                false
            }
            Ok(resp) => {
                warn!(status = resp.status().as_u16(), "Proxy probe failed");
                false
            }
            Err(e) => {
                warn!(error = %e, "Exception while testing proxy");
                if mode == ProxyMode::RotatingProxy {
                    warn!("Double check your credentials and try increasing the timeout");
                }
                false
            }
        }
    }

    async fn check_account(&self, api_key: &str) -> bool {
        let client = match Client::builder().timeout(GATEWAY_TIMEOUT).no_proxy().build() {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "Failed to build account check client");
                return false;
            }
        };

        let response = client
            .get(&self.endpoints.account_url)
            .query(&[("api_key", api_key)])
            .send()
            .await;

        let account: serde_json::Value = match response {
            Ok(resp) => match resp.json().await {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "Unreadable gateway account status");
                    return false;
                }
            },
            Err(e) => {
                warn!(error = %e, "Error checking gateway account");
                return false;
            }
        };

        if let Some(err) = account.get("error") {
            warn!(error = %err, "Gateway rejected the API key");
            return false;
        }

        let count = account.get("requestCount").and_then(|v| v.as_u64()).unwrap_or(0);
        let limit = account.get("requestLimit").and_then(|v| v.as_u64()).unwrap_or(0);
        info!(requests = count, limit, "Gateway account active");
        if limit > 0 && count >= limit {
            warn!("Gateway account limit reached");
        }
        true
    }
}
