//! Client facade with builder pattern.
//!
//! Binds the loopback listener, launches the engine, accepts its
//! connection and starts the dispatch loop. Each request call registers a
//! fresh correlation token, writes one frame and returns immediately with a
//! [`PendingResponse`].
//!
//! # Example
//!
//! ```rust,ignore
//! use turbonet::{Client, bridge::EngineCommand};
//!
//! let client = Client::builder("https://example.com")
//!     .launcher(EngineCommand::turbo_intruder("/opt/turbo")?)
//!     .build()
//!     .await?;
//!
//! let pending = client.get("/").query(&[("q", "rust")]).send().await?;
//! let resp = pending.timeout(Duration::from_secs(30)).await?;
//! println!("{} {}", resp.status(), resp.text());
//! ```

use crate::base::neterror::NetError;
use crate::bridge::dispatch::{DispatchStats, Dispatcher};
use crate::bridge::engine::{EngineConfig, EngineHandle, EngineLauncher, LaunchContext};
use crate::bridge::message::{HttpVersion, RequestDescriptor};
use crate::bridge::registry::{PendingRegistry, PendingResponse, TokenGenerator};
use crate::bridge::transport::{EngineListener, TransportWriter};
use crate::http::orderedheaders::OrderedHeaderMap;
use crate::http::requestbody::RequestBody;
use http::Method;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use url::Url;

/// User agent sent unless overridden.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/116.0.0.0 Safari/537.36";

/// How long the engine gets to connect back after launch. JVM start-up and
/// warm-up are slow.
pub const DEFAULT_ACCEPT_TIMEOUT: Duration = Duration::from_secs(60);

/// Bridge client.
///
/// Cheap to clone; clones share the engine connection. The engine is
/// terminated by [`Client::close`] or when the last clone is dropped.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    base_url: Url,
    default_headers: OrderedHeaderMap,
    version: HttpVersion,
    registry: Arc<PendingRegistry>,
    tokens: TokenGenerator,
    writer: TransportWriter,
    dispatch: Mutex<Option<JoinHandle<Result<DispatchStats, NetError>>>>,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    engine: Mutex<Option<Box<dyn EngineHandle>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.dispatch).take() {
            handle.abort();
        }
        if let Some(mut engine) = lock(&self.engine).take() {
            engine.terminate();
        }
        self.registry.mark_closed();
    }
}

impl Client {
    /// Create a new client builder for requests against `base_url`.
    pub fn builder<U: AsRef<str>>(base_url: U) -> ClientBuilder {
        ClientBuilder::new(base_url.as_ref())
    }

    /// Start building a GET request.
    pub fn get<E: AsRef<str>>(&self, endpoint: E) -> RequestBuilder {
        self.request(Method::GET, endpoint)
    }

    /// Start building a POST request.
    pub fn post<E: AsRef<str>>(&self, endpoint: E) -> RequestBuilder {
        self.request(Method::POST, endpoint)
    }

    /// Start building a PUT request.
    pub fn put<E: AsRef<str>>(&self, endpoint: E) -> RequestBuilder {
        self.request(Method::PUT, endpoint)
    }

    /// Start building a DELETE request.
    pub fn delete<E: AsRef<str>>(&self, endpoint: E) -> RequestBuilder {
        self.request(Method::DELETE, endpoint)
    }

    /// Start building a PATCH request.
    pub fn patch<E: AsRef<str>>(&self, endpoint: E) -> RequestBuilder {
        self.request(Method::PATCH, endpoint)
    }

    /// Start building a HEAD request.
    pub fn head<E: AsRef<str>>(&self, endpoint: E) -> RequestBuilder {
        self.request(Method::HEAD, endpoint)
    }

    /// Start building a request with custom method.
    pub fn request<E: AsRef<str>>(&self, method: Method, endpoint: E) -> RequestBuilder {
        RequestBuilder {
            client: self.clone(),
            method,
            endpoint: endpoint.as_ref().to_string(),
            query: Vec::new(),
            headers: OrderedHeaderMap::new(),
            body: RequestBody::Empty,
            conflicting_body: false,
            version: None,
            error: None,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Headers merged under every request.
    pub fn default_headers(&self) -> &OrderedHeaderMap {
        &self.inner.default_headers
    }

    /// Requests sent and not yet answered.
    pub fn pending(&self) -> usize {
        self.inner.registry.len()
    }

    /// Whether the engine connection has ended.
    pub fn is_closed(&self) -> bool {
        self.inner.registry.is_closed()
    }

    /// Bridge-level failure reported by the engine, if any.
    pub fn failure(&self) -> Option<NetError> {
        self.inner.registry.failure()
    }

    /// Stop the dispatch loop, terminate the engine and shut the transport.
    ///
    /// Requests still pending are abandoned and never resolve; their
    /// [`PendingResponse::timeout`] reports `TransportClosed`. Returns the
    /// loop's counters, or the failure that ended the bridge. Closing twice
    /// reports `TransportClosed`.
    pub async fn close(&self) -> Result<DispatchStats, NetError> {
        self.inner.registry.mark_closed();

        let handle = lock(&self.inner.dispatch).take();
        let handle = match handle {
            Some(handle) => handle,
            None => return Err(self.inner.registry.closed_error()),
        };

        if let Some(stop) = lock(&self.inner.stop).take() {
            let _ = stop.send(());
        }
        if let Some(mut engine) = lock(&self.inner.engine).take() {
            engine.terminate();
        }
        if let Err(e) = self.inner.writer.shutdown().await {
            tracing::debug!(error = %e, "engine transport already closed");
        }

        match handle.await {
            Ok(Ok(stats)) => {
                tracing::debug!(?stats, "dispatch loop finished");
                Ok(stats)
            }
            Ok(Err(e)) => Err(e),
            Err(e) => {
                tracing::error!(error = %e, "dispatch loop panicked");
                Err(self.inner.registry.closed_error())
            }
        }
    }
}

/// Builder for creating a [`Client`].
pub struct ClientBuilder {
    base_url: String,
    default_headers: Vec<(String, String)>,
    user_agent: String,
    http2: bool,
    engine_config: EngineConfig,
    launcher: Option<Box<dyn EngineLauncher>>,
    accept_timeout: Duration,
    debug_output: bool,
}

impl ClientBuilder {
    fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            default_headers: Vec::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http2: false,
            engine_config: EngineConfig::default(),
            launcher: None,
            accept_timeout: DEFAULT_ACCEPT_TIMEOUT,
            debug_output: false,
        }
    }

    /// Add a header sent with every request. Per-request headers win.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Ask the engine for HTTP/2 by default.
    pub fn http2(mut self, enabled: bool) -> Self {
        self.http2 = enabled;
        self
    }

    pub fn engine_config(mut self, config: EngineConfig) -> Self {
        self.engine_config = config;
        self
    }

    /// How the engine is started. Required.
    pub fn launcher<L: EngineLauncher + 'static>(mut self, launcher: L) -> Self {
        self.launcher = Some(Box::new(launcher));
        self
    }

    /// How long to wait for the engine to connect back.
    pub fn accept_timeout(mut self, timeout: Duration) -> Self {
        self.accept_timeout = timeout;
        self
    }

    /// Forward the engine's stdout/stderr to tracing.
    pub fn debug_output(mut self, enabled: bool) -> Self {
        self.debug_output = enabled;
        self
    }

    /// Bind, launch the engine, accept its connection and start dispatching.
    pub async fn build(self) -> Result<Client, NetError> {
        let base_url = Url::parse(&self.base_url).map_err(|_| NetError::InvalidUrl)?;

        let mut default_headers = OrderedHeaderMap::new();
        default_headers.insert("host", &authority(&base_url)?)?;
        default_headers.insert("user-agent", &self.user_agent)?;
        for (name, value) in &self.default_headers {
            default_headers.insert(name, value)?;
        }

        let launcher = self.launcher.ok_or_else(|| {
            tracing::error!("no engine launcher configured");
            NetError::EngineUnavailable
        })?;

        // Port must exist before the engine starts: it is a launch argument.
        let listener = EngineListener::bind().await?;
        let ctx = LaunchContext {
            base_url: &base_url,
            port: listener.port(),
            config: &self.engine_config,
            capture_output: self.debug_output,
        };
        let mut engine = launcher.launch(&ctx)?;

        let (reader, writer) = match listener.accept(self.accept_timeout).await {
            Ok(halves) => halves,
            Err(e) => {
                engine.terminate();
                return Err(e);
            }
        };

        let registry = PendingRegistry::new();
        let dispatcher = Dispatcher::new(reader, Arc::clone(&registry), base_url.clone());
        let (stop, stopped) = oneshot::channel();
        let dispatch = tokio::spawn(dispatcher.run_until(async move {
            let _ = stopped.await;
        }));

        tracing::debug!(base_url = %base_url, "bridge ready");

        Ok(Client {
            inner: Arc::new(ClientInner {
                base_url,
                default_headers,
                version: if self.http2 {
                    HttpVersion::Http2
                } else {
                    HttpVersion::Http11
                },
                registry,
                tokens: TokenGenerator::default(),
                writer,
                dispatch: Mutex::new(Some(dispatch)),
                stop: Mutex::new(Some(stop)),
                engine: Mutex::new(Some(engine)),
            }),
        })
    }
}

/// `host[:port]` of the base URL, as sent in the Host header.
fn authority(url: &Url) -> Result<String, NetError> {
    let host = url.host_str().ok_or(NetError::InvalidUrl)?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Builder for a single request.
pub struct RequestBuilder {
    client: Client,
    method: Method,
    endpoint: String,
    query: Vec<(String, String)>,
    headers: OrderedHeaderMap,
    body: RequestBody,
    conflicting_body: bool,
    version: Option<HttpVersion>,
    error: Option<NetError>,
}

impl RequestBuilder {
    /// Append URL-encoded query parameters to the endpoint.
    pub fn query<K: AsRef<str>, V: AsRef<str>>(mut self, params: &[(K, V)]) -> Self {
        for (k, v) in params {
            self.query
                .push((k.as_ref().to_string(), v.as_ref().to_string()));
        }
        self
    }

    /// Add a header. Overrides a client default of the same name.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let Err(e) = self.headers.insert(name, value) {
            self.error.get_or_insert(e);
        }
        self
    }

    /// Set a raw text body.
    pub fn body<B: Into<String>>(self, body: B) -> Self {
        self.set_body(RequestBody::Text(body.into()))
    }

    /// Set JSON body. Adds `content-type` and `content-length`.
    #[cfg(feature = "json")]
    pub fn json<T: serde::Serialize>(mut self, json: &T) -> Self {
        match serde_json::to_value(json) {
            Ok(value) => self.set_body(RequestBody::Json(value)),
            Err(_) => {
                self.error.get_or_insert(NetError::JsonParseError);
                self
            }
        }
    }

    /// Set a URL-encoded form body. Adds `content-type` and `content-length`.
    pub fn form<K: AsRef<str>, V: AsRef<str>>(self, fields: &[(K, V)]) -> Self {
        let fields = fields
            .iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
            .collect();
        self.set_body(RequestBody::Form(fields))
    }

    /// Override the protocol version for this request.
    pub fn version(mut self, version: HttpVersion) -> Self {
        self.version = Some(version);
        self
    }

    fn set_body(mut self, body: RequestBody) -> Self {
        if self.body.is_empty() {
            self.body = body;
        } else {
            self.conflicting_body = true;
        }
        self
    }

    fn endpoint_with_query(&self) -> String {
        if self.query.is_empty() {
            return self.endpoint.clone();
        }
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter())
            .finish();
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.endpoint, separator, encoded)
    }

    /// Validate and assemble the descriptor. Nothing is registered or sent.
    fn into_descriptor(self) -> Result<(Client, RequestDescriptor), NetError> {
        if self.conflicting_body {
            return Err(NetError::ConflictingBody);
        }
        if let Some(e) = self.error {
            return Err(e);
        }

        let endpoint = self.endpoint_with_query();
        self.client
            .inner
            .base_url
            .join(&endpoint)
            .map_err(|_| NetError::InvalidUrl)?;

        let mut headers = self.client.inner.default_headers.clone();
        headers.merge(&self.headers);

        let body = self.body.encode()?;
        if let (Some(content_type), Some(text)) = (self.body.content_type(), &body) {
            headers.insert("content-type", content_type)?;
            headers.insert("content-length", &text.len().to_string())?;
        }

        let descriptor = RequestDescriptor {
            method: self.method,
            endpoint,
            headers,
            body,
            version: self.version.unwrap_or(self.client.inner.version),
        };
        Ok((self.client, descriptor))
    }

    /// Register and send the request.
    ///
    /// Returns as soon as the frame is written; await the returned handle
    /// for the response. Validation errors are returned before anything
    /// reaches the engine.
    pub async fn send(self) -> Result<PendingResponse, NetError> {
        let (client, descriptor) = self.into_descriptor()?;
        let inner = &client.inner;

        if inner.registry.is_closed() {
            return Err(inner.registry.closed_error());
        }

        let token = inner.tokens.next_token();
        let frame = descriptor.to_message(token.as_str()).to_frame()?;

        // Register before writing so a fast reply always finds its entry.
        let pending = inner.registry.register(token, descriptor)?;
        let len = frame.len();
        inner.writer.send(frame).await?;

        tracing::debug!(label = %pending.token(), len, "request sent");
        Ok(pending)
    }
}
