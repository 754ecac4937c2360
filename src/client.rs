//! HTTP Client with builder pattern.
//!
//! The [`Client`] is the dispatch engine's public face: it holds the
//! defaults every request inherits, the shared cookie jar and, once started,
//! a worker pool for fire-and-collect dispatch.
//!
//! # Example
//!
//! ```rust,no_run
//! use mimicnet::Client;
//!
//! # async fn run() -> Result<(), mimicnet::http::DispatchFailure> {
//! let client = Client::new();
//! let resp = client
//!     .get("https://example.com/search")
//!     .query_param("q", "rust")
//!     .send()
//!     .await?;
//! println!("{} {}", resp.status, resp.text.len());
//! # Ok(())
//! # }
//! ```

use crate::base::neterror::NetError;
use crate::cookies::monster::CookieMonster;
use crate::emulation::profiles::chrome::Chrome;
use crate::emulation::{EmulationFactory, CHROME_105_USER_AGENT};
use crate::http::multipart::{Form, Part};
use crate::http::orderedheaders::{CaseSensitiveHeaders, HeaderOrderList};
use crate::http::requestbody::RequestBody;
use crate::http::response::Response;
use crate::http::retry::RetryConfig;
use crate::http::streamfactory::HyperTransportFactory;
use crate::http::transaction::{dispatch, DispatchFailure};
use crate::http::transport::TransportFactory;
use crate::socket::dialer::{DialerFactory, TunnelDialerFactory};
use crate::socket::proxy::ProxySettings;
use crate::urlrequest::prepare::RequestPreparer;
use crate::urlrequest::request::RequestDescriptor;
use crate::workerpool::{WorkerPool, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS};
use bytes::Bytes;
use futures::FutureExt;
use http::Method;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_ATTEMPTS: usize = 1;

/// Client-wide defaults. Deserializable so it can come from a config file;
/// every field is optional.
///
/// ```
/// use mimicnet::client::ClientConfig;
///
/// let cfg: ClientConfig = serde_json::from_str(r#"{"attempts": 3, "timeout": 5}"#).unwrap();
/// assert_eq!(cfg.attempts, 3);
/// assert_eq!(cfg.timeout.as_secs(), 5);
/// assert_eq!(cfg.workers, 100);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// JA3 string.
    pub fingerprint: String,
    /// Used when the merged headers carry no `User-Agent`.
    pub user_agent: String,
    pub attempts: usize,
    /// Whole seconds in config files.
    #[serde(deserialize_with = "duration_secs")]
    pub timeout: Duration,
    pub disable_redirect: bool,
    pub headers: CaseSensitiveHeaders,
    pub query_params: BTreeMap<String, String>,
    pub header_order: HeaderOrderList,
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let emulation = Chrome::default().emulation();
        Self {
            fingerprint: emulation.fingerprint,
            user_agent: emulation.user_agent,
            attempts: DEFAULT_ATTEMPTS,
            timeout: DEFAULT_TIMEOUT,
            disable_redirect: false,
            headers: emulation.headers,
            query_params: BTreeMap::new(),
            header_order: emulation.header_order,
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

fn duration_secs<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    u64::deserialize(d).map(Duration::from_secs)
}

/// HTTP client. Cheap to clone; clones share the cookie jar and the worker
/// pool but carry their own copy of the defaults.
#[derive(Clone)]
pub struct Client {
    config: ClientConfig,
    proxy: Option<ProxySettings>,
    jar: Arc<CookieMonster>,
    preparer: Arc<RequestPreparer>,
    pool: Arc<Mutex<Option<Arc<WorkerPool>>>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("proxy", &self.proxy)
            .field("cookies", &self.jar.total_cookie_count())
            .finish_non_exhaustive()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn from_config(config: ClientConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn get<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn post<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    pub fn put<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::PUT, url)
    }

    pub fn delete<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }

    pub fn patch<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::PATCH, url)
    }

    pub fn head<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::HEAD, url)
    }

    pub fn options<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::OPTIONS, url)
    }

    pub fn request<U: AsRef<str>>(&self, method: Method, url: U) -> RequestBuilder {
        RequestBuilder::new(self.clone(), method, url.as_ref())
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.config.headers.insert(name, value);
        self
    }

    pub fn set_headers<I, K, V>(&mut self, headers: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in headers {
            self.config.headers.insert(k, v);
        }
        self
    }

    /// Drop every default header, then apply `headers`.
    pub fn replace_headers<I, K, V>(&mut self, headers: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.config.headers = CaseSensitiveHeaders::new();
        self.set_headers(headers)
    }

    pub fn set_query_params<I, K, V>(&mut self, params: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in params {
            self.config.query_params.insert(k.into(), v.into());
        }
        self
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.config.timeout = timeout;
        self
    }

    pub fn set_attempts(&mut self, attempts: usize) -> &mut Self {
        self.config.attempts = attempts;
        self
    }

    pub fn set_fingerprint(&mut self, ja3: impl Into<String>) -> &mut Self {
        self.config.fingerprint = ja3.into();
        self
    }

    pub fn set_disable_redirect(&mut self, disable: bool) -> &mut Self {
        self.config.disable_redirect = disable;
        self
    }

    pub fn set_proxy(&mut self, proxy: Option<ProxySettings>) -> &mut Self {
        self.proxy = proxy;
        self
    }

    pub fn cookies(&self) -> &Arc<CookieMonster> {
        &self.jar
    }

    /// Empty the shared jar.
    pub fn clear_cookies(&self) {
        self.jar.clear();
    }

    /// Prepare and dispatch `descriptor`, up to `attempts` times with no
    /// delay between tries. The first success wins; otherwise the last
    /// failure is returned.
    pub async fn execute(
        &self,
        descriptor: RequestDescriptor,
        attempts: usize,
    ) -> Result<Response, DispatchFailure> {
        execute_with(&self.preparer, &self.jar, descriptor, attempts).await
    }

    /// Spawn the worker pool on the current runtime and return the channel
    /// responses are published on.
    pub fn start_workers(&self) -> Result<mpsc::UnboundedReceiver<Response>, NetError> {
        let mut slot = self.pool.lock().map_err(|_| NetError::PoolClosed)?;
        if slot.is_some() {
            return Err(NetError::PoolAlreadyRunning);
        }
        let (pool, output) = WorkerPool::start(self.config.workers, self.config.queue_capacity)?;
        *slot = Some(Arc::new(pool));
        Ok(output)
    }

    /// Hand a request to the worker pool. Waits while the input queue is
    /// full. Failures are published as their best-effort response.
    pub async fn queue(
        &self,
        descriptor: RequestDescriptor,
        attempts: usize,
    ) -> Result<(), NetError> {
        let pool = self
            .pool
            .lock()
            .map_err(|_| NetError::PoolClosed)?
            .clone()
            .ok_or(NetError::PoolNotStarted)?;
        // Only the engine parts: a captured Client would keep the pool alive.
        let preparer = self.preparer.clone();
        let jar = self.jar.clone();
        let job = async move {
            match execute_with(&preparer, &jar, descriptor, attempts).await {
                Ok(response) => response,
                Err(failure) => failure.response,
            }
        }
        .boxed();
        pool.submit(job).await
    }

    /// Stop accepting work, let queued requests finish and join the workers.
    /// The response channel closes after the last one is published.
    pub async fn close(&self) {
        let pool = match self.pool.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(pool) = pool {
            pool.shutdown().await;
        }
    }
}

async fn execute_with(
    preparer: &RequestPreparer,
    jar: &Arc<CookieMonster>,
    descriptor: RequestDescriptor,
    attempts: usize,
) -> Result<Response, DispatchFailure> {
    let retry = if attempts <= 1 {
        RetryConfig::no_retry()
    } else {
        RetryConfig::new(attempts)
    };
    retry
        .run(|attempt| {
            let descriptor = descriptor.clone();
            async move {
                if attempt > 1 {
                    debug!(attempt, url = %descriptor.url, "retrying request");
                }
                let prepared = preparer.prepare(descriptor, jar.clone())?;
                dispatch(prepared).await
            }
        })
        .await
}

/// Builder for creating a [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    proxy: Option<ProxySettings>,
    cookie_store: Option<Arc<CookieMonster>>,
    transports: Option<Arc<dyn TransportFactory>>,
    dialers: Option<Arc<dyn DialerFactory>>,
}

impl ClientBuilder {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Take fingerprint, user agent, default headers and header order from
    /// a browser profile.
    pub fn emulation<E: EmulationFactory>(mut self, emulation: E) -> Self {
        let emulation = emulation.emulation();
        self.config.fingerprint = emulation.fingerprint;
        self.config.user_agent = emulation.user_agent;
        self.config.headers = emulation.headers;
        self.config.header_order = emulation.header_order;
        self
    }

    pub fn fingerprint(mut self, ja3: impl Into<String>) -> Self {
        self.config.fingerprint = ja3.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(name, value);
        self
    }

    pub fn header_order(mut self, order: HeaderOrderList) -> Self {
        self.config.header_order = order;
        self
    }

    pub fn proxy(mut self, proxy: ProxySettings) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Use `HTTPS_PROXY` / `HTTP_PROXY` when set.
    pub fn proxy_from_env(mut self) -> Self {
        if let Some(proxy) = ProxySettings::from_env() {
            self.proxy = Some(proxy);
        }
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn attempts(mut self, attempts: usize) -> Self {
        self.config.attempts = attempts;
        self
    }

    pub fn disable_redirect(mut self, disable: bool) -> Self {
        self.config.disable_redirect = disable;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Share an existing jar.
    pub fn cookie_store(mut self, store: Arc<CookieMonster>) -> Self {
        self.cookie_store = Some(store);
        self
    }

    pub fn transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transports = Some(factory);
        self
    }

    pub fn dialer_factory(mut self, factory: Arc<dyn DialerFactory>) -> Self {
        self.dialers = Some(factory);
        self
    }

    pub fn build(self) -> Client {
        let preparer = RequestPreparer::new(
            self.transports
                .unwrap_or_else(|| Arc::new(HyperTransportFactory)),
            self.dialers.unwrap_or_else(|| Arc::new(TunnelDialerFactory)),
            self.config.header_order.clone(),
        );
        Client {
            config: self.config,
            proxy: self.proxy,
            jar: self.cookie_store.unwrap_or_default(),
            preparer: Arc::new(preparer),
            pool: Arc::new(Mutex::new(None)),
        }
    }
}

/// Builder for a single request.
#[must_use]
pub struct RequestBuilder {
    client: Client,
    method: Method,
    url: String,
    headers: CaseSensitiveHeaders,
    query: BTreeMap<String, String>,
    body: Option<String>,
    form: Option<BTreeMap<String, String>>,
    json: Option<serde_json::Map<String, serde_json::Value>>,
    multipart: Option<Form>,
    content_type: Option<String>,
    proxy: Option<ProxySettings>,
    timeout: Option<Duration>,
    attempts: Option<usize>,
    disable_redirect: Option<bool>,
    header_order: Option<HeaderOrderList>,
    error: Option<NetError>,
}

impl RequestBuilder {
    fn new(client: Client, method: Method, url: &str) -> Self {
        Self {
            client,
            method,
            url: url.to_string(),
            headers: CaseSensitiveHeaders::new(),
            query: BTreeMap::new(),
            body: None,
            form: None,
            json: None,
            multipart: None,
            content_type: None,
            proxy: None,
            timeout: None,
            attempts: None,
            disable_redirect: None,
            header_order: None,
            error: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in headers {
            self.headers.insert(k, v);
        }
        self
    }

    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn query<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in params {
            self.query.insert(k.into(), v.into());
        }
        self
    }

    /// Merge a raw `a=1&b=2` string into the query parameters.
    pub fn query_string(mut self, query: &str) -> Self {
        for (k, v) in url::form_urlencoded::parse(query.trim().as_bytes()) {
            self.query.insert(k.into_owned(), v.into_owned());
        }
        self
    }

    /// Raw `text/plain` body. Takes precedence over every other body kind.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// `application/x-www-form-urlencoded` fields, sent sorted by name.
    pub fn form<I, K, V>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let form = self.form.get_or_insert_with(BTreeMap::new);
        for (k, v) in fields {
            form.insert(k.into(), v.into());
        }
        self
    }

    /// Merge the fields of a JSON object into the body. Non-object values
    /// are rejected when the request is sent.
    #[cfg(feature = "json")]
    pub fn json<T: serde::Serialize>(mut self, json: &T) -> Self {
        match serde_json::to_value(json) {
            Ok(serde_json::Value::Object(fields)) => {
                self.json.get_or_insert_with(serde_json::Map::new).extend(fields);
            }
            Ok(other) => {
                self.error = Some(NetError::JsonShape {
                    path: String::new(),
                    expected: if other.is_null() { "non-null" } else { "an object" },
                });
            }
            Err(e) => self.error = Some(e.into()),
        }
        self
    }

    /// Add a multipart part with optional file name and content type.
    pub fn multipart_field(
        mut self,
        name: impl Into<String>,
        file_name: Option<&str>,
        content_type: Option<&str>,
        data: impl Into<Bytes>,
    ) -> Self {
        let mut part = Part::bytes(data.into());
        if let Some(f) = file_name {
            part = part.file_name(f.to_string());
        }
        if let Some(ct) = content_type {
            part = part.content_type(ct);
        }
        self.multipart
            .get_or_insert_with(Form::new)
            .push(name.into(), part);
        self
    }

    pub fn multipart_text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.multipart
            .get_or_insert_with(Form::new)
            .push(name.into(), Part::text(value.into()));
        self
    }

    pub fn multipart_boundary(mut self, boundary: impl Into<String>) -> Self {
        if let Err(e) = self
            .multipart
            .get_or_insert_with(Form::new)
            .set_boundary(boundary)
        {
            self.error = Some(e);
        }
        self
    }

    /// Explicit `Content-Type`; suppresses the one implied by the body.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn proxy(mut self, proxy: ProxySettings) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn attempts(mut self, attempts: usize) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn disable_redirect(mut self, disable: bool) -> Self {
        self.disable_redirect = Some(disable);
        self
    }

    pub fn header_order(mut self, order: HeaderOrderList) -> Self {
        self.header_order = Some(order);
        self
    }

    /// The body that wins precedence: text, form, JSON, then multipart. An
    /// empty text body counts as absent. Multipart parts on a method without
    /// a body are rejected even when another kind wins.
    fn request_body(&mut self) -> Result<RequestBody, NetError> {
        if self.multipart.is_some() {
            RequestBody::check_multipart_method(&self.method)?;
        }
        Ok(
            if let Some(text) = self.body.take().filter(|b| !b.is_empty()) {
                RequestBody::Text(text)
            } else if let Some(form) = self.form.take() {
                RequestBody::Form(form)
            } else if let Some(json) = self.json.take() {
                RequestBody::Json(serde_json::Value::Object(json))
            } else if let Some(form) = self.multipart.take() {
                RequestBody::Multipart(form)
            } else {
                RequestBody::Empty
            },
        )
    }

    /// Resolve everything the client and this builder say into a
    /// descriptor, plus the attempt budget.
    fn into_parts(mut self) -> Result<(Client, RequestDescriptor, usize), NetError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        let body = self.request_body()?;
        let (bytes, implied_type) = body.encode()?;

        let config = &self.client.config;
        let mut headers = config.headers.clone();
        headers.extend_from(&self.headers);
        match (self.content_type.take(), implied_type) {
            (Some(explicit), _) => headers.insert("Content-Type", explicit),
            (None, Some(implied)) => headers.insert("Content-Type", implied),
            (None, None) => {}
        }

        let user_agent = headers
            .get("user-agent")
            .map(str::to_string)
            .or_else(|| Some(config.user_agent.clone()).filter(|ua| !ua.is_empty()))
            .unwrap_or_else(|| CHROME_105_USER_AGENT.to_string());

        let descriptor = RequestDescriptor {
            method: self.method,
            url: export_url(&self.url, &config.query_params, &self.query),
            headers,
            body: bytes,
            fingerprint: config.fingerprint.clone(),
            user_agent,
            proxy: self.proxy.or_else(|| self.client.proxy.clone()),
            timeout: self.timeout.unwrap_or(config.timeout),
            disable_redirect: self.disable_redirect.unwrap_or(config.disable_redirect),
            header_order: Some(self.header_order.unwrap_or_else(|| config.header_order.clone())),
        };
        let attempts = self.attempts.unwrap_or(config.attempts);
        Ok((self.client, descriptor, attempts))
    }

    /// The descriptor this builder would send.
    pub fn descriptor(self) -> Result<RequestDescriptor, NetError> {
        self.into_parts().map(|(_, d, _)| d)
    }

    pub async fn send(self) -> Result<Response, DispatchFailure> {
        let (client, descriptor, attempts) = self.into_parts()?;
        client.execute(descriptor, attempts).await
    }

    /// Queue on the client's worker pool instead of waiting for the result.
    pub async fn queue(self) -> Result<(), NetError> {
        let (client, descriptor, attempts) = self.into_parts()?;
        client.queue(descriptor, attempts).await
    }
}

/// Append client then request query parameters (request wins on clashes),
/// sorted by name.
fn export_url(
    url: &str,
    client: &BTreeMap<String, String>,
    request: &BTreeMap<String, String>,
) -> String {
    if client.is_empty() && request.is_empty() {
        return url.to_string();
    }
    let mut params = client.clone();
    params.extend(request.iter().map(|(k, v)| (k.clone(), v.clone())));

    let mut out = url.to_string();
    if out.contains('?') {
        if !out.ends_with('&') {
            out.push('&');
        }
    } else {
        out.push('?');
    }
    out.push_str(
        &url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter())
            .finish(),
    );
    out
}
