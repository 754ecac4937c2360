//! Client dispatch tests against an in-process transport.

use futures::future::BoxFuture;
use mimicnet::http::responsebody::ResponseBody;
use mimicnet::http::{Transport, TransportFactory, TransportSpec, WireRequest};
use mimicnet::{Client, NetError};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Reply = Result<(u16, Vec<(&'static str, &'static str)>, Vec<u8>), NetError>;
type Handler = dyn Fn(usize, &WireRequest) -> Reply + Send + Sync;

/// Answers every round trip through `handler` and records what it was sent.
struct Mock {
    handler: Box<Handler>,
    calls: AtomicUsize,
    seen: Mutex<Vec<WireRequest>>,
    specs: Mutex<Vec<String>>,
}

impl Mock {
    fn new(handler: impl Fn(usize, &WireRequest) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            specs: Mutex::new(Vec::new()),
        })
    }

    fn ok(body: &'static str) -> Arc<Self> {
        Self::new(move |_, _| Ok((200, vec![], body.as_bytes().to_vec())))
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn seen(&self) -> Vec<WireRequest> {
        self.seen.lock().unwrap().clone()
    }
}

impl Transport for Mock {
    fn round_trip(
        &self,
        request: WireRequest,
    ) -> BoxFuture<'_, Result<http::Response<ResponseBody>, NetError>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = (self.handler)(call, &request);
        self.seen.lock().unwrap().push(request);
        Box::pin(async move {
            let (status, headers, body) = reply?;
            let mut builder = http::Response::builder().status(status);
            for (k, v) in headers {
                builder = builder.header(k, v);
            }
            Ok(builder.body(ResponseBody::full(body)).unwrap())
        })
    }
}

struct MockFactory(Arc<Mock>);

impl TransportFactory for MockFactory {
    fn build(&self, spec: &TransportSpec) -> Result<Arc<dyn Transport>, NetError> {
        self.0.specs.lock().unwrap().push(spec.fingerprint.clone());
        Ok(self.0.clone())
    }
}

fn client(mock: &Arc<Mock>) -> Client {
    Client::builder()
        .transport_factory(Arc::new(MockFactory(mock.clone())))
        .build()
}

// === Header ordering ===

#[tokio::test]
async fn test_header_order_is_deterministic() {
    let mock = Mock::ok("");
    let client = client(&mock);

    for _ in 0..20 {
        client
            .get("http://example.com/")
            .header("X-Zeta", "z")
            .header("X-Alpha", "a")
            .header("Sec-Fetch-Mode", "navigate")
            .send()
            .await
            .unwrap();
    }

    let seen = mock.seen();
    let first = seen[0].headers.keys_lower();
    assert!(seen.iter().all(|r| r.headers.keys_lower() == first));
    assert_eq!(first[0], "host");
    let ua = first.iter().position(|k| k == "user-agent").unwrap();
    let accept = first.iter().position(|k| k == "accept").unwrap();
    let fetch = first.iter().position(|k| k == "sec-fetch-mode").unwrap();
    assert!(ua < accept && accept < fetch);
    // Unlisted headers trail in insertion order.
    assert_eq!(&first[first.len() - 2..], ["x-zeta", "x-alpha"]);
}

#[tokio::test]
async fn test_host_and_user_agent_are_forced() {
    let mock = Mock::ok("");
    let client = client(&mock);

    client
        .get("http://example.com:8080/path")
        .header("Host", "spoofed.example")
        .header("Content-Length", "12345")
        .send()
        .await
        .unwrap();
    client
        .get("http://example.com/")
        .header("User-Agent", "Custom/9.9")
        .send()
        .await
        .unwrap();

    let seen = mock.seen();
    assert_eq!(seen[0].headers.get("host"), Some("example.com:8080"));
    assert!(seen[0].headers.get("content-length").is_none());
    assert_eq!(
        seen[0].headers.get("user-agent"),
        Some(mimicnet::emulation::CHROME_105_USER_AGENT)
    );
    assert_eq!(seen[1].headers.get("user-agent"), Some("Custom/9.9"));
    assert_eq!(
        mock.specs.lock().unwrap()[0],
        mimicnet::emulation::CHROME_JA3
    );
}

// === Cookies ===

#[tokio::test]
async fn test_cookie_round_trip_stays_on_host() {
    let mock = Mock::new(|call, _| match call {
        0 => Ok((200, vec![("set-cookie", "sid=s3cr3t; Path=/")], vec![])),
        _ => Ok((200, vec![], vec![])),
    });
    let client = client(&mock);

    let login = client.post("http://shop.example/login").send().await.unwrap();
    assert_eq!(login.cookie("sid").map(|c| c.value.as_str()), Some("s3cr3t"));
    assert_eq!(login.set_cookies(), vec!["sid=s3cr3t; Path=/"]);

    client.get("http://shop.example/cart").send().await.unwrap();
    client.get("http://other.example/").send().await.unwrap();

    let seen = mock.seen();
    assert!(seen[0].headers.get("cookie").is_none());
    assert_eq!(seen[1].headers.get("cookie"), Some("sid=s3cr3t"));
    assert!(seen[2].headers.get("cookie").is_none());

    client.clear_cookies();
    client.get("http://shop.example/cart").send().await.unwrap();
    assert!(mock.seen()[3].headers.get("cookie").is_none());
}

#[tokio::test]
async fn test_caller_cookie_merges_with_jar() {
    let mock = Mock::new(|call, _| match call {
        0 => Ok((200, vec![("set-cookie", "jar=1")], vec![])),
        _ => Ok((200, vec![], vec![])),
    });
    let client = client(&mock);
    client.get("http://a.example/").send().await.unwrap();
    client
        .get("http://a.example/")
        .header("Cookie", "mine=2")
        .send()
        .await
        .unwrap();
    assert_eq!(mock.seen()[1].headers.get("cookie"), Some("mine=2; jar=1"));
}

#[tokio::test]
async fn test_domain_cookie_returns_on_next_dispatch() {
    let mock = Mock::new(|call, _| match call {
        0 => Ok((
            200,
            vec![
                ("set-cookie", "Foo=Bar; Domain=example.com"),
                ("set-cookie", "a=1; Path=/"),
            ],
            vec![],
        )),
        _ => Ok((200, vec![], vec![])),
    });
    let client = client(&mock);

    let first = client.get("http://example.com/").send().await.unwrap();
    assert_eq!(
        first.set_cookies(),
        vec!["Foo=Bar; Domain=example.com", "a=1; Path=/"]
    );
    client.get("http://example.com/next").send().await.unwrap();
    client.get("http://www.example.com/").send().await.unwrap();

    let seen = mock.seen();
    assert!(seen[0].headers.get("cookie").is_none());
    let cookie = seen[1].headers.get("cookie").unwrap();
    assert!(cookie.split("; ").any(|c| c == "Foo=Bar"));
    assert!(cookie.split("; ").any(|c| c == "a=1"));
    // Only the domain cookie reaches the subdomain.
    assert_eq!(seen[2].headers.get("cookie"), Some("Foo=Bar"));
}

/// Sets one cookie named after the request path.
struct CookiePerPath;

impl Transport for CookiePerPath {
    fn round_trip(
        &self,
        request: WireRequest,
    ) -> BoxFuture<'_, Result<http::Response<ResponseBody>, NetError>> {
        let name = request.url.path().trim_start_matches('/').to_string();
        Box::pin(async move {
            tokio::task::yield_now().await;
            Ok(http::Response::builder()
                .header("set-cookie", format!("{name}=v; Path=/"))
                .body(ResponseBody::empty())
                .unwrap())
        })
    }
}

impl TransportFactory for CookiePerPath {
    fn build(&self, _spec: &TransportSpec) -> Result<Arc<dyn Transport>, NetError> {
        Ok(Arc::new(CookiePerPath))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dispatches_keep_every_cookie() {
    let client = Client::builder()
        .transport_factory(Arc::new(CookiePerPath))
        .build();

    let tasks: Vec<_> = (0..64)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .get(format!("http://busy.example/c{i}"))
                    .send()
                    .await
                    .unwrap()
            })
        })
        .collect();
    for (i, task) in tasks.into_iter().enumerate() {
        let resp = task.await.unwrap();
        assert_eq!(resp.set_cookies(), vec![format!("c{i}=v; Path=/")]);
        assert!(resp.cookie(&format!("c{i}")).is_some());
    }

    assert_eq!(client.cookies().total_cookie_count(), 64);
    let url = url::Url::parse("http://busy.example/").unwrap();
    let cookies = client.cookies().get_cookies_for_url(&url);
    for i in 0..64 {
        assert!(cookies.iter().any(|c| c.name == format!("c{i}")));
    }
}

// === Redirects ===

#[tokio::test]
async fn test_redirects_followed_unless_disabled() {
    let script = |call: usize, _: &WireRequest| -> Reply {
        match call % 2 {
            0 => Ok((302, vec![("location", "/landing")], b"moved".to_vec())),
            _ => Ok((200, vec![], b"landed".to_vec())),
        }
    };
    let mock = Mock::new(script);
    let client = client(&mock);

    let resp = client.post("http://a.example/go").body("x").send().await.unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.text, "landed");
    let seen = mock.seen();
    let hop = &seen[1];
    assert_eq!(hop.method, http::Method::GET);
    assert_eq!(hop.url.path(), "/landing");

    let mock = Mock::new(script);
    let resp = client_no_redirect(&mock).get("http://a.example/go").send().await.unwrap();
    assert_eq!(resp.status, 302);
    assert_eq!(resp.header("location"), Some("/landing"));
    assert_eq!(mock.calls(), 1);
}

fn client_no_redirect(mock: &Arc<Mock>) -> Client {
    Client::builder()
        .transport_factory(Arc::new(MockFactory(mock.clone())))
        .disable_redirect(true)
        .build()
}

// === Failures, retries and timeouts ===

#[tokio::test]
async fn test_attempts_run_exactly_n_times() {
    let mock = Mock::new(|_, _| Err(NetError::ConnectionReset));
    let client = client(&mock);

    let failure = client
        .get("http://a.example/")
        .attempts(3)
        .send()
        .await
        .unwrap_err();
    assert_eq!(mock.calls(), 3);
    assert!(matches!(failure.error, NetError::ConnectionReset));
    assert!(failure.response.text.ends_with(&NetError::ConnectionReset.to_string()));
}

#[tokio::test]
async fn test_attempts_stop_at_first_success() {
    let mock = Mock::new(|call, _| {
        if call < 2 {
            Err(NetError::ConnectionClosed)
        } else {
            Ok((204, vec![], vec![]))
        }
    });
    let resp = client(&mock)
        .get("http://a.example/")
        .attempts(5)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status, 204);
    assert_eq!(mock.calls(), 3);
}

#[tokio::test]
async fn test_zero_attempts_means_one() {
    let mock = Mock::new(|_, _| Err(NetError::ConnectionClosed));
    let _ = client(&mock).get("http://a.example/").attempts(0).send().await;
    assert_eq!(mock.calls(), 1);
}

struct Stall;

impl Transport for Stall {
    fn round_trip(
        &self,
        _request: WireRequest,
    ) -> BoxFuture<'_, Result<http::Response<ResponseBody>, NetError>> {
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(NetError::ConnectionClosed)
        })
    }
}

struct StallFactory;

impl TransportFactory for StallFactory {
    fn build(&self, _spec: &TransportSpec) -> Result<Arc<dyn Transport>, NetError> {
        Ok(Arc::new(Stall))
    }
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_classified_as_408() {
    let client = Client::builder()
        .transport_factory(Arc::new(StallFactory))
        .timeout(Duration::from_secs(2))
        .build();

    let failure = client.get("http://slow.example/").send().await.unwrap_err();
    assert_eq!(failure.status(), 408);
    assert!(matches!(failure.error, NetError::TimedOut(_)));
    assert!(failure.response.text.starts_with("Request returned a Syscall Error"));
}

#[tokio::test]
async fn test_status_error_is_passed_through() {
    let mock = Mock::new(|_, _| {
        Err(NetError::Status {
            status: 407,
            message: "Proxy Authentication Required".into(),
        })
    });
    let failure = client(&mock).get("http://a.example/").send().await.unwrap_err();
    assert_eq!(failure.status(), 407);
}

#[tokio::test]
async fn test_invalid_url_fails_before_dispatch() {
    let mock = Mock::ok("");
    let failure = client(&mock).get("not a url").send().await.unwrap_err();
    assert!(matches!(failure.error, NetError::InvalidUrl));
    assert_eq!(mock.calls(), 0);
}

// === Bodies ===

#[tokio::test]
async fn test_gzip_body_decoded_and_bad_gzip_kept_raw() {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(b"hello, gzip").unwrap();
    let gz = encoder.finish().unwrap();

    let mock = Mock::new(move |call, _| match call {
        0 => Ok((200, vec![("content-encoding", "gzip")], gz.clone())),
        _ => Ok((200, vec![("content-encoding", "gzip")], b"plainly not gzip".to_vec())),
    });
    let client = client(&mock);

    let resp = client.get("http://a.example/").send().await.unwrap();
    assert_eq!(resp.text, "hello, gzip");
    let resp = client.get("http://a.example/").send().await.unwrap();
    assert_eq!(resp.text, "plainly not gzip");
    assert_eq!(&resp.bytes[..], b"plainly not gzip");
}

#[tokio::test]
async fn test_body_precedence_and_query_merge() {
    let mock = Mock::ok("");
    let mut client = client(&mock);
    client.set_query_params([("lang", "en")]);

    client
        .post("http://a.example/submit?x=1")
        .query_param("lang", "fr")
        .form([("field", "value")])
        .multipart_text("ignored", "because form wins")
        .send()
        .await
        .unwrap();

    let sent = &mock.seen()[0];
    assert_eq!(sent.url.as_str(), "http://a.example/submit?x=1&lang=fr");
    assert_eq!(&sent.body[..], b"field=value");
    assert_eq!(
        sent.headers.get("content-type"),
        Some("application/x-www-form-urlencoded")
    );
}

#[tokio::test]
async fn test_multipart_rejected_on_get() {
    let mock = Mock::ok("");
    let failure = client(&mock)
        .get("http://a.example/")
        .multipart_text("a", "1")
        .send()
        .await
        .unwrap_err();
    assert!(matches!(failure.error, NetError::BodyNotAllowed { .. }));
    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn test_multipart_rejected_on_get_even_when_text_wins() {
    let mock = Mock::ok("");
    let failure = client(&mock)
        .get("http://a.example/")
        .body("x")
        .multipart_text("a", "1")
        .send()
        .await
        .unwrap_err();
    assert!(matches!(failure.error, NetError::BodyNotAllowed { .. }));
    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn test_empty_text_body_counts_as_absent() {
    let mock = Mock::ok("");
    let client = client(&mock);

    client
        .post("http://a.example/")
        .body("")
        .form([("a", "1")])
        .send()
        .await
        .unwrap();
    client.post("http://a.example/").body("").send().await.unwrap();

    let seen = mock.seen();
    assert_eq!(&seen[0].body[..], b"a=1");
    assert_eq!(
        seen[0].headers.get("content-type"),
        Some("application/x-www-form-urlencoded")
    );
    assert!(seen[1].body.is_empty());
    assert!(seen[1].headers.get("content-type").is_none());
}

// === Worker pool ===

#[tokio::test]
async fn test_worker_pool_drains_every_request() {
    let mock = Mock::new(|call, _| {
        if call % 4 == 0 {
            Err(NetError::Status {
                status: 503,
                message: "busy".into(),
            })
        } else {
            Ok((200, vec![], b"ok".to_vec()))
        }
    });
    let client = Client::builder()
        .transport_factory(Arc::new(MockFactory(mock.clone())))
        .workers(4)
        .queue_capacity(2)
        .build();

    let mut responses = client.start_workers().unwrap();
    for i in 0..16 {
        client
            .get(format!("http://a.example/{i}"))
            .queue()
            .await
            .unwrap();
    }
    client.close().await;

    let mut statuses = Vec::new();
    while let Some(resp) = responses.recv().await {
        statuses.push(resp.status);
    }
    assert_eq!(statuses.len(), 16);
    assert_eq!(statuses.iter().filter(|s| **s == 503).count(), 4);
    assert_eq!(mock.calls(), 16);

    assert!(matches!(
        client.get("http://a.example/").queue().await,
        Err(NetError::PoolNotStarted)
    ));
}
