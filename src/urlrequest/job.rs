use crate::base::neterror::NetError;
use crate::cookies::monster::CookieMonster;
use crate::http::transaction::HttpNetworkTransaction;
use crate::http::transport::{authority_of, RedirectPolicy, Transport, WireRequest};
use crate::urlrequest::prepare::PreparedRequest;
use bytes::Bytes;
use http::{Method, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Final hop of a job: where it ended up, the response head and the raw
/// (still content-encoded) body.
#[derive(Debug)]
pub struct JobOutcome {
    pub url: Url,
    pub parts: http::response::Parts,
    pub body: Bytes,
}

/// Drives one request through redirects, one [`HttpNetworkTransaction`] per
/// hop, sharing the cookie jar between hops.
pub struct URLRequestHttpJob {
    transport: Arc<dyn Transport>,
    jar: Arc<CookieMonster>,
    request: WireRequest,
    caller_cookie: Option<String>,
    redirect: RedirectPolicy,
    redirects_followed: usize,
}

impl URLRequestHttpJob {
    pub fn new(prepared: &PreparedRequest) -> Self {
        let mut request = prepared.wire.clone();
        let caller_cookie = request.remove_header("cookie");
        Self {
            transport: prepared.transport.clone(),
            jar: prepared.jar.clone(),
            request,
            caller_cookie,
            redirect: prepared.redirect,
            redirects_followed: 0,
        }
    }

    /// [`start`](Self::start) under a deadline covering every hop and the
    /// body read.
    pub async fn run(self, timeout: Duration) -> Result<JobOutcome, NetError> {
        match tokio::time::timeout(timeout, self.start()).await {
            Ok(result) => result,
            Err(_) => Err(NetError::TimedOut(timeout)),
        }
    }

    pub async fn start(mut self) -> Result<JobOutcome, NetError> {
        loop {
            let mut transaction = HttpNetworkTransaction::new(
                self.transport.clone(),
                self.jar.clone(),
                self.request.clone(),
                self.caller_cookie.clone(),
            );
            transaction.start().await?;
            let response = transaction
                .take_response()
                .ok_or(NetError::InvalidResponse)?;
            let (parts, body) = response.into_parts();

            match self.next_hop(&parts)? {
                Some(next) => {
                    drop(body);
                    self.follow(parts.status, next);
                }
                None => {
                    let body = body.bytes().await?;
                    return Ok(JobOutcome {
                        url: self.request.url,
                        parts,
                        body,
                    });
                }
            }
        }
    }

    /// The redirect target, if this response should be followed.
    fn next_hop(&self, parts: &http::response::Parts) -> Result<Option<Url>, NetError> {
        if !is_redirect(parts.status) {
            return Ok(None);
        }
        let limit = match self.redirect {
            RedirectPolicy::UseLastResponse => return Ok(None),
            RedirectPolicy::Follow(limit) => limit,
        };
        let Some(location) = parts.headers.get(http::header::LOCATION) else {
            return Ok(None);
        };
        if self.redirects_followed >= limit {
            return Err(NetError::TooManyRedirects);
        }
        let location = location.to_str().map_err(|_| NetError::InvalidRedirect)?;
        let next = self
            .request
            .url
            .join(location)
            .map_err(|_| NetError::InvalidRedirect)?;
        if !matches!(next.scheme(), "http" | "https") {
            return Err(NetError::InvalidRedirect);
        }
        Ok(Some(next))
    }

    fn follow(&mut self, status: StatusCode, next: Url) {
        self.redirects_followed += 1;
        debug!(
            from = %self.request.url,
            to = %next,
            status = status.as_u16(),
            hop = self.redirects_followed,
            "following redirect"
        );

        // 301/302/303 turn into a bodyless GET; 307/308 replay as-is.
        if matches!(
            status,
            StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER
        ) {
            if self.request.method != Method::GET && self.request.method != Method::HEAD {
                self.request.method = Method::GET;
            }
            self.request.body = Bytes::new();
            self.request.remove_header("content-type");
        }

        if next.host_str() != self.request.url.host_str() {
            self.request.remove_header("authorization");
            self.request.remove_header("www-authenticate");
            self.caller_cookie = None;
        }
        self.request.set_header("Host", authority_of(&next));
        self.request.url = next;
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::orderedheaders::{CaseSensitiveHeaders, HeaderOrderList, PSEUDO_HEADER_ORDER};
    use crate::http::responsebody::ResponseBody;
    use crate::urlrequest::request::RequestDescriptor;
    use futures::future::BoxFuture;
    use std::sync::Mutex;

    type Reply = (u16, Vec<(&'static str, &'static str)>, &'static str);

    /// Replies from a script and records every request it saw.
    struct Scripted {
        replies: Mutex<Vec<Reply>>,
        seen: Mutex<Vec<WireRequest>>,
    }

    impl Scripted {
        fn new(mut replies: Vec<Reply>) -> Arc<Self> {
            replies.reverse();
            Arc::new(Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl Transport for Scripted {
        fn round_trip(
            &self,
            request: WireRequest,
        ) -> BoxFuture<'_, Result<http::Response<ResponseBody>, NetError>> {
            self.seen.lock().unwrap().push(request);
            let reply = self.replies.lock().unwrap().pop();
            Box::pin(async move {
                let (status, headers, body) = reply.ok_or(NetError::ConnectionClosed)?;
                let mut builder = http::Response::builder().status(status);
                for (k, v) in headers {
                    builder = builder.header(k, v);
                }
                Ok(builder.body(ResponseBody::full(body)).unwrap())
            })
        }
    }

    fn prepared(
        transport: Arc<Scripted>,
        method: Method,
        url: &str,
        redirect: RedirectPolicy,
    ) -> PreparedRequest {
        let url = Url::parse(url).unwrap();
        let mut headers = CaseSensitiveHeaders::new();
        headers.insert("Host", authority_of(&url));
        headers.insert("Authorization", "Bearer t");
        headers.insert("Content-Type", "text/plain");
        headers.insert("Cookie", "mine=1");
        PreparedRequest {
            descriptor: RequestDescriptor::new(method.clone(), url.as_str()),
            wire: WireRequest {
                method,
                url,
                headers,
                header_order: HeaderOrderList::chrome(),
                pseudo_order: PSEUDO_HEADER_ORDER,
                body: Bytes::from_static(b"payload"),
            },
            transport,
            jar: Arc::new(CookieMonster::new()),
            timeout: Duration::from_secs(5),
            redirect,
        }
    }

    #[tokio::test]
    async fn test_see_other_becomes_get_and_strips_on_cross_host() {
        let transport = Scripted::new(vec![
            (303, vec![("location", "http://other.example/done")], ""),
            (200, vec![], "ok"),
        ]);
        let p = prepared(
            transport.clone(),
            Method::POST,
            "http://a.example/form",
            RedirectPolicy::default(),
        );

        let outcome = URLRequestHttpJob::new(&p).start().await.unwrap();
        assert_eq!(outcome.parts.status, 200);
        assert_eq!(outcome.url.as_str(), "http://other.example/done");
        assert_eq!(&outcome.body[..], b"ok");

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].headers.get("cookie"), Some("mine=1"));
        let second = &seen[1];
        assert_eq!(second.method, Method::GET);
        assert!(second.body.is_empty());
        assert_eq!(second.headers.get("host"), Some("other.example"));
        assert!(second.headers.get("authorization").is_none());
        assert!(second.headers.get("content-type").is_none());
        assert!(second.headers.get("cookie").is_none());
    }

    #[tokio::test]
    async fn test_temporary_redirect_keeps_method_and_body() {
        let transport = Scripted::new(vec![
            (307, vec![("location", "/again")], ""),
            (201, vec![], ""),
        ]);
        let p = prepared(
            transport.clone(),
            Method::PUT,
            "http://a.example/x",
            RedirectPolicy::default(),
        );

        URLRequestHttpJob::new(&p).start().await.unwrap();
        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[1].method, Method::PUT);
        assert_eq!(&seen[1].body[..], b"payload");
        assert_eq!(seen[1].url.as_str(), "http://a.example/again");
        assert_eq!(seen[1].headers.get("authorization"), Some("Bearer t"));
        assert_eq!(seen[1].headers.get("cookie"), Some("mine=1"));
    }

    #[tokio::test]
    async fn test_use_last_response() {
        let transport = Scripted::new(vec![(302, vec![("location", "/next")], "moved")]);
        let p = prepared(
            transport.clone(),
            Method::GET,
            "http://a.example/",
            RedirectPolicy::UseLastResponse,
        );

        let outcome = URLRequestHttpJob::new(&p).start().await.unwrap();
        assert_eq!(outcome.parts.status, 302);
        assert_eq!(&outcome.body[..], b"moved");
        assert_eq!(transport.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_too_many_redirects() {
        let transport = Scripted::new(vec![
            (302, vec![("location", "/1")], ""),
            (302, vec![("location", "/2")], ""),
            (302, vec![("location", "/3")], ""),
        ]);
        let p = prepared(
            transport,
            Method::GET,
            "http://a.example/",
            RedirectPolicy::Follow(2),
        );

        let err = URLRequestHttpJob::new(&p).start().await.unwrap_err();
        assert!(matches!(err, NetError::TooManyRedirects));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_covers_the_exchange() {
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
        let mut p = prepared(
            Scripted::new(vec![]),
            Method::GET,
            "http://a.example/",
            RedirectPolicy::default(),
        );
        p.transport = Arc::new(Stall) as Arc<dyn Transport>;

        let err = URLRequestHttpJob::new(&p)
            .run(Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::TimedOut(d) if d == Duration::from_secs(2)));
    }
}
