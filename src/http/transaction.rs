//! One request/response hop, and the dispatcher that drives a whole
//! exchange to a [`Response`].

use crate::base::classify::{classify, ClassifiedError};
use crate::base::neterror::NetError;
use crate::cookies::monster::CookieMonster;
use crate::http::response::{flatten_headers, set_cookie_lines, Response};
use crate::http::responsebody::{content_codings, decode_body, ResponseBody};
use crate::http::transport::{Transport, WireRequest};
use crate::urlrequest::job::URLRequestHttpJob;
use crate::urlrequest::prepare::PreparedRequest;
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    AttachCookies,
    SendRequest,
    SaveCookies,
    Done,
}

/// Sends one [`WireRequest`] and records the cookies it set.
///
/// The `Cookie` header is rebuilt from the caller's own value plus whatever
/// the jar holds for the hop URL, so a redirect to another host never sees
/// cookies scoped elsewhere.
pub struct HttpNetworkTransaction {
    transport: Arc<dyn Transport>,
    jar: Arc<CookieMonster>,
    request: WireRequest,
    caller_cookie: Option<String>,
    state: State,
    response: Option<http::Response<ResponseBody>>,
}

impl HttpNetworkTransaction {
    pub fn new(
        transport: Arc<dyn Transport>,
        jar: Arc<CookieMonster>,
        request: WireRequest,
        caller_cookie: Option<String>,
    ) -> Self {
        Self {
            transport,
            jar,
            request,
            caller_cookie,
            state: State::Idle,
            response: None,
        }
    }

    pub fn request(&self) -> &WireRequest {
        &self.request
    }

    pub async fn start(&mut self) -> Result<(), NetError> {
        self.state = State::AttachCookies;
        self.do_loop().await
    }

    async fn do_loop(&mut self) -> Result<(), NetError> {
        loop {
            match self.state {
                State::Idle | State::Done => return Ok(()),
                State::AttachCookies => {
                    let jar_cookies = self.jar.cookie_header_for_url(&self.request.url);
                    let value = match (self.caller_cookie.as_deref(), jar_cookies) {
                        (Some(own), Some(jar)) if !own.is_empty() => Some(format!("{own}; {jar}")),
                        (Some(own), None) if !own.is_empty() => Some(own.to_string()),
                        (_, jar) => jar,
                    };
                    match value {
                        Some(v) => self.request.set_header("Cookie", v),
                        None => {
                            self.request.remove_header("cookie");
                        }
                    }
                    self.state = State::SendRequest;
                }
                State::SendRequest => {
                    trace!(method = %self.request.method, url = %self.request.url, "sending");
                    let response = self.transport.round_trip(self.request.clone()).await?;
                    self.response = Some(response);
                    self.state = State::SaveCookies;
                }
                State::SaveCookies => {
                    if let Some(response) = &self.response {
                        let lines = response
                            .headers()
                            .get_all(http::header::SET_COOKIE)
                            .iter()
                            .filter_map(|v| v.to_str().ok());
                        let stored = self.jar.save_response_cookies(&self.request.url, lines);
                        if stored > 0 {
                            trace!(url = %self.request.url, stored, "cookies saved");
                        }
                    }
                    self.state = State::Done;
                }
            }
        }
    }

    pub fn take_response(&mut self) -> Option<http::Response<ResponseBody>> {
        self.response.take()
    }
}

/// A failed dispatch. There is always a best-effort [`Response`] to hand
/// back alongside the error.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct DispatchFailure {
    pub response: Response,
    pub classified: Option<ClassifiedError>,
    #[source]
    pub error: NetError,
}

impl DispatchFailure {
    pub fn new(error: NetError) -> Self {
        let classified = classify(&error);
        let response = Response::from_failure(classified.as_ref(), &error);
        Self {
            response,
            classified,
            error,
        }
    }

    pub fn status(&self) -> u16 {
        self.response.status
    }
}

impl From<NetError> for DispatchFailure {
    fn from(error: NetError) -> Self {
        Self::new(error)
    }
}

/// Run a prepared request to completion: every redirect hop and the body
/// read happen under the request timeout. No retries here.
pub async fn dispatch(prepared: PreparedRequest) -> Result<Response, DispatchFailure> {
    let url = prepared.url().clone();
    let jar = prepared.jar.clone();

    let outcome = match URLRequestHttpJob::new(&prepared)
        .run(prepared.timeout)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            debug!(url = %url, error = %e, "dispatch failed");
            return Err(DispatchFailure::new(e));
        }
    };

    let codings = content_codings(
        outcome
            .parts
            .headers
            .get_all(http::header::CONTENT_ENCODING)
            .iter()
            .filter_map(|v| v.to_str().ok()),
    );
    let (text, bytes) = decode_body(&outcome.body, &codings);

    debug!(
        url = %url,
        final_url = %outcome.url,
        status = outcome.parts.status.as_u16(),
        bytes = bytes.len(),
        "dispatch complete"
    );

    Ok(Response {
        status: outcome.parts.status.as_u16(),
        headers: flatten_headers(&outcome.parts.headers),
        set_cookie_lines: set_cookie_lines(&outcome.parts.headers),
        bytes,
        text,
        cookies: jar.get_cookies_for_url(&url),
    })
}
