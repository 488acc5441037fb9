//! Single-step execution: build one request, send it, judge the response,
//! and thread the session state forward.
//!
//! Failures at this boundary are data, never errors: a timeout, a bad status,
//! or a missing token all come back as a [`StepResult`] with
//! `succeeded == false` and the input session state untouched. The flow
//! orchestrator decides what a failed step means for the iteration.

use std::future::Future;
use std::time::Duration;

use reqwest::header;
use reqwest::{Client, Method};
use tokio::time::Instant;
use typed_builder::TypedBuilder;

use crate::cookies::CookieJar;
use crate::extract::{TokenExtractor, ViewState};
use crate::metric::FailureKind;
use crate::validate::Validation;

/// Header tagging a request as a partial/AJAX submission.
const PARTIAL_REQUEST_HEADER: &str = "Faces-Request";
const PARTIAL_REQUEST_VALUE: &str = "partial/ajax";

/// What the step is expected to do with the session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPolicy {
    /// The response must carry a fresh token; absence is a state failure.
    Required,
    /// Take a fresh token if the response carries one, else keep the prior.
    Optional,
    /// Do not look for a token; pass the prior one through unchanged.
    None,
}

/// One named HTTP interaction of the scripted journey.
#[derive(Debug, Clone, TypedBuilder)]
pub struct StepSpec {
    #[builder(setter(into))]
    pub name: String,
    pub method: Method,
    #[builder(setter(into))]
    pub url: String,
    /// Fixed business parameters, form-encoded on POST.
    #[builder(default)]
    pub form: Vec<(String, String)>,
    /// Form field the session token is echoed under, when the step posts one.
    #[builder(default)]
    pub token_field: Option<String>,
    /// Tag the request as a partial/AJAX submission.
    #[builder(default = false)]
    pub partial: bool,
    pub validation: Validation,
    #[builder(default = TokenPolicy::None)]
    pub token_policy: TokenPolicy,
    #[builder(default = Duration::from_secs(30))]
    pub timeout: Duration,
}

/// The session identity one iteration threads between its steps: the current
/// view token plus the accumulated cookies. Fresh per iteration, never shared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub token: Option<ViewState>,
    pub cookies: CookieJar,
}

impl SessionState {
    pub fn fresh() -> Self {
        Self::default()
    }
}

/// Uniform result of one step. On failure the token and cookies are exactly
/// the input session's — a failed step never corrupts session state.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub succeeded: bool,
    pub status: u16,
    pub token: Option<ViewState>,
    pub cookies: CookieJar,
    pub latency: Duration,
    pub bytes: usize,
    pub failure: Option<FailureKind>,
}

impl StepResult {
    fn failed(
        session: &SessionState,
        status: u16,
        latency: Duration,
        bytes: usize,
        kind: FailureKind,
    ) -> Self {
        Self {
            succeeded: false,
            status,
            token: session.token.clone(),
            cookies: session.cookies.clone(),
            latency,
            bytes,
            failure: Some(kind),
        }
    }
}

/// Executes one step against the target. The seam exists so the flow
/// orchestrator can be driven by scripted results in tests.
pub trait StepRunner {
    fn run(
        &self,
        spec: &StepSpec,
        session: &SessionState,
    ) -> impl Future<Output = StepResult> + Send;
}

/// [`StepRunner`] over a shared [`reqwest::Client`].
///
/// The client must be built with redirects disabled: auth transitions are
/// judged on the 302 itself, and an unexpected redirect anywhere else means
/// an expired session, which the validators must get to see. Cookies are
/// threaded by the session's own jar, not a client-side store.
pub struct HttpStepRunner<X> {
    client: Client,
    extractor: X,
}

impl<X: TokenExtractor> HttpStepRunner<X> {
    pub fn new(client: Client, extractor: X) -> Self {
        Self { client, extractor }
    }
}

impl<X> StepRunner for HttpStepRunner<X>
where
    X: TokenExtractor,
{
    async fn run(&self, spec: &StepSpec, session: &SessionState) -> StepResult {
        let mut request = self
            .client
            .request(spec.method.clone(), &spec.url)
            .timeout(spec.timeout);

        if !session.cookies.is_empty() {
            request = request.header(header::COOKIE, session.cookies.header_value());
        }
        if spec.partial {
            request = request.header(PARTIAL_REQUEST_HEADER, PARTIAL_REQUEST_VALUE);
        }
        if spec.method == Method::POST {
            let mut form = spec.form.clone();
            if let (Some(field), Some(token)) = (&spec.token_field, &session.token) {
                form.push((field.clone(), token.as_str().to_owned()));
            }
            request = request.form(&form);
        }

        let started = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(step = %spec.name, %err, "transport failure");
                return StepResult::failed(
                    session,
                    0,
                    started.elapsed(),
                    0,
                    FailureKind::Transport,
                );
            }
        };

        let status = response.status().as_u16();
        let set_cookies: Vec<String> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok().map(str::to_owned))
            .collect();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                tracing::debug!(step = %spec.name, %err, "failed reading response body");
                return StepResult::failed(
                    session,
                    status,
                    started.elapsed(),
                    0,
                    FailureKind::Transport,
                );
            }
        };
        let latency = started.elapsed();

        if !spec.validation.accepts(status, &body) {
            tracing::debug!(step = %spec.name, status, bytes = body.len(), "invalid response");
            return StepResult::failed(session, status, latency, body.len(), FailureKind::Protocol);
        }

        let token = match resolve_token(&self.extractor, spec.token_policy, &body, &session.token)
        {
            Ok(token) => token,
            Err(()) => {
                tracing::debug!(step = %spec.name, "expected token absent from valid response");
                return StepResult::failed(session, status, latency, body.len(), FailureKind::State);
            }
        };

        StepResult {
            succeeded: true,
            status,
            token,
            cookies: session.cookies.merged(set_cookies.iter().map(String::as_str)),
            latency,
            bytes: body.len(),
            failure: None,
        }
    }
}

/// Apply a [`TokenPolicy`] to a validated body. `Err(())` is the state
/// failure: a required token was absent.
fn resolve_token<X: TokenExtractor>(
    extractor: &X,
    policy: TokenPolicy,
    body: &str,
    prior: &Option<ViewState>,
) -> Result<Option<ViewState>, ()> {
    match policy {
        TokenPolicy::Required => match extractor.extract(body) {
            Some(token) => Ok(Some(token)),
            None => Err(()),
        },
        TokenPolicy::Optional => Ok(extractor.extract(body).or_else(|| prior.clone())),
        TokenPolicy::None => Ok(prior.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{FieldValueExtractor, FACES_VIEW_STATE};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn extractor() -> FieldValueExtractor {
        FieldValueExtractor::new(FACES_VIEW_STATE).unwrap()
    }

    fn client() -> Client {
        Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap()
    }

    /// Serve one canned HTTP/1.1 response on an ephemeral port, reading the
    /// whole request (headers plus any Content-Length body) first.
    async fn serve_once(response: String) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let Some(headers_end) = find_headers_end(&request) else {
                    continue;
                };
                let head = String::from_utf8_lossy(&request[..headers_end]).to_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= headers_end + 4 + body_len {
                    break;
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        addr
    }

    fn find_headers_end(request: &[u8]) -> Option<usize> {
        request.windows(4).position(|w| w == b"\r\n\r\n")
    }

    fn http_response(status_line: &str, headers: &[&str], body: &str) -> String {
        let mut response = format!("HTTP/1.1 {status_line}\r\n");
        for header in headers {
            response.push_str(header);
            response.push_str("\r\n");
        }
        response.push_str(&format!("Content-Length: {}\r\n", body.len()));
        response.push_str("Connection: close\r\n\r\n");
        response.push_str(body);
        response
    }

    #[tokio::test]
    async fn page_step_yields_token_and_cookies() {
        let body = format!(
            "<html><body>{}<input type=\"hidden\" name=\"javax.faces.ViewState\" value=\"-77:42\" /></body></html>",
            "x".repeat(300)
        );
        let addr = serve_once(http_response(
            "200 OK",
            &["Set-Cookie: JSESSIONID=s1; Path=/; HttpOnly"],
            &body,
        ))
        .await;

        let runner = HttpStepRunner::new(client(), extractor());
        let spec = StepSpec::builder()
            .name("login_page")
            .method(Method::GET)
            .url(format!("http://{addr}/index.xhtml"))
            .validation(Validation::FullPage { min_len: 200 })
            .token_policy(TokenPolicy::Required)
            .build();

        let result = runner.run(&spec, &SessionState::fresh()).await;
        assert!(result.succeeded);
        assert_eq!(result.status, 200);
        assert_eq!(result.token, Some(ViewState::new("-77:42")));
        assert_eq!(result.cookies.get("JSESSIONID"), Some("s1"));
        assert!(result.failure.is_none());
    }

    #[tokio::test]
    async fn auth_redirect_step_keeps_token_and_merges_cookies() {
        let addr = serve_once(http_response(
            "302 Found",
            &["Location: /home.xhtml", "Set-Cookie: JSESSIONID=s2"],
            "",
        ))
        .await;

        let mut session = SessionState::fresh();
        session.token = Some(ViewState::new("-77:42"));
        session.cookies.insert("JSESSIONID", "s1");

        let runner = HttpStepRunner::new(client(), extractor());
        let spec = StepSpec::builder()
            .name("login_submit")
            .method(Method::POST)
            .url(format!("http://{addr}/index.xhtml"))
            .token_field(Some(FACES_VIEW_STATE.to_owned()))
            .validation(Validation::AuthRedirect)
            .build();

        let result = runner.run(&spec, &session).await;
        assert!(result.succeeded);
        assert_eq!(result.status, 302);
        // The redirect body carries no token; the page's token stays current.
        assert_eq!(result.token, Some(ViewState::new("-77:42")));
        assert_eq!(result.cookies.get("JSESSIONID"), Some("s2"));
    }

    #[tokio::test]
    async fn invalid_response_leaves_session_unchanged() {
        let addr = serve_once(http_response("200 OK", &["Set-Cookie: sid=new"], "tiny")).await;

        let mut session = SessionState::fresh();
        session.token = Some(ViewState::new("old"));
        session.cookies.insert("sid", "old");

        let runner = HttpStepRunner::new(client(), extractor());
        let spec = StepSpec::builder()
            .name("menu")
            .method(Method::GET)
            .url(format!("http://{addr}/menu"))
            .validation(Validation::FullPage { min_len: 200 })
            .token_policy(TokenPolicy::Required)
            .build();

        let result = runner.run(&spec, &session).await;
        assert!(!result.succeeded);
        assert_eq!(result.failure, Some(FailureKind::Protocol));
        assert_eq!(result.token, session.token);
        assert_eq!(result.cookies, session.cookies);
    }

    #[tokio::test]
    async fn connection_refused_is_a_transport_failure() {
        // Bind then drop to get a port nothing listens on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let session = SessionState::fresh();
        let runner = HttpStepRunner::new(client(), extractor());
        let spec = StepSpec::builder()
            .name("menu")
            .method(Method::GET)
            .url(format!("http://{addr}/menu"))
            .validation(Validation::FullPage { min_len: 200 })
            .build();

        let result = runner.run(&spec, &session).await;
        assert!(!result.succeeded);
        assert_eq!(result.failure, Some(FailureKind::Transport));
        assert_eq!(result.status, 0);
        assert!(result.token.is_none());
        assert!(result.cookies.is_empty());
    }

    mod resolve_token {
        use super::*;

        const BODY: &str = r#"<input name="javax.faces.ViewState" value="fresh" />"#;

        #[test]
        fn required_takes_fresh_token() {
            let token = resolve_token(&extractor(), TokenPolicy::Required, BODY, &None).unwrap();
            assert_eq!(token, Some(ViewState::new("fresh")));
        }

        #[test]
        fn required_fails_without_token() {
            let prior = Some(ViewState::new("prior"));
            assert!(resolve_token(&extractor(), TokenPolicy::Required, "<html/>", &prior).is_err());
        }

        #[test]
        fn optional_falls_back_to_prior() {
            let prior = Some(ViewState::new("prior"));
            let token =
                resolve_token(&extractor(), TokenPolicy::Optional, "<html/>", &prior).unwrap();
            assert_eq!(token, prior);

            let token = resolve_token(&extractor(), TokenPolicy::Optional, BODY, &prior).unwrap();
            assert_eq!(token, Some(ViewState::new("fresh")));
        }

        #[test]
        fn none_passes_prior_through() {
            let prior = Some(ViewState::new("prior"));
            let token = resolve_token(&extractor(), TokenPolicy::None, BODY, &prior).unwrap();
            assert_eq!(token, prior);
        }
    }
}
