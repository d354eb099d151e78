use crate::body::{prefers_json, read_form_body};
use crate::config::{Config, DEFAULT_SESSION_SECRET, StoreErrorPolicy};
use crate::cors::{CorsDecision, CorsPolicy};
use crate::errors::IntakeError;
use crate::metrics_defs::{CORS_REJECTED, REQUEST_DURATION};
use crate::pages::PageRouter;
use crate::session::SessionStore;
use crate::submissions::{EMAIL_FORM, SubmissionForm, find_form, submit};
use http_body_util::combinators::BoxBody;
use hyper::body::{Body, Bytes, Incoming};
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderValue, LOCATION, ORIGIN, SET_COOKIE};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use recordstore::RecordStore;
use serde::Serialize;
use shared::http::{empty_body, full_body, make_boxed_error_response, make_text_response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub type ResponseBody = BoxBody<Bytes, IntakeError>;

/// JSON answer for clients that ask for JSON instead of a redirect.
#[derive(Serialize)]
struct SubmissionReceipt<'a> {
    message: &'a str,
    id: &'a str,
}

/// Everything a request needs, shared by all connections.
pub struct Intake {
    cors: CorsPolicy,
    sessions: SessionStore,
    pages: PageRouter,
    store: Arc<dyn RecordStore>,
    max_body_bytes: usize,
    store_timeout: Duration,
    email_store_errors: StoreErrorPolicy,
}

impl Intake {
    pub fn new(config: &Config, store: Arc<dyn RecordStore>) -> Self {
        if config.session.secret == DEFAULT_SESSION_SECRET {
            tracing::warn!("Session secret is the built-in placeholder. Set session.secret or SESSION_SECRET.");
        }

        Intake {
            cors: CorsPolicy::new(&config.cors),
            sessions: SessionStore::new(&config.session),
            pages: PageRouter::new(&config.site),
            store,
            max_body_bytes: config.max_body_bytes,
            store_timeout: Duration::from_secs(config.store_timeout_secs),
            email_store_errors: config.email_store_errors,
        }
    }

    /// CORS, then session, then dispatch. Never fails: errors become responses.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let started = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let response = match self.cors.evaluate(&method, req.headers()) {
            CorsDecision::Reject(reason) => {
                tracing::warn!(
                    method = %method,
                    path = %path,
                    origin = ?req.headers().get(ORIGIN),
                    reason,
                    "Cross-origin request rejected"
                );
                shared::counter!(CORS_REJECTED).increment(1);
                make_boxed_error_response(StatusCode::FORBIDDEN)
            }
            CorsDecision::Preflight(headers) => {
                let mut response = Response::new(empty_body());
                response.headers_mut().extend(headers);
                response
                    .headers_mut()
                    .insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
                response
            }
            CorsDecision::Allow(headers) => {
                let session = self.sessions.resume_or_start(req.headers());
                if session.is_new {
                    tracing::debug!(session = %session.id, "Started session");
                }

                let mut response = self.dispatch(req).await;
                response.headers_mut().extend(headers);
                if let Some(cookie) = session.set_cookie {
                    response.headers_mut().append(SET_COOKIE, cookie);
                }
                response
            }
        };

        let status = response.status();
        shared::histogram!(REQUEST_DURATION, "status" => status.as_str().to_string())
            .record(started.elapsed().as_secs_f64());
        tracing::debug!(method = %method, path = %path, status = status.as_u16(), "Handled request");

        response
    }

    async fn dispatch<B>(&self, req: Request<B>) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if let Some(form) = find_form(req.uri().path())
            && req.method() == Method::POST
        {
            return self.handle_submission(form, req).await;
        }

        match *req.method() {
            Method::GET => self.pages.serve(req.uri().path(), false).await,
            Method::HEAD => self.pages.serve(req.uri().path(), true).await,
            _ => make_boxed_error_response(StatusCode::NOT_FOUND),
        }
    }

    async fn handle_submission<B>(
        &self,
        form: &'static SubmissionForm,
        req: Request<B>,
    ) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let wants_json = prefers_json(req.headers());
        let (parts, body) = req.into_parts();

        let body = match read_form_body(&parts.headers, body, self.max_body_bytes).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(path = form.path, error = %e, "Rejected submission body");
                return make_text_response(e.status_code(), e.to_string());
            }
        };

        let policy = match form.collection == EMAIL_FORM.collection {
            true => self.email_store_errors,
            false => StoreErrorPolicy::Surface,
        };

        match submit(form, &body, self.store.as_ref(), self.store_timeout, policy).await {
            Ok(id) if wants_json => receipt_response(form, &id),
            Ok(_) => redirect_response(form.redirect_to),
            // Already logged by the store layer
            Err(_) => make_text_response(StatusCode::INTERNAL_SERVER_ERROR, form.failure_message),
        }
    }
}

fn redirect_response(location: &'static str) -> Response<ResponseBody> {
    let mut response = make_text_response(
        StatusCode::FOUND,
        format!("Found. Redirecting to {location}"),
    );
    response
        .headers_mut()
        .insert(LOCATION, HeaderValue::from_static(location));
    response
}

fn receipt_response(form: &SubmissionForm, id: &str) -> Response<ResponseBody> {
    let receipt = SubmissionReceipt {
        message: form.success_message,
        id,
    };
    match serde_json::to_vec(&receipt) {
        Ok(bytes) => {
            let mut response = Response::new(full_body(bytes));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize submission receipt");
            make_boxed_error_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Hyper entry point for the public listener.
pub struct IntakeService {
    intake: Arc<Intake>,
}

impl IntakeService {
    pub fn new(intake: Intake) -> Self {
        IntakeService {
            intake: Arc::new(intake),
        }
    }
}

impl Service<Request<Incoming>> for IntakeService {
    type Response = Response<ResponseBody>;
    type Error = IntakeError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let intake = self.intake.clone();
        Box::pin(async move { Ok(intake.handle(req).await) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;
    use crate::testutils::FailingRecordStore;
    use http_body_util::{BodyExt, Full};
    use hyper::header::{
        ACCEPT, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_METHOD, HOST,
    };
    use recordstore::memory::MemoryRecordStore;
    use std::fs;

    const ALLOWED_ORIGIN: &str = "http://13.200.229.146";

    struct TestSite {
        _dir: tempfile::TempDir,
        config: Config,
    }

    fn test_site() -> TestSite {
        let dir = tempfile::tempdir().unwrap();
        let pages = dir.path().join("pages");
        fs::create_dir_all(&pages).unwrap();
        fs::write(pages.join("index.html"), "index page").unwrap();
        fs::write(pages.join("hom.html"), "hom page").unwrap();

        let config = Config {
            site: SiteConfig {
                pages_dir: pages.to_str().unwrap().into(),
                assets_dir: dir.path().join("public").to_str().unwrap().into(),
            },
            ..Default::default()
        };
        TestSite { _dir: dir, config }
    }

    fn memory_intake(config: &Config) -> (Intake, Arc<MemoryRecordStore>) {
        let store = Arc::new(MemoryRecordStore::new());
        (Intake::new(config, store.clone()), store)
    }

    fn form_post(path: &str, body: &'static str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(HOST, "localhost:8080")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Full::new(Bytes::from(body)))
            .unwrap()
    }

    fn get(path: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    async fn body_text(response: Response<ResponseBody>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn location(response: &Response<ResponseBody>) -> &str {
        response.headers()[LOCATION].to_str().unwrap()
    }

    #[tokio::test]
    async fn test_each_form_stores_and_redirects() {
        let site = test_site();
        let (intake, store) = memory_intake(&site.config);

        let cases = [
            ("/submitEmail", "email=a%40example.com", "Emails", "emailid", "/about"),
            ("/submitQuestion", "question=Why%3F", "Questions", "questionid", "/nn.html"),
            ("/submitAnswer", "answer=Because", "Answers", "answerid", "/"),
            (
                "/submitQuery",
                "name=Bob&email=b%40example.com&query=hello",
                "Queries",
                "queryid",
                "/",
            ),
        ];

        for (path, body, collection, key, target) in cases {
            let response = intake.handle(form_post(path, body)).await;
            assert_eq!(response.status(), StatusCode::FOUND, "{path}");
            assert_eq!(location(&response), target, "{path}");

            let records = store.records(collection);
            assert_eq!(records.len(), 1, "{path}");
            assert!(!records[0][key].is_empty(), "{path}");
        }

        assert_eq!(store.total(), 4);
        assert_eq!(store.records("Emails")[0]["email"], "a@example.com");
        assert_eq!(store.records("Questions")[0]["question"], "Why?");
    }

    #[tokio::test]
    async fn test_query_json_example() {
        let site = test_site();
        let (intake, store) = memory_intake(&site.config);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/submitQuery")
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(
                r#"{"name":"Alice","email":"a@example.com","query":"hi"}"#,
            )))
            .unwrap();
        let response = intake.handle(request).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/");

        let records = store.records("Queries");
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.len(), 4);
        assert!(!record["queryid"].is_empty());
        assert_eq!(record["name"], "Alice");
        assert_eq!(record["email"], "a@example.com");
        assert_eq!(record["query"], "hi");
    }

    #[tokio::test]
    async fn test_duplicate_bodies_create_two_records() {
        let site = test_site();
        let (intake, store) = memory_intake(&site.config);

        for _ in 0..2 {
            let response = intake.handle(form_post("/submitAnswer", "answer=same")).await;
            assert_eq!(response.status(), StatusCode::FOUND);
        }

        let records = store.records("Answers");
        assert_eq!(records.len(), 2);
        assert_ne!(records[0]["answerid"], records[1]["answerid"]);
    }

    #[tokio::test]
    async fn test_store_failure_yields_500() {
        let site = test_site();
        let intake = Intake::new(&site.config, Arc::new(FailingRecordStore));

        let cases = [
            ("/submitQuestion", "question=q", "Error submitting question."),
            ("/submitAnswer", "answer=a", "Error submitting answer."),
            ("/submitQuery", "query=q", "Error submitting query."),
            ("/submitEmail", "email=e", "Error submitting email."),
        ];
        for (path, body, message) in cases {
            let response = intake.handle(form_post(path, body)).await;
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR, "{path}");
            assert!(!response.headers().contains_key(LOCATION));
            assert_eq!(body_text(response).await, message);
        }
    }

    #[tokio::test]
    async fn test_email_log_only_policy_still_redirects() {
        let mut site = test_site();
        site.config.email_store_errors = StoreErrorPolicy::LogOnly;
        let intake = Intake::new(&site.config, Arc::new(FailingRecordStore));

        let response = intake.handle(form_post("/submitEmail", "email=e")).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/about");

        // The policy only covers the email form
        let response = intake.handle(form_post("/submitQuery", "query=q")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_foreign_origin_rejected_before_store() {
        let site = test_site();
        let (intake, store) = memory_intake(&site.config);

        let mut request = form_post("/submitQuery", "name=x&email=y&query=z");
        request
            .headers_mut()
            .insert(ORIGIN, HeaderValue::from_static("http://evil.example"));
        let response = intake.handle(request).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(!response.headers().contains_key(SET_COOKIE));
        assert_eq!(store.total(), 0);
    }

    #[tokio::test]
    async fn test_allowed_origin_and_preflight() {
        let site = test_site();
        let (intake, store) = memory_intake(&site.config);

        let mut request = form_post("/submitEmail", "email=e");
        request
            .headers_mut()
            .insert(ORIGIN, HeaderValue::from_static(ALLOWED_ORIGIN));
        let response = intake.handle(request).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], ALLOWED_ORIGIN);
        assert_eq!(store.total(), 1);

        let preflight = Request::builder()
            .method(Method::OPTIONS)
            .uri("/submitQuery")
            .header(ORIGIN, ALLOWED_ORIGIN)
            .header(ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = intake.handle(preflight).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], ALLOWED_ORIGIN);
        assert_eq!(store.total(), 1);
    }

    #[tokio::test]
    async fn test_static_pages() {
        let site = test_site();
        let (intake, _store) = memory_intake(&site.config);

        let response = intake.handle(get("/")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "index page");

        let response = intake.handle(get("/about")).await;
        assert_eq!(body_text(response).await, "hom page");

        let response = intake.handle(get("/nonexistent.html")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_method_mismatch_is_not_found() {
        let site = test_site();
        let (intake, store) = memory_intake(&site.config);

        let response = intake.handle(get("/submitEmail")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = intake.handle(form_post("/about", "email=e")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(store.total(), 0);
    }

    #[tokio::test]
    async fn test_session_cookie_on_every_response() {
        let site = test_site();
        let (intake, _store) = memory_intake(&site.config);

        let first = intake.handle(get("/")).await;
        let cookie = first.headers()[SET_COOKIE].to_str().unwrap().to_string();
        assert!(cookie.starts_with("sid="));
        assert!(cookie.contains("Max-Age=600"));

        let pair = cookie.split(';').next().unwrap().to_string();
        let mut request = form_post("/submitAnswer", "answer=a");
        request
            .headers_mut()
            .insert(hyper::header::COOKIE, HeaderValue::from_str(&pair).unwrap());
        let second = intake.handle(request).await;
        let renewed = second.headers()[SET_COOKIE].to_str().unwrap();

        // Same session id, re-issued with a fresh expiry
        let session_id = |cookie: &str| cookie.split('.').next().unwrap().to_string();
        assert_eq!(session_id(renewed), session_id(&pair));
    }

    #[tokio::test]
    async fn test_routes_ignore_case_and_trailing_slash() {
        let site = test_site();
        let (intake, store) = memory_intake(&site.config);

        let response = intake
            .handle(form_post("/submitQuery/", "name=a&email=b&query=c"))
            .await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/");

        let response = intake.handle(form_post("/SubmitEmail", "email=e")).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(store.total(), 2);

        let response = intake.handle(get("/About")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "hom page");
    }

    #[tokio::test]
    async fn test_json_clients_get_receipt() {
        let site = test_site();
        let (intake, store) = memory_intake(&site.config);

        let mut request = form_post("/submitQuery", "name=a&email=b&query=c");
        request.headers_mut().insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        let response = intake.handle(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");

        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["message"], "Query submitted successfully.");
        assert_eq!(json["id"], store.records("Queries")[0]["queryid"].as_str());
    }

    #[tokio::test]
    async fn test_body_errors() {
        let mut site = test_site();
        site.config.max_body_bytes = 16;
        let (intake, store) = memory_intake(&site.config);

        let response = intake
            .handle(form_post("/submitQuestion", "question=this-is-far-too-long"))
            .await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/submitQuestion")
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from("{oops")))
            .unwrap();
        let response = intake.handle(request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert_eq!(store.total(), 0);
    }
}
