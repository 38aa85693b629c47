use bytes::Bytes;
use http::StatusCode;
use reqflow_core::attribute::{ExecutionAttributes, ATTEMPT};
use reqflow_core::body::Body;
use reqflow_core::config::{
    ClientConfiguration, ClientConfigurationBuilder, ClientConfigurationResolver,
    ClientOverrideConfiguration, ClientType, ServiceDefaults,
};
use reqflow_core::execution::InterceptorContext;
use reqflow_core::http::{HttpRequest, HttpResponse};
use reqflow_core::interceptor::Interceptor;
use reqflow_core::retry::{Backoff, RetryStrategy};
use reqflow_core::{Error, ErrorKind, HttpSend, Operation, Result, Sign};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug)]
pub struct TestService;

impl ServiceDefaults for TestService {
    fn service_name(&self) -> &str {
        "test"
    }

    fn defaults(&self, _: &ClientConfigurationBuilder) -> Result<ClientConfigurationBuilder> {
        Ok(ClientConfigurationBuilder::new().with_endpoint("https://test.example.com"))
    }
}

/// A request as the transport received it.
#[derive(Debug, Clone)]
pub struct Sent {
    pub method: http::Method,
    pub uri: String,
    pub headers: http::HeaderMap,
    pub body: Bytes,
}

pub type Reply = Box<dyn Fn() -> Result<HttpResponse> + Send + Sync>;

/// Transport that replays scripted replies and records what it received.
///
/// Once the script runs out every request gets an empty 200.
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<VecDeque<Reply>>,
    pub sent: Mutex<Vec<Sent>>,
    pub closed: AtomicUsize,
    pub delay: Option<Duration>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport").finish_non_exhaustive()
    }
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Default::default()
        })
    }

    pub fn reply(&self, f: impl Fn() -> Result<HttpResponse> + Send + Sync + 'static) {
        self.replies.lock().unwrap().push_back(Box::new(f));
    }

    pub fn reply_status(&self, status: StatusCode, code: &'static str) {
        self.reply(move || Ok(response(status, code)));
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl HttpSend for MockTransport {
    async fn http_send(&self, req: HttpRequest) -> Result<HttpResponse> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let body = req.body().read_to_bytes()?;
        self.sent.lock().unwrap().push(Sent {
            method: req.method().clone(),
            uri: req.uri().to_string(),
            headers: req.headers().clone(),
            body,
        });
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(reply) => reply(),
            None => Ok(response(StatusCode::OK, "")),
        }
    }

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn response(status: StatusCode, code: &str) -> HttpResponse {
    let mut builder = http::Response::builder()
        .status(status)
        .header("x-amz-request-id", "req-1");
    if !code.is_empty() {
        builder = builder.header("x-error-code", code);
    }
    builder.body(Bytes::from_static(b"ok")).unwrap()
}

#[derive(Debug)]
pub struct PutItem {
    pub key: String,
    pub body: Body,
}

impl PutItem {
    pub fn new(key: &str, body: impl Into<Body>) -> Self {
        Self {
            key: key.to_string(),
            body: body.into(),
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct PutItemOutput {
    pub request_id: String,
}

/// Operation that PUTs a body to `/items/{key}`.
#[derive(Debug, Default)]
pub struct PutItemOperation {
    pub fail_marshal: bool,
}

impl Operation for PutItemOperation {
    type Input = PutItem;
    type Output = PutItemOutput;

    fn name(&self) -> &str {
        "PutItem"
    }

    fn marshal(&self, input: &PutItem) -> Result<HttpRequest> {
        if self.fail_marshal {
            return Err(Error::request_invalid("key must not be empty"));
        }
        Ok(http::Request::put(format!("/items/{}", input.key)).body(input.body.clone())?)
    }

    fn unmarshal(&self, resp: HttpResponse) -> Result<PutItemOutput> {
        let header = |name: &str| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };
        if !resp.status().is_success() {
            return Err(Error::service(
                resp.status(),
                header("x-error-code"),
                "request failed",
            ));
        }
        Ok(PutItemOutput {
            request_id: header("x-amz-request-id"),
        })
    }
}

/// Records the hooks it sees, in order.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    pub calls: Arc<Mutex<Vec<String>>>,
    pub failures: Arc<Mutex<Vec<ErrorKind>>>,
    pub fail_in_failure_hook: bool,
}

impl Recorder {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn failures(&self) -> Vec<ErrorKind> {
        self.failures.lock().unwrap().clone()
    }

    fn record(&self, name: &str) {
        self.calls.lock().unwrap().push(name.to_string());
    }
}

impl Interceptor for Recorder {
    fn before_execution(&self, _: &InterceptorContext, _: &mut ExecutionAttributes) -> Result<()> {
        self.record("before_execution");
        Ok(())
    }

    fn after_marshalling(&self, _: &InterceptorContext, _: &mut ExecutionAttributes) -> Result<()> {
        self.record("after_marshalling");
        Ok(())
    }

    fn before_transmission(&self, _: &HttpRequest, attrs: &mut ExecutionAttributes) -> Result<()> {
        let attempt = attrs.get(ATTEMPT).copied().unwrap_or_default();
        self.record(&format!("before_transmission:{attempt}"));
        Ok(())
    }

    fn after_execution(&self, _: &InterceptorContext, _: &mut ExecutionAttributes) -> Result<()> {
        self.record("after_execution");
        Ok(())
    }

    fn on_execution_failure(
        &self,
        _: &InterceptorContext,
        err: &Error,
        _: &mut ExecutionAttributes,
    ) -> Result<()> {
        self.failures.lock().unwrap().push(err.kind());
        if self.fail_in_failure_hook {
            return Err(Error::unexpected("failure hook failed"));
        }
        Ok(())
    }
}

/// Signs with an `authorization` header naming the attempt.
#[derive(Debug, Default)]
pub struct AttemptSigner {
    pub signed: AtomicUsize,
}

#[async_trait::async_trait]
impl Sign for AttemptSigner {
    async fn sign(&self, req: &mut HttpRequest, attrs: &ExecutionAttributes) -> Result<()> {
        self.signed.fetch_add(1, Ordering::SeqCst);
        let attempt = attrs.get(ATTEMPT).copied().unwrap_or_default();
        let retry = req
            .headers()
            .get("amz-sdk-retry")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        req.headers_mut().insert(
            http::header::AUTHORIZATION,
            format!("signed attempt={attempt} retry={retry}").parse()?,
        );
        Ok(())
    }
}

/// Strategy with fixed 10ms backoff, so `amz-sdk-retry` is predictable.
pub fn fixed_backoff(max_attempts: u32) -> RetryStrategy {
    RetryStrategy::standard()
        .with_max_attempts(max_attempts)
        .with_backoff(Backoff::Fixed(Duration::from_millis(10)))
        .with_throttling_backoff(Backoff::Fixed(Duration::from_millis(10)))
}

/// Caller layer using `transport` on the current runtime.
pub fn caller(transport: Arc<MockTransport>) -> ClientConfigurationBuilder {
    ClientConfigurationBuilder::new()
        .with_http_client(transport)
        .with_signing_enabled(false)
        .with_retry_strategy(fixed_backoff(3))
        .with_completion_executor(tokio::runtime::Handle::current())
}

pub fn resolve(caller: ClientConfigurationBuilder) -> ClientConfiguration {
    ClientConfigurationResolver::new(TestService)
        .resolve(ClientOverrideConfiguration::new(), caller, ClientType::Async)
        .unwrap()
}
