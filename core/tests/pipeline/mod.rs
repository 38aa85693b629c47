use crate::common::*;
use http::StatusCode;
use pretty_assertions::assert_eq;
use reqflow_core::attribute::{ExecutionAttributes, CHUNKED_ENCODING_CONFIG, PRESIGN_EXPIRATION, SIGNING_TIME};
use reqflow_core::body::{Body, StreamBody};
use reqflow_core::chunked::ChunkedEncodingStream;
use reqflow_core::config::RequestOverrideConfiguration;
use reqflow_core::execution::{InterceptorContext, Message};
use reqflow_core::http::HttpRequest;
use reqflow_core::interceptor::Interceptor;
use reqflow_core::{Error, ErrorKind, RequestPipeline, Result, Sign};
use std::io::Cursor;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_retries_until_success() -> Result<()> {
    init_logger();
    let transport = MockTransport::new();
    transport.reply_status(StatusCode::SERVICE_UNAVAILABLE, "");
    transport.reply_status(StatusCode::SERVICE_UNAVAILABLE, "");
    let signer = Arc::new(AttemptSigner::default());
    let recorder = Recorder::default();
    let cfg = resolve(
        caller(transport.clone())
            .with_signing_enabled(true)
            .with_shared_signer(signer.clone())
            .with_interceptor(recorder.clone()),
    );

    let output = RequestPipeline::new(cfg)
        .execute(&PutItemOperation::default(), PutItem::new("k", "hello"))
        .await?;
    assert_eq!(output.request_id, "req-1");

    let sent = transport.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(signer.signed.load(Ordering::SeqCst), 3);

    let ids: Vec<_> = sent
        .iter()
        .map(|s| s.headers["amz-sdk-invocation-id"].clone())
        .collect();
    assert_eq!(ids[0].len(), 36);
    assert!(ids.iter().all(|id| *id == ids[0]));

    let retries: Vec<_> = sent
        .iter()
        .map(|s| s.headers["amz-sdk-retry"].to_str().unwrap().to_string())
        .collect();
    assert_eq!(retries, vec!["0/0/500", "1/10/495", "2/20/490"]);
    assert_eq!(
        sent[2].headers[http::header::AUTHORIZATION],
        "signed attempt=2 retry=2/20/490"
    );

    for s in &sent {
        assert_eq!(s.method, http::Method::PUT);
        assert_eq!(s.uri, "https://test.example.com/items/k");
        assert_eq!(s.headers[http::header::CONTENT_LENGTH], "5");
        assert!(s.headers[http::header::USER_AGENT]
            .to_str()
            .unwrap()
            .starts_with("reqflow/"));
        assert_eq!(s.body.as_ref(), b"hello");
    }

    assert_eq!(
        recorder.calls(),
        vec![
            "before_execution",
            "after_marshalling",
            "before_transmission:0",
            "before_transmission:1",
            "before_transmission:2",
            "after_execution",
        ]
    );
    assert!(recorder.failures().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_returns_error_of_last_attempt() {
    let transport = MockTransport::new();
    transport.reply_status(StatusCode::SERVICE_UNAVAILABLE, "First");
    transport.reply_status(StatusCode::SERVICE_UNAVAILABLE, "Second");
    transport.reply_status(StatusCode::SERVICE_UNAVAILABLE, "Third");
    let recorder = Recorder::default();
    let cfg = resolve(caller(transport.clone()).with_interceptor(recorder.clone()));

    let err = RequestPipeline::new(cfg)
        .execute(&PutItemOperation::default(), PutItem::new("k", "hello"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Service);
    assert_eq!(err.code(), Some("Third"));
    assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    assert_eq!(err.request_id(), Some("req-1"));
    assert_eq!(transport.sent().len(), 3);
    assert_eq!(recorder.failures(), vec![ErrorKind::Service]);
}

#[tokio::test]
async fn test_non_retryable_errors_are_not_retried() {
    let transport = MockTransport::new();
    transport.reply_status(StatusCode::BAD_REQUEST, "ValidationException");
    transport.reply(|| Err(Error::integrity("checksum mismatch")));
    let cfg = resolve(caller(transport.clone()));
    let pipeline = RequestPipeline::new(cfg);

    let err = pipeline
        .execute(&PutItemOperation::default(), PutItem::new("k", "a"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("ValidationException"));
    assert_eq!(transport.sent().len(), 1);

    let err = pipeline
        .execute(&PutItemOperation::default(), PutItem::new("k", "a"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integrity);
    assert_eq!(transport.sent().len(), 2);
}

#[tokio::test]
async fn test_marshalling_error_sends_nothing() {
    let transport = MockTransport::new();
    let recorder = Recorder::default();
    let cfg = resolve(caller(transport.clone()).with_interceptor(recorder.clone()));

    let op = PutItemOperation { fail_marshal: true };
    let err = RequestPipeline::new(cfg)
        .execute(&op, PutItem::new("", "a"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RequestInvalid);
    assert_eq!(err.message(), "key must not be empty");
    assert!(transport.sent().is_empty());
    assert_eq!(recorder.calls(), vec!["before_execution"]);
    assert_eq!(recorder.failures(), vec![ErrorKind::RequestInvalid]);
}

#[tokio::test(start_paused = true)]
async fn test_api_call_timeout() {
    let transport = MockTransport::with_delay(Duration::from_secs(10));
    let recorder = Recorder::default();
    let cfg = resolve(
        caller(transport.clone())
            .with_api_call_timeout(Duration::from_secs(1))
            .with_interceptor(recorder.clone()),
    );

    let err = RequestPipeline::new(cfg)
        .execute(&PutItemOperation::default(), PutItem::new("k", "a"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ApiCallTimeout);
    assert!(transport.sent().is_empty());
    assert_eq!(recorder.failures(), vec![ErrorKind::ApiCallTimeout]);
}

#[tokio::test(start_paused = true)]
async fn test_attempt_timeout_is_retried() {
    let transport = MockTransport::with_delay(Duration::from_secs(10));
    let recorder = Recorder::default();
    let cfg = resolve(
        caller(transport.clone())
            .with_api_call_attempt_timeout(Duration::from_secs(1))
            .with_max_attempts(2)
            .with_interceptor(recorder.clone()),
    );

    let err = RequestPipeline::new(cfg)
        .execute(&PutItemOperation::default(), PutItem::new("k", "a"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ApiCallAttemptTimeout);
    assert_eq!(
        recorder.calls(),
        vec![
            "before_execution",
            "after_marshalling",
            "before_transmission:0",
            "before_transmission:1",
        ]
    );
    assert_eq!(recorder.failures(), vec![ErrorKind::ApiCallAttemptTimeout]);
}

#[tokio::test]
async fn test_failing_failure_hook_keeps_error() {
    let transport = MockTransport::new();
    transport.reply_status(StatusCode::BAD_REQUEST, "ValidationException");
    let recorder = Recorder {
        fail_in_failure_hook: true,
        ..Default::default()
    };
    let cfg = resolve(caller(transport).with_interceptor(recorder.clone()));

    let err = RequestPipeline::new(cfg)
        .execute(&PutItemOperation::default(), PutItem::new("k", "a"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Service);
    assert_eq!(err.code(), Some("ValidationException"));
    assert_eq!(recorder.failures().len(), 1);
}

#[tokio::test]
async fn test_configured_and_override_headers() -> Result<()> {
    let transport = MockTransport::new();
    let cfg = resolve(
        caller(transport.clone())
            .with_header("x-team", "storage")?
            .with_header("x-trace", "configured")?,
    );

    let o = RequestOverrideConfiguration::new()
        .with_header("x-trace", "overridden")?
        .with_query("versionId", "v 1");
    RequestPipeline::new(cfg)
        .with_request_override(o)
        .execute(&PutItemOperation::default(), PutItem::new("k", "a"))
        .await?;

    let sent = transport.sent();
    assert_eq!(sent[0].uri, "https://test.example.com/items/k?versionId=v+1");
    assert_eq!(sent[0].headers["x-team"], "storage");
    assert_eq!(sent[0].headers["x-trace"], "overridden");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_stream_is_replayed_on_retry() -> Result<()> {
    let transport = MockTransport::new();
    transport.reply_status(StatusCode::INTERNAL_SERVER_ERROR, "");
    let cfg = resolve(caller(transport.clone()));

    let body = StreamBody::new(Cursor::new(b"streamed data".to_vec()), Some(13));
    RequestPipeline::new(cfg)
        .execute(&PutItemOperation::default(), PutItem::new("k", body))
        .await?;

    let sent = transport.sent();
    assert_eq!(sent.len(), 2);
    for s in &sent {
        assert_eq!(s.body.as_ref(), b"streamed data");
        assert_eq!(s.headers[http::header::CONTENT_LENGTH], "13");
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_stream_overflowing_replay_buffer_fails() {
    let transport = MockTransport::new();
    transport.reply_status(StatusCode::INTERNAL_SERVER_ERROR, "InternalError");
    let cfg = resolve(caller(transport.clone()));

    let body = StreamBody::buffered(Cursor::new(b"0123456789".to_vec()), Some(10), 4);
    let err = RequestPipeline::new(cfg)
        .execute(&PutItemOperation::default(), PutItem::new("k", body))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Service);
    assert_eq!(err.code(), Some("InternalError"));
    assert_eq!(err.context().len(), 1);
    assert!(err.context()[0].contains("more than 4 bytes"), "{:?}", err.context());
    assert_eq!(transport.sent().len(), 1);
}

/// Chunk-encodes streaming bodies without signatures.
#[derive(Debug)]
struct ChunkingSigner;

#[async_trait::async_trait]
impl Sign for ChunkingSigner {
    async fn sign(&self, req: &mut HttpRequest, attrs: &ExecutionAttributes) -> Result<()> {
        let Body::Stream(source) = req.body().clone() else {
            return Ok(());
        };
        let decoded = source
            .content_length()
            .ok_or_else(|| Error::request_invalid("length required"))?;
        let cfg = attrs.get(CHUNKED_ENCODING_CONFIG).copied().unwrap_or_default();
        let stream = ChunkedEncodingStream::new(source, cfg)?;
        let encoded = stream.encoded_length(decoded)?;
        *req.body_mut() = StreamBody::rewindable(stream, Some(encoded)).into();
        req.headers_mut()
            .insert(http::header::CONTENT_LENGTH, encoded.into());
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_chunked_upload_content_length_matches_body() -> Result<()> {
    let transport = MockTransport::new();
    transport.reply_status(StatusCode::SERVICE_UNAVAILABLE, "");
    let cfg = resolve(
        caller(transport.clone())
            .with_signing_enabled(true)
            .with_signer(ChunkingSigner)
            .with_chunked_encoding(reqflow_core::chunked::ChunkedEncodingConfig::new(16, 1024)?),
    );

    let data = vec![b'x'; 100];
    let body = StreamBody::new(Cursor::new(data), Some(100));
    RequestPipeline::new(cfg)
        .execute(&PutItemOperation::default(), PutItem::new("k", body))
        .await?;

    let sent = transport.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].body, sent[1].body);
    for s in &sent {
        let length: usize = s.headers[http::header::CONTENT_LENGTH]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(length, s.body.len());
        assert!(s.body.starts_with(b"10\r\nxxxxxxxxxxxxxxxx\r\n"));
        assert!(s.body.ends_with(b"4\r\nxxxx\r\n0\r\n\r\n"));
    }
    Ok(())
}

/// Presigns by appending the expiration as a query parameter.
#[derive(Debug)]
struct QuerySigner;

#[async_trait::async_trait]
impl Sign for QuerySigner {
    async fn sign(&self, req: &mut HttpRequest, attrs: &ExecutionAttributes) -> Result<()> {
        let expires = attrs
            .get(PRESIGN_EXPIRATION)
            .ok_or_else(|| Error::request_invalid("not a presign"))?;
        let uri = format!("{}?X-Expires={}", req.uri(), expires.as_secs());
        *req.uri_mut() = uri.parse()?;
        Ok(())
    }
}

#[tokio::test]
async fn test_presign_sends_nothing() -> Result<()> {
    let transport = MockTransport::new();
    let cfg = resolve(
        caller(transport.clone())
            .with_signing_enabled(true)
            .with_signer(QuerySigner),
    );
    let signed_at = reqflow_core::time::parse_rfc3339("2024-01-01T00:00:00Z")?;

    let presigned = RequestPipeline::new(cfg)
        .with_request_override(RequestOverrideConfiguration::new().with_attribute(SIGNING_TIME, signed_at))
        .presign(
            &PutItemOperation::default(),
            PutItem::new("k", ""),
            Duration::from_secs(300),
        )
        .await?;

    assert_eq!(
        presigned.request().uri().to_string(),
        "https://test.example.com/items/k?X-Expires=300"
    );
    assert_eq!(
        presigned.expires_at(),
        signed_at + chrono::Duration::seconds(300)
    );
    assert!(transport.sent().is_empty());
    Ok(())
}

/// Replaces the in-flight objects and records what later stages see.
#[derive(Debug, Default)]
struct Rewriter {
    marshalled_key: Mutex<Option<String>>,
    transmitted_header: Mutex<Option<String>>,
    after_execution_saw: Mutex<Option<String>>,
}

impl Interceptor for Rewriter {
    fn modify_request(&self, req: &mut Box<dyn Message>, _: &mut ExecutionAttributes) -> Result<()> {
        *req = Box::new(PutItem::new("rewritten", "replaced body"));
        Ok(())
    }

    fn after_marshalling(&self, ctx: &InterceptorContext, _: &mut ExecutionAttributes) -> Result<()> {
        let uri = ctx.http_request().map(|r| r.uri().to_string());
        *self.marshalled_key.lock().unwrap() = uri;
        Ok(())
    }

    fn modify_http_request(&self, req: &mut HttpRequest, _: &mut ExecutionAttributes) -> Result<()> {
        req.headers_mut().insert("x-rewritten", "yes".parse()?);
        Ok(())
    }

    fn before_transmission(&self, req: &HttpRequest, _: &mut ExecutionAttributes) -> Result<()> {
        let value = req
            .headers()
            .get("x-rewritten")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *self.transmitted_header.lock().unwrap() = value;
        Ok(())
    }

    fn modify_response(&self, resp: &mut Box<dyn Message>, _: &mut ExecutionAttributes) -> Result<()> {
        *resp = Box::new(PutItemOutput {
            request_id: "replaced".to_string(),
        });
        Ok(())
    }

    fn after_execution(&self, ctx: &InterceptorContext, _: &mut ExecutionAttributes) -> Result<()> {
        let seen = ctx
            .response()
            .and_then(|r| r.downcast_ref::<PutItemOutput>())
            .map(|r| r.request_id.clone());
        *self.after_execution_saw.lock().unwrap() = seen;
        Ok(())
    }
}

/// Signs with a header carrying the request's `x-rewritten` value.
#[derive(Debug)]
struct EchoSigner;

#[async_trait::async_trait]
impl Sign for EchoSigner {
    async fn sign(&self, req: &mut HttpRequest, _: &ExecutionAttributes) -> Result<()> {
        let seen = req
            .headers()
            .get("x-rewritten")
            .cloned()
            .unwrap_or_else(|| http::HeaderValue::from_static("missing"));
        req.headers_mut().insert("x-signed-rewritten", seen);
        Ok(())
    }
}

#[tokio::test]
async fn test_modify_request_replacement_is_marshalled() -> Result<()> {
    let transport = MockTransport::new();
    let rewriter = Arc::new(Rewriter::default());
    let cfg = resolve(caller(transport.clone()).with_shared_interceptor(rewriter.clone()));

    RequestPipeline::new(cfg)
        .execute(&PutItemOperation::default(), PutItem::new("k", "original"))
        .await?;

    assert_eq!(
        rewriter.marshalled_key.lock().unwrap().as_deref(),
        Some("/items/rewritten")
    );
    let sent = transport.sent();
    assert_eq!(sent[0].uri, "https://test.example.com/items/rewritten");
    assert_eq!(sent[0].body.as_ref(), b"replaced body");
    Ok(())
}

#[tokio::test]
async fn test_modify_http_request_replacement_is_signed_and_sent() -> Result<()> {
    let transport = MockTransport::new();
    let rewriter = Arc::new(Rewriter::default());
    let cfg = resolve(
        caller(transport.clone())
            .with_signing_enabled(true)
            .with_signer(EchoSigner)
            .with_shared_interceptor(rewriter.clone()),
    );

    RequestPipeline::new(cfg)
        .execute(&PutItemOperation::default(), PutItem::new("k", "a"))
        .await?;

    assert_eq!(
        rewriter.transmitted_header.lock().unwrap().as_deref(),
        Some("yes")
    );
    let sent = transport.sent();
    assert_eq!(sent[0].headers["x-rewritten"], "yes");
    assert_eq!(sent[0].headers["x-signed-rewritten"], "yes");
    Ok(())
}

#[tokio::test]
async fn test_modify_response_replacement_is_seen_by_after_execution() -> Result<()> {
    let transport = MockTransport::new();
    let rewriter = Arc::new(Rewriter::default());
    let recorder = Recorder::default();
    let cfg = resolve(
        caller(transport.clone())
            .with_shared_interceptor(rewriter.clone())
            .with_interceptor(recorder.clone()),
    );

    let output = RequestPipeline::new(cfg)
        .execute(&PutItemOperation::default(), PutItem::new("k", "a"))
        .await?;

    assert_eq!(output.request_id, "replaced");
    assert_eq!(
        rewriter.after_execution_saw.lock().unwrap().as_deref(),
        Some("replaced")
    );
    assert_eq!(recorder.calls().last().map(String::as_str), Some("after_execution"));
    Ok(())
}
