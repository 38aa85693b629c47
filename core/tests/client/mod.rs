use crate::common::*;
use http::StatusCode;
use pretty_assertions::assert_eq;
use reqflow_core::config::{
    ClientConfigurationBuilder, ClientConfigurationResolver, ClientOverrideConfiguration,
    ClientType,
};
use reqflow_core::http::{HttpClientBuilder, HttpSend};
use reqflow_core::{AsyncClient, ErrorKind, Result, SyncClient};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
struct MockBuilder(Arc<MockTransport>);

impl HttpClientBuilder for MockBuilder {
    fn build(&self) -> Result<Arc<dyn HttpSend>> {
        Ok(self.0.clone())
    }
}

fn resolver() -> ClientConfigurationResolver {
    ClientConfigurationResolver::new(TestService)
}

#[tokio::test]
async fn test_async_execute() -> Result<()> {
    init_logger();
    let transport = MockTransport::new();
    let client = AsyncClient::build(
        &resolver(),
        ClientOverrideConfiguration::new(),
        caller(transport.clone()),
    )?;
    assert_eq!(client.config().client_type(), ClientType::Async);

    let output = client
        .execute(PutItemOperation::default(), PutItem::new("k", "v"))
        .await?;
    assert_eq!(output.request_id, "req-1");
    assert_eq!(transport.sent().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_cancel_runs_failure_hook_once() -> Result<()> {
    let transport = MockTransport::with_delay(Duration::from_secs(3600));
    let recorder = Recorder::default();
    let client = AsyncClient::build(
        &resolver(),
        ClientOverrideConfiguration::new(),
        caller(transport.clone()).with_interceptor(recorder.clone()),
    )?;

    let fut = client.execute(PutItemOperation::default(), PutItem::new("k", "v"));
    // Let the call reach the transport.
    while !recorder.calls().contains(&"before_transmission:0".to_string()) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    fut.cancel();

    let err = fut.await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(recorder.failures(), vec![ErrorKind::Cancelled]);
    assert!(transport.sent().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_close_owned_transport_once() -> Result<()> {
    let transport = MockTransport::new();
    let caller = ClientConfigurationBuilder::new()
        .with_http_client_builder(MockBuilder(transport.clone()))
        .with_signing_enabled(false)
        .with_completion_executor(tokio::runtime::Handle::current());
    let client = AsyncClient::build(&resolver(), ClientOverrideConfiguration::new(), caller)?;

    let cloned = client.clone();
    client.close();
    cloned.close();
    drop(cloned);
    drop(client);
    assert_eq!(transport.closed.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_caller_transport_stays_open() -> Result<()> {
    let transport = MockTransport::new();
    let client = AsyncClient::build(
        &resolver(),
        ClientOverrideConfiguration::new(),
        caller(transport.clone()),
    )?;
    client.close();

    let err = client
        .execute(PutItemOperation::default(), PutItem::new("k", "v"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigInvalid);

    drop(client);
    assert_eq!(transport.closed.load(Ordering::SeqCst), 0);

    // The caller can keep using its transport.
    transport
        .http_send(http::Request::get("https://test.example.com/").body(Default::default())?)
        .await?;
    Ok(())
}

#[test]
fn test_sync_client_retries_on_owned_runtime() -> Result<()> {
    let transport = MockTransport::new();
    transport.reply_status(StatusCode::SERVICE_UNAVAILABLE, "");
    let caller = ClientConfigurationBuilder::new()
        .with_http_client_builder(MockBuilder(transport.clone()))
        .with_signing_enabled(false)
        .with_retry_strategy(fixed_backoff(3));
    let client = SyncClient::build(&resolver(), ClientOverrideConfiguration::new(), caller)?;
    assert!(client.config().executor().is_owned());

    let output = client.execute(&PutItemOperation::default(), PutItem::new("k", "v"))?;
    assert_eq!(output.request_id, "req-1");
    assert_eq!(transport.sent().len(), 2);

    client.close();
    assert!(!client.config().executor().is_owned());
    assert_eq!(transport.closed.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn test_async_client_on_owned_runtime() -> Result<()> {
    let transport = MockTransport::new();
    let caller = ClientConfigurationBuilder::new()
        .with_http_client(transport.clone())
        .with_signing_enabled(false);
    let client = AsyncClient::build(&resolver(), ClientOverrideConfiguration::new(), caller)?;
    assert!(client.config().executor().is_owned());

    let fut = client.execute(PutItemOperation::default(), PutItem::new("k", "v"));
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(fut)?;

    client.close();
    assert!(!client.config().executor().is_owned());
    assert_eq!(transport.closed.load(Ordering::SeqCst), 0);
    Ok(())
}
