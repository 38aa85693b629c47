//! [`HttpSend`] backed by reqwest.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::BodyExt;
use log::debug;
use reqflow_core::body::{Body, StreamBody};
use reqflow_core::http::{HttpClientBuilder, HttpRequest, HttpResponse};
use reqflow_core::{Error, HttpSend, Result};
use reqwest::{Client, Request};
use std::io::{self, Read};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Bytes pulled from a streaming body per read.
const STREAM_READ_SIZE: usize = 64 * 1024;

/// Transport sending requests through a [`reqwest::Client`].
///
/// Streaming bodies are read on the blocking pool one chunk at a time while
/// the request is sent, so they are never held in memory as a whole.
#[derive(Debug, Default)]
pub struct ReqwestHttpSend {
    client: Client,
}

impl ReqwestHttpSend {
    /// Create a new ReqwestHttpSend with a reqwest::Client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// First error hit while reading a streaming body. reqwest only reports
/// that the body failed, so the original error is kept here.
type BodyError = Arc<Mutex<Option<io::Error>>>;

fn read_chunk(body: &mut StreamBody) -> io::Result<Vec<u8>> {
    let mut buf = vec![0; STREAM_READ_SIZE];
    loop {
        match body.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                return Ok(buf);
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
}

fn stream_body(body: StreamBody, failure: BodyError) -> reqwest::Body {
    let chunks = futures::stream::try_unfold(body, move |mut body| {
        let failure = failure.clone();
        async move {
            let read = tokio::task::spawn_blocking(move || read_chunk(&mut body).map(|c| (c, body)))
                .await
                .unwrap_or_else(|e| Err(io::Error::other(e)));
            match read {
                Ok((chunk, _)) if chunk.is_empty() => Ok(None),
                Ok((chunk, body)) => Ok(Some((Bytes::from(chunk), body))),
                Err(err) => {
                    let message = err.to_string();
                    if let Ok(mut slot) = failure.lock() {
                        slot.get_or_insert(err);
                    }
                    Err(io::Error::other(message))
                }
            }
        }
    });
    reqwest::Body::wrap_stream(chunks)
}

fn into_reqwest_body(body: Body, failure: &BodyError) -> reqwest::Body {
    match body {
        Body::Empty => reqwest::Body::from(Bytes::new()),
        Body::Bytes(bs) => reqwest::Body::from(bs),
        Body::Stream(s) => stream_body(s, failure.clone()),
    }
}

#[async_trait]
impl HttpSend for ReqwestHttpSend {
    async fn http_send(&self, req: HttpRequest) -> Result<HttpResponse> {
        let failure = BodyError::default();
        let (parts, body) = req.into_parts();
        let body = into_reqwest_body(body, &failure);
        let req = Request::try_from(http::Request::from_parts(parts, body)).map_err(|e| {
            Error::request_invalid("failed to convert request for reqwest").with_source(e)
        })?;

        let resp: http::Response<_> = match self.client.execute(req).await {
            Ok(resp) => resp.into(),
            Err(e) => {
                let body_err = failure.lock().ok().and_then(|mut slot| slot.take());
                return Err(match body_err {
                    Some(body_err) => Error::from(body_err),
                    None => Error::transport("failed to send request").with_source(e),
                });
            }
        };

        let (parts, body) = resp.into_parts();
        let bs = BodyExt::collect(body)
            .await
            .map(|buf| buf.to_bytes())
            .map_err(|e| Error::transport("failed to read response body").with_source(e))?;
        Ok(http::Response::from_parts(parts, bs))
    }

    fn close(&self) {
        debug!("closing reqwest http client");
    }
}

/// Builds a [`ReqwestHttpSend`] owned by the client.
#[derive(Debug, Clone, Default)]
pub struct ReqwestHttpClientBuilder {
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    pool_idle_timeout: Option<Duration>,
    pool_max_idle_per_host: Option<usize>,
}

impl ReqwestHttpClientBuilder {
    /// Create a builder with reqwest's defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Timeout for establishing a connection.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Timeout between two reads of the response.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// How long idle connections are kept.
    pub fn with_pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    /// Idle connections kept per host.
    pub fn with_pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = Some(max);
        self
    }
}

impl HttpClientBuilder for ReqwestHttpClientBuilder {
    fn build(&self) -> Result<Arc<dyn HttpSend>> {
        let mut builder = Client::builder();
        if let Some(v) = self.connect_timeout {
            builder = builder.connect_timeout(v);
        }
        if let Some(v) = self.read_timeout {
            builder = builder.read_timeout(v);
        }
        if let Some(v) = self.pool_idle_timeout {
            builder = builder.pool_idle_timeout(v);
        }
        if let Some(v) = self.pool_max_idle_per_host {
            builder = builder.pool_max_idle_per_host(v);
        }
        let client = builder
            .build()
            .map_err(|e| Error::config_invalid("failed to build reqwest client").with_source(e))?;
        Ok(Arc::new(ReqwestHttpSend::new(client)))
    }
}
