// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use crate::body::Body;
use crate::{Error, Result};
use bytes::Bytes;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Outgoing request as seen by interceptors, signers and transports.
pub type HttpRequest = http::Request<Body>;

/// Response returned by a transport.
pub type HttpResponse = http::Response<Bytes>;

/// HttpSend is the transport used to send requests.
///
/// Implementations must be safe to share between concurrent calls.
#[async_trait::async_trait]
pub trait HttpSend: Debug + Send + Sync + 'static {
    /// Send http request and return the response.
    ///
    /// Only I/O level failures are errors, any status code is a response.
    async fn http_send(&self, req: HttpRequest) -> Result<HttpResponse>;

    /// Release resources held by this transport.
    fn close(&self) {}
}

/// Builds a transport owned by the client that built it.
pub trait HttpClientBuilder: Debug + Send + Sync + 'static {
    /// Build a new transport.
    fn build(&self) -> Result<Arc<dyn HttpSend>>;
}

/// Transport handed in by the caller. The client never closes it.
#[derive(Debug)]
pub struct NonManagedHttpSend(Arc<dyn HttpSend>);

impl NonManagedHttpSend {
    /// Wrap a caller owned transport.
    pub fn new(inner: Arc<dyn HttpSend>) -> Self {
        Self(inner)
    }
}

#[async_trait::async_trait]
impl HttpSend for NonManagedHttpSend {
    async fn http_send(&self, req: HttpRequest) -> Result<HttpResponse> {
        self.0.http_send(req).await
    }
}

/// Transport shared by every clone of one client configuration.
///
/// `close` reaches the inner transport at most once; sending afterwards fails.
#[derive(Debug)]
pub struct SharedHttpClient {
    inner: Arc<dyn HttpSend>,
    closed: AtomicBool,
}

impl SharedHttpClient {
    /// Take ownership of a transport.
    pub fn new(inner: Arc<dyn HttpSend>) -> Self {
        Self {
            inner,
            closed: AtomicBool::new(false),
        }
    }

    /// Check if `close` was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait::async_trait]
impl HttpSend for SharedHttpClient {
    async fn http_send(&self, req: HttpRequest) -> Result<HttpResponse> {
        if self.is_closed() {
            return Err(Error::transport("http client is already closed").with_retryable(false));
        }
        self.inner.http_send(req).await
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.inner.close();
        }
    }
}

/// Clone a request, sharing its body.
pub fn clone_request(req: &HttpRequest) -> HttpRequest {
    let mut out = http::Request::new(req.body().clone());
    *out.method_mut() = req.method().clone();
    *out.uri_mut() = req.uri().clone();
    *out.version_mut() = req.version();
    *out.headers_mut() = req.headers().clone();
    out
}

/// Clone a response. Extensions are not carried over.
pub fn clone_response(resp: &HttpResponse) -> HttpResponse {
    let mut out = http::Response::new(resp.body().clone());
    *out.status_mut() = resp.status();
    *out.version_mut() = resp.version();
    *out.headers_mut() = resp.headers().clone();
    out
}
