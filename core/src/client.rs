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

//! Sync and async clients.

use crate::config::{
    ClientConfiguration, ClientConfigurationBuilder, ClientConfigurationResolver,
    ClientOverrideConfiguration, ClientType, RequestOverrideConfiguration,
};
use crate::pipeline::{Operation, PresignedRequest, RequestPipeline};
use crate::{Error, Result};
use log::debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug)]
struct ClientInner {
    config: ClientConfiguration,
    closed: AtomicBool,
}

impl ClientInner {
    fn new(config: ClientConfiguration) -> Arc<Self> {
        Arc::new(Self {
            config,
            closed: AtomicBool::new(false),
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::config_invalid(format!(
                "client for {} is already closed",
                self.config.service_name()
            )));
        }
        Ok(())
    }

    fn pipeline(&self, o: Option<RequestOverrideConfiguration>) -> RequestPipeline {
        let pipeline = RequestPipeline::new(self.config.clone());
        match o {
            Some(o) => pipeline.with_request_override(o),
            None => pipeline,
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("closing client for {}", self.config.service_name());
            self.config.close();
        }
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.close();
    }
}

/// Client whose calls return a [`ResponseFuture`].
///
/// Calls run on the completion executor. Clones share the client, which
/// closes when [`AsyncClient::close`] is called or the last clone drops.
#[derive(Debug, Clone)]
pub struct AsyncClient {
    inner: Arc<ClientInner>,
}

impl AsyncClient {
    /// Wrap a configuration resolved for [`ClientType::Async`].
    pub fn new(config: ClientConfiguration) -> Self {
        debug_assert_eq!(config.client_type(), ClientType::Async);
        Self {
            inner: ClientInner::new(config),
        }
    }

    /// Resolve the configuration and build the client.
    pub fn build(
        resolver: &ClientConfigurationResolver,
        overrides: ClientOverrideConfiguration,
        caller: ClientConfigurationBuilder,
    ) -> Result<Self> {
        let config = resolver.resolve(overrides, caller, ClientType::Async)?;
        Ok(Self::new(config))
    }

    /// Resolved configuration.
    pub fn config(&self) -> &ClientConfiguration {
        &self.inner.config
    }

    /// Execute `op` on the completion executor.
    pub fn execute<O: Operation>(&self, op: O, input: O::Input) -> ResponseFuture<O::Output> {
        self.spawn(op, input, None)
    }

    /// Execute `op` with options scoped to this call.
    pub fn execute_with<O: Operation>(
        &self,
        op: O,
        input: O::Input,
        o: RequestOverrideConfiguration,
    ) -> ResponseFuture<O::Output> {
        self.spawn(op, input, Some(o))
    }

    fn spawn<O: Operation>(
        &self,
        op: O,
        input: O::Input,
        o: Option<RequestOverrideConfiguration>,
    ) -> ResponseFuture<O::Output> {
        if let Err(err) = self.inner.check_open() {
            return ResponseFuture::ready(err);
        }
        let pipeline = self.inner.pipeline(o);
        let handle = self
            .inner
            .config
            .executor()
            .handle()
            .spawn(async move { pipeline.execute(&op, input).await });
        ResponseFuture::spawned(handle)
    }

    /// Presign `op`. Nothing is transmitted.
    pub async fn presign<O: Operation>(
        &self,
        op: &O,
        input: O::Input,
        expires_in: Duration,
    ) -> Result<PresignedRequest> {
        self.inner.check_open()?;
        self.inner.pipeline(None).presign(op, input, expires_in).await
    }

    /// Close the resources owned by this client. Calling it again does nothing.
    pub fn close(&self) {
        self.inner.close()
    }
}

/// Result of an async call.
///
/// Dropping the future lets the call run to completion in the background;
/// [`ResponseFuture::cancel`] stops it.
#[derive(Debug)]
pub struct ResponseFuture<T> {
    state: FutureState<T>,
}

#[derive(Debug)]
enum FutureState<T> {
    Ready(Option<Error>),
    Spawned(JoinHandle<Result<T>>),
}

impl<T> ResponseFuture<T> {
    fn ready(err: Error) -> Self {
        Self {
            state: FutureState::Ready(Some(err)),
        }
    }

    fn spawned(handle: JoinHandle<Result<T>>) -> Self {
        Self {
            state: FutureState::Spawned(handle),
        }
    }

    /// Cancel the call.
    ///
    /// In-flight transmission and pending backoff stop and the future
    /// resolves to [`crate::ErrorKind::Cancelled`] unless the call already
    /// finished.
    pub fn cancel(&self) {
        if let FutureState::Spawned(handle) = &self.state {
            handle.abort();
        }
    }

    /// Check if the call reached a terminal state.
    pub fn is_finished(&self) -> bool {
        match &self.state {
            FutureState::Ready(_) => true,
            FutureState::Spawned(handle) => handle.is_finished(),
        }
    }
}

impl<T> Future for ResponseFuture<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            FutureState::Ready(err) => Poll::Ready(Err(err
                .take()
                .unwrap_or_else(|| Error::unexpected("response future polled after completion")))),
            FutureState::Spawned(handle) => Pin::new(handle).poll(cx).map(|res| match res {
                Ok(res) => res,
                Err(err) if err.is_cancelled() => Err(Error::cancelled("call was cancelled")),
                Err(err) => Err(Error::unexpected("call panicked").with_source(err)),
            }),
        }
    }
}

/// Client whose calls block the calling thread.
///
/// The calling thread polls each call to completion, while the client's
/// runtime drives timers and I/O.
#[derive(Debug, Clone)]
pub struct SyncClient {
    inner: Arc<ClientInner>,
}

impl SyncClient {
    /// Wrap a configuration resolved for [`ClientType::Sync`].
    pub fn new(config: ClientConfiguration) -> Self {
        debug_assert_eq!(config.client_type(), ClientType::Sync);
        Self {
            inner: ClientInner::new(config),
        }
    }

    /// Resolve the configuration and build the client.
    pub fn build(
        resolver: &ClientConfigurationResolver,
        overrides: ClientOverrideConfiguration,
        caller: ClientConfigurationBuilder,
    ) -> Result<Self> {
        let config = resolver.resolve(overrides, caller, ClientType::Sync)?;
        Ok(Self::new(config))
    }

    /// Resolved configuration.
    pub fn config(&self) -> &ClientConfiguration {
        &self.inner.config
    }

    /// Execute `op`, blocking until it finishes.
    ///
    /// Must not be called from within an async context.
    pub fn execute<O: Operation>(&self, op: &O, input: O::Input) -> Result<O::Output> {
        self.block_on(None, |p| async move { p.execute(op, input).await })
    }

    /// Execute `op` with options scoped to this call.
    pub fn execute_with<O: Operation>(
        &self,
        op: &O,
        input: O::Input,
        o: RequestOverrideConfiguration,
    ) -> Result<O::Output> {
        self.block_on(Some(o), |p| async move { p.execute(op, input).await })
    }

    /// Presign `op`. Nothing is transmitted.
    pub fn presign<O: Operation>(
        &self,
        op: &O,
        input: O::Input,
        expires_in: Duration,
    ) -> Result<PresignedRequest> {
        self.block_on(None, |p| async move { p.presign(op, input, expires_in).await })
    }

    fn block_on<T, F, Fut>(&self, o: Option<RequestOverrideConfiguration>, f: F) -> Result<T>
    where
        F: FnOnce(RequestPipeline) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.inner.check_open()?;
        let pipeline = self.inner.pipeline(o);
        self.inner.config.executor().handle().block_on(f(pipeline))
    }

    /// Close the resources owned by this client. Calling it again does nothing.
    pub fn close(&self) {
        self.inner.close()
    }
}
