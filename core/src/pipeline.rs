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

//! The request execution pipeline.

use crate::attribute::{
    ExecutionAttributes, ATTEMPT, CHUNKED_ENCODING_CONFIG, CLIENT_TYPE, DISABLE_SIGNING,
    OPERATION_NAME, PRESIGN_EXPIRATION, SERVICE_NAME, SIGNING_TIME, TRANSACTION_ID,
};
use crate::body::Body;
use crate::config::{ClientConfiguration, RequestOverrideConfiguration};
use crate::execution::{ExecutionContext, ExecutionState, Message};
use crate::http::{clone_request, clone_response, HttpRequest, HttpResponse, HttpSend};
use crate::interceptor::InterceptorChain;
use crate::retry::{RetryDecision, RetryToken};
use crate::time::{now, DateTime};
use crate::{Error, ErrorKind, Result};
use http::header::{CONTENT_LENGTH, RETRY_AFTER, USER_AGENT};
use http::uri::PathAndQuery;
use http::{HeaderValue, Uri};
use log::debug;
use std::fmt::Debug;
use std::time::Duration;

/// Header carrying the transaction id, identical on every attempt of a call.
pub const INVOCATION_ID_HEADER: &str = "amz-sdk-invocation-id";
/// Header carrying `attempt/cumulativeBackoffMillis/remainingCapacity`.
pub const RETRY_HEADER: &str = "amz-sdk-retry";

const REQUEST_ID_HEADERS: &[&str] = &["x-amzn-requestid", "x-amz-request-id"];

/// One operation of a service: how its input becomes an http request and
/// how a response becomes its output.
pub trait Operation: Debug + Send + Sync + 'static {
    /// Typed request.
    type Input: Message;
    /// Typed response.
    type Output: Message;

    /// Name of the operation, like `PutObject`.
    fn name(&self) -> &str;

    /// Build the http request. A relative URI is resolved against the
    /// configured endpoint.
    fn marshal(&self, input: &Self::Input) -> Result<HttpRequest>;

    /// Decode a response. Error responses are returned as
    /// [`ErrorKind::Service`] errors.
    fn unmarshal(&self, resp: HttpResponse) -> Result<Self::Output>;
}

/// A signed request that is valid until `expires_at`.
#[derive(Debug)]
pub struct PresignedRequest {
    request: HttpRequest,
    expires_at: DateTime,
}

impl PresignedRequest {
    /// The signed request.
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// Take the signed request.
    pub fn into_request(self) -> HttpRequest {
        self.request
    }

    /// Instant the signature stops being valid.
    pub fn expires_at(&self) -> DateTime {
        self.expires_at
    }
}

/// Runs calls against one client configuration.
#[derive(Debug, Clone)]
pub struct RequestPipeline {
    config: ClientConfiguration,
    request_override: Option<RequestOverrideConfiguration>,
}

impl RequestPipeline {
    /// Create a pipeline.
    pub fn new(config: ClientConfiguration) -> Self {
        Self {
            config,
            request_override: None,
        }
    }

    /// Scope the pipeline to one call's override.
    pub fn with_request_override(mut self, o: RequestOverrideConfiguration) -> Self {
        self.config = self.config.with_request_override(&o);
        self.request_override = Some(o);
        self
    }

    /// Configuration calls run with.
    pub fn config(&self) -> &ClientConfiguration {
        &self.config
    }

    /// Execute `op`, retrying failed attempts as the retry strategy allows.
    pub async fn execute<O: Operation>(&self, op: &O, input: O::Input) -> Result<O::Output> {
        let mut call = Call::new(self.config.interceptors().clone(), self.new_context(op, input));
        let result = match self.config.api_call_timeout() {
            Some(t) => tokio::time::timeout(t, self.run(op, &mut call.ctx))
                .await
                .unwrap_or_else(|_| Err(Error::api_call_timeout(t))),
            None => self.run(op, &mut call.ctx).await,
        };
        call.finish(result)
    }

    /// Run every stage through signing with [`PRESIGN_EXPIRATION`] set and
    /// return the signed request. Nothing is transmitted.
    pub async fn presign<O: Operation>(
        &self,
        op: &O,
        input: O::Input,
        expires_in: Duration,
    ) -> Result<PresignedRequest> {
        let mut call = Call::new(self.config.interceptors().clone(), self.new_context(op, input));
        call.ctx.attributes.put(PRESIGN_EXPIRATION, expires_in);
        if !call.ctx.attributes.contains(SIGNING_TIME) {
            call.ctx.attributes.put(SIGNING_TIME, now());
        }
        let result = self.run_presign(op, &mut call.ctx, expires_in).await;
        call.finish(result)
    }

    fn new_context<O: Operation>(&self, op: &O, input: O::Input) -> ExecutionContext {
        let mut attrs = ExecutionAttributes::new();
        attrs
            .put(SERVICE_NAME, self.config.service_name().to_string())
            .put(OPERATION_NAME, op.name().to_string())
            .put(CLIENT_TYPE, self.config.client_type())
            .put(TRANSACTION_ID, uuid::Uuid::new_v4().to_string())
            .put(CHUNKED_ENCODING_CONFIG, self.config.chunked_encoding());
        if let Some(o) = &self.request_override {
            attrs.merge(o.attributes());
        }
        ExecutionContext::new(Box::new(input), attrs)
    }

    async fn run<O: Operation>(&self, op: &O, ctx: &mut ExecutionContext) -> Result<O::Output> {
        let interceptors = self.config.interceptors();
        self.prepare(op, ctx)?;
        self.send_with_retries(op, ctx).await?;

        if let Some(resp) = ctx.interceptor_context.response_mut() {
            interceptors.modify_response(resp, &mut ctx.attributes)?;
        }
        interceptors.after_execution(&ctx.interceptor_context, &mut ctx.attributes)?;
        ctx.advance(ExecutionState::AfterExecution);

        let output = ctx
            .interceptor_context
            .take_response()
            .ok_or_else(|| Error::unexpected("execution finished without a response"))?;
        Ok(*output.downcast::<O::Output>()?)
    }

    async fn run_presign<O: Operation>(
        &self,
        op: &O,
        ctx: &mut ExecutionContext,
        expires_in: Duration,
    ) -> Result<PresignedRequest> {
        self.prepare(op, ctx)?;

        let signer = self
            .config
            .signer()
            .ok_or_else(|| Error::config_invalid("presigning requires a signer"))?;
        let mut req = clone_request(http_request(ctx)?);
        signer.sign(&mut req, &ctx.attributes).await?;
        ctx.advance(ExecutionState::Signed);

        let signed_at = ctx.attributes.get(SIGNING_TIME).copied().unwrap_or_else(now);
        let expires_in = chrono::Duration::from_std(expires_in).map_err(|e| {
            Error::request_invalid(format!("presign expiration {expires_in:?} is out of range"))
                .with_source(e)
        })?;
        ctx.interceptor_context.set_http_request(clone_request(&req));
        Ok(PresignedRequest {
            request: req,
            expires_at: signed_at + expires_in,
        })
    }

    /// Stages from `before_execution` up to `modify_http_request`.
    fn prepare<O: Operation>(&self, op: &O, ctx: &mut ExecutionContext) -> Result<()> {
        let interceptors = self.config.interceptors();

        interceptors.before_execution(&ctx.interceptor_context, &mut ctx.attributes)?;
        ctx.advance(ExecutionState::BeforeExecution);
        interceptors.modify_request(ctx.interceptor_context.request_mut(), &mut ctx.attributes)?;
        ctx.advance(ExecutionState::ModifyRequest);
        interceptors.before_marshalling(&ctx.interceptor_context, &mut ctx.attributes)?;
        ctx.advance(ExecutionState::BeforeMarshalling);

        let input = ctx
            .interceptor_context
            .request()
            .downcast_ref::<O::Input>()
            .ok_or_else(|| {
                Error::request_invalid(format!(
                    "request of {} was replaced by an object of another type",
                    op.name()
                ))
            })?;
        let req = op.marshal(input)?;
        ctx.interceptor_context.set_http_request(req);
        ctx.advance(ExecutionState::Marshalled);
        interceptors.after_marshalling(&ctx.interceptor_context, &mut ctx.attributes)?;
        ctx.advance(ExecutionState::AfterMarshalling);

        self.add_headers_and_params(http_request_mut(ctx)?)?;
        ctx.advance(ExecutionState::HeadersAndParamsAdded);
        let req = ctx
            .interceptor_context
            .http_request_mut()
            .ok_or_else(|| Error::unexpected("http request is missing after marshalling"))?;
        interceptors.modify_http_request(req, &mut ctx.attributes)?;
        ctx.advance(ExecutionState::ModifyHttpRequest);
        Ok(())
    }

    fn add_headers_and_params(&self, req: &mut HttpRequest) -> Result<()> {
        let mut uri = resolve_uri(self.config.endpoint(), req.uri())?;
        if let Some(o) = &self.request_override {
            uri = append_query(uri, &o.query)?;
        }
        *req.uri_mut() = uri;

        let user_agent = HeaderValue::from_str(self.config.user_agent())?;
        let headers = req.headers_mut();
        headers.insert(USER_AGENT, user_agent);
        for name in self.config.headers().keys() {
            if !headers.contains_key(name) {
                for value in self.config.headers().get_all(name) {
                    headers.append(name.clone(), value.clone());
                }
            }
        }
        if let Some(o) = &self.request_override {
            for name in o.headers.keys() {
                headers.remove(name);
                for value in o.headers.get_all(name) {
                    headers.append(name.clone(), value.clone());
                }
            }
        }

        if !req.headers().contains_key(CONTENT_LENGTH) {
            let length = match req.body() {
                Body::Empty => None,
                body => body.content_length(),
            };
            if let Some(length) = length {
                req.headers_mut().insert(CONTENT_LENGTH, HeaderValue::from(length));
            }
        }
        Ok(())
    }

    async fn send_with_retries<O: Operation>(&self, op: &O, ctx: &mut ExecutionContext) -> Result<()> {
        let strategy = self.config.retry_strategy();
        let original = clone_request(http_request(ctx)?);
        original.body().mark()?;

        let mut token = strategy.acquire_initial_token();
        let mut last_err: Option<Error> = None;
        loop {
            if let Some(err) = last_err.take() {
                if let Err(reset_err) = original.body().reset() {
                    return Err(err.with_context(format!("body cannot be replayed: {reset_err}")));
                }
            }

            let err = match self.attempt(op, ctx, &original, &token).await {
                Ok(()) => {
                    strategy.record_success(&token);
                    return Ok(());
                }
                Err(err) => err,
            };
            match strategy.refresh_retry_token(&mut token, &err) {
                RetryDecision::RetryAfter(delay) => {
                    debug!("{} failed: {err}, retrying in {delay:?}", op.name());
                    tokio::time::sleep(delay).await;
                    last_err = Some(err);
                }
                RetryDecision::GiveUp => return Err(err),
            }
        }
    }

    async fn attempt<O: Operation>(
        &self,
        op: &O,
        ctx: &mut ExecutionContext,
        original: &HttpRequest,
        token: &RetryToken,
    ) -> Result<()> {
        let interceptors = self.config.interceptors();
        let strategy = self.config.retry_strategy();

        let mut req = clone_request(original);
        let transaction_id = ctx
            .attributes
            .get(TRANSACTION_ID)
            .cloned()
            .unwrap_or_default();
        req.headers_mut()
            .insert(INVOCATION_ID_HEADER, HeaderValue::from_str(&transaction_id)?);
        req.headers_mut()
            .insert(RETRY_HEADER, HeaderValue::from_str(&token.header_value())?);
        ctx.attributes.put(ATTEMPT, token.attempt());

        if self.config.signing_enabled() && !ctx.attributes.is_enabled(DISABLE_SIGNING) {
            if let Some(signer) = self.config.signer() {
                signer.sign(&mut req, &ctx.attributes).await?;
            }
        }
        ctx.advance(ExecutionState::Signed);
        interceptors.before_transmission(&req, &mut ctx.attributes)?;
        ctx.interceptor_context.set_http_request(clone_request(&req));

        let delay = strategy.rate_limit_delay()?;
        if !delay.is_zero() {
            debug!("rate limiter delays attempt {} by {delay:?}", token.attempt());
            tokio::time::sleep(delay).await;
        }

        debug!(
            "sending {} attempt {} to {}",
            op.name(),
            token.attempt(),
            req.uri()
        );
        let send = self.config.http_client().http_send(req);
        let mut resp = match self.config.api_call_attempt_timeout() {
            Some(t) => tokio::time::timeout(t, send)
                .await
                .map_err(|_| Error::api_call_attempt_timeout(t))??,
            None => send.await?,
        };
        ctx.advance(ExecutionState::Transmitted);

        interceptors.modify_http_response(&mut resp, &mut ctx.attributes)?;
        ctx.interceptor_context.set_http_response(clone_response(&resp));
        let result = op.unmarshal(resp).map_err(|err| {
            match ctx.interceptor_context.http_response() {
                Some(resp) => annotate_service_error(err, resp),
                None => err,
            }
        });
        ctx.advance(ExecutionState::ResponseHandled);

        match result {
            Ok(output) => {
                strategy.record_response(false)?;
                ctx.interceptor_context.set_response(Box::new(output));
                Ok(())
            }
            Err(err) => {
                if err.is_throttling() {
                    strategy.record_response(true)?;
                }
                Err(err)
            }
        }
    }
}

/// Owns the context of one call and runs the failure hooks exactly once,
/// also when the call is dropped before it finishes.
struct Call {
    interceptors: InterceptorChain,
    ctx: ExecutionContext,
    finished: bool,
}

impl Call {
    fn new(interceptors: InterceptorChain, ctx: ExecutionContext) -> Self {
        Self {
            interceptors,
            ctx,
            finished: false,
        }
    }

    fn finish<T>(&mut self, result: Result<T>) -> Result<T> {
        self.finished = true;
        match &result {
            Ok(_) => self.ctx.advance(ExecutionState::Success),
            Err(err) => {
                self.interceptors.on_execution_failure(
                    &self.ctx.interceptor_context,
                    err,
                    &mut self.ctx.attributes,
                );
                self.ctx.advance(ExecutionState::Failed);
            }
        }
        result
    }
}

impl Drop for Call {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let err = Error::cancelled(format!(
            "call was cancelled in state {:?}",
            self.ctx.state()
        ));
        self.interceptors
            .on_execution_failure(&self.ctx.interceptor_context, &err, &mut self.ctx.attributes);
    }
}

fn http_request(ctx: &ExecutionContext) -> Result<&HttpRequest> {
    ctx.interceptor_context
        .http_request()
        .ok_or_else(|| Error::unexpected("http request is missing after marshalling"))
}

fn http_request_mut(ctx: &mut ExecutionContext) -> Result<&mut HttpRequest> {
    ctx.interceptor_context
        .http_request_mut()
        .ok_or_else(|| Error::unexpected("http request is missing after marshalling"))
}

/// Resolve a relative request URI against the endpoint.
fn resolve_uri(endpoint: &Uri, uri: &Uri) -> Result<Uri> {
    if uri.authority().is_some() {
        return Ok(uri.clone());
    }
    let authority = endpoint
        .authority()
        .ok_or_else(|| Error::config_invalid(format!("endpoint {endpoint} has no host")))?;

    let base = endpoint.path().trim_end_matches('/');
    let path_and_query = uri.path_and_query().map(|v| v.as_str()).unwrap_or("/");
    let path_and_query = if path_and_query.starts_with('/') {
        format!("{base}{path_and_query}")
    } else {
        format!("{base}/{path_and_query}")
    };

    Ok(Uri::builder()
        .scheme(endpoint.scheme_str().unwrap_or("https"))
        .authority(authority.as_str())
        .path_and_query(path_and_query)
        .build()?)
}

fn append_query(uri: Uri, params: &[(String, String)]) -> Result<Uri> {
    if params.is_empty() {
        return Ok(uri);
    }
    let mut parts = uri.into_parts();
    let (path, query) = match &parts.path_and_query {
        Some(pq) => (pq.path().to_string(), pq.query().unwrap_or_default().to_string()),
        None => ("/".to_string(), String::new()),
    };
    let query = form_urlencoded::Serializer::for_suffix(query, 0)
        .extend_pairs(params)
        .finish();
    parts.path_and_query = Some(format!("{path}?{query}").parse::<PathAndQuery>()?);
    Ok(Uri::from_parts(parts)?)
}

/// Fill request id and retry delay of a service error from the response headers.
fn annotate_service_error(mut err: Error, resp: &HttpResponse) -> Error {
    if err.kind() != ErrorKind::Service {
        return err;
    }
    if err.request_id().is_none() {
        let id = REQUEST_ID_HEADERS
            .iter()
            .find_map(|name| resp.headers().get(*name))
            .and_then(|v| v.to_str().ok());
        if let Some(id) = id {
            err = err.with_request_id(id);
        }
    }
    if err.retry_after().is_none() {
        let secs = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        if let Some(secs) = secs {
            err = err.with_retry_after(Duration::from_secs(secs));
        }
    }
    err
}
