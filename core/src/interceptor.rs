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

//! Hooks into the stages of the request pipeline.

use crate::attribute::{ExecutionAttributes, ATTEMPT, OPERATION_NAME, SERVICE_NAME, TRANSACTION_ID};
use crate::execution::{InterceptorContext, Message};
use crate::http::{HttpRequest, HttpResponse};
use crate::{Error, Result};
use log::{debug, log_enabled, warn, Level};
use std::fmt::Debug;
use std::sync::Arc;

/// Interceptor observes or rewrites one execution at fixed points.
///
/// Every hook defaults to a no-op. Returning an error from any hook fails
/// the call, except for [`Interceptor::on_execution_failure`] whose errors
/// are logged and dropped.
///
/// `before_transmission` and `modify_http_response` run once per attempt,
/// every other hook once per call.
#[allow(unused_variables)]
pub trait Interceptor: Debug + Send + Sync + 'static {
    /// The call starts.
    fn before_execution(&self, ctx: &InterceptorContext, attrs: &mut ExecutionAttributes) -> Result<()> {
        Ok(())
    }

    /// Replace the typed request.
    fn modify_request(&self, req: &mut Box<dyn Message>, attrs: &mut ExecutionAttributes) -> Result<()> {
        Ok(())
    }

    /// The typed request is about to be marshalled.
    fn before_marshalling(&self, ctx: &InterceptorContext, attrs: &mut ExecutionAttributes) -> Result<()> {
        Ok(())
    }

    /// The http request is available.
    fn after_marshalling(&self, ctx: &InterceptorContext, attrs: &mut ExecutionAttributes) -> Result<()> {
        Ok(())
    }

    /// Rewrite the http request before signing.
    fn modify_http_request(&self, req: &mut HttpRequest, attrs: &mut ExecutionAttributes) -> Result<()> {
        Ok(())
    }

    /// The signed request of one attempt is about to be sent.
    fn before_transmission(&self, req: &HttpRequest, attrs: &mut ExecutionAttributes) -> Result<()> {
        Ok(())
    }

    /// Rewrite the raw response of one attempt.
    fn modify_http_response(&self, resp: &mut HttpResponse, attrs: &mut ExecutionAttributes) -> Result<()> {
        Ok(())
    }

    /// The typed response is available.
    fn after_execution(&self, ctx: &InterceptorContext, attrs: &mut ExecutionAttributes) -> Result<()> {
        Ok(())
    }

    /// Replace the typed response. Runs before `after_execution`.
    fn modify_response(&self, resp: &mut Box<dyn Message>, attrs: &mut ExecutionAttributes) -> Result<()> {
        Ok(())
    }

    /// The call failed. Runs exactly once per failed call.
    fn on_execution_failure(
        &self,
        ctx: &InterceptorContext,
        err: &Error,
        attrs: &mut ExecutionAttributes,
    ) -> Result<()> {
        Ok(())
    }
}

/// Ordered list of interceptors, run front to back.
#[derive(Debug, Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

macro_rules! run_hook {
    ($(#[$meta:meta])* $name:ident($arg:ident: $ty:ty)) => {
        $(#[$meta])*
        pub fn $name(&self, $arg: $ty, attrs: &mut ExecutionAttributes) -> Result<()> {
            for i in &self.interceptors {
                i.$name($arg, attrs)?;
            }
            Ok(())
        }
    };
}

impl InterceptorChain {
    /// Create a chain.
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self { interceptors }
    }

    /// Append an interceptor.
    pub fn push(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    /// Append every interceptor of `other`.
    pub fn extend(&mut self, other: &InterceptorChain) {
        self.interceptors.extend(other.interceptors.iter().cloned());
    }

    /// Number of interceptors.
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// Check if the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Iterate the interceptors in order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Interceptor>> {
        self.interceptors.iter()
    }

    run_hook!(
        /// Run `before_execution` hooks.
        before_execution(ctx: &InterceptorContext)
    );
    run_hook!(
        /// Run `modify_request` hooks.
        modify_request(req: &mut Box<dyn Message>)
    );
    run_hook!(
        /// Run `before_marshalling` hooks.
        before_marshalling(ctx: &InterceptorContext)
    );
    run_hook!(
        /// Run `after_marshalling` hooks.
        after_marshalling(ctx: &InterceptorContext)
    );
    run_hook!(
        /// Run `modify_http_request` hooks.
        modify_http_request(req: &mut HttpRequest)
    );
    run_hook!(
        /// Run `before_transmission` hooks.
        before_transmission(req: &HttpRequest)
    );
    run_hook!(
        /// Run `modify_http_response` hooks.
        modify_http_response(resp: &mut HttpResponse)
    );
    run_hook!(
        /// Run `after_execution` hooks.
        after_execution(ctx: &InterceptorContext)
    );
    run_hook!(
        /// Run `modify_response` hooks.
        modify_response(resp: &mut Box<dyn Message>)
    );

    /// Run `on_execution_failure` hooks.
    ///
    /// Every hook runs even if an earlier one fails. Hook errors never
    /// replace `err`.
    pub fn on_execution_failure(
        &self,
        ctx: &InterceptorContext,
        err: &Error,
        attrs: &mut ExecutionAttributes,
    ) {
        for i in &self.interceptors {
            if let Err(hook_err) = i.on_execution_failure(ctx, err, attrs) {
                warn!("interceptor {i:?} failed in on_execution_failure: {hook_err:?}");
            }
        }
    }
}

impl From<Vec<Arc<dyn Interceptor>>> for InterceptorChain {
    fn from(interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self::new(interceptors)
    }
}

/// Logs the lifecycle of every call under the `reqflow::request` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor;

const LOG_TARGET: &str = "reqflow::request";

impl LoggingInterceptor {
    fn describe(attrs: &ExecutionAttributes) -> String {
        format!(
            "{}.{} [{}]",
            attrs.get(SERVICE_NAME).map(String::as_str).unwrap_or("-"),
            attrs.get(OPERATION_NAME).map(String::as_str).unwrap_or("-"),
            attrs.get(TRANSACTION_ID).map(String::as_str).unwrap_or("-"),
        )
    }
}

impl Interceptor for LoggingInterceptor {
    fn before_execution(&self, _: &InterceptorContext, attrs: &mut ExecutionAttributes) -> Result<()> {
        debug!(target: LOG_TARGET, "{} started", Self::describe(attrs));
        Ok(())
    }

    fn before_transmission(&self, req: &HttpRequest, attrs: &mut ExecutionAttributes) -> Result<()> {
        if log_enabled!(target: LOG_TARGET, Level::Debug) {
            debug!(
                target: LOG_TARGET,
                "{} attempt {} sending {} {}",
                Self::describe(attrs),
                attrs.get(ATTEMPT).copied().unwrap_or_default(),
                req.method(),
                req.uri()
            );
        }
        Ok(())
    }

    fn modify_http_response(&self, resp: &mut HttpResponse, attrs: &mut ExecutionAttributes) -> Result<()> {
        debug!(
            target: LOG_TARGET,
            "{} attempt {} got {}",
            Self::describe(attrs),
            attrs.get(ATTEMPT).copied().unwrap_or_default(),
            resp.status()
        );
        Ok(())
    }

    fn after_execution(&self, _: &InterceptorContext, attrs: &mut ExecutionAttributes) -> Result<()> {
        debug!(target: LOG_TARGET, "{} succeeded", Self::describe(attrs));
        Ok(())
    }

    fn on_execution_failure(
        &self,
        _: &InterceptorContext,
        err: &Error,
        attrs: &mut ExecutionAttributes,
    ) -> Result<()> {
        warn!(target: LOG_TARGET, "{} failed: {err}", Self::describe(attrs));
        Ok(())
    }
}
