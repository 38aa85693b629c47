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

//! Per-call state threaded through the pipeline.

use crate::attribute::ExecutionAttributes;
use crate::http::{HttpRequest, HttpResponse};
use crate::{Error, Result};
use log::debug;
use std::any::Any;
use std::fmt::{self, Debug};

/// A typed request or response object of an operation.
///
/// Implemented for every `Debug + Send + Sync + 'static` type.
pub trait Message: Any + Debug + Send + Sync {
    /// Upcast for downcasting by reference.
    fn as_any(&self) -> &dyn Any;
    /// Upcast for downcasting by mutable reference.
    fn as_any_mut(&mut self) -> &mut dyn Any;
    /// Upcast for downcasting by value.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync>;
}

impl<T: Any + Debug + Send + Sync> Message for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }
}

impl dyn Message {
    /// Borrow as `T` if the message is a `T`.
    pub fn downcast_ref<T: Message>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    /// Mutably borrow as `T` if the message is a `T`.
    pub fn downcast_mut<T: Message>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut()
    }

    /// Take the message as `T`.
    pub fn downcast<T: Message>(self: Box<Self>) -> Result<Box<T>> {
        self.into_any()
            .downcast()
            .map_err(|_| Error::unexpected("message is not of the expected type"))
    }
}

/// Stages of one execution, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExecutionState {
    /// Context created, nothing ran yet.
    Created,
    /// `before_execution` hooks ran.
    BeforeExecution,
    /// `modify_request` hooks ran.
    ModifyRequest,
    /// `before_marshalling` hooks ran.
    BeforeMarshalling,
    /// The request object became an http request.
    Marshalled,
    /// `after_marshalling` hooks ran.
    AfterMarshalling,
    /// Endpoint, user agent, headers and query were added.
    HeadersAndParamsAdded,
    /// `modify_http_request` hooks ran.
    ModifyHttpRequest,
    /// The current attempt was signed.
    Signed,
    /// The current attempt was sent.
    Transmitted,
    /// The response of the current attempt was handled.
    ResponseHandled,
    /// `after_execution` hooks ran.
    AfterExecution,
    /// Terminal: the call produced a response.
    Success,
    /// Terminal: the call failed.
    Failed,
}

impl ExecutionState {
    /// Check if no further stage can run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionState::Success | ExecutionState::Failed)
    }
}

/// The objects interceptors can see and replace.
///
/// Each slot fills as the pipeline advances: the typed request from the
/// start, the http request after marshalling, the http response after
/// transmission and the typed response after unmarshalling.
pub struct InterceptorContext {
    request: Box<dyn Message>,
    http_request: Option<HttpRequest>,
    http_response: Option<HttpResponse>,
    response: Option<Box<dyn Message>>,
}

impl InterceptorContext {
    /// Start with the typed request.
    pub fn new(request: Box<dyn Message>) -> Self {
        Self {
            request,
            http_request: None,
            http_response: None,
            response: None,
        }
    }

    /// The typed request.
    pub fn request(&self) -> &dyn Message {
        self.request.as_ref()
    }

    /// The marshalled request, if marshalling ran.
    pub fn http_request(&self) -> Option<&HttpRequest> {
        self.http_request.as_ref()
    }

    /// The response of the last attempt, if one arrived.
    pub fn http_response(&self) -> Option<&HttpResponse> {
        self.http_response.as_ref()
    }

    /// The typed response, if unmarshalling ran.
    pub fn response(&self) -> Option<&dyn Message> {
        self.response.as_deref()
    }

    pub(crate) fn request_mut(&mut self) -> &mut Box<dyn Message> {
        &mut self.request
    }

    pub(crate) fn http_request_mut(&mut self) -> Option<&mut HttpRequest> {
        self.http_request.as_mut()
    }

    pub(crate) fn set_http_request(&mut self, req: HttpRequest) {
        self.http_request = Some(req);
    }

    pub(crate) fn set_http_response(&mut self, resp: HttpResponse) {
        self.http_response = Some(resp);
    }

    pub(crate) fn response_mut(&mut self) -> Option<&mut Box<dyn Message>> {
        self.response.as_mut()
    }

    pub(crate) fn set_response(&mut self, resp: Box<dyn Message>) {
        self.response = Some(resp);
    }

    pub(crate) fn take_response(&mut self) -> Option<Box<dyn Message>> {
        self.response.take()
    }
}

impl Debug for InterceptorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorContext")
            .field("request", &self.request)
            .field("http_request", &self.http_request.as_ref().map(|r| r.uri()))
            .field("http_response", &self.http_response.as_ref().map(|r| r.status()))
            .field("response", &self.response)
            .finish()
    }
}

/// Mutable state of one logical call.
///
/// Owned by exactly one call and never shared.
#[derive(Debug)]
pub struct ExecutionContext {
    /// Objects visible to interceptors.
    pub interceptor_context: InterceptorContext,
    /// Attributes of this call.
    pub attributes: ExecutionAttributes,
    state: ExecutionState,
}

impl ExecutionContext {
    /// Create a context for the typed request.
    pub fn new(request: Box<dyn Message>, attributes: ExecutionAttributes) -> Self {
        Self {
            interceptor_context: InterceptorContext::new(request),
            attributes,
            state: ExecutionState::Created,
        }
    }

    /// Current stage.
    pub fn state(&self) -> ExecutionState {
        self.state
    }

    /// Move to `state`.
    ///
    /// Retries go back from `ResponseHandled` to `Signed`; every other
    /// transition moves forward.
    pub(crate) fn advance(&mut self, state: ExecutionState) {
        debug_assert!(
            !self.state.is_terminal(),
            "execution already finished in {:?}",
            self.state
        );
        debug!("execution state: {:?} -> {:?}", self.state, state);
        self.state = state;
    }
}
