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

use crate::attribute::{AttributeKey, ExecutionAttributes};
use crate::interceptor::Interceptor;
use crate::{Error, Result, Sign};
use http::{HeaderMap, HeaderName, HeaderValue};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

/// Options scoped to a single call.
#[derive(Debug, Clone, Default)]
pub struct RequestOverrideConfiguration {
    pub(crate) api_call_timeout: Option<Duration>,
    pub(crate) api_call_attempt_timeout: Option<Duration>,
    pub(crate) headers: HeaderMap,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) interceptors: Vec<Arc<dyn Interceptor>>,
    pub(crate) signer: Option<Arc<dyn Sign>>,
    pub(crate) signing_enabled: Option<bool>,
    pub(crate) attributes: ExecutionAttributes,
}

impl RequestOverrideConfiguration {
    /// Create an empty override.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound this call, every retry included.
    pub fn with_api_call_timeout(mut self, timeout: Duration) -> Self {
        self.api_call_timeout = Some(timeout);
        self
    }

    /// Bound each attempt of this call.
    pub fn with_api_call_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.api_call_attempt_timeout = Some(timeout);
        self
    }

    /// Set a header, replacing any value the request already has.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name: HeaderName = name
            .parse()
            .map_err(|e| Error::request_invalid(format!("invalid header name {name}")).with_source(e))?;
        let value: HeaderValue = value.parse().map_err(|e| {
            Error::request_invalid(format!("invalid value for header {name}")).with_source(e)
        })?;
        self.headers.append(name, value);
        Ok(self)
    }

    /// Append a raw query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Append an interceptor, run after the client's.
    pub fn with_interceptor(mut self, interceptor: impl Interceptor) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Sign this call with another signer.
    pub fn with_signer(mut self, signer: impl Sign) -> Self {
        self.signer = Some(Arc::new(signer));
        self
    }

    /// Enable or disable signing for this call.
    pub fn with_signing_enabled(mut self, enabled: bool) -> Self {
        self.signing_enabled = Some(enabled);
        self
    }

    /// Seed an execution attribute.
    pub fn with_attribute<T: Any + Send + Sync>(mut self, key: AttributeKey<T>, value: T) -> Self {
        self.attributes.put(key, value);
        self
    }

    /// Attributes seeded by this override.
    pub fn attributes(&self) -> &ExecutionAttributes {
        &self.attributes
    }
}
