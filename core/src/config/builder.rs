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

use crate::chunked::ChunkedEncodingConfig;
use crate::http::{HttpClientBuilder, HttpSend};
use crate::interceptor::Interceptor;
use crate::retry::{RetryMode, RetryStrategy};
use crate::{Error, Result, Sign};
use http::{HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

/// One layer of client configuration.
///
/// Every option may be unset. Layers are merged by
/// [`crate::config::ClientConfigurationResolver`], highest priority first.
#[derive(Debug, Clone, Default)]
pub struct ClientConfigurationBuilder {
    pub(crate) endpoint: Option<String>,
    pub(crate) region: Option<String>,
    pub(crate) profile_name: Option<String>,
    pub(crate) user_agent_prefix: Option<String>,
    pub(crate) user_agent_suffix: Option<String>,
    pub(crate) api_call_timeout: Option<Duration>,
    pub(crate) api_call_attempt_timeout: Option<Duration>,
    pub(crate) retry_mode: Option<RetryMode>,
    pub(crate) retry_strategy: Option<RetryStrategy>,
    pub(crate) max_attempts: Option<u32>,
    pub(crate) interceptors: Vec<Arc<dyn Interceptor>>,
    pub(crate) headers: HeaderMap,
    pub(crate) signer: Option<Arc<dyn Sign>>,
    pub(crate) signing_enabled: Option<bool>,
    pub(crate) http_client: Option<Arc<dyn HttpSend>>,
    pub(crate) http_client_builder: Option<Arc<dyn HttpClientBuilder>>,
    pub(crate) completion_executor: Option<Handle>,
    pub(crate) chunked_encoding: Option<ChunkedEncodingConfig>,
}

impl ClientConfigurationBuilder {
    /// Create an empty layer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the endpoint, like `https://s3.us-east-1.amazonaws.com`.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Select a profile of the shared config files.
    pub fn with_profile_name(mut self, profile: impl Into<String>) -> Self {
        self.profile_name = Some(profile.into());
        self
    }

    /// Text placed before the default user agent.
    pub fn with_user_agent_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.user_agent_prefix = Some(prefix.into());
        self
    }

    /// Text placed after the default user agent.
    pub fn with_user_agent_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.user_agent_suffix = Some(suffix.into());
        self
    }

    /// Bound a whole call, every retry included.
    pub fn with_api_call_timeout(mut self, timeout: Duration) -> Self {
        self.api_call_timeout = Some(timeout);
        self
    }

    /// Bound a single attempt.
    pub fn with_api_call_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.api_call_attempt_timeout = Some(timeout);
        self
    }

    /// Use the default strategy of `mode`.
    pub fn with_retry_mode(mut self, mode: RetryMode) -> Self {
        self.retry_mode = Some(mode);
        self
    }

    /// Use this strategy, taking precedence over a mode set on the same layer.
    pub fn with_retry_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.retry_strategy = Some(strategy);
        self
    }

    /// Override the attempts of the resolved retry strategy.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Append an interceptor.
    pub fn with_interceptor(mut self, interceptor: impl Interceptor) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Append a shared interceptor.
    pub fn with_shared_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Add a header sent with every request.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name: HeaderName = name.parse().map_err(|e| {
            Error::config_invalid(format!("invalid header name {name}")).with_source(e)
        })?;
        let value: HeaderValue = value.parse().map_err(|e| {
            Error::config_invalid(format!("invalid value for header {name}")).with_source(e)
        })?;
        self.headers.append(name, value);
        Ok(self)
    }

    /// Set the signer.
    pub fn with_signer(mut self, signer: impl Sign) -> Self {
        self.signer = Some(Arc::new(signer));
        self
    }

    /// Set a shared signer.
    pub fn with_shared_signer(mut self, signer: Arc<dyn Sign>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Enable or disable request signing.
    pub fn with_signing_enabled(mut self, enabled: bool) -> Self {
        self.signing_enabled = Some(enabled);
        self
    }

    /// Use a transport owned by the caller. The client never closes it.
    pub fn with_http_client(mut self, client: Arc<dyn HttpSend>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Let the client build and own its transport.
    pub fn with_http_client_builder(mut self, builder: impl HttpClientBuilder) -> Self {
        self.http_client_builder = Some(Arc::new(builder));
        self
    }

    /// Run async calls on this runtime instead of an owned one.
    pub fn with_completion_executor(mut self, handle: Handle) -> Self {
        self.completion_executor = Some(handle);
        self
    }

    /// Sizes used to chunk-encode streaming uploads.
    pub fn with_chunked_encoding(mut self, config: ChunkedEncodingConfig) -> Self {
        self.chunked_encoding = Some(config);
        self
    }

    /// The endpoint, if set.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// The region, if set.
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// The profile name, if set.
    pub fn profile_name(&self) -> Option<&str> {
        self.profile_name.as_deref()
    }

    /// Check if a signer is set.
    pub fn has_signer(&self) -> bool {
        self.signer.is_some()
    }

    /// Check if a transport or transport builder is set.
    pub fn has_http_client(&self) -> bool {
        self.http_client.is_some() || self.http_client_builder.is_some()
    }

    /// Fail if a transport and a transport builder are both set.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.http_client.is_some() && self.http_client_builder.is_some() {
            return Err(Error::config_invalid(
                "The httpClient and the httpClientBuilder can't both be configured.",
            ));
        }
        Ok(())
    }

    /// Merge `self` over a lower priority layer.
    pub fn merge_over(self, lower: ClientConfigurationBuilder) -> ClientConfigurationBuilder {
        // A layer that picks a retry strategy or mode replaces both of the lower layer.
        let (retry_mode, retry_strategy) = if self.retry_mode.is_some() || self.retry_strategy.is_some() {
            (self.retry_mode, self.retry_strategy)
        } else {
            (lower.retry_mode, lower.retry_strategy)
        };

        let mut headers = lower.headers;
        let mut last_name = None;
        for (name, value) in self.headers {
            // `None` names continue the previous one.
            let name = match name {
                Some(name) => {
                    headers.remove(&name);
                    last_name = Some(name.clone());
                    name
                }
                None => match &last_name {
                    Some(name) => name.clone(),
                    None => continue,
                },
            };
            headers.append(name, value);
        }

        let mut interceptors = lower.interceptors;
        interceptors.extend(self.interceptors);

        ClientConfigurationBuilder {
            endpoint: self.endpoint.or(lower.endpoint),
            region: self.region.or(lower.region),
            profile_name: self.profile_name.or(lower.profile_name),
            user_agent_prefix: self.user_agent_prefix.or(lower.user_agent_prefix),
            user_agent_suffix: self.user_agent_suffix.or(lower.user_agent_suffix),
            api_call_timeout: self.api_call_timeout.or(lower.api_call_timeout),
            api_call_attempt_timeout: self.api_call_attempt_timeout.or(lower.api_call_attempt_timeout),
            retry_mode,
            retry_strategy,
            max_attempts: self.max_attempts.or(lower.max_attempts),
            interceptors,
            headers,
            signer: self.signer.or(lower.signer),
            signing_enabled: self.signing_enabled.or(lower.signing_enabled),
            http_client: self.http_client.or(lower.http_client),
            http_client_builder: self.http_client_builder.or(lower.http_client_builder),
            completion_executor: self.completion_executor.or(lower.completion_executor),
            chunked_encoding: self.chunked_encoding.or(lower.chunked_encoding),
        }
    }
}

/// Options that override what the caller configured on the client.
///
/// Typically set by a service wrapper or a test harness.
#[derive(Debug, Clone, Default)]
pub struct ClientOverrideConfiguration {
    inner: ClientConfigurationBuilder,
}

impl ClientOverrideConfiguration {
    /// Create an empty override.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound a whole call, every retry included.
    pub fn with_api_call_timeout(mut self, timeout: Duration) -> Self {
        self.inner.api_call_timeout = Some(timeout);
        self
    }

    /// Bound a single attempt.
    pub fn with_api_call_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.inner.api_call_attempt_timeout = Some(timeout);
        self
    }

    /// Append an interceptor, run after the caller's.
    pub fn with_interceptor(mut self, interceptor: impl Interceptor) -> Self {
        self.inner.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Set the signer.
    pub fn with_signer(mut self, signer: impl Sign) -> Self {
        self.inner.signer = Some(Arc::new(signer));
        self
    }

    /// Add a header, replacing same-named headers of lower layers.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        self.inner = self.inner.with_header(name, value)?;
        Ok(self)
    }

    /// Use the default strategy of `mode`.
    pub fn with_retry_mode(mut self, mode: RetryMode) -> Self {
        self.inner.retry_mode = Some(mode);
        self
    }

    /// Use this retry strategy.
    pub fn with_retry_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.inner.retry_strategy = Some(strategy);
        self
    }

    /// Select a profile of the shared config files.
    pub fn with_profile_name(mut self, profile: impl Into<String>) -> Self {
        self.inner.profile_name = Some(profile.into());
        self
    }
}

impl From<ClientOverrideConfiguration> for ClientConfigurationBuilder {
    fn from(value: ClientOverrideConfiguration) -> Self {
        value.inner
    }
}
