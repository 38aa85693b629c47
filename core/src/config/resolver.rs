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

use super::{
    ClientConfigurationBuilder, ClientExecutor, ClientOverrideConfiguration, ClientType,
    RequestOverrideConfiguration,
};
use crate::chunked::ChunkedEncodingConfig;
use crate::http::{HttpClientBuilder, HttpSend, NonManagedHttpSend, SharedHttpClient};
use crate::interceptor::{InterceptorChain, LoggingInterceptor};
use crate::retry::{RetryMode, RetryStrategy};
use crate::utils::default_user_agent;
use crate::{Error, Result, Sign};
use http::{HeaderMap, Uri};
use log::{debug, warn};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Defaults contributed by one service.
pub trait ServiceDefaults: Debug + Send + Sync + 'static {
    /// Name of the service, used for logging and signing.
    fn service_name(&self) -> &str;

    /// Build the service layer.
    ///
    /// `merged` holds the caller and override layers, so defaults can be
    /// derived from them, like an endpoint from the region.
    fn defaults(&self, merged: &ClientConfigurationBuilder) -> Result<ClientConfigurationBuilder>;
}

/// Lowest layer, shared by every client.
fn global_defaults() -> ClientConfigurationBuilder {
    ClientConfigurationBuilder::new()
        .with_retry_mode(RetryMode::Standard)
        .with_interceptor(LoggingInterceptor)
        .with_signing_enabled(true)
        .with_chunked_encoding(ChunkedEncodingConfig::default())
}

/// Resolves layered configuration into a [`ClientConfiguration`].
#[derive(Debug, Clone)]
pub struct ClientConfigurationResolver {
    service: Arc<dyn ServiceDefaults>,
    default_http_client_builder: Option<Arc<dyn HttpClientBuilder>>,
}

impl ClientConfigurationResolver {
    /// Create a resolver for one service.
    pub fn new(service: impl ServiceDefaults) -> Self {
        Self {
            service: Arc::new(service),
            default_http_client_builder: None,
        }
    }

    /// Transport builder used when no layer configures a transport.
    pub fn with_default_http_client_builder(mut self, builder: impl HttpClientBuilder) -> Self {
        self.default_http_client_builder = Some(Arc::new(builder));
        self
    }

    /// Merge overrides, caller, service and global layers, then build every
    /// resource the client needs.
    pub fn resolve(
        &self,
        overrides: ClientOverrideConfiguration,
        caller: ClientConfigurationBuilder,
        client_type: ClientType,
    ) -> Result<ClientConfiguration> {
        let overrides = ClientConfigurationBuilder::from(overrides);
        overrides.validate()?;
        caller.validate()?;
        let merged = overrides.merge_over(caller);
        merged.validate()?;

        let service = self.service.defaults(&merged)?;
        let merged = merged.merge_over(service).merge_over(global_defaults());
        self.finalize(merged, client_type)
    }

    fn finalize(
        &self,
        cfg: ClientConfigurationBuilder,
        client_type: ClientType,
    ) -> Result<ClientConfiguration> {
        let service_name = self.service.service_name().to_string();

        let endpoint = cfg
            .endpoint
            .ok_or_else(|| Error::config_invalid(format!("no endpoint configured for {service_name}")))?;
        let endpoint: Uri = endpoint.parse().map_err(|e| {
            Error::config_invalid(format!("invalid endpoint {endpoint}")).with_source(e)
        })?;
        if endpoint.scheme().is_none() || endpoint.authority().is_none() {
            return Err(Error::config_invalid(format!(
                "endpoint {endpoint} must have a scheme and a host"
            )));
        }

        let user_agent = [
            cfg.user_agent_prefix.as_deref(),
            Some(default_user_agent()),
            cfg.user_agent_suffix.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");

        let mut retry_strategy = match (cfg.retry_strategy, cfg.retry_mode) {
            (Some(strategy), _) => strategy,
            (None, mode) => RetryStrategy::from_mode(mode.unwrap_or_default()),
        };
        if let Some(max_attempts) = cfg.max_attempts {
            retry_strategy = retry_strategy.with_max_attempts(max_attempts);
        }
        if retry_strategy.max_attempts() == 0 {
            return Err(Error::config_invalid("max attempts must be greater than 0"));
        }

        let chunked_encoding = cfg.chunked_encoding.unwrap_or_default();
        chunked_encoding.validate()?;

        let signing_enabled = cfg.signing_enabled.unwrap_or(true);
        if signing_enabled && cfg.signer.is_none() {
            return Err(Error::config_invalid(format!(
                "signing is enabled but no signer is configured for {service_name}"
            )));
        }

        let http_client = match (cfg.http_client, cfg.http_client_builder) {
            (Some(client), _) => {
                let client: Arc<dyn HttpSend> = Arc::new(NonManagedHttpSend::new(client));
                SharedHttpClient::new(client)
            }
            (None, Some(builder)) => SharedHttpClient::new(builder.build()?),
            (None, None) => match &self.default_http_client_builder {
                Some(builder) => SharedHttpClient::new(builder.build()?),
                None => {
                    return Err(Error::config_invalid(
                        "no http client or http client builder configured",
                    ))
                }
            },
        };

        let executor = match (cfg.completion_executor, client_type) {
            (Some(handle), _) => Ok(ClientExecutor::shared(handle)),
            (None, ClientType::Sync) => ClientExecutor::new_sync(),
            (None, ClientType::Async) => ClientExecutor::new_async(),
        };
        let executor = match executor {
            Ok(executor) => executor,
            Err(err) => {
                http_client.close();
                return Err(err);
            }
        };

        debug!(
            "resolved {client_type:?} client for {service_name}: endpoint={endpoint}, retry={}, max_attempts={}",
            retry_strategy.mode(),
            retry_strategy.max_attempts()
        );

        Ok(ClientConfiguration {
            service_name,
            client_type,
            endpoint,
            region: cfg.region,
            profile_name: cfg.profile_name,
            user_agent,
            api_call_timeout: cfg.api_call_timeout,
            api_call_attempt_timeout: cfg.api_call_attempt_timeout,
            retry_strategy,
            interceptors: InterceptorChain::new(cfg.interceptors),
            headers: cfg.headers,
            signer: cfg.signer,
            signing_enabled,
            http_client: Arc::new(http_client),
            executor: Arc::new(executor),
            chunked_encoding,
        })
    }
}

/// Immutable configuration of one client.
///
/// Clones share the transport, the executor and the retry budget.
#[derive(Debug, Clone)]
pub struct ClientConfiguration {
    service_name: String,
    client_type: ClientType,
    endpoint: Uri,
    region: Option<String>,
    profile_name: Option<String>,
    user_agent: String,
    api_call_timeout: Option<Duration>,
    api_call_attempt_timeout: Option<Duration>,
    retry_strategy: RetryStrategy,
    interceptors: InterceptorChain,
    headers: HeaderMap,
    signer: Option<Arc<dyn Sign>>,
    signing_enabled: bool,
    http_client: Arc<SharedHttpClient>,
    executor: Arc<ClientExecutor>,
    chunked_encoding: ChunkedEncodingConfig,
}

impl ClientConfiguration {
    /// Name of the service.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Sync or async.
    pub fn client_type(&self) -> ClientType {
        self.client_type
    }

    /// Endpoint relative request URIs are resolved against.
    pub fn endpoint(&self) -> &Uri {
        &self.endpoint
    }

    /// Region, if the service uses one.
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// Selected profile, if any.
    pub fn profile_name(&self) -> Option<&str> {
        self.profile_name.as_deref()
    }

    /// Full `User-Agent` value.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Bound of a whole call, `None` for no bound.
    pub fn api_call_timeout(&self) -> Option<Duration> {
        self.api_call_timeout
    }

    /// Bound of one attempt, `None` for no bound.
    pub fn api_call_attempt_timeout(&self) -> Option<Duration> {
        self.api_call_attempt_timeout
    }

    /// Retry strategy.
    pub fn retry_strategy(&self) -> &RetryStrategy {
        &self.retry_strategy
    }

    /// Interceptors, in run order.
    pub fn interceptors(&self) -> &InterceptorChain {
        &self.interceptors
    }

    /// Headers added to every request.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Signer, if any.
    pub fn signer(&self) -> Option<&Arc<dyn Sign>> {
        self.signer.as_ref()
    }

    /// Check if requests are signed.
    pub fn signing_enabled(&self) -> bool {
        self.signing_enabled
    }

    /// Transport.
    pub fn http_client(&self) -> &Arc<SharedHttpClient> {
        &self.http_client
    }

    /// Executor.
    pub fn executor(&self) -> &Arc<ClientExecutor> {
        &self.executor
    }

    /// Chunked encoding sizes.
    pub fn chunked_encoding(&self) -> ChunkedEncodingConfig {
        self.chunked_encoding
    }

    /// Copy scoped to one call.
    ///
    /// Timeouts, signer and signing flag are replaced, interceptors appended.
    /// Headers, query and attributes are applied by the pipeline.
    pub fn with_request_override(&self, o: &RequestOverrideConfiguration) -> ClientConfiguration {
        let mut cfg = self.clone();
        if let Some(t) = o.api_call_timeout {
            cfg.api_call_timeout = Some(t);
        }
        if let Some(t) = o.api_call_attempt_timeout {
            cfg.api_call_attempt_timeout = Some(t);
        }
        if let Some(signer) = &o.signer {
            cfg.signer = Some(signer.clone());
        }
        if let Some(enabled) = o.signing_enabled {
            cfg.signing_enabled = enabled;
        }
        for i in &o.interceptors {
            cfg.interceptors.push(i.clone());
        }
        cfg
    }

    /// Close owned resources. Caller supplied ones are left alone.
    pub fn close(&self) {
        self.http_client.close();
        if let Err(err) = self.executor.shutdown() {
            warn!("failed to shut down executor of {}: {err}", self.service_name);
        }
    }
}
