//! Core of reqflow: the request execution pipeline and signed chunked uploads.
//!
//! Generated service clients hand a typed request and an [`Operation`] to a
//! client. The pipeline runs interceptors, marshals the request, derives
//! endpoint and headers, then signs, sends and retries attempts until the
//! response decodes into a typed result or the retry strategy gives up.
//!
//! ## Overview
//!
//! - [`config`]: layered client configuration, resolved once per client.
//! - [`interceptor`]: hooks around every stage of a call.
//! - [`retry`]: the standard, legacy and adaptive retry strategies.
//! - [`chunked`]: `aws-chunked` encoding with per-chunk signatures.
//! - [`body`]: request bodies that can be replayed on retry.
//! - [`Signer`]: caches credentials from a [`ProvideCredential`] and signs
//!   through a [`SignRequest`].
//!
//! ## Example
//!
//! ```no_run
//! use reqflow_core::config::{
//!     ClientConfigurationBuilder, ClientConfigurationResolver, ClientOverrideConfiguration,
//!     ServiceDefaults,
//! };
//! use reqflow_core::http::{HttpRequest, HttpResponse};
//! use reqflow_core::{Error, Operation, Result, SyncClient};
//!
//! #[derive(Debug)]
//! struct Echo;
//!
//! impl ServiceDefaults for Echo {
//!     fn service_name(&self) -> &str {
//!         "echo"
//!     }
//!
//!     fn defaults(&self, _: &ClientConfigurationBuilder) -> Result<ClientConfigurationBuilder> {
//!         Ok(ClientConfigurationBuilder::new().with_endpoint("https://echo.example.com"))
//!     }
//! }
//!
//! #[derive(Debug)]
//! struct GetItem;
//!
//! impl Operation for GetItem {
//!     type Input = String;
//!     type Output = String;
//!
//!     fn name(&self) -> &str {
//!         "GetItem"
//!     }
//!
//!     fn marshal(&self, id: &String) -> Result<HttpRequest> {
//!         Ok(http::Request::get(format!("/items/{id}")).body(Default::default())?)
//!     }
//!
//!     fn unmarshal(&self, resp: HttpResponse) -> Result<String> {
//!         if !resp.status().is_success() {
//!             return Err(Error::service(resp.status(), "Error", "request failed"));
//!         }
//!         Ok(String::from_utf8_lossy(resp.body()).to_string())
//!     }
//! }
//!
//! # fn example(transport: std::sync::Arc<dyn reqflow_core::HttpSend>) -> Result<()> {
//! let resolver = ClientConfigurationResolver::new(Echo);
//! let client = SyncClient::build(
//!     &resolver,
//!     ClientOverrideConfiguration::new(),
//!     ClientConfigurationBuilder::new()
//!         .with_http_client(transport)
//!         .with_signing_enabled(false),
//! )?;
//! let item = client.execute(&GetItem, "42".to_string())?;
//! # Ok(())
//! # }
//! ```

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

pub mod attribute;
pub mod body;
pub mod chunked;
pub mod config;
pub mod execution;
pub mod hash;
pub mod http;
pub mod interceptor;
pub mod retry;
pub mod time;
pub mod utils;

mod context;
pub use context::{Context, Env, FileRead, NoopEnv, NoopFileRead, OsEnv, StaticEnv};
mod error;
pub use error::{Error, ErrorKind, Result};
pub use http::HttpSend;

mod api;
pub use api::{ProvideCredential, SignRequest, SigningCredential};
mod chain;
pub use chain::ProvideCredentialChain;
mod signer;
pub use signer::{Sign, Signer};
pub use chunked::SignChunk;

mod pipeline;
pub use pipeline::{
    Operation, PresignedRequest, RequestPipeline, INVOCATION_ID_HEADER, RETRY_HEADER,
};
mod client;
pub use client::{AsyncClient, ResponseFuture, SyncClient};
