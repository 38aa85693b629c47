//! Execute typed API calls through an interceptor pipeline with retries,
//! signing and signed chunked uploads.
//!
//! This crate bundles [`reqflow_core`] with the service crates behind
//! features:
//!
//! - `aws`: SigV4 signing, credential providers and AWS service defaults.
//! - `default-context`: a [`DefaultContext`] reading the process
//!   environment and local files, and a reqwest transport for clients.
//!
//! ```no_run
//! use reqflow::aws;
//! use reqflow::config::{ClientConfigurationBuilder, ClientOverrideConfiguration};
//! use reqflow::AsyncClient;
//!
//! # async fn run() -> reqflow::Result<()> {
//! let client = AsyncClient::build(
//!     &aws::client_resolver("s3"),
//!     ClientOverrideConfiguration::new(),
//!     ClientConfigurationBuilder::new().with_region("us-east-1"),
//! )?;
//! // client.execute(MyOperation, input).await?;
//! client.close();
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub use reqflow_core::*;

#[cfg(feature = "default-context")]
mod context;
#[cfg(feature = "default-context")]
pub use context::{default_context, DefaultContext};
#[cfg(feature = "default-context")]
pub use reqflow_http_send_reqwest::{ReqwestHttpClientBuilder, ReqwestHttpSend};

#[cfg(feature = "aws")]
pub mod aws;
