//! AWS SigV4 signing for reqflow.
//!
//! [`RequestSigner`] signs requests in the headers or, for presigning, in the
//! query. When chunked encoding is enabled for a call it also rewrites the body
//! into `aws-chunked` form, with every chunk signed by an [`AwsChunkSigner`].
//!
//! [`AwsServiceDefaults`] plugs region, endpoint and signer defaults into a
//! client.
//!
//! ```no_run
//! use reqflow_aws_v4::{AwsServiceDefaults, DefaultCredentialProvider, RequestSigner};
//! use reqflow_core::config::{ClientConfigurationBuilder, ClientConfigurationResolver};
//! use reqflow_core::{Context, OsEnv, Signer};
//!
//! let resolver = ClientConfigurationResolver::new(AwsServiceDefaults::new("s3"));
//! let caller = ClientConfigurationBuilder::new()
//!     .with_region("us-east-1")
//!     .with_signer(Signer::new(
//!         Context::new().with_env(OsEnv),
//!         DefaultCredentialProvider::new(),
//!         RequestSigner::new("s3", "us-east-1"),
//!     ));
//! # let _ = (resolver, caller);
//! ```

#![warn(missing_docs)]

mod canonical;
mod constants;
pub use constants::{
    AWS_CHUNKED, STREAMING_SIGNED_PAYLOAD, STREAMING_SIGNED_PAYLOAD_TRAILER,
    STREAMING_UNSIGNED_PAYLOAD_TRAILER, UNSIGNED_PAYLOAD_HASH, X_AMZ_CONTENT_SHA_256,
    X_AMZ_DECODED_CONTENT_LENGTH, X_AMZ_TRAILER,
};

mod credential;
pub use credential::Credential;

mod chunk_signer;
pub use chunk_signer::AwsChunkSigner;

mod sign_request;
pub use sign_request::RequestSigner;

mod provide_credential;
pub use provide_credential::*;

mod service_defaults;
pub use service_defaults::AwsServiceDefaults;
