//! AWS services.

pub use reqflow_aws_v4::*;

#[cfg(feature = "default-context")]
use crate::config::ClientConfigurationResolver;
#[cfg(feature = "default-context")]
use crate::{default_context, ReqwestHttpClientBuilder, Signer};

/// Signer that loads credentials through the default chain.
#[cfg(feature = "default-context")]
pub type DefaultSigner = Signer<Credential>;

/// Build a SigV4 signer for `service` in `region` over the default
/// credential chain.
#[cfg(feature = "default-context")]
pub fn default_signer(service: &str, region: &str) -> DefaultSigner {
    let ctx = default_context();
    let provider = DefaultCredentialProvider::new();
    let signer = RequestSigner::new(service, region);
    Signer::new(ctx, provider, signer)
}

/// Resolver for clients of `service`.
///
/// Region, endpoint and signer default from the process environment and
/// `~/.aws`. Clients without a transport get a reqwest one they own.
#[cfg(feature = "default-context")]
pub fn client_resolver(service: &str) -> ClientConfigurationResolver {
    log::debug!("building client resolver for aws service {service}");
    ClientConfigurationResolver::new(AwsServiceDefaults::new(service).with_context(default_context()))
        .with_default_http_client_builder(ReqwestHttpClientBuilder::new())
}
