use crate::constants::{AWS_DEFAULT_REGION, AWS_MAX_ATTEMPTS, AWS_REGION, AWS_RETRY_MODE};
use crate::{DefaultCredentialProvider, RequestSigner};
use log::debug;
use reqflow_core::config::{ClientConfigurationBuilder, ServiceDefaults};
use reqflow_core::retry::RetryMode;
use reqflow_core::{Context, Error, OsEnv, Result, Signer};

/// Defaults for a client of one AWS service.
///
/// - Region from the client configuration, `AWS_REGION` or `AWS_DEFAULT_REGION`.
/// - Endpoint `https://{service}.{region}.amazonaws.com`.
/// - A SigV4 [`Signer`] over the [`DefaultCredentialProvider`] chain.
/// - Retry mode and attempts from `AWS_RETRY_MODE` and `AWS_MAX_ATTEMPTS`.
#[derive(Debug, Clone)]
pub struct AwsServiceDefaults {
    service: String,
    signing_name: Option<String>,
    ctx: Context,
}

impl AwsServiceDefaults {
    /// Defaults for `service`, which is both the endpoint prefix and the
    /// signing name unless [`AwsServiceDefaults::with_signing_name`] is used.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            signing_name: None,
            ctx: Context::new().with_env(OsEnv),
        }
    }

    /// Sign as this service, like `execute-api` for API Gateway.
    pub fn with_signing_name(mut self, name: impl Into<String>) -> Self {
        self.signing_name = Some(name.into());
        self
    }

    /// Context to read the environment and profile files from.
    pub fn with_context(mut self, ctx: Context) -> Self {
        self.ctx = ctx;
        self
    }

    fn signing_name(&self) -> &str {
        self.signing_name.as_deref().unwrap_or(&self.service)
    }

    fn region(&self, merged: &ClientConfigurationBuilder) -> Option<String> {
        merged
            .region()
            .map(str::to_string)
            .or_else(|| self.ctx.env_var(AWS_REGION))
            .or_else(|| self.ctx.env_var(AWS_DEFAULT_REGION))
            .filter(|v| !v.is_empty())
    }
}

impl ServiceDefaults for AwsServiceDefaults {
    fn service_name(&self) -> &str {
        &self.service
    }

    fn defaults(&self, merged: &ClientConfigurationBuilder) -> Result<ClientConfigurationBuilder> {
        let mut cfg = ClientConfigurationBuilder::new();
        let region = self.region(merged);

        if let Some(region) = &region {
            cfg = cfg.with_region(region);
            if merged.endpoint().is_none() {
                cfg = cfg.with_endpoint(format!("https://{}.{region}.amazonaws.com", self.service));
            }
        } else if merged.endpoint().is_none() {
            return Err(Error::config_invalid(format!(
                "no region configured for {}, set one or export {AWS_REGION}",
                self.service
            )));
        }

        match (&region, merged.has_signer()) {
            (Some(region), false) => {
                let provider = match merged.profile_name() {
                    Some(profile) => DefaultCredentialProvider::with_profile(profile),
                    None => DefaultCredentialProvider::new(),
                };
                debug!(
                    "signing {} requests as {} in {region}",
                    self.service,
                    self.signing_name()
                );
                cfg = cfg.with_signer(Signer::new(
                    self.ctx.clone(),
                    provider,
                    RequestSigner::new(self.signing_name(), region),
                ));
            }
            // Without a region only an explicit signer can sign.
            (None, false) => debug!("no region for {}, default signer skipped", self.service),
            (_, true) => {}
        }

        if let Some(mode) = self.ctx.env_var(AWS_RETRY_MODE) {
            cfg = cfg.with_retry_mode(mode.parse::<RetryMode>()?);
        }
        if let Some(attempts) = self.ctx.env_var(AWS_MAX_ATTEMPTS) {
            let attempts = attempts.trim().parse::<u32>().map_err(|e| {
                Error::config_invalid(format!("invalid {AWS_MAX_ATTEMPTS}: {attempts}")).with_source(e)
            })?;
            cfg = cfg.with_max_attempts(attempts);
        }

        Ok(cfg)
    }
}
