use crate::constants::*;
use crate::Credential;
use async_trait::async_trait;
use ini::{Ini, Properties};
use log::debug;
use reqflow_core::{Context, Error, ProvideCredential, Result};

/// ProfileCredentialProvider loads AWS credentials from configuration files.
///
/// This provider loads credentials from:
/// - `~/.aws/credentials` (or the path specified by `AWS_SHARED_CREDENTIALS_FILE`)
/// - `~/.aws/config` (or the path specified by `AWS_CONFIG_FILE`)
///
/// The profile to use is determined by:
/// 1. The profile specified via `with_profile()`
/// 2. The `AWS_PROFILE` environment variable
/// 3. Default to "default"
#[derive(Debug, Default, Clone)]
pub struct ProfileCredentialProvider {
    profile: Option<String>,
    config_file: Option<String>,
    credentials_file: Option<String>,
}

impl ProfileCredentialProvider {
    /// Create a new ProfileCredentialProvider with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the profile name to use.
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Set the path to the config file.
    pub fn with_config_file(mut self, path: impl Into<String>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Set the path to the credentials file.
    pub fn with_credentials_file(mut self, path: impl Into<String>) -> Self {
        self.credentials_file = Some(path.into());
        self
    }

    fn profile(&self, ctx: &Context) -> String {
        self.profile
            .clone()
            .or_else(|| ctx.env_var(AWS_PROFILE))
            .unwrap_or_else(|| "default".to_string())
    }

    /// Read and parse an ini file. Missing or unreadable files are skipped.
    async fn load_ini(
        ctx: &Context,
        configured: Option<&str>,
        env: &str,
        fallback: &str,
    ) -> Result<Option<Ini>> {
        let path = configured
            .map(str::to_string)
            .or_else(|| ctx.env_var(env))
            .unwrap_or_else(|| fallback.to_string());

        let Some(expanded_path) = ctx.expand_home_dir(&path) else {
            debug!("failed to expand homedir for path: {path}");
            return Ok(None);
        };

        let content = match ctx.file_read(&expanded_path).await {
            Ok(content) => content,
            Err(err) => {
                debug!("failed to read {expanded_path}: {err:?}");
                return Ok(None);
            }
        };

        let conf = Ini::load_from_str(&String::from_utf8_lossy(&content)).map_err(|e| {
            Error::config_invalid(format!("failed to parse {expanded_path}")).with_source(e)
        })?;
        Ok(Some(conf))
    }
}

fn credential_from(props: &Properties) -> Option<Credential> {
    let access_key_id = props.get("aws_access_key_id")?;
    let secret_access_key = props.get("aws_secret_access_key")?;
    Some(Credential {
        access_key_id: access_key_id.to_string(),
        secret_access_key: secret_access_key.to_string(),
        session_token: props.get("aws_session_token").map(|s| s.to_string()),
        expires_in: None,
    })
}

#[async_trait]
impl ProvideCredential for ProfileCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        let profile = self.profile(ctx);

        // Try credentials file first
        if let Some(conf) = Self::load_ini(
            ctx,
            self.credentials_file.as_deref(),
            AWS_SHARED_CREDENTIALS_FILE,
            "~/.aws/credentials",
        )
        .await?
        {
            match conf.section(Some(profile.as_str())).and_then(credential_from) {
                Some(cred) => return Ok(Some(cred)),
                None => debug!("profile {profile} not found in credentials file"),
            }
        }

        // Then try config file
        let Some(conf) = Self::load_ini(
            ctx,
            self.config_file.as_deref(),
            AWS_CONFIG_FILE,
            "~/.aws/config",
        )
        .await?
        else {
            return Ok(None);
        };
        let section = match profile.as_str() {
            "default" => "default".to_string(),
            x => format!("profile {x}"),
        };
        Ok(conf.section(Some(section)).and_then(credential_from))
    }
}
