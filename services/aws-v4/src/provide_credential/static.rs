use crate::Credential;
use async_trait::async_trait;
use reqflow_core::{Context, ProvideCredential, Result};

/// Serves one fixed credential, for keys handed in by the caller.
///
/// The credential is returned as is, expiration included, so the signer
/// refuses it once it has expired.
#[derive(Debug, Clone)]
pub struct StaticCredentialProvider {
    credential: Credential,
}

impl StaticCredentialProvider {
    /// Serve a long-lived access key pair.
    pub fn new(access_key_id: &str, secret_access_key: &str) -> Self {
        Self::from_credential(&Credential::new(access_key_id, secret_access_key))
    }

    /// Serve an existing credential.
    pub fn from_credential(cred: &Credential) -> Self {
        Self {
            credential: cred.clone(),
        }
    }

    /// Attach a session token to the served credential.
    pub fn with_session_token(mut self, token: &str) -> Self {
        self.credential.session_token = Some(token.to_string());
        self
    }
}

#[async_trait]
impl ProvideCredential for StaticCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, _: &Context) -> Result<Option<Self::Credential>> {
        Ok(Some(self.credential.clone()))
    }
}
