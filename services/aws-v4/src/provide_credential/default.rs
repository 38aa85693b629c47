use crate::provide_credential::{
    EnvCredentialProvider, ProfileCredentialProvider, StaticCredentialProvider,
};
use crate::Credential;
use async_trait::async_trait;
use reqflow_core::{Context, ProvideCredential, ProvideCredentialChain, Result};

/// DefaultCredentialProvider is a loader that will try to load credential via default chains.
///
/// Resolution order:
///
/// 1. Environment variables
/// 2. Shared config (`~/.aws/config`, `~/.aws/credentials`)
/// 3. Static credentials, if given with [`DefaultCredentialProvider::with_static`]
#[derive(Debug)]
pub struct DefaultCredentialProvider {
    chain: ProvideCredentialChain<Credential>,
}

impl Default for DefaultCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultCredentialProvider {
    /// Create a new `DefaultCredentialProvider` instance.
    pub fn new() -> Self {
        Self::with_profile_provider(ProfileCredentialProvider::new())
    }

    /// Use this profile instead of `AWS_PROFILE`.
    pub fn with_profile(profile: impl Into<String>) -> Self {
        Self::with_profile_provider(ProfileCredentialProvider::new().with_profile(profile))
    }

    fn with_profile_provider(profile: ProfileCredentialProvider) -> Self {
        let chain = ProvideCredentialChain::new()
            .push(EnvCredentialProvider::new())
            .push(profile);

        Self { chain }
    }

    /// Create with a custom credential chain.
    pub fn with_chain(chain: ProvideCredentialChain<Credential>) -> Self {
        Self { chain }
    }

    /// Fall back to a fixed credential when nothing else is found.
    pub fn with_static(mut self, cred: &Credential) -> Self {
        self.chain = self
            .chain
            .push(StaticCredentialProvider::from_credential(cred));
        self
    }
}

#[async_trait]
impl ProvideCredential for DefaultCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        self.chain.provide_credential(ctx).await
    }
}
