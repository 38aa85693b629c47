use super::create_test_context_with_env;
use pretty_assertions::assert_eq;
use reqflow_aws_v4::{Credential, DefaultCredentialProvider, EnvCredentialProvider};
use reqflow_core::{ProvideCredential, Result};

#[tokio::test]
async fn test_env_credential_provider() -> Result<()> {
    let ctx = create_test_context_with_env(&[
        ("AWS_ACCESS_KEY_ID", "env-ak"),
        ("AWS_SECRET_ACCESS_KEY", "env-sk"),
        ("AWS_SESSION_TOKEN", "env-token"),
    ]);

    let cred = EnvCredentialProvider::new()
        .provide_credential(&ctx)
        .await?
        .expect("credential from env");
    assert_eq!(cred.access_key_id, "env-ak");
    assert_eq!(cred.secret_access_key, "env-sk");
    assert_eq!(cred.session_token.as_deref(), Some("env-token"));
    Ok(())
}

#[tokio::test]
async fn test_default_chain_without_anything_falls_back_to_static() -> Result<()> {
    let ctx = create_test_context_with_env(&[
        // Point the profile files at paths that don't exist.
        ("AWS_CONFIG_FILE", "/nonexistent/config"),
        ("AWS_SHARED_CREDENTIALS_FILE", "/nonexistent/credentials"),
    ]);

    let provider = DefaultCredentialProvider::new();
    assert!(provider.provide_credential(&ctx).await?.is_none());

    let cred = DefaultCredentialProvider::new()
        .with_static(&Credential::new("static-ak", "static-sk"))
        .provide_credential(&ctx)
        .await?
        .expect("static fallback");
    assert_eq!(cred.access_key_id, "static-ak");
    Ok(())
}
