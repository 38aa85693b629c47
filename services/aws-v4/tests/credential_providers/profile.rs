use super::*;
use crate::signing::{authorization_parts, MockTransport, PutObject, PutObjectOperation};
use pretty_assertions::assert_eq;
use reqflow_aws_v4::{AwsServiceDefaults, ProfileCredentialProvider};
use reqflow_core::config::{
    ClientConfigurationBuilder, ClientConfigurationResolver, ClientOverrideConfiguration,
    ClientType,
};
use reqflow_core::{ProvideCredential, RequestPipeline};
use std::fs;
use tempfile::TempDir;

const CREDENTIALS: &str = r#"[default]
aws_access_key_id = default-ak
aws_secret_access_key = default-sk

[dev]
aws_access_key_id = dev-ak
aws_secret_access_key = dev-sk
aws_session_token = dev-token
"#;

fn write_credentials() -> (TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials");
    fs::write(&path, CREDENTIALS).unwrap();
    let path = path.to_string_lossy().to_string();
    (dir, path)
}

#[tokio::test]
async fn test_profile_credential_provider() -> Result<()> {
    let (_dir, path) = write_credentials();
    let ctx = create_test_context_with_env(&[
        ("AWS_SHARED_CREDENTIALS_FILE", path.as_str()),
        ("AWS_CONFIG_FILE", "/nonexistent/config"),
        ("AWS_PROFILE", "dev"),
    ]);

    let cred = ProfileCredentialProvider::new()
        .provide_credential(&ctx)
        .await?
        .expect("credential from profile");
    assert_eq!(cred.access_key_id, "dev-ak");
    assert_eq!(cred.session_token.as_deref(), Some("dev-token"));
    Ok(())
}

#[tokio::test]
async fn test_client_signs_with_configured_profile() -> Result<()> {
    let (_dir, path) = write_credentials();
    let ctx = create_test_context_with_env(&[
        ("AWS_SHARED_CREDENTIALS_FILE", path.as_str()),
        ("AWS_CONFIG_FILE", "/nonexistent/config"),
        ("AWS_REGION", "eu-west-1"),
    ]);
    let transport = MockTransport::new(&[]);

    let cfg = ClientConfigurationResolver::new(AwsServiceDefaults::new("s3").with_context(ctx))
        .resolve(
            ClientOverrideConfiguration::new(),
            ClientConfigurationBuilder::new()
                .with_profile_name("dev")
                .with_http_client(transport.clone())
                .with_completion_executor(tokio::runtime::Handle::current()),
            ClientType::Async,
        )?;

    RequestPipeline::new(cfg)
        .execute(&PutObjectOperation, PutObject::new("k", "v"))
        .await?;

    let sent = &transport.sent()[0];
    assert!(sent.uri.starts_with("https://s3.eu-west-1.amazonaws.com/"));
    assert_eq!(sent.header("x-amz-security-token"), "dev-token");
    let parts = authorization_parts(sent.header("authorization"));
    assert!(parts["Credential"].starts_with("dev-ak/"));
    assert!(parts["Credential"].ends_with("/eu-west-1/s3/aws4_request"));
    Ok(())
}

#[tokio::test]
async fn test_env_wins_over_profile() -> Result<()> {
    let (_dir, path) = write_credentials();
    let ctx = create_test_context_with_env(&[
        ("AWS_SHARED_CREDENTIALS_FILE", path.as_str()),
        ("AWS_ACCESS_KEY_ID", "env-ak"),
        ("AWS_SECRET_ACCESS_KEY", "env-sk"),
    ]);

    let cred = reqflow_aws_v4::DefaultCredentialProvider::new()
        .provide_credential(&ctx)
        .await?
        .expect("credential");
    assert_eq!(cred.access_key_id, "env-ak");
    Ok(())
}
