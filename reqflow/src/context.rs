use async_trait::async_trait;
use reqflow_core::{Context, Env, Error, FileRead, OsEnv, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;

/// Reads the process environment and the local file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultContext;

impl DefaultContext {
    /// Create a new `DefaultContext`.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileRead for DefaultContext {
    async fn file_read(&self, path: &str) -> Result<Vec<u8>> {
        fs::read(path)
            .await
            .map_err(|e| Error::unexpected(format!("failed to read {path}")).with_source(e))
    }
}

impl Env for DefaultContext {
    fn var(&self, key: &str) -> Option<String> {
        OsEnv.var(key)
    }

    fn vars(&self) -> HashMap<String, String> {
        OsEnv.vars()
    }

    fn home_dir(&self) -> Option<PathBuf> {
        OsEnv.home_dir()
    }
}

/// A [`Context`] backed by [`DefaultContext`].
pub fn default_context() -> Context {
    Context::new()
        .with_file_read(DefaultContext)
        .with_env(DefaultContext)
}
