// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use crate::attribute::ExecutionAttributes;
use crate::http::HttpRequest;
use crate::{Context, Error, ProvideCredential, Result, SignRequest, SigningCredential};
use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard};

/// Sign is the signer the pipeline calls once per attempt.
#[async_trait::async_trait]
pub trait Sign: Debug + Send + Sync + 'static {
    /// Sign the request in place.
    async fn sign(&self, req: &mut HttpRequest, attrs: &ExecutionAttributes) -> Result<()>;
}

/// Signer is the main struct used to sign the request.
///
/// It caches the credential returned by the provider and loads a new one
/// once the cached credential is no longer valid.
#[derive(Clone, Debug)]
pub struct Signer<K: SigningCredential> {
    ctx: Context,
    loader: Arc<dyn ProvideCredential<Credential = K>>,
    builder: Arc<dyn SignRequest<Credential = K>>,
    credential: Arc<Mutex<Option<K>>>,
}

impl<K: SigningCredential> Signer<K> {
    /// Create a new signer.
    pub fn new(
        ctx: Context,
        loader: impl ProvideCredential<Credential = K>,
        builder: impl SignRequest<Credential = K>,
    ) -> Self {
        Self {
            ctx,

            loader: Arc::new(loader),
            builder: Arc::new(builder),
            credential: Arc::new(Mutex::new(None)),
        }
    }

    async fn credential(&self) -> Result<Option<K>> {
        let credential = self.cached()?.clone();
        if credential.is_valid() {
            return Ok(credential);
        }

        let credential = self.loader.provide_credential(&self.ctx).await?;
        *self.cached()? = credential.clone();
        Ok(credential)
    }

    fn cached(&self) -> Result<MutexGuard<'_, Option<K>>> {
        self.credential
            .lock()
            .map_err(|_| Error::unexpected("credential cache lock poisoned"))
    }
}

#[async_trait::async_trait]
impl<K: SigningCredential> Sign for Signer<K> {
    async fn sign(&self, req: &mut HttpRequest, attrs: &ExecutionAttributes) -> Result<()> {
        let credential = self.credential().await?;
        self.builder
            .sign_request(&self.ctx, req, credential.as_ref(), attrs)
            .await
    }
}
