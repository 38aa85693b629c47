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

use crate::canonical::{generate_signing_key, scope};
use crate::constants::{AWS4_HMAC_SHA256_PAYLOAD, AWS4_HMAC_SHA256_TRAILER};
use hmac::{Hmac, Mac};
use reqflow_core::chunked::SignChunk;
use reqflow_core::hash::{hex_sha256, EMPTY_STRING_SHA256};
use reqflow_core::time::{format_iso8601, DateTime};
use reqflow_core::{Error, Result};
use sha2::Sha256;
use std::fmt::{self, Debug};

/// Signs the chunks of an `aws-chunked` body.
///
/// Every signature covers the previous one, so the chunks of one body form a
/// chain that starts at the signature of the request headers.
///
/// - [Signature calculations for streaming uploads](https://docs.aws.amazon.com/AmazonS3/latest/API/sigv4-streaming.html)
#[derive(Clone)]
pub struct AwsChunkSigner {
    mac: Hmac<Sha256>,
    date_time: String,
    scope: String,
}

impl AwsChunkSigner {
    /// Build a chunk signer from an already derived signing key.
    ///
    /// `date_time` is the ISO 8601 basic timestamp of the request and `scope`
    /// its credential scope, `<date>/<region>/<service>/aws4_request`.
    pub fn new(
        signing_key: &[u8],
        date_time: impl Into<String>,
        scope: impl Into<String>,
    ) -> Result<Self> {
        let mac = Hmac::<Sha256>::new_from_slice(signing_key).map_err(|e| {
            Error::config_invalid(format!("failed to initialize chunk signing key: {e}"))
        })?;
        Ok(Self {
            mac,
            date_time: date_time.into(),
            scope: scope.into(),
        })
    }

    /// Derive the signing key from a secret the same way the request
    /// signature does.
    pub fn from_secret(
        secret_access_key: &str,
        time: DateTime,
        region: &str,
        service: &str,
    ) -> Result<Self> {
        let key = generate_signing_key(secret_access_key, time, region, service);
        Self::new(&key, format_iso8601(time), scope(time, region, service))
    }

    fn sign(&self, algorithm: &str, previous_signature: &str, tail: &str) -> String {
        let string_to_sign = format!(
            "{algorithm}\n{}\n{}\n{previous_signature}\n{tail}",
            self.date_time, self.scope
        );

        let mut mac = self.mac.clone();
        mac.update(string_to_sign.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl SignChunk for AwsChunkSigner {
    fn sign_chunk(&self, chunk: &[u8], previous_signature: &str) -> Result<String> {
        let tail = format!("{EMPTY_STRING_SHA256}\n{}", hex_sha256(chunk));
        Ok(self.sign(AWS4_HMAC_SHA256_PAYLOAD, previous_signature, &tail))
    }

    fn sign_trailer(&self, canonical_trailers: &str, previous_signature: &str) -> Result<String> {
        let tail = hex_sha256(canonical_trailers.as_bytes());
        Ok(self.sign(AWS4_HMAC_SHA256_TRAILER, previous_signature, &tail))
    }

    fn signature_length(&self) -> usize {
        64
    }
}

impl Debug for AwsChunkSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsChunkSigner")
            .field("date_time", &self.date_time)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}
