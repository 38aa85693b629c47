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

//! Typed attributes attached to one execution.

use crate::chunked::{ChecksumAlgorithm, ChunkedEncodingConfig};
use crate::config::ClientType;
use crate::time::DateTime;
use std::any::Any;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Typed key into [`ExecutionAttributes`].
pub struct AttributeKey<T> {
    name: &'static str,
    _type: PhantomData<fn() -> T>,
}

impl<T> AttributeKey<T> {
    /// Create a key. Keys are compared by name.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _type: PhantomData,
        }
    }

    /// Name of this key.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for AttributeKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for AttributeKey<T> {}

impl<T> Debug for AttributeKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AttributeKey({})", self.name)
    }
}

/// Name of the operation being executed.
pub const OPERATION_NAME: AttributeKey<String> = AttributeKey::new("OperationName");
/// Name of the service the client talks to.
pub const SERVICE_NAME: AttributeKey<String> = AttributeKey::new("ServiceName");
/// Whether the call came through the sync or the async client.
pub const CLIENT_TYPE: AttributeKey<ClientType> = AttributeKey::new("ClientType");
/// Id shared by every attempt of one call.
pub const TRANSACTION_ID: AttributeKey<String> = AttributeKey::new("TransactionId");
/// Zero based index of the current attempt.
pub const ATTEMPT: AttributeKey<u32> = AttributeKey::new("Attempt");
/// Set when presigning: how long the signed request stays valid.
pub const PRESIGN_EXPIRATION: AttributeKey<Duration> = AttributeKey::new("PresignExpiration");
/// Overrides the time used for signing.
pub const SIGNING_TIME: AttributeKey<DateTime> = AttributeKey::new("SigningTime");
/// Skip signing for this execution.
pub const DISABLE_SIGNING: AttributeKey<bool> = AttributeKey::new("DisableSigning");
/// Upload a streaming body with `aws-chunked` encoding.
pub const ENABLE_CHUNKED_ENCODING: AttributeKey<bool> = AttributeKey::new("EnableChunkedEncoding");
/// Sizes used for chunked encoding.
pub const CHUNKED_ENCODING_CONFIG: AttributeKey<ChunkedEncodingConfig> =
    AttributeKey::new("ChunkedEncodingConfig");
/// Checksum sent as a trailer of a chunk-encoded body.
pub const CHECKSUM_TRAILER: AttributeKey<ChecksumAlgorithm> = AttributeKey::new("ChecksumTrailer");
/// Send chunks without signatures.
pub const UNSIGNED_PAYLOAD: AttributeKey<bool> = AttributeKey::new("UnsignedPayload");
/// Endpoint was resolved through discovery rather than configuration.
pub const ENDPOINT_DISCOVERED: AttributeKey<bool> = AttributeKey::new("EndpointDiscovered");

/// Attribute map of one execution.
///
/// Cloning is cheap: values are shared.
#[derive(Clone, Default)]
pub struct ExecutionAttributes {
    values: HashMap<&'static str, Arc<dyn Any + Send + Sync>>,
}

impl ExecutionAttributes {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing any previous one.
    pub fn put<T: Any + Send + Sync>(&mut self, key: AttributeKey<T>, value: T) -> &mut Self {
        self.values.insert(key.name, Arc::new(value));
        self
    }

    /// Get a value.
    pub fn get<T: Any + Send + Sync>(&self, key: AttributeKey<T>) -> Option<&T> {
        self.values.get(key.name)?.downcast_ref()
    }

    /// Check if a value is set for `key`.
    pub fn contains<T>(&self, key: AttributeKey<T>) -> bool {
        self.values.contains_key(key.name)
    }

    /// Check a boolean flag, unset means `false`.
    pub fn is_enabled(&self, key: AttributeKey<bool>) -> bool {
        self.get(key).copied().unwrap_or(false)
    }

    /// Remove a value.
    pub fn remove<T>(&mut self, key: AttributeKey<T>) {
        self.values.remove(key.name);
    }

    /// Copy every value of `other` into self, overwriting same-named ones.
    pub fn merge(&mut self, other: &ExecutionAttributes) {
        for (k, v) in &other.values {
            self.values.insert(*k, v.clone());
        }
    }

    /// Number of values set.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if nothing is set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Debug for ExecutionAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort();
        f.debug_set().entries(keys).finish()
    }
}
