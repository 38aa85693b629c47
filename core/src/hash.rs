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

//! Hash related utils.

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use hmac::Hmac;
use hmac::Mac;
use sha1::Sha1;
use sha2::Digest;
use sha2::Sha256;

/// Hex encoded sha256 of the empty string.
pub const EMPTY_STRING_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Base64 encode
pub fn base64_encode(content: &[u8]) -> String {
    BASE64_STANDARD.encode(content)
}

/// Hex encoded SHA256 hash.
///
/// Use this function instead of `hex::encode(sha256(content))` can reduce
/// extra copy.
pub fn hex_sha256(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content).as_slice())
}

/// HMAC with SHA256 hash.
pub fn hmac_sha256(key: &[u8], content: &[u8]) -> Vec<u8> {
    // SAFETY: HMAC's new_from_slice always returns Ok - it handles any key length
    let mut h = Hmac::<Sha256>::new_from_slice(key).unwrap();
    h.update(content);

    h.finalize().into_bytes().to_vec()
}

/// Hex encoded HMAC with SHA256 hash.
///
/// Use this function instead of `hex::encode(hmac_sha256(key, content))` can
/// reduce extra copy.
pub fn hex_hmac_sha256(key: &[u8], content: &[u8]) -> String {
    // SAFETY: HMAC's new_from_slice always returns Ok - it handles any key length
    let mut h = Hmac::<Sha256>::new_from_slice(key).unwrap();
    h.update(content);

    hex::encode(h.finalize().into_bytes())
}

/// Incremental digest over a request payload, used for checksum trailers.
#[derive(Debug, Clone)]
pub enum PayloadDigest {
    /// SHA-256
    Sha256(Sha256),
    /// SHA-1
    Sha1(Sha1),
    /// CRC32 (ISO-HDLC)
    Crc32(crc32fast::Hasher),
    /// CRC32C (Castagnoli), holding the running checksum.
    Crc32c(u32),
}

impl PayloadDigest {
    /// Feed more payload bytes.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            PayloadDigest::Sha256(h) => Digest::update(h, data),
            PayloadDigest::Sha1(h) => Digest::update(h, data),
            PayloadDigest::Crc32(h) => h.update(data),
            PayloadDigest::Crc32c(crc) => *crc = crc32c::crc32c_append(*crc, data),
        }
    }

    /// Base64 encoded digest of everything fed so far. The state is reset.
    ///
    /// CRC checksums are encoded as their four big-endian bytes.
    pub fn finalize_base64(&mut self) -> String {
        match self {
            PayloadDigest::Sha256(h) => base64_encode(&h.finalize_reset()),
            PayloadDigest::Sha1(h) => base64_encode(&h.finalize_reset()),
            PayloadDigest::Crc32(h) => {
                let crc = std::mem::take(h).finalize();
                base64_encode(&crc.to_be_bytes())
            }
            PayloadDigest::Crc32c(crc) => base64_encode(&std::mem::take(crc).to_be_bytes()),
        }
    }

    /// Drop everything fed so far.
    pub fn reset(&mut self) {
        match self {
            PayloadDigest::Sha256(h) => Digest::reset(h),
            PayloadDigest::Sha1(h) => Digest::reset(h),
            PayloadDigest::Crc32(h) => h.reset(),
            PayloadDigest::Crc32c(crc) => *crc = 0,
        }
    }
}
