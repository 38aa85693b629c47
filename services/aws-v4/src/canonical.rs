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

//! Canonical request construction shared by header and query signing.

use crate::constants::{AWS_QUERY_ENCODE_SET, AWS_URI_ENCODE_SET};
use http::header::HeaderName;
use http::uri::{Authority, PathAndQuery, Scheme};
use http::{HeaderMap, HeaderValue, Method, Uri};
use percent_encoding::{percent_decode_str, utf8_percent_encode};
use reqflow_core::hash::hmac_sha256;
use reqflow_core::http::HttpRequest;
use reqflow_core::time::{format_date, DateTime};
use reqflow_core::{Error, Result};
use std::fmt::Write;
use std::mem;
use std::str::FromStr;

/// Headers that proxies and transports may rewrite are never signed.
fn is_signed(name: &HeaderName) -> bool {
    !matches!(
        name.as_str(),
        "authorization" | "connection" | "expect" | "transfer-encoding" | "user-agent" | "x-amzn-trace-id"
    )
}

/// A request taken apart for signing.
#[derive(Debug)]
pub(crate) struct SigningRequest {
    pub method: Method,
    pub scheme: Scheme,
    pub authority: Authority,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
}

impl SigningRequest {
    /// Take the uri and headers out of `req`. They are returned by
    /// [`SigningRequest::apply`].
    pub fn build(req: &mut HttpRequest) -> Result<Self> {
        let uri = mem::take(req.uri_mut()).into_parts();
        let paq = uri
            .path_and_query
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        Ok(SigningRequest {
            method: req.method().clone(),
            scheme: uri.scheme.unwrap_or(Scheme::HTTPS),
            authority: uri.authority.ok_or_else(|| {
                Error::request_invalid("request without authority is invalid for signing")
            })?,
            path: paq.path().to_string(),
            query: paq
                .query()
                .map(|v| {
                    form_urlencoded::parse(v.as_bytes())
                        .map(|(k, v)| (k.into_owned(), v.into_owned()))
                        .collect()
                })
                .unwrap_or_default(),
            headers: mem::take(req.headers_mut()),
        })
    }

    /// Put the signed uri and headers back into `req`.
    pub fn apply(mut self, req: &mut HttpRequest) -> Result<()> {
        mem::swap(req.headers_mut(), &mut self.headers);

        let mut paq = self.path;
        for (i, (k, v)) in self.query.iter().enumerate() {
            paq.push(if i == 0 { '?' } else { '&' });
            paq.push_str(k);
            if !v.is_empty() {
                paq.push('=');
                paq.push_str(v);
            }
        }

        let mut parts = http::uri::Parts::default();
        parts.scheme = Some(self.scheme);
        parts.authority = Some(self.authority);
        parts.path_and_query = Some(PathAndQuery::from_str(&paq)?);
        *req.uri_mut() = Uri::from_parts(parts)?;
        Ok(())
    }

    /// Trim leading and trailing spaces and collapse inner runs of spaces.
    pub fn normalize_headers(&mut self) -> Result<()> {
        for value in self.headers.values_mut() {
            let s = value.to_str()?;
            if !s.starts_with(' ') && !s.ends_with(' ') && !s.contains("  ") {
                continue;
            }
            let normalized = s.split(' ').filter(|v| !v.is_empty()).collect::<Vec<_>>();
            let sensitive = value.is_sensitive();
            *value = HeaderValue::from_str(&normalized.join(" "))?;
            value.set_sensitive(sensitive);
        }
        Ok(())
    }

    /// Names of the signed headers, sorted.
    pub fn signed_headers(&self) -> Vec<&str> {
        let mut names = self
            .headers
            .keys()
            .filter(|k| is_signed(k))
            .map(|k| k.as_str())
            .collect::<Vec<_>>();
        names.sort_unstable();
        names
    }

    /// Sort the query and encode every pair with the AWS query encode set.
    pub fn encode_query(&mut self) {
        self.query.sort();
        for (k, v) in self.query.iter_mut() {
            *k = utf8_percent_encode(k, &AWS_QUERY_ENCODE_SET).to_string();
            *v = utf8_percent_encode(v, &AWS_QUERY_ENCODE_SET).to_string();
        }
    }
}

/// Build the canonical request. The query must already be encoded.
pub(crate) fn canonical_request_string(req: &SigningRequest, payload_hash: &str) -> Result<String> {
    // 256 is specially chosen to avoid reallocation for most requests.
    let mut f = String::with_capacity(256);

    writeln!(f, "{}", req.method)?;
    let path = percent_decode_str(&req.path)
        .decode_utf8()
        .map_err(|e| Error::request_invalid("request path is not valid utf-8").with_source(e))?;
    writeln!(f, "{}", utf8_percent_encode(&path, &AWS_URI_ENCODE_SET))?;
    writeln!(
        f,
        "{}",
        req.query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    )?;

    let signed_headers = req.signed_headers();
    for name in signed_headers.iter() {
        let values = req
            .headers
            .get_all(*name)
            .iter()
            .map(|v| v.to_str())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        writeln!(f, "{name}:{}", values.join(","))?;
    }
    writeln!(f)?;
    writeln!(f, "{}", signed_headers.join(";"))?;
    write!(f, "{payload_hash}")?;

    Ok(f)
}

/// Credential scope: `20220313/<region>/<service>/aws4_request`.
pub(crate) fn scope(time: DateTime, region: &str, service: &str) -> String {
    format!("{}/{region}/{service}/aws4_request", format_date(time))
}

pub(crate) fn generate_signing_key(
    secret: &str,
    time: DateTime,
    region: &str,
    service: &str,
) -> Vec<u8> {
    let secret = format!("AWS4{secret}");
    let sign_date = hmac_sha256(secret.as_bytes(), format_date(time).as_bytes());
    let sign_region = hmac_sha256(sign_date.as_slice(), region.as_bytes());
    let sign_service = hmac_sha256(sign_region.as_slice(), service.as_bytes());
    hmac_sha256(sign_service.as_slice(), "aws4_request".as_bytes())
}
