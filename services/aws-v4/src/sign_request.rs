use crate::canonical::{canonical_request_string, generate_signing_key, scope, SigningRequest};
use crate::chunk_signer::AwsChunkSigner;
use crate::constants::*;
use crate::Credential;
use async_trait::async_trait;
use http::{header, HeaderValue};
use log::debug;
use reqflow_core::attribute::{
    ExecutionAttributes, CHECKSUM_TRAILER, CHUNKED_ENCODING_CONFIG, ENABLE_CHUNKED_ENCODING,
    PRESIGN_EXPIRATION, SIGNING_TIME, UNSIGNED_PAYLOAD,
};
use reqflow_core::body::{Body, StreamBody};
use reqflow_core::chunked::{
    calculate_encoded_length, ChecksumAlgorithm, ChunkedEncodingConfig, ChunkedEncodingStream,
};
use reqflow_core::hash::{hex_hmac_sha256, hex_sha256, EMPTY_STRING_SHA256};
use reqflow_core::http::HttpRequest;
use reqflow_core::time::{format_iso8601, now, DateTime};
use reqflow_core::{Context, Error, Result, SignRequest, SigningCredential};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

/// RequestSigner that implement AWS SigV4.
///
/// - [Signature Version 4 signing process](https://docs.aws.amazon.com/general/latest/gr/signature-version-4.html)
///
/// The signer reads these execution attributes:
///
/// - [`PRESIGN_EXPIRATION`]: sign in the query instead of the headers.
/// - [`SIGNING_TIME`]: sign as of this time instead of now.
/// - [`UNSIGNED_PAYLOAD`]: leave the payload out of the signature.
/// - [`ENABLE_CHUNKED_ENCODING`] with [`CHUNKED_ENCODING_CONFIG`] and
///   [`CHECKSUM_TRAILER`]: send the body `aws-chunked`, signing every chunk.
#[derive(Debug)]
pub struct RequestSigner {
    service: String,
    region: String,

    time: Option<DateTime>,
}

impl RequestSigner {
    /// Create a new builder for AWS V4 signer.
    pub fn new(service: &str, region: &str) -> Self {
        Self {
            service: service.into(),
            region: region.into(),

            time: None,
        }
    }

    /// Specify the signing time.
    ///
    /// # Note
    ///
    /// We should always take current time to sign requests.
    /// Only use this function for testing.
    pub fn with_time(mut self, time: DateTime) -> Self {
        self.time = Some(time);
        self
    }
}

/// How the body goes out when it is sent `aws-chunked`.
struct ChunkedUpload {
    source: StreamBody,
    config: ChunkedEncodingConfig,
    checksum: Option<ChecksumAlgorithm>,
    signed: bool,
    encoded_length: u64,
}

impl ChunkedUpload {
    /// Decide whether the body of `req` is sent chunked, and how.
    fn plan(req: &HttpRequest, attrs: &ExecutionAttributes) -> Result<Option<Self>> {
        if !attrs.is_enabled(ENABLE_CHUNKED_ENCODING) {
            return Ok(None);
        }
        let checksum = attrs.get(CHECKSUM_TRAILER).copied();
        let signed = !attrs.is_enabled(UNSIGNED_PAYLOAD);
        // Unsigned chunks are only worth it for the checksum trailer.
        if !signed && checksum.is_none() {
            return Ok(None);
        }

        let source = match req.body() {
            Body::Empty => return Ok(None),
            Body::Bytes(bs) => {
                let len = bs.len() as u64;
                StreamBody::seekable(Cursor::new(bs.clone()), Some(len))
            }
            Body::Stream(s) => s.clone(),
        };
        let decoded_length = source.content_length().ok_or_else(|| {
            Error::request_invalid("chunked encoding requires a known content length")
        })?;

        let config = attrs
            .get(CHUNKED_ENCODING_CONFIG)
            .copied()
            .unwrap_or_default();
        let encoded_length = calculate_encoded_length(
            decoded_length,
            config.chunk_size,
            signed.then_some(64),
            checksum,
        )?;

        Ok(Some(Self {
            source,
            config,
            checksum,
            signed,
            encoded_length,
        }))
    }

    fn payload_hash(&self) -> &'static str {
        match (self.signed, self.checksum.is_some()) {
            (true, false) => STREAMING_SIGNED_PAYLOAD,
            (true, true) => STREAMING_SIGNED_PAYLOAD_TRAILER,
            (false, _) => STREAMING_UNSIGNED_PAYLOAD_TRAILER,
        }
    }

    /// Set the headers describing the encoded body. They are signed.
    fn apply_headers(&self, req: &mut SigningRequest) -> Result<()> {
        let decoded_length = self.source.content_length().unwrap_or_default();
        let encoding = match req.headers.get(header::CONTENT_ENCODING) {
            Some(v) => HeaderValue::from_str(&format!("{AWS_CHUNKED},{}", v.to_str()?))?,
            None => HeaderValue::from_static(AWS_CHUNKED),
        };
        req.headers.insert(header::CONTENT_ENCODING, encoding);
        req.headers
            .insert(header::CONTENT_LENGTH, self.encoded_length.into());
        req.headers
            .insert(X_AMZ_DECODED_CONTENT_LENGTH, decoded_length.into());
        if let Some(alg) = self.checksum {
            req.headers
                .insert(X_AMZ_TRAILER, HeaderValue::from_static(alg.header_name()));
        }
        Ok(())
    }

    /// Replace the body with its chunk-encoded form.
    fn wrap(self, req: &mut HttpRequest, signer: Option<AwsChunkSigner>, seed: String) -> Result<()> {
        let mut stream = ChunkedEncodingStream::new(self.source, self.config)?;
        if let Some(signer) = signer {
            stream = stream.with_signer(Arc::new(signer), seed);
        }
        if let Some(alg) = self.checksum {
            stream = stream.with_checksum(alg);
        }
        *req.body_mut() = StreamBody::rewindable(stream, Some(self.encoded_length)).into();
        Ok(())
    }
}

fn body_hash(req: &HttpRequest, attrs: &ExecutionAttributes) -> String {
    if attrs.is_enabled(UNSIGNED_PAYLOAD) {
        return UNSIGNED_PAYLOAD_HASH.to_string();
    }
    match req.body() {
        Body::Empty => EMPTY_STRING_SHA256.to_string(),
        Body::Bytes(bs) => hex_sha256(bs),
        Body::Stream(_) => UNSIGNED_PAYLOAD_HASH.to_string(),
    }
}

#[async_trait]
impl SignRequest for RequestSigner {
    type Credential = Credential;

    async fn sign_request(
        &self,
        _: &Context,
        req: &mut HttpRequest,
        credential: Option<&Self::Credential>,
        attrs: &ExecutionAttributes,
    ) -> Result<()> {
        let Some(cred) = credential.filter(|c| c.is_valid()) else {
            return Err(Error::credential_invalid(
                "no valid credential found to sign the request",
            ));
        };

        let now = attrs
            .get(SIGNING_TIME)
            .copied()
            .or(self.time)
            .unwrap_or_else(now);
        let expires_in = attrs.get(PRESIGN_EXPIRATION).copied();

        let chunked = match expires_in {
            Some(_) => None,
            None => ChunkedUpload::plan(req, attrs)?,
        };
        let payload_hash = match (&chunked, expires_in) {
            (Some(upload), _) => upload.payload_hash().to_string(),
            // Presigned urls are used by other clients with their own body.
            (None, Some(_)) => UNSIGNED_PAYLOAD_HASH.to_string(),
            (None, None) => req
                .headers()
                .get(X_AMZ_CONTENT_SHA_256)
                .map(|v| v.to_str().map(str::to_string))
                .transpose()?
                .unwrap_or_else(|| body_hash(req, attrs)),
        };

        let mut signed_req = SigningRequest::build(req)?;
        signed_req.normalize_headers()?;
        if let Some(upload) = &chunked {
            upload.apply_headers(&mut signed_req)?;
        }

        canonicalize_header(&mut signed_req, cred, expires_in, now, &payload_hash)?;
        canonicalize_query(
            &mut signed_req,
            cred,
            expires_in,
            now,
            &self.service,
            &self.region,
        );

        // build canonical request and string to sign.
        let creq = canonical_request_string(&signed_req, &payload_hash)?;
        let encoded_req = hex_sha256(creq.as_bytes());

        let scope = scope(now, &self.region, &self.service);
        debug!("calculated scope: {scope}");

        // StringToSign:
        //
        // AWS4-HMAC-SHA256
        // 20220313T072004Z
        // 20220313/<region>/<service>/aws4_request
        // <hashed_canonical_request>
        let string_to_sign = format!(
            "{AWS4_HMAC_SHA256}\n{}\n{scope}\n{encoded_req}",
            format_iso8601(now)
        );
        debug!("calculated string to sign: {string_to_sign}");

        let signing_key =
            generate_signing_key(&cred.secret_access_key, now, &self.region, &self.service);
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        if expires_in.is_some() {
            signed_req.query.push(("X-Amz-Signature".into(), signature.clone()));
        } else {
            let mut authorization = HeaderValue::from_str(&format!(
                "{AWS4_HMAC_SHA256} Credential={}/{}, SignedHeaders={}, Signature={}",
                cred.access_key_id,
                scope,
                signed_req.signed_headers().join(";"),
                signature
            ))?;
            authorization.set_sensitive(true);

            signed_req
                .headers
                .insert(header::AUTHORIZATION, authorization);
        }

        // Apply to the request.
        signed_req.apply(req)?;

        if let Some(upload) = chunked {
            let chunk_signer = if upload.signed {
                Some(AwsChunkSigner::new(
                    &signing_key,
                    format_iso8601(now),
                    scope,
                )?)
            } else {
                None
            };
            upload.wrap(req, chunk_signer, signature)?;
        }
        Ok(())
    }
}

fn canonicalize_header(
    req: &mut SigningRequest,
    cred: &Credential,
    expires_in: Option<Duration>,
    now: DateTime,
    payload_hash: &str,
) -> Result<()> {
    // Insert HOST header if not present.
    if req.headers.get(header::HOST).is_none() {
        req.headers
            .insert(header::HOST, req.authority.as_str().parse()?);
    }

    if expires_in.is_none() {
        // Insert DATE header if not present.
        if req.headers.get(X_AMZ_DATE).is_none() {
            req.headers
                .insert(X_AMZ_DATE, HeaderValue::try_from(format_iso8601(now))?);
        }

        req.headers
            .insert(X_AMZ_CONTENT_SHA_256, HeaderValue::from_str(payload_hash)?);

        // Insert X_AMZ_SECURITY_TOKEN header if security token exists.
        if let Some(token) = &cred.session_token {
            let mut value = HeaderValue::from_str(token)?;
            // Set token value sensitive to valid leaking.
            value.set_sensitive(true);

            req.headers.insert(X_AMZ_SECURITY_TOKEN, value);
        }
    }

    Ok(())
}

fn canonicalize_query(
    req: &mut SigningRequest,
    cred: &Credential,
    expires_in: Option<Duration>,
    now: DateTime,
    service: &str,
    region: &str,
) {
    if let Some(expire) = expires_in {
        let signed_headers = req.signed_headers().join(";");
        req.query
            .push(("X-Amz-Algorithm".into(), AWS4_HMAC_SHA256.into()));
        req.query.push((
            "X-Amz-Credential".into(),
            format!("{}/{}", cred.access_key_id, scope(now, region, service)),
        ));
        req.query.push(("X-Amz-Date".into(), format_iso8601(now)));
        req.query
            .push(("X-Amz-Expires".into(), expire.as_secs().to_string()));
        req.query
            .push(("X-Amz-SignedHeaders".into(), signed_headers));

        if let Some(token) = &cred.session_token {
            req.query
                .push(("X-Amz-Security-Token".into(), token.into()));
        }
    }

    req.encode_query();
}
