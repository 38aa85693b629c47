use super::*;
use pretty_assertions::assert_eq;
use reqflow_aws_v4::{AwsChunkSigner, STREAMING_SIGNED_PAYLOAD, STREAMING_SIGNED_PAYLOAD_TRAILER};
use reqflow_core::attribute::{CHECKSUM_TRAILER, ENABLE_CHUNKED_ENCODING, SIGNING_TIME};
use reqflow_core::body::StreamBody;
use reqflow_core::chunked::{ChecksumAlgorithm, ChunkedEncodingConfig};
use reqflow_core::config::RequestOverrideConfiguration;
use reqflow_core::time::parse_rfc3339;
use reqflow_core::{RequestPipeline, SignChunk};
use std::io::Cursor;

const CHUNK_SIZE: usize = 64 * 1024;
const PAYLOAD_SIZE: usize = 66560;

fn chunked_pipeline(transport: Arc<MockTransport>, checksum: bool) -> Result<RequestPipeline> {
    let cred = Credential::new(ACCESS_KEY, SECRET_KEY);
    let cfg = s3_config_with(
        transport,
        &cred,
        ClientConfigurationBuilder::new()
            .with_chunked_encoding(ChunkedEncodingConfig::new(CHUNK_SIZE, 4 * CHUNK_SIZE)?),
    );

    let mut o = RequestOverrideConfiguration::new()
        .with_attribute(ENABLE_CHUNKED_ENCODING, true)
        .with_attribute(SIGNING_TIME, parse_rfc3339("2013-05-24T00:00:00Z")?);
    if checksum {
        o = o.with_attribute(CHECKSUM_TRAILER, ChecksumAlgorithm::Sha256);
    }
    Ok(RequestPipeline::new(cfg).with_request_override(o))
}

fn payload() -> StreamBody {
    StreamBody::new(Cursor::new(vec![b'a'; PAYLOAD_SIZE]), Some(PAYLOAD_SIZE as u64))
}

/// Split an `aws-chunked` body into `(size, signature, data)` frames.
fn frames(body: &[u8]) -> Vec<(usize, String, Vec<u8>)> {
    let mut out = Vec::new();
    let mut rest = body;
    loop {
        let line_end = rest.windows(2).position(|w| w == b"\r\n").unwrap();
        let line = std::str::from_utf8(&rest[..line_end]).unwrap();
        let (size, signature) = line.split_once(";chunk-signature=").unwrap();
        let size = usize::from_str_radix(size, 16).unwrap();
        let data = rest[line_end + 2..line_end + 2 + size].to_vec();
        out.push((size, signature.to_string(), data));
        rest = &rest[line_end + 2 + size..];
        if size == 0 {
            return out;
        }
        assert!(rest.starts_with(b"\r\n"));
        rest = &rest[2..];
    }
}

#[tokio::test(start_paused = true)]
async fn test_chunked_upload_signs_every_chunk() -> Result<()> {
    init_logger();
    let transport = MockTransport::new(&[StatusCode::INTERNAL_SERVER_ERROR]);

    chunked_pipeline(transport.clone(), false)?
        .execute(&PutObjectOperation, PutObject::new("chunkObject.txt", payload()))
        .await?;

    let sent = transport.sent();
    assert_eq!(sent.len(), 2);

    let signer = AwsChunkSigner::from_secret(
        SECRET_KEY,
        parse_rfc3339("2013-05-24T00:00:00Z")?,
        "us-east-1",
        "s3",
    )?;
    for s in &sent {
        assert_eq!(s.header("content-encoding"), "aws-chunked");
        assert_eq!(s.header("x-amz-content-sha256"), STREAMING_SIGNED_PAYLOAD);
        assert_eq!(s.header("x-amz-decoded-content-length"), "66560");
        assert_eq!(s.header("content-length"), "66824");
        assert_eq!(s.body.len(), 66824);

        // The chain starts at the signature of the headers.
        let mut previous = authorization_parts(s.header("authorization"))["Signature"].clone();
        let frames = frames(&s.body);
        assert_eq!(
            frames.iter().map(|f| f.0).collect::<Vec<_>>(),
            vec![CHUNK_SIZE, 1024, 0]
        );
        for (_, signature, data) in frames {
            previous = signer.sign_chunk(&data, &previous)?;
            assert_eq!(signature, previous);
        }
    }
    // The retry carries a new header signature, so the whole chain changes.
    assert_ne!(sent[0].body, sent[1].body);
    Ok(())
}

#[tokio::test]
async fn test_chunked_upload_with_checksum_trailer() -> Result<()> {
    let transport = MockTransport::new(&[]);

    chunked_pipeline(transport.clone(), true)?
        .execute(&PutObjectOperation, PutObject::new("chunkObject.txt", payload()))
        .await?;

    let s = &transport.sent()[0];
    assert_eq!(s.header("x-amz-content-sha256"), STREAMING_SIGNED_PAYLOAD_TRAILER);
    assert_eq!(s.header("x-amz-trailer"), "x-amz-checksum-sha256");
    assert_eq!(s.header("content-length").parse::<usize>().unwrap(), s.body.len());

    let body = std::str::from_utf8(&s.body).unwrap();
    assert!(body.contains("\r\nx-amz-checksum-sha256:"));
    assert!(body.ends_with("\r\n\r\n"));
    assert!(body.contains("x-amz-trailer-signature:"));
    Ok(())
}

#[tokio::test]
async fn test_small_bytes_body_is_sent_in_one_chunk() -> Result<()> {
    let transport = MockTransport::new(&[]);

    chunked_pipeline(transport.clone(), false)?
        .execute(&PutObjectOperation, PutObject::new("small.txt", "hello"))
        .await?;

    let s = &transport.sent()[0];
    assert_eq!(s.header("x-amz-decoded-content-length"), "5");
    let frames = frames(&s.body);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].2, b"hello");
    Ok(())
}
