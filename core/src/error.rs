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

use http::StatusCode;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Error codes that services use to signal throttling.
const THROTTLING_ERROR_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "RequestThrottledException",
    "TooManyRequestsException",
    "ProvisionedThroughputExceededException",
    "TransactionInProgressException",
    "RequestLimitExceeded",
    "BandwidthLimitExceeded",
    "LimitExceededException",
    "RequestThrottled",
    "SlowDown",
    "PriorRequestNotComplete",
    "EC2ThrottledException",
];

/// Error codes that describe a transient failure on the service side.
const TRANSIENT_ERROR_CODES: &[&str] = &[
    "RequestTimeout",
    "RequestTimeoutException",
    "InternalError",
    "ServiceUnavailable",
];

const TRANSIENT_STATUS_CODES: &[u16] = &[500, 502, 503, 504];

/// The error type for reqflow operations
#[derive(Error, Debug)]
#[error("{message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    status: Option<StatusCode>,
    code: Option<String>,
    request_id: Option<String>,
    retry_after: Option<Duration>,
    retryable: Option<bool>,
    context: Vec<String>,
    #[source]
    source: Option<anyhow::Error>,
}

/// The kind of error that occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Credentials exist but are invalid/malformed
    CredentialInvalid,

    /// Request cannot be built or signed (marshalling failures, missing fields, etc.)
    RequestInvalid,

    /// Configuration error (bad builder combinations, missing fields, invalid values)
    ConfigInvalid,

    /// Connection or I/O failure while preparing or transmitting a request.
    Transport,

    /// The whole call, including every retry, took longer than the api call timeout.
    ApiCallTimeout,

    /// A single attempt took longer than the attempt timeout.
    ApiCallAttemptTimeout,

    /// The service answered with a modeled error response.
    Service,

    /// Checksum or signature mismatch.
    Integrity,

    /// A stream was used in a way it does not support.
    StreamContract,

    /// The call was cancelled before it reached a terminal state.
    Cancelled,

    /// Unexpected errors
    Unexpected,
}

impl Error {
    /// Create a new error with the given kind and message
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            code: None,
            request_id: None,
            retry_after: None,
            retryable: None,
            context: Vec::new(),
            source: None,
        }
    }

    /// Add a source error
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attach a note about something that failed while handling this error.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Notes attached with [`Error::with_context`].
    pub fn context(&self) -> &[String] {
        &self.context
    }

    /// Attach the request id returned by the service.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Attach the delay suggested by the service before retrying.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Mark this error as retryable (or not), overriding the default classification.
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the error message without the source chain.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status of the response that produced this error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Service error code, if any.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Request id reported by the service, if any.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Delay suggested by the service (`Retry-After`), if any.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// Check if this is a credential error
    pub fn is_credential_error(&self) -> bool {
        self.kind == ErrorKind::CredentialInvalid
    }

    /// Check if this error reports throttling by the service.
    pub fn is_throttling(&self) -> bool {
        if self.kind != ErrorKind::Service {
            return false;
        }
        if self.status == Some(StatusCode::TOO_MANY_REQUESTS) {
            return true;
        }
        self.code
            .as_deref()
            .is_some_and(|code| THROTTLING_ERROR_CODES.contains(&code))
    }

    /// Check if retrying the request that produced this error could succeed.
    ///
    /// Transport failures and attempt timeouts are always retryable. Service
    /// errors are retryable when throttled, transient, or explicitly marked so.
    /// Everything else is fatal.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            ErrorKind::Transport | ErrorKind::ApiCallAttemptTimeout => {
                self.retryable.unwrap_or(true)
            }
            ErrorKind::Service => {
                if let Some(retryable) = self.retryable {
                    return retryable;
                }
                if self.is_throttling() {
                    return true;
                }
                if self
                    .status
                    .is_some_and(|s| TRANSIENT_STATUS_CODES.contains(&s.as_u16()))
                {
                    return true;
                }
                self.code
                    .as_deref()
                    .is_some_and(|code| TRANSIENT_ERROR_CODES.contains(&code))
            }
            _ => false,
        }
    }
}

// Convenience constructors
impl Error {
    /// Create a credential invalid error
    pub fn credential_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CredentialInvalid, message)
    }

    /// Create a request invalid error
    pub fn request_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RequestInvalid, message)
    }

    /// Create a config invalid error
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    /// Create an api call timeout error
    pub fn api_call_timeout(timeout: Duration) -> Self {
        Self::new(
            ErrorKind::ApiCallTimeout,
            format!("api call did not complete within {timeout:?}"),
        )
    }

    /// Create an api call attempt timeout error
    pub fn api_call_attempt_timeout(timeout: Duration) -> Self {
        Self::new(
            ErrorKind::ApiCallAttemptTimeout,
            format!("api call attempt did not complete within {timeout:?}"),
        )
    }

    /// Create a service error from a parsed error response.
    pub fn service(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        let mut err = Self::new(ErrorKind::Service, message);
        err.status = Some(status);
        err.code = Some(code.into());
        err
    }

    /// Create an integrity error
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Integrity, message)
    }

    /// Create a stream contract error
    pub fn stream_contract(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StreamContract, message)
    }

    /// Create a cancelled error
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    /// Create an unexpected error
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::CredentialInvalid => write!(f, "invalid credentials"),
            ErrorKind::RequestInvalid => write!(f, "invalid request"),
            ErrorKind::ConfigInvalid => write!(f, "invalid configuration"),
            ErrorKind::Transport => write!(f, "transport error"),
            ErrorKind::ApiCallTimeout => write!(f, "api call timeout"),
            ErrorKind::ApiCallAttemptTimeout => write!(f, "api call attempt timeout"),
            ErrorKind::Service => write!(f, "service error"),
            ErrorKind::Integrity => write!(f, "integrity check failed"),
            ErrorKind::StreamContract => write!(f, "stream contract violated"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
            ErrorKind::Unexpected => write!(f, "unexpected error"),
        }
    }
}

/// Convenience type alias for Results
pub type Result<T> = std::result::Result<T, Error>;

// Common From implementations
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::unexpected(err.to_string()).with_source(err)
    }
}

impl From<std::fmt::Error> for Error {
    fn from(err: std::fmt::Error) -> Self {
        Self::unexpected(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::Error> for Error {
    fn from(err: http::Error) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::header::InvalidHeaderName> for Error {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::header::ToStrError> for Error {
    fn from(err: http::header::ToStrError) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::uri::InvalidUri> for Error {
    fn from(err: http::uri::InvalidUri) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::uri::InvalidUriParts> for Error {
    fn from(err: http::uri::InvalidUriParts) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

/// I/O failures surface while a body is read for transmission, so they are
/// transport errors. An [`Error`] smuggled through `io::Error` keeps its kind.
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        if err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            if let Some(inner) = err.into_inner() {
                if let Ok(inner) = inner.downcast::<Error>() {
                    return *inner;
                }
            }
            return Self::unexpected("failed to recover error from io::Error");
        }
        Self::transport(err.to_string()).with_source(anyhow::Error::from(err))
    }
}
