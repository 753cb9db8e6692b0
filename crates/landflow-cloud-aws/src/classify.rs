//! AWS error classification
//!
//! Every SDK error is mapped to a [`Fault`] at the gateway boundary, from the
//! structured error code and the [`SdkError`] variant. Message text is never
//! inspected.

use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use landflow_cloud::GatewayError;
use std::fmt::Debug;

/// What an AWS error means to a gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The resource is already there
    AlreadyExists,
    /// The resource is not there
    NotFound,
    /// Worth retrying
    Transient,
    /// Anything else
    Permanent,
}

const ALREADY_EXISTS: &[&str] = &[
    "BucketAlreadyOwnedByYou",
    "EntityAlreadyExists",
    "ResourceExistsException",
    "InvalidGroup.Duplicate",
    "ClusterAlreadyExists",
    "InvalidPermission.Duplicate",
];

const NOT_FOUND: &[&str] = &[
    "NoSuchBucket",
    "NotFound",
    "NoSuchEntity",
    "ResourceNotFoundException",
    "InvalidGroup.NotFound",
    "InvalidGroupId.NotFound",
    "ClusterNotFound",
];

const TRANSIENT: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "RequestLimitExceeded",
    "TooManyRequestsException",
    "SlowDown",
    "ServiceUnavailable",
    "ServiceUnavailableException",
    "InternalError",
    "InternalFailure",
    "InternalServiceError",
    "RequestTimeout",
    "RequestTimeoutException",
    "ConcurrentModification",
    "DependencyViolation",
];

/// Classify a bare error code
///
/// `BucketAlreadyExists` means another account owns the name, so it stays
/// permanent.
pub fn classify_code(code: Option<&str>) -> Fault {
    match code {
        Some(code) if ALREADY_EXISTS.contains(&code) => Fault::AlreadyExists,
        Some(code) if NOT_FOUND.contains(&code) => Fault::NotFound,
        Some(code) if TRANSIENT.contains(&code) => Fault::Transient,
        _ => Fault::Permanent,
    }
}

/// Classify an SDK error
pub fn classify<E, R>(err: &SdkError<E, R>) -> Fault
where
    E: ProvideErrorMetadata,
{
    match err {
        SdkError::ServiceError(service) => classify_code(service.err().code()),
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            Fault::Transient
        }
        SdkError::ConstructionFailure(_) => Fault::Permanent,
        _ => Fault::Permanent,
    }
}

impl Fault {
    /// Convert to the orchestrator's taxonomy
    ///
    /// `NotFound` only means something to lookups and deletes; anywhere else
    /// it is a permanent failure.
    pub fn into_gateway_error(self, detail: String) -> GatewayError {
        match self {
            Fault::AlreadyExists => GatewayError::AlreadyExists(detail),
            Fault::Transient => GatewayError::Transient(detail),
            Fault::NotFound | Fault::Permanent => GatewayError::Permanent(detail),
        }
    }
}

/// Result helpers for SDK calls
pub(crate) trait SdkResultExt<T> {
    /// Classify any error
    fn gateway(self, what: &str) -> Result<T, GatewayError>;

    /// Like [`gateway`](Self::gateway), but `NotFound` becomes `Ok(None)`
    fn or_not_found(self, what: &str) -> Result<Option<T>, GatewayError>;

    /// Returns the classified fault instead of failing, for callers that
    /// tolerate a specific one
    fn fault(self, what: &str) -> Result<Result<T, Fault>, GatewayError>;
}

impl<T, E, R> SdkResultExt<T> for Result<T, SdkError<E, R>>
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: Debug + Send + Sync + 'static,
{
    fn gateway(self, what: &str) -> Result<T, GatewayError> {
        self.map_err(|err| {
            let fault = classify(&err);
            fault.into_gateway_error(describe(what, &err))
        })
    }

    fn or_not_found(self, what: &str) -> Result<Option<T>, GatewayError> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(err) => match classify(&err) {
                Fault::NotFound => Ok(None),
                fault => Err(fault.into_gateway_error(describe(what, &err))),
            },
        }
    }

    fn fault(self, what: &str) -> Result<Result<T, Fault>, GatewayError> {
        match self {
            Ok(value) => Ok(Ok(value)),
            Err(err) => match classify(&err) {
                fault @ (Fault::AlreadyExists | Fault::NotFound) => Ok(Err(fault)),
                fault => Err(fault.into_gateway_error(describe(what, &err))),
            },
        }
    }
}

fn describe<E, R>(what: &str, err: &SdkError<E, R>) -> String
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: Debug + Send + Sync + 'static,
{
    match err.code() {
        Some(code) => format!("{}: {} ({})", what, DisplayErrorContext(err), code),
        None => format!("{}: {}", what, DisplayErrorContext(err)),
    }
}
