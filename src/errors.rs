//! Error types for dynamap.
//!
//! Mapping and batch-limit failures are raised before any store call.
//! Store failures are classified once, by [`map_sdk_error`], and otherwise
//! passed through untouched.

use aws_sdk_dynamodb::error::SdkError;
use thiserror::Error;

/// Top-level error type for all dynamap operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A required mapped field is missing or blank.
    #[error("the attribute '{field}' is required, '{received}' received")]
    Validation { field: String, received: String },

    /// A declared scalar coercion (or accessor conversion) failed.
    #[error("the type info at property '{field}' is invalid, '{expected}' expected")]
    Type { field: String, expected: String },

    /// Invalid metadata or an invalid request shape.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A transaction batch holds more operations than the store accepts.
    #[error("limit of {max} operations per transaction exceeded ({count} staged)")]
    CapacityExceeded { count: usize, max: usize },

    /// A document could not be decoded or encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures reported by the underlying store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("table '{0}' not found")]
    TableNotFound(String),

    #[error("table '{0}' already exists")]
    TableAlreadyExists(String),

    #[error("{0}")]
    Validation(String),

    #[error("the condition expression evaluated to false")]
    ConditionCheckFailed,

    #[error("transaction was canceled{}", format_reasons(reasons))]
    TransactionCanceled { reasons: Vec<String> },

    #[error("{0}")]
    Throttling(String),

    #[error("{0}")]
    AccessDenied(String),

    #[error("{0}")]
    Credentials(String),

    /// The client could not drive the request (runtime or builder failure).
    #[error("{0}")]
    Runtime(String),

    /// Any other service failure, with as much detail as could be extracted.
    #[error("{0}")]
    Service(String),
}

fn format_reasons(reasons: &[String]) -> String {
    if reasons.is_empty() {
        String::new()
    } else {
        format!(": {}", reasons.join("; "))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Map any AWS SDK error to the matching [`StoreError`].
///
/// This is the single entry point for store error handling. Every operation
/// in the client goes through it so callers can branch on one enum.
pub fn map_sdk_error<E, R>(err: SdkError<E, R>, table: Option<&str>) -> StoreError
where
    E: std::fmt::Debug + std::fmt::Display,
    R: std::fmt::Debug,
{
    let err_display = err.to_string();
    let err_debug = format!("{:?}", err);
    classify(&err_display, &err_debug, table)
}

/// Classify an error from its display and debug renderings.
fn classify(err_display: &str, err_debug: &str, table: Option<&str>) -> StoreError {
    // Credential errors are dispatch failures, not service errors, so check them first.
    if err_debug.contains("NoCredentialsError")
        || err_debug.contains("no credentials")
        || err_debug.contains("No credentials")
        || err_debug.contains("CredentialsError")
        || err_debug.contains("failed to load credentials")
    {
        return StoreError::Credentials(
            "No AWS credentials found. Configure credentials via environment variables \
            (AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY), AWS profile, or IAM role."
                .to_string(),
        );
    }

    if err_debug.contains("InvalidAccessKeyId") || err_debug.contains("invalid access key") {
        return StoreError::Credentials("Invalid AWS access key ID. Check your credentials.".into());
    }

    if err_debug.contains("SignatureDoesNotMatch") {
        return StoreError::Credentials(
            "AWS signature mismatch. Check your secret access key.".into(),
        );
    }

    if err_debug.contains("ExpiredToken") {
        return StoreError::Credentials(
            "AWS credentials have expired. Refresh your session token.".into(),
        );
    }

    match extract_error_code(err_debug).as_deref() {
        Some("ResourceNotFoundException") => {
            StoreError::TableNotFound(table.unwrap_or("<unknown>").to_string())
        }
        Some("ResourceInUseException") => {
            StoreError::TableAlreadyExists(table.unwrap_or("<unknown>").to_string())
        }
        Some("ValidationException") => StoreError::Validation(
            extract_message(err_debug).unwrap_or_else(|| err_display.to_string()),
        ),
        Some("ConditionalCheckFailedException") => StoreError::ConditionCheckFailed,
        Some("TransactionCanceledException") => StoreError::TransactionCanceled {
            reasons: extract_cancellation_reasons(err_debug),
        },
        Some("ProvisionedThroughputExceededException") | Some("ThrottlingException") => {
            StoreError::Throttling("Request rate too high. Try again with exponential backoff.".into())
        }
        Some("AccessDeniedException") => StoreError::AccessDenied(
            extract_message(err_debug)
                .unwrap_or_else(|| "Access denied. Check your IAM permissions.".to_string()),
        ),
        Some("UnrecognizedClientException") => StoreError::Credentials(
            "Invalid AWS credentials. Check your access key and secret.".into(),
        ),
        Some("ItemCollectionSizeLimitExceededException") => {
            StoreError::Validation("Item collection size limit exceeded".into())
        }
        Some("RequestLimitExceeded") => {
            StoreError::Throttling("Request limit exceeded. Try again later.".into())
        }
        _ => {
            let msg = extract_message(err_debug).unwrap_or_else(|| {
                if err_display == "service error" {
                    // The display is useless here, fall back to a trimmed debug string.
                    let clean = err_debug.replace('\n', " ").replace("  ", " ");
                    if clean.len() > 500 {
                        let cut = (0..=500).rev().find(|i| clean.is_char_boundary(*i)).unwrap_or(0);
                        format!("{}...", &clean[..cut])
                    } else {
                        clean
                    }
                } else {
                    err_display.to_string()
                }
            });
            StoreError::Service(msg)
        }
    }
}

/// Extract error code from AWS SDK error debug string.
fn extract_error_code(err_str: &str) -> Option<String> {
    // Look for patterns like: code: Some("ResourceNotFoundException")
    if let Some(start) = err_str.find("code: Some(\"") {
        let rest = &err_str[start + 12..];
        if let Some(end) = rest.find('"') {
            return Some(rest[..end].to_string());
        }
    }

    let known_errors = [
        "ResourceNotFoundException",
        "ResourceInUseException",
        "ValidationException",
        "ConditionalCheckFailedException",
        "TransactionCanceledException",
        "ProvisionedThroughputExceededException",
        "ThrottlingException",
        "AccessDeniedException",
        "UnrecognizedClientException",
        "ItemCollectionSizeLimitExceededException",
        "RequestLimitExceeded",
    ];

    known_errors
        .iter()
        .find(|error| err_str.contains(*error))
        .map(|error| error.to_string())
}

/// Extract the error message from AWS SDK error debug string.
fn extract_message(err_str: &str) -> Option<String> {
    // Look for patterns like: message: Some("The actual error message")
    let start = err_str.find("message: Some(\"")?;
    let rest = &err_str[start + 15..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

/// Extract cancellation reasons from transaction error.
fn extract_cancellation_reasons(err_str: &str) -> Vec<String> {
    let mut reasons = Vec::new();

    if err_str.contains("ConditionalCheckFailed") {
        reasons.push("Condition check failed".to_string());
    }
    if err_str.contains("ItemCollectionSizeLimitExceeded") {
        reasons.push("Item collection size limit exceeded".to_string());
    }
    if err_str.contains("TransactionConflict") {
        reasons.push("Transaction conflict".to_string());
    }
    if err_str.contains("ProvisionedThroughputExceeded") {
        reasons.push("Throughput exceeded".to_string());
    }

    reasons
}
