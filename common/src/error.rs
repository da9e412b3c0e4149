use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::io;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("bucket {0} is busy")]
    BucketIsBusy(String),
    #[error("bucket {0} does not exist")]
    BucketDoesNotExist(String),
    #[error("bucket {0} already exists")]
    BucketAlreadyExists(String),
    #[error("out of space: {0}")]
    OutOfSpace(String),
    #[error("xaction {kind} already running on {scope} (uuid {uuid})")]
    XactionAlreadyRunning {
        kind: String,
        scope: String,
        uuid: String,
    },
    #[error("xaction {0} not found")]
    XactionNotFound(String),
    #[error("aborted: {0}")]
    Aborted(String),
    #[error("transaction {0} already exists")]
    TxnAlreadyExists(String),
    #[error("transaction {0} not found")]
    TxnNotFound(String),
    #[error("transaction {0}: timed out waiting for new bucket metadata version")]
    TxnTimeout(String),
    #[error("cluster map mismatch: have v{have}, caller v{caller}")]
    SmapMismatch { have: u64, caller: u64 },
    #[error("bucket metadata mismatch: have v{have}, caller v{caller}")]
    BmdMismatch { have: u64, caller: u64 },
    #[error("{0}: not an IC member")]
    NotIcMember(String),
    #[error("{msg}")]
    Remote { status: u16, msg: String },
    #[error("upstream request failed: {0}")]
    UpstreamReq(#[source] reqwest::Error),
    #[error("upstream replied {0}")]
    UpstreamStatus(reqwest::StatusCode),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Any(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = match &self {
            ApiError::BucketIsBusy(_) => StatusCode::CONFLICT,
            ApiError::BucketDoesNotExist(_) => StatusCode::NOT_FOUND,
            ApiError::BucketAlreadyExists(_) => StatusCode::CONFLICT,
            ApiError::OutOfSpace(_) => StatusCode::INSUFFICIENT_STORAGE,
            ApiError::XactionAlreadyRunning { .. } => StatusCode::CONFLICT,
            ApiError::XactionNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Aborted(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::TxnAlreadyExists(_) => StatusCode::CONFLICT,
            ApiError::TxnNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::TxnTimeout(_) => StatusCode::REQUEST_TIMEOUT,
            ApiError::SmapMismatch { .. } => StatusCode::CONFLICT,
            ApiError::BmdMismatch { .. } => StatusCode::CONFLICT,
            ApiError::NotIcMember(_) => StatusCode::MISDIRECTED_REQUEST,
            ApiError::Remote { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ApiError::UpstreamReq(_) => StatusCode::BAD_GATEWAY,
            ApiError::UpstreamStatus(_) => StatusCode::BAD_GATEWAY,
            ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Any(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status_code, self.to_string()).into_response()
    }
}
