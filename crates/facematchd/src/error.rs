use std::time::Instant;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::pipeline::PipelineError;
use crate::response::{round_secs, ErrorBody};

pub const MISSING_IMAGES: &str = "Both img1 and img2 are required";
pub const MISSING_FILES: &str = "Both img1 and img2 files are required";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    MissingField(&'static str),

    #[error("{source}")]
    Failed { source: PipelineError, time: f64 },

    #[error("request body too large")]
    PayloadTooLarge { time: f64 },
}

impl ApiError {
    /// Wrap a pipeline failure, stamping the seconds elapsed since `started`.
    pub fn failed(source: impl Into<PipelineError>, started: Instant) -> Self {
        ApiError::Failed {
            source: source.into(),
            time: round_secs(started.elapsed().as_secs_f64()),
        }
    }

    pub fn payload_too_large(started: Instant) -> Self {
        ApiError::PayloadTooLarge {
            time: round_secs(started.elapsed().as_secs_f64()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::MissingField(message) => {
                tracing::warn!(error = message, "rejected request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorBody {
                        error: message.to_string(),
                        time: None,
                    },
                )
            }
            ApiError::Failed { source, time } => {
                tracing::error!(error = %source, detail = ?source, time, "verification failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        error: source.to_string(),
                        time: Some(*time),
                    },
                )
            }
            ApiError::PayloadTooLarge { time } => {
                tracing::warn!(time, "rejected oversized request body");
                (
                    StatusCode::PAYLOAD_TOO_LARGE,
                    ErrorBody {
                        error: self.to_string(),
                        time: Some(*time),
                    },
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
