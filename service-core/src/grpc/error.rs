//! Mapping of upstream `tonic::Status` values onto HTTP errors.
//!
//! | gRPC code | HTTP status |
//! |-----------|-------------|
//! | `INVALID_ARGUMENT`, `FAILED_PRECONDITION`, `OUT_OF_RANGE` | 400 |
//! | `UNAUTHENTICATED` | 401 |
//! | `PERMISSION_DENIED` | 403 |
//! | `NOT_FOUND` | 404 |
//! | `ALREADY_EXISTS`, `ABORTED` | 409 |
//! | `RESOURCE_EXHAUSTED` | 429 |
//! | `UNIMPLEMENTED` | 501 |
//! | `UNAVAILABLE` | 503 |
//! | `DEADLINE_EXCEEDED` | 504 |
//! | everything else | 500 |

use tonic::{Code, Status};

use crate::error::AppError;

impl From<Status> for AppError {
    fn from(status: Status) -> Self {
        let message = status.message().to_string();
        match status.code() {
            Code::InvalidArgument | Code::FailedPrecondition | Code::OutOfRange => {
                AppError::BadRequest(anyhow::anyhow!(message))
            }
            Code::Unauthenticated => AppError::Unauthorized(message),
            Code::PermissionDenied => AppError::Forbidden(message),
            Code::NotFound => AppError::NotFound(anyhow::anyhow!(message)),
            Code::AlreadyExists | Code::Aborted => AppError::Conflict(message),
            Code::ResourceExhausted => AppError::TooManyRequests(message),
            Code::Unimplemented => AppError::NotImplemented(message),
            Code::Unavailable => AppError::ServiceUnavailable(message),
            Code::DeadlineExceeded => AppError::GatewayTimeout(message),
            Code::Ok => AppError::InternalError(anyhow::anyhow!("unexpected OK status as error")),
            code => AppError::InternalError(anyhow::anyhow!("upstream {:?}: {}", code, message)),
        }
    }
}
