use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use salesdesk_import::{import::ImportError, MergeError, WorkbookError};
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Bad request: {}", msg);
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Not found: {}", msg);
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", msg)
    }

    /// The file was read but no table could be located in it.
    pub fn unparseable(detail: impl std::fmt::Display) -> Self {
        tracing::warn!("Layout not found: {}", detail);
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "LAYOUT_NOT_FOUND",
            format!("Could not parse this file: {detail}"),
        )
    }

    /// Details are logged, never returned.
    pub fn internal(msg: impl Into<String>) -> Self {
        tracing::error!("Internal error: {}", msg.into());
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "Internal server error",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorBody<'a> {
            code: &'a str,
            message: &'a str,
        }

        let body = ErrorBody {
            code: self.code,
            message: &self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        Self::internal(format!("database: {err}"))
    }
}

impl From<WorkbookError> for ApiError {
    fn from(err: WorkbookError) -> Self {
        match err {
            WorkbookError::Xlsx(e) => Self::internal(format!("workbook write: {e}")),
            other => Self::bad_request(other.to_string()),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Workbook(e) => e.into(),
            ImportError::Layout(e) => Self::unparseable(e),
        }
    }
}

impl From<MergeError> for ApiError {
    fn from(err: MergeError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::bad_request(format!("Malformed upload: {}", err.body_text()))
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::internal(format!("worker task: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use salesdesk_core::LayoutNotFound;

    #[test]
    fn layout_errors_are_unprocessable() {
        let err: ApiError = ImportError::Layout(LayoutNotFound {
            candidates: vec!["Actual".to_string()],
        })
        .into();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.message.starts_with("Could not parse this file"));
    }

    #[test]
    fn missing_sheet_is_bad_request() {
        let err: ApiError = WorkbookError::SheetNotFound {
            sheet: "Sales".to_string(),
            available: vec![],
        }
        .into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn internal_errors_hide_details() {
        let err: ApiError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Internal server error");
    }
}
