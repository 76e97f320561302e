use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use axum::{Json, http::HeaderValue};

use loyalty_hub_ledger::{ErrorKind, LedgerError, UnavailableReason};
use loyalty_hub_types::{Value, json::json};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReportPolicy {
    Ignore,
    Report,
}

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub id: String,
    pub status_code: u16,
    pub public_code: String,
    pub summary: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    public_code: String,
    public_message: Option<String>,
    details: Option<Value>,
    report_policy: ReportPolicy,
    report_summary: Option<String>,
    report_details: Option<String>,
}

// Associated constants for enum-like usage without parentheses
impl ApiError {
    pub const FORBIDDEN: ApiError = ApiError {
        status: StatusCode::FORBIDDEN,
        public_code: String::new(),
        public_message: None,
        details: None,
        report_policy: ReportPolicy::Ignore,
        report_summary: None,
        report_details: None,
    };

    pub const UNAUTHORIZED: ApiError = ApiError {
        status: StatusCode::UNAUTHORIZED,
        public_code: String::new(),
        public_message: None,
        details: None,
        report_policy: ReportPolicy::Ignore,
        report_summary: None,
        report_details: None,
    };
}

impl ApiError {
    fn new(
        status: StatusCode,
        public_code: impl Into<String>,
        public_message: Option<String>,
        report_policy: ReportPolicy,
    ) -> Self {
        Self {
            status,
            public_code: public_code.into(),
            public_message,
            details: None,
            report_policy,
            report_summary: None,
            report_details: None,
        }
    }

    fn with_report(mut self, summary: impl Into<String>, details: Option<String>) -> Self {
        self.report_summary = Some(summary.into());
        self.report_details = details;
        self
    }

    /// Structured payload clients can act on, e.g. the missing points.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn public_code(&self) -> &str {
        &self.public_code
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Not found: {}", msg);
        Self::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            Some(msg),
            ReportPolicy::Ignore,
        )
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Bad request: {}", msg);
        Self::new(
            StatusCode::BAD_REQUEST,
            "BAD_REQUEST",
            Some(msg),
            ReportPolicy::Ignore,
        )
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Unauthorized: {}", msg);
        Self::new(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            Some(msg),
            ReportPolicy::Ignore,
        )
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Forbidden: {}", msg);
        Self::new(
            StatusCode::FORBIDDEN,
            "FORBIDDEN",
            Some(msg),
            ReportPolicy::Ignore,
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorEnvelope<'a> {
            error: ErrorBody<'a>,
        }

        #[derive(Serialize)]
        struct ErrorBody<'a> {
            code: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            id: Option<&'a str>,
            message: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<&'a Value>,
        }

        let code = if self.public_code.is_empty() {
            match self.status {
                StatusCode::NOT_FOUND => "NOT_FOUND",
                StatusCode::FORBIDDEN => "FORBIDDEN",
                StatusCode::UNAUTHORIZED => "UNAUTHORIZED",
                StatusCode::BAD_REQUEST => "BAD_REQUEST",
                _ => "ERROR",
            }
        } else {
            self.public_code.as_str()
        };

        let public_message = self
            .public_message
            .as_deref()
            .unwrap_or_else(|| self.status.canonical_reason().unwrap_or("Error"));

        let mut error_id: Option<String> = None;
        if self.report_policy == ReportPolicy::Report {
            error_id = Some(loyalty_hub_types::create_id());
        }

        let mut response = (
            self.status,
            Json(ErrorEnvelope {
                error: ErrorBody {
                    code,
                    id: error_id.as_deref(),
                    message: public_message,
                    details: self.details.as_ref(),
                },
            }),
        )
            .into_response();

        if let Some(id) = error_id.as_deref() {
            if let Ok(v) = HeaderValue::from_str(id) {
                response.headers_mut().insert("x-error-id", v);
            }

            let report = ErrorReport {
                id: id.to_string(),
                status_code: self.status.as_u16(),
                public_code: code.to_string(),
                summary: self
                    .report_summary
                    .clone()
                    .unwrap_or_else(|| public_message.to_string()),
                details: self.report_details.clone(),
            };
            response.extensions_mut().insert(report);
        }

        response
    }
}

fn unavailable_details(reason: UnavailableReason) -> Value {
    json!({ "reason": reason })
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let code = err.reason().as_str().to_uppercase();
        let message = err.to_string();

        let api_error = match err.kind() {
            ErrorKind::Validation => {
                tracing::warn!("Bad request: {}", message);
                Self::new(
                    StatusCode::BAD_REQUEST,
                    code,
                    Some(message),
                    ReportPolicy::Ignore,
                )
            }
            ErrorKind::NotFound => {
                tracing::warn!("Not found: {}", message);
                Self::new(
                    StatusCode::NOT_FOUND,
                    code,
                    Some(message),
                    ReportPolicy::Ignore,
                )
            }
            ErrorKind::Conflict => {
                tracing::warn!("Conflict: {}", message);
                Self::new(
                    StatusCode::CONFLICT,
                    code,
                    Some(message),
                    ReportPolicy::Ignore,
                )
            }
            ErrorKind::Expired => {
                tracing::warn!("Gone: {}", message);
                Self::new(StatusCode::GONE, code, Some(message), ReportPolicy::Ignore)
            }
            ErrorKind::CollisionExhausted | ErrorKind::Storage => {
                tracing::error!("Ledger unavailable: {:?}", err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    code,
                    Some("Service unavailable, please retry".to_string()),
                    ReportPolicy::Report,
                )
                .with_report(message, Some(format!("{:?}", err)))
            }
            ErrorKind::InvariantViolation => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                code,
                None,
                ReportPolicy::Report,
            )
            .with_report(message, Some(format!("{:?}", err))),
        };

        match &err {
            LedgerError::InsufficientPoints { required, current } => {
                api_error.with_details(json!({
                    "required": required,
                    "current": current,
                    "deficit": required - current,
                }))
            }
            LedgerError::CouponUnavailable(reason) => {
                api_error.with_details(unavailable_details(*reason))
            }
            _ => api_error,
        }
    }
}

impl From<loyalty_hub_types::Error> for ApiError {
    fn from(err: loyalty_hub_types::Error) -> Self {
        tracing::error!("Internal error: {:?}", err);
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            None,
            ReportPolicy::Report,
        )
        .with_report(format!("{:?}", err), Some(err.to_string()))
    }
}

// Implement From for sea_orm::DbErr
impl From<sea_orm::DbErr> for ApiError {
    fn from(err: sea_orm::DbErr) -> Self {
        tracing::error!("Database error: {:?}", err);
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "DATABASE_ERROR",
            None,
            ReportPolicy::Report,
        )
        .with_report(format!("{:?}", err), Some(err.to_string()))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON error: {:?}", err);
        // Parsing errors are typically user-caused. Keep message, do not persist.
        Self::bad_request(format!("JSON error: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for ApiError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        tracing::warn!("JWT error: {:?}", err);
        Self::unauthorized(format!("JWT error: {}", err))
    }
}

impl std::error::Error for ApiError {}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.public_code.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loyalty_hub_ledger::StoreError;
    use std::time::Duration;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_ledger_kinds_map_to_statuses() {
        let cases = [
            (
                LedgerError::InvalidFormat("12ab".into()),
                StatusCode::BAD_REQUEST,
            ),
            (LedgerError::RedemptionNotFound, StatusCode::NOT_FOUND),
            (LedgerError::AlreadyUsed, StatusCode::CONFLICT),
            (LedgerError::ShopMismatch, StatusCode::CONFLICT),
            (LedgerError::Expired, StatusCode::GONE),
            (LedgerError::CouponExpired, StatusCode::GONE),
            (
                LedgerError::CollisionExhausted { attempts: 10 },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                LedgerError::Storage(StoreError::Timeout(Duration::from_secs(5))),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                LedgerError::InvariantViolation("balance drift".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            let api: ApiError = err.into();
            assert_eq!(api.status(), status);
        }
    }

    #[test]
    fn test_public_code_is_the_failure_reason() {
        let api: ApiError = LedgerError::AlreadyUsed.into();
        assert_eq!(api.public_code(), "ALREADY_USED");

        let api: ApiError = LedgerError::InvalidFormat("x".into()).into();
        assert_eq!(api.public_code(), "INVALID_FORMAT");
    }

    #[tokio::test]
    async fn test_insufficient_points_carries_deficit() {
        let api: ApiError = LedgerError::InsufficientPoints {
            required: 600,
            current: 100,
        }
        .into();
        let response = api.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(response.headers().get("x-error-id").is_none());

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "INSUFFICIENT_POINTS");
        assert_eq!(body["error"]["details"]["deficit"], 500);
        assert!(body["error"].get("id").is_none());
    }

    #[tokio::test]
    async fn test_reported_errors_get_an_id() {
        let api: ApiError = LedgerError::InvariantViolation("drift".into()).into();
        let response = api.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let header = response
            .headers()
            .get("x-error-id")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let report = response.extensions().get::<ErrorReport>().unwrap().clone();
        assert_eq!(report.id, header);
        assert_eq!(report.status_code, 500);

        let body = body_json(response).await;
        assert_eq!(body["error"]["id"], header.as_str());
        // Internal details never reach the client.
        assert_eq!(body["error"]["message"], "Internal Server Error");
    }
}
