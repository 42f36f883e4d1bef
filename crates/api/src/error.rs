use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tracing::warn;

use common::Error;

pub type ApiResult = Result<Json<Value>, ApiError>;

/// Domain error rendered as `{"status": "error", "message": ...}` with a
/// matching status code.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::ConfigInvalid(_) => StatusCode::BAD_REQUEST,
            Error::PairNotFound(_) => StatusCode::NOT_FOUND,
            Error::AlreadyRunning => StatusCode::CONFLICT,
            Error::DeliveryFailed(_) | Error::Unavailable(_) => StatusCode::BAD_GATEWAY,
            Error::LoopFault(_)
            | Error::Json(_)
            | Error::TomlDe(_)
            | Error::TomlSer(_)
            | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(%status, error = %self.0, "Request failed");
        }

        let mut body = json!({
            "status": "error",
            "message": self.0.to_string(),
        });
        if let Error::ConfigInvalid(issues) = &self.0 {
            body["issues"] = json!(issues);
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ConfigSection;

    #[test]
    fn transport_failures_map_to_bad_gateway() {
        let status = |e: Error| ApiError(e).status();
        assert_eq!(status(Error::Unavailable("timeout".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(status(Error::DeliveryFailed("503".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status(Error::invalid(ConfigSection::Ntfy, "topic is empty")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status(Error::AlreadyRunning), StatusCode::CONFLICT);
        assert_eq!(status(Error::LoopFault("panic".into())), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status(Error::PairNotFound("BTC/USDT".into())), StatusCode::NOT_FOUND);
    }
}
