//! Render errors returned by request handlers into JSON responses.
use actix_web::http::header::RETRY_AFTER;
use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use actix_web::ResponseError;
use serde_json::json;

use portal_errors::ErrorKind;
use portal_errors::UpgradeInProgress;

/// Message returned to clients for errors with no known classification.
const GENERIC_ERROR_MESSAGE: &str = "internal server error";

/// Error returned by API handlers and middlewares.
///
/// The HTTP status is selected by looking for known errors in the [`anyhow::Error`] chain.
/// Unknown errors are reported as `500 Internal Server Error` with a generic message so
/// details such as connection strings never reach clients.
#[derive(Debug)]
pub struct Error {
    source: anyhow::Error,
}

impl Error {
    /// Access the underlying error.
    pub fn source(&self) -> &anyhow::Error {
        &self.source
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.source, f)
    }
}

impl<E> From<E> for Error
where
    E: Into<anyhow::Error>,
{
    fn from(source: E) -> Self {
        Error {
            source: source.into(),
        }
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        ErrorKind::of(&self.source)
            .map(status_for)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        let (status, message) = match ErrorKind::classify(&self.source) {
            Some((kind, message)) => (status_for(kind), message),
            None => (
                StatusCode::INTERNAL_SERVER_ERROR,
                GENERIC_ERROR_MESSAGE.to_string(),
            ),
        };
        let mut response = HttpResponse::build(status);
        if let Some(upgrade) = self.source.downcast_ref::<UpgradeInProgress>() {
            response.insert_header((RETRY_AFTER, upgrade.retry_after.to_string()));
        }
        response.json(json!({
            "error": true,
            "error_msg": message,
        }))
    }
}

/// Map error classifications onto HTTP status codes.
fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
    }
}

#[cfg(test)]
mod tests {
    use actix_web::body::MessageBody;
    use actix_web::http::StatusCode;
    use actix_web::ResponseError;

    use portal_errors::ClusterNotFound;
    use portal_errors::UpgradeInProgress;

    use super::Error;

    fn body(error: &Error) -> serde_json::Value {
        let body = error.error_response().into_body().try_into_bytes().unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn known_error_status() {
        let error = Error::from(anyhow::anyhow!(ClusterNotFound::new("abc")));
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
        let body = body(&error);
        assert_eq!(body["error"], true);
        assert_eq!(body["error_msg"], "cluster 'abc' is not registered");
    }

    #[test]
    fn unknown_error_is_generic() {
        let error = Error::from(anyhow::anyhow!("postgres://user:pass@db failed"));
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body(&error);
        assert_eq!(body["error_msg"], "internal server error");
    }

    #[test]
    fn upgrade_sets_retry_after() {
        let error = Error::from(anyhow::anyhow!(UpgradeInProgress { retry_after: 42 }));
        let response = error.error_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let retry = response.headers().get("retry-after").unwrap();
        assert_eq!(retry, "42");
    }
}
