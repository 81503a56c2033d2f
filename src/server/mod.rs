//! The user-facing JSON web server. Each model route resolves the request's
//! image reference, forwards the payload to the `Predictor` held in app data
//! and answers with the URL of the generated image.

use crate::replicate::InvocationError;
use crate::resolver::ResolveError;
use actix_multipart::MultipartError;
use actix_web::error::JsonPayloadError;
use actix_web::http::header::ContentType;
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use tracing::warn;

pub mod protocol;
pub mod routes;

#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Invocation(#[from] InvocationError),

    /// The uploaded file could not be read
    #[error("{0}")]
    Upload(String),

    #[error("{0}")]
    InvalidRequest(String),
}

impl actix_web::error::ResponseError for WebError {
    fn error_response(&self) -> HttpResponse {
        let err = protocol::ErrorResponse {
            detail: format!("Error: {self}"),
        };

        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(err)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            WebError::Upload(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl From<MultipartError> for WebError {
    fn from(err: MultipartError) -> Self {
        WebError::Upload(err.to_string())
    }
}

fn json_error(err: JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    warn!("rejected body for {}: {err}", req.path());
    WebError::InvalidRequest(err.to_string()).into()
}

/// Register every route, and reject malformed JSON bodies with a 422. The
/// app must also carry a `web::Data<dyn Predictor>`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .service(routes::flux_ultra)
        .service(routes::flux_depth_pro)
        .service(routes::flux_redux_dev)
        .service(routes::upload_image)
        .service(routes::models);
}
