use super::protocol::{self, ModelRequest};
use super::WebError;
use crate::prediction;
use crate::replicate::{ModelId, Predictor};
use crate::resolver;
use actix_multipart::Multipart;
use actix_web::{get, post, web, Responder};
use futures_util::TryStreamExt;
use tracing::{debug, info};

type Result<T> = std::result::Result<T, WebError>;

/// Form field the upload route reads the file from
const UPLOAD_FIELD: &str = "file";

/// Resolve the request's image, run its model and reduce the output to a URL
async fn generate<R: ModelRequest>(request: &R, predictor: &dyn Predictor) -> Result<String> {
    let image = resolver::resolve(request.image_reference()).await?;
    debug!("resolved image for {}: {image:?}", R::MODEL);

    let payload = request.build_payload(image);
    let output = predictor.run(payload).await?;
    let url = prediction::extract_result_url(&output);

    info!("finished serving inference request for {}", R::MODEL);
    Ok(url)
}

#[post("/flux-ultra")]
pub async fn flux_ultra(
    req: web::Json<protocol::FluxUltraInput>,
    predictor: web::Data<dyn Predictor>,
) -> Result<impl Responder> {
    let output_url = generate(&req.into_inner(), predictor.get_ref()).await?;
    Ok(web::Json(protocol::OutputUrlResponse { output_url }))
}

#[post("/flux-depth-pro")]
pub async fn flux_depth_pro(
    req: web::Json<protocol::FluxDepthProInput>,
    predictor: web::Data<dyn Predictor>,
) -> Result<impl Responder> {
    let output_url = generate(&req.into_inner(), predictor.get_ref()).await?;
    Ok(web::Json(protocol::OutputUrlResponse { output_url }))
}

#[post("/flux-redux-dev")]
pub async fn flux_redux_dev(
    req: web::Json<protocol::FluxReduxInput>,
    predictor: web::Data<dyn Predictor>,
) -> Result<impl Responder> {
    let generated_image_url = generate(&req.into_inner(), predictor.get_ref()).await?;
    Ok(web::Json(protocol::GeneratedImageResponse {
        generated_image_url,
    }))
}

/// Encode an uploaded image as a `data:` URI, typed by its file extension
#[post("/upload-image")]
pub async fn upload_image(mut payload: Multipart) -> Result<impl Responder> {
    while let Some(mut field) = payload.try_next().await? {
        let is_upload = field.name() == Some(UPLOAD_FIELD);
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);

        let mut contents = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            contents.extend_from_slice(&chunk);
        }
        if !is_upload {
            continue;
        }

        let filename =
            filename.ok_or_else(|| WebError::Upload("uploaded file has no filename".into()))?;
        info!("encoding upload {filename} ({} bytes)", contents.len());

        let subtype = resolver::subtype_from_filename(&filename);
        return Ok(web::Json(protocol::UploadResponse {
            base64_image: resolver::encode_data_uri(subtype, &contents),
        }));
    }

    Err(WebError::InvalidRequest(format!(
        "missing multipart field `{UPLOAD_FIELD}`"
    )))
}

/// The routes this gateway serves and the model behind each
#[get("/models")]
pub async fn models() -> impl Responder {
    let models = ModelId::ALL.into_iter().map(protocol::ModelInfo::from).collect();
    web::Json(protocol::ModelsResponse { models })
}
