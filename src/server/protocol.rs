use crate::replicate::{InferenceRequest, ModelId};
use crate::resolver::ResolvedImage;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A request body for one of the model routes
pub trait ModelRequest {
    const MODEL: ModelId;

    /// The image URL or local path carried by the request
    fn image_reference(&self) -> &str;

    /// Assemble the model's input parameters around the resolved image
    fn build_payload(&self, image: ResolvedImage) -> InferenceRequest;
}

fn inference_request<const N: usize>(
    model: ModelId,
    fields: [(&str, Value); N],
) -> InferenceRequest {
    let input: Map<String, Value> = fields
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();
    InferenceRequest { model, input }
}

/// Input for FLUX 1.1 [pro] ultra
#[derive(Debug, Deserialize)]
pub struct FluxUltraInput {
    pub prompt: String,
    /// URL or local path of the image prompt
    pub image_prompt: String,
    pub image_prompt_strength: f64,
    pub aspect_ratio: String,
    pub safety_tolerance: i64,
    pub seed: i64,
    pub raw: bool,
}

impl ModelRequest for FluxUltraInput {
    const MODEL: ModelId = ModelId::FluxUltra;

    fn image_reference(&self) -> &str {
        &self.image_prompt
    }

    fn build_payload(&self, image: ResolvedImage) -> InferenceRequest {
        inference_request(
            Self::MODEL,
            [
                ("prompt", json!(self.prompt)),
                ("image_prompt", image.into()),
                ("image_prompt_strength", json!(self.image_prompt_strength)),
                ("aspect_ratio", json!(self.aspect_ratio)),
                ("safety_tolerance", json!(self.safety_tolerance)),
                ("seed", json!(self.seed)),
                ("raw", json!(self.raw)),
            ],
        )
    }
}

/// Input for FLUX.1 Depth [pro]
#[derive(Debug, Deserialize)]
pub struct FluxDepthProInput {
    pub prompt: String,
    /// URL or local path of the depth control image
    pub control_image: String,
    pub steps: i64,
    pub prompt_upsampling: bool,
    pub guidance: f64,
    pub safety_tolerance: i64,
}

impl ModelRequest for FluxDepthProInput {
    const MODEL: ModelId = ModelId::FluxDepthPro;

    fn image_reference(&self) -> &str {
        &self.control_image
    }

    fn build_payload(&self, image: ResolvedImage) -> InferenceRequest {
        inference_request(
            Self::MODEL,
            [
                ("prompt", json!(self.prompt)),
                ("control_image", image.into()),
                ("steps", json!(self.steps)),
                ("prompt_upsampling", json!(self.prompt_upsampling)),
                ("guidance", json!(self.guidance)),
                ("safety_tolerance", json!(self.safety_tolerance)),
            ],
        )
    }
}

/// Input for FLUX.1 Redux [dev]
#[derive(Debug, Deserialize)]
pub struct FluxReduxInput {
    /// URL or local path of the image to vary
    pub redux_image: String,
    pub aspect_ratio: String,
    pub num_inference_steps: i64,
    pub guidance: f64,
    pub seed: i64,
}

impl ModelRequest for FluxReduxInput {
    const MODEL: ModelId = ModelId::FluxReduxDev;

    fn image_reference(&self) -> &str {
        &self.redux_image
    }

    fn build_payload(&self, image: ResolvedImage) -> InferenceRequest {
        inference_request(
            Self::MODEL,
            [
                ("redux_image", image.into()),
                ("aspect_ratio", json!(self.aspect_ratio)),
                ("num_inference_steps", json!(self.num_inference_steps)),
                ("guidance", json!(self.guidance)),
                ("seed", json!(self.seed)),
            ],
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OutputUrlResponse {
    pub output_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeneratedImageResponse {
    pub generated_image_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub base64_image: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelInfo {
    pub endpoint: String,
    pub model: String,
}

impl From<ModelId> for ModelInfo {
    fn from(model: ModelId) -> Self {
        let endpoint = match model {
            ModelId::FluxUltra => "/flux-ultra",
            ModelId::FluxDepthPro => "/flux-depth-pro",
            ModelId::FluxReduxDev => "/flux-redux-dev",
        };
        ModelInfo {
            endpoint: endpoint.to_string(),
            model: model.as_str().to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
}
