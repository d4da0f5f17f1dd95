use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use url::Url;

use crate::core::config::Config;
use crate::core::error::{GenerationError, GenerationResult};
use crate::services::llm::{post_json, ApiKey};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ImageConfig {
    #[serde(default = "default_image_model")]
    pub model: String,
    #[serde(default = "default_image_size")]
    pub size: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            model: default_image_model(),
            size: default_image_size(),
        }
    }
}

fn default_image_model() -> String {
    "dall-e-2".to_string()
}
fn default_image_size() -> String {
    "512x512".to_string()
}

/// One illustration per summary; the service is never asked for more.
const IMAGE_COUNT: u8 = 1;

/// A service that turns a prompt into a reference to a generated image.
#[async_trait]
pub trait ImageGenerator: Send + Sync + Debug {
    fn model(&self) -> &str;

    async fn generate_image(&self, prompt: &str) -> GenerationResult<Url>;
}

pub fn create_image_generator(config: &Config, api_key: ApiKey) -> Box<dyn ImageGenerator> {
    Box::new(OpenAIImageClient::new(
        api_key,
        &config.image,
        &config.llm.base_url,
    ))
}

pub struct OpenAIImageClient {
    api_key: ApiKey,
    config: ImageConfig,
    base_url: String,
    client: reqwest::Client,
}

impl Debug for OpenAIImageClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAIImageClient")
            .field("config", &self.config)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAIImageClient {
    pub fn new(api_key: ApiKey, config: &ImageConfig, base_url: &str) -> Self {
        Self {
            api_key,
            config: config.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
}

#[derive(Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    url: Option<String>,
}

#[async_trait]
impl ImageGenerator for OpenAIImageClient {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn generate_image(&self, prompt: &str) -> GenerationResult<Url> {
        let url = format!("{}/images/generations", self.base_url);
        debug!("POST {} (model {}, size {})", url, self.config.model, self.config.size);

        let request_body = ImageRequest {
            model: &self.config.model,
            prompt,
            n: IMAGE_COUNT,
            size: &self.config.size,
        };

        let body = post_json(&self.client, &url, &self.api_key, &request_body).await?;

        let result: ImageResponse = serde_json::from_str(&body).map_err(|e| {
            GenerationError::Service(format!(
                "Failed to parse image response: {}. Body: {}",
                e, body
            ))
        })?;

        let image_url = result
            .data
            .into_iter()
            .next()
            .and_then(|image| image.url)
            .ok_or_else(|| {
                GenerationError::Service("Image response contained no URL".to_string())
            })?;

        Url::parse(&image_url).map_err(|e| {
            GenerationError::Service(format!("Invalid image URL `{}`: {}", image_url, e))
        })
    }
}
