pub mod gemini;
pub mod media;

use async_trait::async_trait;

use crate::billing::Tier;
use crate::imaging::EncodedImage;

pub use gemini::{GeminiClient, GeminiSettings, GeneratedImage, ImageGenerationError};

/// The hosted model behind analysis and enhancement.
#[async_trait]
pub trait BeautyModel: Send + Sync {
    /// Returns the model's raw report text for the photo.
    async fn analyze_image(&self, image: &EncodedImage, tier: Tier) -> anyhow::Result<String>;

    /// Returns an enhanced rendition of the photo steered by `goal`.
    async fn generate_enhanced_image(
        &self,
        image: &EncodedImage,
        goal: &str,
    ) -> Result<GeneratedImage, ImageGenerationError>;
}
