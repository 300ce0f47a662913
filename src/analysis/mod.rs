//! Image analysis pipeline
//!
//! For one image:
//! 1. load the bytes (`ImageFetcher`)
//! 2. classify into an `ImageCategory`
//! 3. ask for a structured description with a category-specific prompt
//! 4. embed it: small images (base64 payload under the inline limit) get a
//!    multimodal image embedding, falling back to a text embedding of the
//!    visual detail when that fails; larger images go straight to text.

pub mod category;
pub mod client;
pub mod fetch;

use data_encoding::BASE64;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub use category::ImageCategory;
pub use client::{GeminiClient, GenerativeModel, InlineImage};
pub use fetch::{detect_mime, FetchedImage, HttpImageFetcher, ImageFetcher};

use crate::config::{AiConfig, StorageConfig};

/// Most tags an analysis may return
pub const MAX_TAGS: usize = 15;

/// Analysis errors
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Image analysis is not configured")]
    Disabled,

    #[error("Failed to fetch image: {0}")]
    Fetch(String),

    #[error("Not a supported image: {0}")]
    UnsupportedImage(String),

    #[error("Model service error: {0}")]
    Service(String),

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Which embedding produced the stored vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingSource {
    /// Image embedded directly
    Multimodal,
    /// Visual description embedded as text
    Text,
}

impl EmbeddingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingSource::Multimodal => "multimodal",
            EmbeddingSource::Text => "text",
        }
    }
}

impl fmt::Display for EmbeddingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmbeddingSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "multimodal" => Ok(EmbeddingSource::Multimodal),
            "text" => Ok(EmbeddingSource::Text),
            _ => Err(anyhow::anyhow!("Invalid embedding source: {}", s)),
        }
    }
}

/// Everything the pipeline derives from an image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub category: ImageCategory,
    pub summary: String,
    pub visual_detail: String,
    pub tags: Vec<String>,
    pub embedding: Vec<f32>,
    pub embedding_source: EmbeddingSource,
}

/// Parsed description answer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Description {
    pub summary: String,
    pub visual_detail: String,
    pub tags: Vec<String>,
}

/// Runs the pipeline against a model and an image source
pub struct ImageAnalyzer {
    model: Arc<dyn GenerativeModel>,
    fetcher: Arc<dyn ImageFetcher>,
    inline_embedding_limit: usize,
    max_tags: usize,
}

impl ImageAnalyzer {
    pub fn new(
        model: Arc<dyn GenerativeModel>,
        fetcher: Arc<dyn ImageFetcher>,
        config: &AiConfig,
    ) -> Self {
        Self {
            model,
            fetcher,
            inline_embedding_limit: config.inline_embedding_limit,
            max_tags: config.max_tags.clamp(1, MAX_TAGS),
        }
    }

    /// Fetch and analyze the image at `url`
    pub async fn analyze_url(&self, url: &str) -> Result<AnalysisResult, AnalysisError> {
        let image = self.fetcher.fetch(url).await?;
        tracing::debug!(
            url,
            mime = %image.mime_type,
            bytes = image.bytes.len(),
            "Fetched image for analysis"
        );
        self.analyze_bytes(&image.bytes, &image.mime_type).await
    }

    /// Analyze image bytes already in memory
    pub async fn analyze_bytes(
        &self,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<AnalysisResult, AnalysisError> {
        if !mime_type.starts_with("image/") {
            return Err(AnalysisError::UnsupportedImage(mime_type.to_string()));
        }

        let image = InlineImage {
            mime_type: mime_type.to_string(),
            data: BASE64.encode(bytes),
        };

        let answer = self
            .model
            .generate(&category::classification_prompt(), &image)
            .await?;
        let category = ImageCategory::from_answer(&answer);

        let answer = self
            .model
            .generate(&category::description_prompt(category, self.max_tags), &image)
            .await?;
        let description = parse_description(&answer, self.max_tags)?;

        let (embedding, embedding_source) = self.embed(&image, &description).await?;

        tracing::info!(
            category = %category,
            tags = description.tags.len(),
            source = %embedding_source,
            dimensions = embedding.len(),
            "Image analyzed"
        );

        Ok(AnalysisResult {
            category,
            summary: description.summary,
            visual_detail: description.visual_detail,
            tags: description.tags,
            embedding,
            embedding_source,
        })
    }

    async fn embed(
        &self,
        image: &InlineImage,
        description: &Description,
    ) -> Result<(Vec<f32>, EmbeddingSource), AnalysisError> {
        if image.data.len() < self.inline_embedding_limit {
            match self.model.embed_image(image).await {
                Ok(embedding) => return Ok((embedding, EmbeddingSource::Multimodal)),
                Err(e) => {
                    tracing::warn!("Multimodal embedding failed, using text embedding: {}", e);
                }
            }
        }

        let embedding = self.model.embed_text(&embedding_text(description)).await?;
        Ok((embedding, EmbeddingSource::Text))
    }
}

/// Text used for the text embedding: the visual detail, or whatever else
/// the description has when that is empty
fn embedding_text(description: &Description) -> String {
    if !description.visual_detail.trim().is_empty() {
        return description.visual_detail.clone();
    }
    if !description.summary.trim().is_empty() {
        return description.summary.clone();
    }
    description.tags.join(", ")
}

/// Parse the model's JSON description.
///
/// Tolerates code fences and prose around the object. `tags` may be an array
/// or a comma-separated string.
pub fn parse_description(answer: &str, max_tags: usize) -> Result<Description, AnalysisError> {
    let json = extract_json_object(answer)
        .ok_or_else(|| AnalysisError::InvalidResponse("No JSON object in answer".into()))?;
    let value: Value = serde_json::from_str(json)
        .map_err(|e| AnalysisError::InvalidResponse(format!("Malformed JSON: {}", e)))?;

    let text = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    };

    let raw_tags: Vec<String> = match value.get("tags") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => s.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };

    let description = Description {
        summary: text("summary"),
        visual_detail: text("visual_detail"),
        tags: normalize_tags(raw_tags, max_tags),
    };

    if description.summary.is_empty() && description.visual_detail.is_empty() {
        return Err(AnalysisError::InvalidResponse(
            "Description has neither summary nor visual_detail".into(),
        ));
    }
    Ok(description)
}

/// Trim, lowercase, drop empties and duplicates (first wins), keep at most `max`
pub fn normalize_tags<I, S>(tags: I, max: usize) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim().trim_start_matches('#').trim().to_lowercase();
        if tag.is_empty() || out.contains(&tag) {
            continue;
        }
        if out.len() >= max {
            break;
        }
        out.push(tag);
    }
    out
}

/// The outermost `{ ... }` span of `text`, ignoring code fences
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Cosine similarity of two vectors; 0.0 for mismatched or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Build the analyzer for the configured AI service.
///
/// Returns `None` when no API key is set, which disables analysis. Images
/// under the storage's public URL are read from disk.
pub fn create_analyzer(
    ai: &AiConfig,
    storage: &StorageConfig,
) -> Result<Option<ImageAnalyzer>, AnalysisError> {
    if !ai.is_enabled() {
        tracing::info!("Image analysis disabled: no AI API key configured");
        return Ok(None);
    }

    let timeout = Duration::from_secs(ai.request_timeout_secs);
    let model = GeminiClient::new(ai.clone())?;
    let fetcher = HttpImageFetcher::new(timeout, storage.max_file_size)?
        .with_local_storage(&storage.public_url, storage.path.clone());

    tracing::info!(model = %ai.generation_model, "Image analysis enabled");
    Ok(Some(ImageAnalyzer::new(
        Arc::new(model),
        Arc::new(fetcher),
        ai,
    )))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fake model and fetcher shared by tests across the crate

    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub struct FakeModel {
        pub category_answer: String,
        pub description_answer: String,
        pub image_embedding_fails: bool,
        pub image_embeds: AtomicUsize,
        pub text_embeds: AtomicUsize,
        pub prompts: Mutex<Vec<String>>,
    }

    impl FakeModel {
        pub fn new(category: &str, description: &str) -> Self {
            Self {
                category_answer: category.to_string(),
                description_answer: description.to_string(),
                image_embedding_fails: false,
                image_embeds: AtomicUsize::new(0),
                text_embeds: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn food() -> Self {
            Self::new(
                "food",
                r#"{"summary":"A bowl of ramen","visual_detail":"Steaming noodles with egg","tags":["Ramen","noodles"]}"#,
            )
        }
    }

    #[async_trait::async_trait]
    impl GenerativeModel for FakeModel {
        async fn generate(&self, prompt: &str, _image: &InlineImage) -> Result<String, AnalysisError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if prompt.starts_with("Classify") {
                Ok(self.category_answer.clone())
            } else {
                Ok(self.description_answer.clone())
            }
        }

        async fn embed_image(&self, _image: &InlineImage) -> Result<Vec<f32>, AnalysisError> {
            self.image_embeds.fetch_add(1, Ordering::SeqCst);
            if self.image_embedding_fails {
                Err(AnalysisError::Service("HTTP 400: unsupported".into()))
            } else {
                Ok(vec![1.0, 0.0, 0.0])
            }
        }

        async fn embed_text(&self, _text: &str) -> Result<Vec<f32>, AnalysisError> {
            self.text_embeds.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0.0, 1.0, 0.0])
        }
    }

    /// Serves fixed bytes per URL
    #[derive(Default)]
    pub struct FakeFetcher {
        pub images: HashMap<String, FetchedImage>,
    }

    impl FakeFetcher {
        pub fn with(mut self, url: &str, bytes: Vec<u8>) -> Self {
            self.images.insert(
                url.to_string(),
                FetchedImage {
                    bytes,
                    mime_type: "image/png".into(),
                },
            );
            self
        }
    }

    #[async_trait::async_trait]
    impl ImageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedImage, AnalysisError> {
            self.images
                .get(url)
                .cloned()
                .ok_or_else(|| AnalysisError::Fetch(format!("{}: HTTP 404", url)))
        }
    }

    pub fn png_bytes(len: usize) -> Vec<u8> {
        let mut bytes = vec![0x89, b'P', b'N', b'G'];
        bytes.resize(len.max(4), 0);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::Ordering;

    fn analyzer(model: Arc<FakeModel>, fetcher: FakeFetcher) -> ImageAnalyzer {
        ImageAnalyzer::new(model, Arc::new(fetcher), &AiConfig::default())
    }

    #[tokio::test]
    async fn test_small_image_uses_multimodal_embedding() {
        let model = Arc::new(FakeModel::food());
        let fetcher = FakeFetcher::default().with("https://img/a.png", png_bytes(1024));
        let result = analyzer(model.clone(), fetcher)
            .analyze_url("https://img/a.png")
            .await
            .unwrap();

        assert_eq!(result.category, ImageCategory::Food);
        assert_eq!(result.summary, "A bowl of ramen");
        assert_eq!(result.tags, vec!["ramen", "noodles"]);
        assert_eq!(result.embedding_source, EmbeddingSource::Multimodal);
        assert_eq!(model.text_embeds.load(Ordering::SeqCst), 0);

        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[1].contains("'food'"));
    }

    #[test]
    fn test_zero_max_keeps_no_tags() {
        assert!(normalize_tags(["a", "b"], 0).is_empty());
        assert_eq!(normalize_tags(["a", "b", "c"], 2), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_configured_tag_limit_is_clamped() {
        let fetcher = FakeFetcher::default().with("u", png_bytes(1024));
        let config = AiConfig {
            max_tags: 0,
            ..AiConfig::default()
        };
        let result = ImageAnalyzer::new(Arc::new(FakeModel::food()), Arc::new(fetcher), &config)
            .analyze_url("u")
            .await
            .unwrap();
        assert_eq!(result.tags, vec!["ramen"]);

        let fetcher = FakeFetcher::default().with("u", png_bytes(1024));
        let config = AiConfig {
            max_tags: 500,
            ..AiConfig::default()
        };
        let analyzer = ImageAnalyzer::new(Arc::new(FakeModel::food()), Arc::new(fetcher), &config);
        assert_eq!(analyzer.max_tags, MAX_TAGS);
    }

    #[tokio::test]
    async fn test_multimodal_failure_falls_back_to_text() {
        let mut model = FakeModel::food();
        model.image_embedding_fails = true;
        let model = Arc::new(model);
        let fetcher = FakeFetcher::default().with("u", png_bytes(1024));

        let result = analyzer(model.clone(), fetcher).analyze_url("u").await.unwrap();
        assert_eq!(result.embedding_source, EmbeddingSource::Text);
        assert_eq!(result.embedding, vec![0.0, 1.0, 0.0]);
        assert_eq!(model.image_embeds.load(Ordering::SeqCst), 1);
        assert_eq!(model.text_embeds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_large_image_goes_straight_to_text() {
        let model = Arc::new(FakeModel::food());
        // 30 KiB of raw bytes is 40 KiB of base64
        let fetcher = FakeFetcher::default().with("u", png_bytes(30 * 1024));

        let result = analyzer(model.clone(), fetcher).analyze_url("u").await.unwrap();
        assert_eq!(result.embedding_source, EmbeddingSource::Text);
        assert_eq!(model.image_embeds.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_limit_applies_to_base64_length() {
        let model = Arc::new(FakeModel::food());
        // 23_000 raw bytes encode to 30_668 base64 chars, just under 30 KiB
        let fetcher = FakeFetcher::default()
            .with("under", png_bytes(23_000))
            .with("over", png_bytes(23_100));
        let analyzer = analyzer(model.clone(), fetcher);

        let under = analyzer.analyze_url("under").await.unwrap();
        assert_eq!(under.embedding_source, EmbeddingSource::Multimodal);
        let over = analyzer.analyze_url("over").await.unwrap();
        assert_eq!(over.embedding_source, EmbeddingSource::Text);
    }

    #[tokio::test]
    async fn test_unrecognised_category_is_other() {
        let model = Arc::new(FakeModel::new(
            "spaceship",
            r#"{"summary":"s","visual_detail":"v","tags":[]}"#,
        ));
        let fetcher = FakeFetcher::default().with("u", png_bytes(10));
        let result = analyzer(model, fetcher).analyze_url("u").await.unwrap();
        assert_eq!(result.category, ImageCategory::Other);
    }

    #[tokio::test]
    async fn test_fetch_failure_propagates() {
        let model = Arc::new(FakeModel::food());
        let err = analyzer(model, FakeFetcher::default())
            .analyze_url("missing")
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_non_image_rejected() {
        let model = Arc::new(FakeModel::food());
        let err = analyzer(model, FakeFetcher::default())
            .analyze_bytes(b"hello", "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::UnsupportedImage(_)));
    }

    #[test]
    fn test_parse_description_with_fences_and_prose() {
        let answer = "Sure! Here it is:\n```json\n{\"summary\": \" A cat \", \"visual_detail\": \"Orange tabby\", \"tags\": [\"Cat\", \"cat\", \" \", \"tabby\"]}\n```";
        let description = parse_description(answer, 15).unwrap();
        assert_eq!(description.summary, "A cat");
        assert_eq!(description.visual_detail, "Orange tabby");
        assert_eq!(description.tags, vec!["cat", "tabby"]);
    }

    #[test]
    fn test_parse_description_tag_string() {
        let description =
            parse_description(r#"{"summary":"x","tags":"Sea, #Sky , sea"}"#, 15).unwrap();
        assert_eq!(description.tags, vec!["sea", "sky"]);
        assert_eq!(description.visual_detail, "");
    }

    #[test]
    fn test_parse_description_rejects_garbage() {
        assert!(parse_description("no json here", 15).is_err());
        assert!(parse_description("{not: valid}", 15).is_err());
        assert!(parse_description(r#"{"tags":["a"]}"#, 15).is_err());
    }

    #[test]
    fn test_embedding_text_fallbacks() {
        let mut description = Description {
            summary: "s".into(),
            visual_detail: "v".into(),
            tags: vec!["a".into(), "b".into()],
        };
        assert_eq!(embedding_text(&description), "v");
        description.visual_detail.clear();
        assert_eq!(embedding_text(&description), "s");
        description.summary.clear();
        assert_eq!(embedding_text(&description), "a, b");
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    proptest! {
        #[test]
        fn normalized_tags_are_bounded_and_clean(
            tags in proptest::collection::vec("[ #]{0,2}[A-Za-z]{0,6}[ ]{0,2}", 0..40),
            max in 0usize..20,
        ) {
            let normalized = normalize_tags(&tags, max);
            prop_assert!(normalized.len() <= max);
            for (i, tag) in normalized.iter().enumerate() {
                prop_assert!(!tag.is_empty());
                prop_assert_eq!(tag.trim(), tag.as_str());
                prop_assert_eq!(tag.to_lowercase(), tag.clone());
                prop_assert!(!normalized[..i].contains(tag));
            }
        }
    }
}
