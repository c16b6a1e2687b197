use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::billing::Tier;
use crate::config::{
    Config, BEAUTY_SYSTEM_PROMPT, ENHANCEMENT_PROMPT_TEMPLATE, FREE_REPORT_REQUEST,
    PREMIUM_REPORT_REQUEST,
};
use crate::imaging::EncodedImage;
use crate::llm::media::normalize_image_mime_type;
use crate::llm::BeautyModel;
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

pub const NO_RESPONSE_TEXT: &str = "No response generated.";

#[derive(Debug, thiserror::Error)]
#[error("Image generation failed: {0}")]
pub struct ImageGenerationError(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl GeneratedImage {
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: String,
    pub api_base: String,
    pub analysis_model: String,
    pub image_model: String,
    pub temperature: f32,
    pub top_k: i32,
    pub top_p: f32,
    pub max_output_tokens: i32,
    pub safety_profile: String,
    pub timeout: Duration,
}

impl GeminiSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_key: config.gemini_api_key.clone(),
            api_base: config.gemini_api_base.clone(),
            analysis_model: config.gemini_analysis_model.clone(),
            image_model: config.gemini_image_model.clone(),
            temperature: config.gemini_temperature,
            top_k: config.gemini_top_k,
            top_p: config.gemini_top_p,
            max_output_tokens: config.gemini_max_output_tokens,
            safety_profile: config.gemini_safety_settings.clone(),
            timeout: Duration::from_secs(config.gemini_timeout_seconds.max(1)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
        #[serde(default)]
        thought: bool,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
    #[allow(dead_code)]
    Other(Value),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

fn build_safety_settings(profile: &str) -> Vec<Value> {
    let threshold = match profile {
        "standard" => "BLOCK_MEDIUM_AND_ABOVE",
        "permissive" => "OFF",
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}', using standard defaults.",
                profile
            );
            "BLOCK_MEDIUM_AND_ABOVE"
        }
    };

    vec![
        json!({ "category": "HARM_CATEGORY_HARASSMENT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": threshold }),
    ]
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn summarize_gemini_parts(parts: &[Value]) -> Vec<Value> {
    parts
        .iter()
        .map(|part| {
            if let Some(text) = part.get("text").and_then(|value| value.as_str()) {
                json!({ "text": truncate_for_log(text, 200) })
            } else if let Some(inline_data) = part.get("inlineData") {
                let mime_type = inline_data
                    .get("mimeType")
                    .and_then(|value| value.as_str())
                    .unwrap_or("unknown");
                let data_len = inline_data
                    .get("data")
                    .and_then(|value| value.as_str())
                    .map(|value| value.len())
                    .unwrap_or(0);
                json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } })
            } else {
                json!({ "unknownPart": true })
            }
        })
        .collect()
}

fn summarize_gemini_payload(payload: &Value, system_prompt_label: Option<&str>) -> Value {
    let mut summary = Map::new();

    if payload.pointer("/systemInstruction").is_some() {
        let label = system_prompt_label.unwrap_or("inline_system_prompt");
        summary.insert(
            "systemInstruction".to_string(),
            Value::String(label.to_string()),
        );
    }

    if let Some(contents) = payload.get("contents").and_then(|value| value.as_array()) {
        let summarized_contents: Vec<Value> = contents
            .iter()
            .map(|content| {
                let role = content
                    .get("role")
                    .and_then(|value| value.as_str())
                    .unwrap_or("user");
                let parts = content
                    .get("parts")
                    .and_then(|value| value.as_array())
                    .map(|parts| summarize_gemini_parts(parts))
                    .unwrap_or_default();
                json!({ "role": role, "parts": parts })
            })
            .collect();
        summary.insert("contents".to_string(), Value::Array(summarized_contents));
    }

    if let Some(config) = payload.get("generationConfig") {
        summary.insert("generationConfig".to_string(), config.clone());
    }

    if let Some(safety) = payload
        .get("safetySettings")
        .and_then(|value| value.as_array())
    {
        summary.insert("safetySettingsCount".to_string(), json!(safety.len()));
    }

    Value::Object(summary)
}

fn summarize_gemini_response(response: &GeminiResponse) -> Value {
    let mut text_parts = 0usize;
    let mut image_parts = 0usize;
    let mut text_preview = None;

    let candidates = response.candidates.as_deref().unwrap_or(&[]);
    for candidate in candidates {
        let Some(parts) = candidate
            .content
            .as_ref()
            .and_then(|content| content.parts.as_ref())
        else {
            continue;
        };
        for part in parts {
            match part {
                GeminiPart::Text { text, .. } => {
                    text_parts += 1;
                    if text_preview.is_none() && !text.trim().is_empty() {
                        text_preview = Some(truncate_for_log(text, 200));
                    }
                }
                GeminiPart::InlineData { inline_data } => {
                    if inline_data.mime_type.starts_with("image/") {
                        image_parts += 1;
                    }
                }
                GeminiPart::Other(_) => {}
            }
        }
    }

    json!({
        "candidates": candidates.len(),
        "textParts": text_parts,
        "imageParts": image_parts,
        "textPreview": text_preview
    })
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

fn build_image_parts(image: &EncodedImage, text: &str) -> Vec<Value> {
    vec![
        json!({
            "inlineData": {
                "mimeType": normalize_image_mime_type(&image.mime_type),
                "data": image.to_base64()
            }
        }),
        json!({ "text": text }),
    ]
}

pub fn report_request_for_tier(tier: Tier) -> &'static str {
    if tier.is_premium() {
        PREMIUM_REPORT_REQUEST
    } else {
        FREE_REPORT_REQUEST
    }
}

pub fn build_enhancement_prompt(goal: &str) -> String {
    ENHANCEMENT_PROMPT_TEMPLATE.replace("{goal}", goal.trim())
}

fn build_analysis_payload(settings: &GeminiSettings, image: &EncodedImage, tier: Tier) -> Value {
    json!({
        "systemInstruction": { "parts": [{ "text": BEAUTY_SYSTEM_PROMPT }] },
        "contents": [{ "role": "user", "parts": build_image_parts(image, report_request_for_tier(tier)) }],
        "generationConfig": {
            "temperature": settings.temperature,
            "topK": settings.top_k,
            "topP": settings.top_p,
            "maxOutputTokens": settings.max_output_tokens,
        },
        "safetySettings": build_safety_settings(&settings.safety_profile),
    })
}

fn build_enhancement_payload(settings: &GeminiSettings, image: &EncodedImage, goal: &str) -> Value {
    json!({
        "contents": [{ "role": "user", "parts": build_image_parts(image, &build_enhancement_prompt(goal)) }],
        "generationConfig": {
            "responseModalities": ["TEXT", "IMAGE"]
        },
        "safetySettings": build_safety_settings(&settings.safety_profile),
    })
}

/// Concatenates the answer's text parts exactly as sent. A section header
/// may be split across parts, so nothing is inserted or dropped between them.
fn extract_text_from_response(response: GeminiResponse) -> String {
    let mut text_parts = Vec::new();
    for candidate in response.candidates.unwrap_or_default() {
        let Some(parts) = candidate.content.and_then(|content| content.parts) else {
            continue;
        };
        for part in parts {
            if let GeminiPart::Text {
                text,
                thought: false,
            } = part
            {
                text_parts.push(text);
            }
        }
    }
    text_parts.concat()
}

fn extract_first_image(response: GeminiResponse) -> Option<GeneratedImage> {
    for candidate in response.candidates.unwrap_or_default() {
        let Some(parts) = candidate.content.and_then(|content| content.parts) else {
            continue;
        };
        for part in parts {
            let GeminiPart::InlineData { inline_data } = part else {
                continue;
            };
            if !inline_data.mime_type.starts_with("image/") || inline_data.data.is_empty() {
                continue;
            }
            match general_purpose::STANDARD.decode(inline_data.data.as_bytes()) {
                Ok(bytes) => {
                    return Some(GeneratedImage {
                        bytes,
                        mime_type: normalize_image_mime_type(&inline_data.mime_type),
                    })
                }
                Err(err) => warn!("Skipping undecodable inline image: {}", err),
            }
        }
    }
    None
}

fn generate_content_url(api_base: &str, model: &str) -> Result<Url> {
    let base = Url::parse(api_base)
        .map_err(|err| anyhow!("Invalid GEMINI_API_BASE '{}': {}", api_base, err))?;
    Ok(base.join(&format!("models/{model}:generateContent"))?)
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    settings: GeminiSettings,
}

impl GeminiClient {
    pub fn new(settings: GeminiSettings) -> Self {
        Self { settings }
    }

    /// Sends one `generateContent` request. Failures are returned as-is;
    /// nothing is retried.
    async fn call_gemini_api(
        &self,
        model: &str,
        payload: Value,
        system_prompt_label: Option<&str>,
    ) -> Result<GeminiResponse> {
        let api_key = self.settings.api_key.trim();
        if api_key.is_empty() {
            return Err(anyhow!("API key is missing. Please set GEMINI_API_KEY"));
        }
        let url = generate_content_url(&self.settings.api_base, model)?;

        if tracing::enabled!(tracing::Level::DEBUG) {
            let payload_summary = summarize_gemini_payload(&payload, system_prompt_label);
            debug!(target: "llm.gemini", model = model, payload = %payload_summary);
        }

        let response = get_http_client()
            .post(url)
            .header("x-goog-api-key", api_key)
            .timeout(self.settings.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                warn!(
                    "Gemini request failed to send: {} (timeout={}, connect={})",
                    err,
                    err.is_timeout(),
                    err.is_connect()
                );
                anyhow!("Gemini request failed: {}", err)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&body);
            warn!("Gemini API error: status={}, body={}", status, body_summary);
            let detail = message.unwrap_or(body_summary);
            return Err(anyhow!(
                "Gemini request failed with status {}: {}",
                status,
                detail
            ));
        }

        let value = response.json::<GeminiResponse>().await?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            let response_summary = summarize_gemini_response(&value);
            debug!(target: "llm.gemini", model = model, response = %response_summary);
        }
        Ok(value)
    }
}

#[async_trait]
impl BeautyModel for GeminiClient {
    async fn analyze_image(&self, image: &EncodedImage, tier: Tier) -> Result<String> {
        let payload = build_analysis_payload(&self.settings, image, tier);
        let model = self.settings.analysis_model.as_str();
        let metadata = json!({ "tier": tier.as_str(), "imageBytes": image.bytes.len() });

        log_llm_timing("gemini", model, "analyze_image", Some(metadata), || async {
            let response = self
                .call_gemini_api(model, payload, Some("beauty_system_prompt"))
                .await?;
            let text = extract_text_from_response(response);
            if text.trim().is_empty() {
                Ok(NO_RESPONSE_TEXT.to_string())
            } else {
                Ok(text)
            }
        })
        .await
    }

    async fn generate_enhanced_image(
        &self,
        image: &EncodedImage,
        goal: &str,
    ) -> Result<GeneratedImage, ImageGenerationError> {
        let payload = build_enhancement_payload(&self.settings, image, goal);
        let model = self.settings.image_model.as_str();

        let response = log_llm_timing("gemini", model, "generate_enhanced_image", None, || {
            self.call_gemini_api(model, payload, None)
        })
        .await
        .map_err(|err| ImageGenerationError(err.to_string()))?;

        extract_first_image(response)
            .ok_or_else(|| ImageGenerationError(format!("No image generated (model: {model})")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> GeminiSettings {
        GeminiSettings {
            api_key: String::new(),
            api_base: "https://generativelanguage.googleapis.com/v1beta/".to_string(),
            analysis_model: "gemini-3-flash-preview".to_string(),
            image_model: "gemini-2.5-flash-image".to_string(),
            temperature: 0.7,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: 8192,
            safety_profile: "standard".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    fn image() -> EncodedImage {
        EncodedImage {
            bytes: vec![0xFF, 0xD8, 0xFF],
            mime_type: "image/jpeg".to_string(),
            width: 2,
            height: 2,
        }
    }

    fn response(value: Value) -> GeminiResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn analysis_payload_sends_image_then_tier_request() {
        let payload = build_analysis_payload(&settings(), &image(), Tier::Free);
        let parts = payload.pointer("/contents/0/parts").unwrap();
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[0]["inlineData"]["data"], "/9j/");
        assert_eq!(parts[1]["text"], FREE_REPORT_REQUEST);
        assert_eq!(
            payload.pointer("/systemInstruction/parts/0/text").unwrap(),
            BEAUTY_SYSTEM_PROMPT
        );

        let premium = build_analysis_payload(&settings(), &image(), Tier::Premium);
        assert_eq!(
            premium.pointer("/contents/0/parts/1/text").unwrap(),
            "full_report"
        );
    }

    #[test]
    fn system_prompt_keeps_policy_wording() {
        assert!(BEAUTY_SYSTEM_PROMPT.contains("core AI engine for a mobile app"));
        assert!(BEAUTY_SYSTEM_PROMPT.contains("❌ “You lack”\n❌ “You are not attractive”"));
        assert!(BEAUTY_SYSTEM_PROMPT.contains("Maintain the user’s identity"));
        assert!(BEAUTY_SYSTEM_PROMPT.contains("When developer sends: \"full_report\""));
    }

    #[test]
    fn enhancement_payload_embeds_goal_and_asks_for_an_image() {
        let payload = build_enhancement_payload(&settings(), &image(), "  Radiant skin.  ");
        let text = payload
            .pointer("/contents/0/parts/1/text")
            .and_then(|value| value.as_str())
            .unwrap();
        assert!(text.contains("Specific Goal based on analysis: Radiant skin.\n"));
        assert!(!text.contains("{goal}"));
        assert_eq!(
            payload.pointer("/generationConfig/responseModalities/1").unwrap(),
            "IMAGE"
        );
        assert!(payload.get("systemInstruction").is_none());
    }

    #[test]
    fn joins_text_parts_and_ignores_unknown_parts() {
        let parsed = response(json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "Weighing the lighting first.", "thought": true },
                    { "text": "1. Photo Analysis Summary\n" },
                    { "thoughtSignature": "abc" },
                    { "text": "   " },
                    { "text": "Clear skin." }
                ]}
            }]
        }));
        assert_eq!(
            extract_text_from_response(parsed),
            "1. Photo Analysis Summary\n   Clear skin."
        );
        assert_eq!(extract_text_from_response(response(json!({}))), "");
    }

    #[test]
    fn header_split_across_parts_still_parses() {
        let parsed = response(json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "1. Photo Analysis " },
                    { "text": "Summary\nNice.\n2. Key Enhancement Opportunities\n- Sleep" }
                ]}
            }]
        }));
        let text = extract_text_from_response(parsed);
        let result = crate::analysis::parse_analysis(&text);
        assert_eq!(result.summary, "Nice.");
        assert_eq!(result.opportunities, "- Sleep");
    }

    #[test]
    fn picks_the_first_inline_image() {
        let parsed = response(json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "Here you go" },
                    { "inlineData": { "mimeType": "text/plain", "data": "aGk=" } },
                    { "inlineData": { "mimeType": "image/png", "data": "AQID" } },
                    { "inlineData": { "mimeType": "image/png", "data": "BAUG" } }
                ]}
            }]
        }));
        let image = extract_first_image(parsed).unwrap();
        assert_eq!(image.bytes, vec![1, 2, 3]);
        assert_eq!(image.to_data_url(), "data:image/png;base64,AQID");

        let text_only = response(json!({
            "candidates": [{ "content": { "parts": [{ "text": "no image" }] } }]
        }));
        assert!(extract_first_image(text_only).is_none());
    }

    #[test]
    fn error_body_prefers_api_message() {
        let (message, _) =
            summarize_error_body(r#"{"error":{"code":400,"message":"API key not valid"}}"#);
        assert_eq!(message.as_deref(), Some("API key not valid"));
        assert_eq!(summarize_error_body("  ").1, "empty response body");
    }

    #[test]
    fn builds_generate_content_endpoint() {
        let url = generate_content_url(
            "https://generativelanguage.googleapis.com/v1beta/",
            "gemini-3-flash-preview",
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-3-flash-preview:generateContent"
        );
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_any_request() {
        let client = GeminiClient::new(settings());
        let err = client.analyze_image(&image(), Tier::Free).await.unwrap_err();
        assert!(err.to_string().contains("API key is missing"));

        let err = client
            .generate_enhanced_image(&image(), "goal")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("API key is missing"));
    }
}
