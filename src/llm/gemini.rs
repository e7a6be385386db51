use std::time::Duration;

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::{validate_api_key, Config, ConfigError};
use crate::llm::media::{normalize_image_mime_type, ImageAsset};
use crate::llm::{ContentReply, ContentService, ResponseModality};
use crate::studio::compose::{ContentSegment, GenerationRequest};
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

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
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
    /// Function calls, executable code, bare thought signatures and the like.
    Other(Value),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

const GEMINI_RETRY_BASE_DELAY_MS: u64 = 900;

/// Client for the Gemini `generateContent` endpoint. Only constructible with
/// a well-formed API key.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_key: String,
    api_base: String,
    image_model: String,
    classifier_model: String,
    timeout: Duration,
    max_attempts: usize,
    safety_profile: String,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let api_key = validate_api_key(&config.gemini_api_key)?;
        Ok(GeminiClient {
            api_key,
            api_base: config.gemini_api_base.clone(),
            image_model: config.gemini_image_model.clone(),
            classifier_model: config.gemini_classifier_model.clone(),
            timeout: Duration::from_secs(config.gemini_request_timeout_seconds.max(1)),
            max_attempts: config.gemini_max_retry_attempts.max(1),
            safety_profile: config.gemini_safety_settings.clone(),
        })
    }

    pub fn model_for(&self, modality: ResponseModality) -> &str {
        match modality {
            ResponseModality::ImageAndText => &self.image_model,
            ResponseModality::Text => &self.classifier_model,
        }
    }

    fn redact_api_key(&self, text: &str) -> String {
        text.replace(&self.api_key, "[redacted]")
    }

    async fn call_gemini_api(&self, model: &str, payload: Value) -> Result<GeminiResponse> {
        let client = get_http_client();
        let url = format!("{}/models/{}:generateContent", self.api_base, model);

        if tracing::enabled!(tracing::Level::DEBUG) {
            let payload_summary = summarize_gemini_payload(&payload);
            debug!(target: "llm.gemini", model = model, payload = %payload_summary);
        }

        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let response = match client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    let err_text = self.redact_api_key(&err.to_string());
                    let should_retry = gemini_should_retry_error(&err) && attempt < self.max_attempts;
                    warn!(
                        "Gemini request failed to send: {} (timeout={}, connect={}, status={:?}, retrying={})",
                        err_text,
                        err.is_timeout(),
                        err.is_connect(),
                        err.status(),
                        should_retry
                    );
                    if should_retry {
                        tokio::time::sleep(gemini_retry_delay(attempt)).await;
                        continue;
                    }
                    return Err(anyhow!("Gemini request failed: {}", err_text));
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let (message, body_summary) = summarize_error_body(&body);
                let should_retry = gemini_should_retry_status(status) && attempt < self.max_attempts;
                warn!(
                    "Gemini API error: status={}, body={}, retrying={}",
                    status, body_summary, should_retry
                );
                if should_retry {
                    tokio::time::sleep(gemini_retry_delay(attempt)).await;
                    continue;
                }
                let detail = self.redact_api_key(&message.unwrap_or(body_summary));
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
            return Ok(value);
        }
    }
}

impl ContentService for GeminiClient {
    async fn generate_content(
        &self,
        request: &GenerationRequest,
        modality: ResponseModality,
    ) -> Result<ContentReply> {
        let payload = build_payload(request, modality, &self.safety_profile);
        let model = self.model_for(modality).to_string();
        let operation = match modality {
            ResponseModality::ImageAndText => "generate_image",
            ResponseModality::Text => "classify_item",
        };
        let metadata = json!({ "segments": request.segments().len(), "images": request.image_count() });

        log_llm_timing("gemini", &model, operation, Some(metadata), || async {
            let response = self.call_gemini_api(&model, payload).await?;
            Ok(extract_reply(response))
        })
        .await
    }
}

fn gemini_should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn gemini_should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn gemini_retry_delay(attempt: usize) -> Duration {
    let attempt = attempt.max(1) as u64;
    Duration::from_millis(GEMINI_RETRY_BASE_DELAY_MS.saturating_mul(attempt))
}

fn build_safety_settings(profile: &str) -> Vec<Value> {
    let threshold = match profile {
        "permissive" => "OFF",
        _ => "BLOCK_MEDIUM_AND_ABOVE",
    };

    vec![
        json!({ "category": "HARM_CATEGORY_HARASSMENT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": threshold }),
    ]
}

fn build_parts(request: &GenerationRequest) -> Vec<Value> {
    request
        .segments()
        .iter()
        .map(|segment| match segment {
            ContentSegment::Text(text) => json!({ "text": text }),
            ContentSegment::Image { data, mime_type } => json!({
                "inlineData": {
                    "mimeType": mime_type,
                    "data": data
                }
            }),
        })
        .collect()
}

fn build_payload(request: &GenerationRequest, modality: ResponseModality, safety_profile: &str) -> Value {
    let modalities = match modality {
        ResponseModality::ImageAndText => json!(["IMAGE", "TEXT"]),
        ResponseModality::Text => json!(["TEXT"]),
    };
    json!({
        "contents": [{ "role": "user", "parts": build_parts(request) }],
        "generationConfig": { "responseModalities": modalities },
        "safetySettings": build_safety_settings(safety_profile),
    })
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

fn summarize_gemini_payload(payload: &Value) -> Value {
    let mut summary = Map::new();

    if let Some(contents) = payload.get("contents").and_then(|value| value.as_array()) {
        let mut summarized_contents = Vec::new();
        for content in contents {
            let role = content
                .get("role")
                .and_then(|value| value.as_str())
                .unwrap_or("user");
            let parts = content
                .get("parts")
                .and_then(|value| value.as_array())
                .map(|parts| summarize_gemini_parts(parts))
                .unwrap_or_default();
            summarized_contents.push(json!({ "role": role, "parts": parts }));
        }
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
    let mut other_parts: Vec<String> = Vec::new();
    let mut text_preview = None;

    let candidates = response.candidates.as_deref().unwrap_or(&[]);
    for candidate in candidates {
        let parts = candidate
            .content
            .as_ref()
            .and_then(|content| content.parts.as_deref())
            .unwrap_or(&[]);
        for part in parts {
            match part {
                GeminiPart::Text { text } => {
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
                GeminiPart::Other(value) => {
                    let keys = value
                        .as_object()
                        .map(|object| object.keys().cloned().collect::<Vec<_>>().join("+"))
                        .unwrap_or_else(|| "non-object".to_string());
                    other_parts.push(keys);
                }
            }
        }
    }

    json!({
        "candidates": candidates.len(),
        "textParts": text_parts,
        "imageParts": image_parts,
        "otherParts": other_parts,
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

fn extract_reply(response: GeminiResponse) -> ContentReply {
    let mut reply = ContentReply::default();
    let mut text_parts = Vec::new();
    for candidate in response.candidates.unwrap_or_default() {
        let Some(parts) = candidate.content.and_then(|content| content.parts) else {
            continue;
        };
        for part in parts {
            match part {
                GeminiPart::Text { text } => {
                    if !text.trim().is_empty() {
                        text_parts.push(text);
                    }
                }
                GeminiPart::InlineData { inline_data } => {
                    if !inline_data.mime_type.starts_with("image/") {
                        continue;
                    }
                    match general_purpose::STANDARD.decode(inline_data.data) {
                        Ok(bytes) => reply.images.push(ImageAsset::new(
                            bytes,
                            normalize_image_mime_type(&inline_data.mime_type),
                            None,
                        )),
                        Err(err) => warn!("Skipping undecodable inline image: {err}"),
                    }
                }
                GeminiPart::Other(_) => {}
            }
        }
    }
    reply.text = text_parts.join("\n");
    reply
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_key(key: &str) -> Config {
        let mut config = Config::load();
        config.gemini_api_key = key.to_string();
        config
    }

    #[test]
    fn refuses_to_build_without_a_key() {
        let err = GeminiClient::new(&config_with_key("")).unwrap_err();
        assert_eq!(err, ConfigError::MissingApiKey);
    }

    #[test]
    fn payload_preserves_segment_order_and_requests_images() {
        let request = GenerationRequest::from_segments(vec![
            ContentSegment::text("first"),
            ContentSegment::Image {
                data: "AAAA".to_string(),
                mime_type: "image/webp".to_string(),
            },
            ContentSegment::text("last"),
        ]);
        let payload = build_payload(&request, ResponseModality::ImageAndText, "standard");

        let parts = payload
            .pointer("/contents/0/parts")
            .and_then(|value| value.as_array())
            .unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["text"], "first");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/webp");
        assert_eq!(parts[1]["inlineData"]["data"], "AAAA");
        assert_eq!(parts[2]["text"], "last");
        assert_eq!(
            payload["generationConfig"]["responseModalities"],
            json!(["IMAGE", "TEXT"])
        );
        assert_eq!(
            payload["safetySettings"][0]["threshold"],
            "BLOCK_MEDIUM_AND_ABOVE"
        );
    }

    #[test]
    fn extracts_images_and_text_from_response() {
        let raw = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "Here is your image." },
                        { "inlineData": { "mimeType": "image/png", "data": "AQID" } }
                    ]
                }
            }]
        });
        let response: GeminiResponse = serde_json::from_value(raw).unwrap();
        let reply = extract_reply(response);
        assert_eq!(reply.text, "Here is your image.");
        assert_eq!(reply.images.len(), 1);
        assert_eq!(reply.images[0].bytes, vec![1, 2, 3]);
        assert_eq!(reply.images[0].mime_type, "image/png");
    }

    #[test]
    fn unfamiliar_parts_do_not_hide_the_image() {
        let raw = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "thoughtSignature": "c2lnbmF0dXJl" },
                        { "functionCall": { "name": "lookup", "args": {} } },
                        { "inlineData": { "mimeType": "image/png", "data": "AQID" } }
                    ]
                }
            }]
        });
        let response: GeminiResponse = serde_json::from_value(raw).unwrap();
        let summary = summarize_gemini_response(&response);
        assert_eq!(summary["imageParts"], 1);
        assert_eq!(summary["otherParts"], json!(["thoughtSignature", "functionCall"]));

        let reply = extract_reply(response);
        assert_eq!(reply.images.len(), 1);
        assert!(reply.text.is_empty());
    }

    #[test]
    fn text_only_response_has_no_images() {
        let raw = json!({ "candidates": [{ "content": { "parts": [{ "text": "Ring" }] } }] });
        let response: GeminiResponse = serde_json::from_value(raw).unwrap();
        let reply = extract_reply(response);
        assert!(reply.images.is_empty());
        assert_eq!(reply.text, "Ring");
    }

    #[test]
    fn error_body_prefers_api_message() {
        let (message, _) =
            summarize_error_body(r#"{"error":{"code":400,"message":"API key not valid."}}"#);
        assert_eq!(message.as_deref(), Some("API key not valid."));
        let (message, summary) = summarize_error_body("   ");
        assert!(message.is_none());
        assert_eq!(summary, "empty response body");
    }

    #[test]
    fn retries_only_transient_statuses() {
        assert!(gemini_should_retry_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(gemini_should_retry_status(StatusCode::BAD_GATEWAY));
        assert!(!gemini_should_retry_status(StatusCode::BAD_REQUEST));
        assert_eq!(gemini_retry_delay(2), Duration::from_millis(1800));
    }
}
