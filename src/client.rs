//! Client for the Anthropic Messages API used as a remote object locator.
//!
//! The model is asked to answer with a small JSON object. That object arrives
//! as text inside the API's own JSON envelope, so a reply is parsed twice.

use crate::{
    config::ClientConfig,
    error::DetectError,
    model::{DetectionModel, DetectionRequest, DetectionResult},
};
use serde::Deserialize;
use serde_json::{Value, json};

/// Blocking client that locates objects through the Messages API.
pub struct AnthropicClient {
    http: reqwest::blocking::Client,
    config: ClientConfig,
}

impl AnthropicClient {
    /// Creates a client from the given configuration.
    pub fn new(config: ClientConfig) -> Result<Self, DetectError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { http, config })
    }

    /// Builds the request body for `request`.
    pub fn build_payload(&self, request: &DetectionRequest) -> Value {
        json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": [
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": instruction(request.label.trim()) },
                        {
                            "type": "image",
                            "source": {
                                "type": "base64",
                                "media_type": request.image.media_type(),
                                "data": request.image.to_base64(),
                            }
                        }
                    ]
                }
            ]
        })
    }
}

impl DetectionModel for AnthropicClient {
    type Error = DetectError;

    fn detect(&mut self, request: DetectionRequest) -> Result<DetectionResult, Self::Error> {
        validate(&request)?;

        let payload = self.build_payload(&request);
        log::debug!(
            "Requesting '{}' from {} ({} bytes of {})",
            request.label.trim(),
            self.config.endpoint,
            request.image.bytes.len(),
            request.image.media_type()
        );

        let response = self
            .http
            .post(&self.config.endpoint)
            .header("x-api-key", request.api_key.trim())
            .header("anthropic-version", &self.config.api_version)
            .json(&payload)
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            log::warn!("Inference API answered with status {}", status);
        }

        let result = parse_reply(&body)?;
        log::info!(
            "Model reply for '{}': found={} confidence={:.2}",
            request.label.trim(),
            result.found,
            result.confidence
        );

        Ok(result)
    }
}

fn validate(request: &DetectionRequest) -> Result<(), DetectError> {
    if request.api_key.trim().is_empty() {
        return Err(DetectError::MissingCredential);
    }
    if request.image.bytes.is_empty() {
        return Err(DetectError::EmptyImage);
    }
    if request.label.trim().is_empty() {
        return Err(DetectError::EmptyLabel);
    }
    Ok(())
}

/// The natural-language instruction sent alongside the image.
pub fn instruction(label: &str) -> String {
    format!(
        "Analyze this image and detect the exact location of the '{label}'.\n\
         Consider objects that are partially visible or obstructed.\n\
         \n\
         Return a JSON object in this format:\n\
         {{\n\
         \x20   \"found\": true/false,\n\
         \x20   \"coords\": [x1, y1, x2, y2],\n\
         \x20   \"confidence\": 0.0 to 1.0,\n\
         \x20   \"description\": \"brief location description\"\n\
         }}\n\
         Coordinates are fractions (0.0 to 1.0) of the image width and height."
    )
}

#[derive(Deserialize)]
struct ModelReply {
    found: Option<bool>,
    coords: Option<[f32; 4]>,
    confidence: Option<f32>,
    description: Option<String>,
}

/// Parses a raw Messages API response body into a detection result.
pub fn parse_reply(body: &str) -> Result<DetectionResult, DetectError> {
    let envelope: Value = serde_json::from_str(body)?;

    if let Some(error) = envelope.get("error").filter(|e| e.is_object()) {
        let field = |key: &str| {
            error
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string()
        };
        return Err(DetectError::Api {
            kind: field("type"),
            message: field("message"),
        });
    }

    let text = envelope
        .get("content")
        .and_then(|content| content.get(0))
        .and_then(|block| block.get("text"))
        .and_then(Value::as_str)
        .ok_or(DetectError::MissingContent)?;

    parse_model_text(text)
}

/// Parses the model's own JSON answer, tolerating prose or a code fence around it.
pub fn parse_model_text(text: &str) -> Result<DetectionResult, DetectError> {
    let reply: ModelReply = serde_json::from_str(extract_object(text))?;
    let found = reply.found.unwrap_or(false);

    let coords = match (found, reply.coords) {
        (_, Some(coords)) => coords,
        (true, None) => return Err(DetectError::MissingCoords),
        (false, None) => [0.0; 4],
    };

    Ok(DetectionResult::new(
        found,
        coords,
        reply.confidence.unwrap_or(0.0),
        reply.description.unwrap_or_default(),
    ))
}

fn extract_object(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{EncodedImage, WireFormat};

    fn envelope(text: &str) -> String {
        json!({
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "content": [{ "type": "text", "text": text }],
        })
        .to_string()
    }

    fn request(api_key: &str, label: &str, bytes: Vec<u8>) -> DetectionRequest {
        DetectionRequest {
            image: EncodedImage {
                bytes,
                format: WireFormat::Png,
            },
            label: label.to_string(),
            api_key: api_key.to_string(),
        }
    }

    #[test]
    fn test_parse_reply_success() {
        let body = envelope(
            r#"{"found": true, "coords": [0.1, 0.2, 0.5, 0.6], "confidence": 0.8, "description": "on the sofa"}"#,
        );
        let result = parse_reply(&body).unwrap();
        assert!(result.found);
        assert_eq!(result.coords, [0.1, 0.2, 0.5, 0.6]);
        assert_eq!(result.confidence, 0.8);
        assert_eq!(result.description, "on the sofa");
    }

    #[test]
    fn test_parse_reply_fenced() {
        let body = envelope(
            "Here is the result:\n```json\n{\"found\": true, \"coords\": [0, 0, 1, 1], \"confidence\": 0.9, \"description\": \"everywhere\"}\n```",
        );
        let result = parse_reply(&body).unwrap();
        assert_eq!(result.coords, [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_parse_reply_missing_content() {
        let body = json!({ "id": "msg_01", "type": "message" }).to_string();
        assert!(matches!(parse_reply(&body), Err(DetectError::MissingContent)));

        let body = json!({ "content": [] }).to_string();
        assert!(matches!(parse_reply(&body), Err(DetectError::MissingContent)));

        let body = json!({ "content": "not a list" }).to_string();
        assert!(matches!(parse_reply(&body), Err(DetectError::MissingContent)));
    }

    #[test]
    fn test_parse_reply_invalid_embedded_json() {
        let body = envelope("I could not find a cat in this picture.");
        assert!(matches!(parse_reply(&body), Err(DetectError::MalformedReply(_))));

        let body = envelope(r#"{"found": true, "coords": [0.1, 0.2]}"#);
        assert!(matches!(parse_reply(&body), Err(DetectError::MalformedReply(_))));
    }

    #[test]
    fn test_parse_reply_body_not_json() {
        assert!(matches!(
            parse_reply("<html>bad gateway</html>"),
            Err(DetectError::MalformedReply(_))
        ));
    }

    #[test]
    fn test_parse_reply_api_error() {
        let body = json!({
            "type": "error",
            "error": { "type": "authentication_error", "message": "invalid x-api-key" }
        })
        .to_string();
        match parse_reply(&body) {
            Err(DetectError::Api { kind, message }) => {
                assert_eq!(kind, "authentication_error");
                assert_eq!(message, "invalid x-api-key");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_parse_reply_not_found_needs_no_coords() {
        let result = parse_reply(&envelope(r#"{"found": false}"#)).unwrap();
        assert_eq!(result, DetectionResult::not_found());

        assert!(matches!(
            parse_reply(&envelope(r#"{"found": true, "confidence": 0.9}"#)),
            Err(DetectError::MissingCoords)
        ));
    }

    #[test]
    fn test_build_payload() {
        let client = AnthropicClient::new(ClientConfig::default()).unwrap();
        let payload = client.build_payload(&request("key", " cat ", vec![1, 2, 3]));

        assert_eq!(payload["model"], "claude-3-opus-20240229");
        assert_eq!(payload["max_tokens"], 1024);
        assert_eq!(payload["messages"][0]["role"], "user");

        let content = &payload["messages"][0]["content"];
        assert!(content[0]["text"].as_str().unwrap().contains("'cat'"));
        assert_eq!(content[1]["source"]["type"], "base64");
        assert_eq!(content[1]["source"]["media_type"], "image/png");
        assert_eq!(content[1]["source"]["data"], "AQID");
    }

    #[test]
    fn test_detect_validates_before_sending() {
        // nothing listens here; validation must fail before any I/O
        let mut client =
            AnthropicClient::new(ClientConfig::with_endpoint("http://127.0.0.1:9/v1/messages"))
                .unwrap();

        assert!(matches!(
            client.detect(request("  ", "cat", vec![1])),
            Err(DetectError::MissingCredential)
        ));
        assert!(matches!(
            client.detect(request("key", "cat", vec![])),
            Err(DetectError::EmptyImage)
        ));
        assert!(matches!(
            client.detect(request("key", "", vec![1])),
            Err(DetectError::EmptyLabel)
        ));
    }
}
