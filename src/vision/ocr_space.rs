//! OCR.space HTTP transport
//!
//! Multipart upload of a prepared photo to the OCR.space `parse/image`
//! endpoint, translating its JSON envelope into a [`ServiceReply`].

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::preprocess::PreparedImage;
use super::recognition::{RecognitionRequest, RecognitionTransport, ServiceReply, TransportError};
use crate::capture::extension_for_mime;

/// Default public endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api.ocr.space/parse/image";

/// OCR.space response envelope
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OcrSpaceResponse {
    #[serde(default)]
    parsed_results: Option<Vec<ParsedResult>>,
    #[serde(default)]
    is_errored_on_processing: bool,
    #[serde(default)]
    error_message: Option<ErrorText>,
    #[serde(default)]
    error_details: Option<ErrorText>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ParsedResult {
    #[serde(default)]
    parsed_text: Option<String>,
}

/// The service sends error fields either as a string or a list of strings
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorText {
    One(String),
    Many(Vec<String>),
}

impl ErrorText {
    fn joined(&self) -> String {
        match self {
            ErrorText::One(s) => s.clone(),
            ErrorText::Many(v) => v.join(" "),
        }
    }
}

impl OcrSpaceResponse {
    fn error_text(&self) -> String {
        [&self.error_message, &self.error_details]
            .into_iter()
            .flatten()
            .map(ErrorText::joined)
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn into_reply(self) -> ServiceReply {
        if self.is_errored_on_processing {
            let message = self.error_text();
            return ServiceReply::ProcessingError {
                message: if message.is_empty() { "OCR error".to_string() } else { message },
            };
        }

        let text = self
            .parsed_results
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| r.parsed_text)
            .collect::<Vec<_>>()
            .join("\n\n");

        ServiceReply::Text(text)
    }
}

/// HTTP client for the OCR.space recognition service
pub struct OcrSpaceClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl OcrSpaceClient {
    /// Create a client for `endpoint` with a per-request timeout
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

#[async_trait]
impl RecognitionTransport for OcrSpaceClient {
    async fn submit(
        &self,
        image: &PreparedImage,
        request: &RecognitionRequest,
    ) -> Result<ServiceReply, TransportError> {
        let file_name = format!("image.{}", extension_for_mime(&image.mime));
        let part = Part::bytes(image.data.clone())
            .file_name(file_name)
            .mime_str(&image.mime)?;

        let form = Form::new()
            .text("language", request.language.clone())
            .text("OCREngine", request.engine.to_string())
            .text("scale", request.scale.to_string())
            .text("detectOrientation", request.detect_orientation.to_string())
            .text("isOverlayRequired", "false")
            .part("file", part);

        let mut builder = self.client.post(&self.endpoint).multipart(form);
        if let Some(key) = &self.api_key {
            builder = builder.header("apikey", key);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        debug!(engine = %request.engine, status = status.as_u16(), "OCR service replied ({} bytes)", body.len());

        if !status.is_success() {
            let message = serde_json::from_str::<OcrSpaceResponse>(&body)
                .map(|r| r.error_text())
                .ok()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| body.chars().take(200).collect());
            return Ok(ServiceReply::HttpStatus {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: OcrSpaceResponse =
            serde_json::from_str(&body).map_err(|e| TransportError::Malformed(e.to_string()))?;

        Ok(parsed.into_reply())
    }
}
