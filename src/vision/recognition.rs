//! Recognition orchestration
//!
//! Sends a prepared photo to the external text-recognition service with
//! engine fallback and per-engine retries. Transport failures, server errors
//! and processing timeouts are retried; client errors and any other
//! processing error abort the whole plan.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::preprocess::{PrepareOptions, PreparedImage, DEFAULT_MAX_BYTES, DEFAULT_MAX_SIDE};

/// Identifier of one recognition backend offered by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineId(pub u8);

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-facing recognition options
#[derive(Debug, Clone)]
pub struct RecognitionOptions {
    /// Language code understood by the service (e.g. "eng")
    pub language: String,
    /// Preferred engine, tried first
    pub engine: EngineId,
    /// Let the service upscale low-resolution input
    pub scale: bool,
    /// Let the service auto-rotate the photo
    pub detect_orientation: bool,
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            engine: EngineId(3),
            scale: true,
            detect_orientation: true,
        }
    }
}

/// One upload to the service, bound to a single engine
#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    pub language: String,
    pub engine: EngineId,
    pub scale: bool,
    pub detect_orientation: bool,
}

/// What the service answered to a single upload
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceReply {
    /// Recognized text (may be empty)
    Text(String),
    /// The service reported a processing error in an otherwise valid response
    ProcessingError { message: String },
    /// Non-success HTTP status
    HttpStatus { status: u16, message: String },
}

/// Failure to obtain any reply from the service
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

/// Transport to the external recognition service
#[async_trait]
pub trait RecognitionTransport: Send + Sync {
    /// Upload `image` once and return the service's reply
    async fn submit(
        &self,
        image: &PreparedImage,
        request: &RecognitionRequest,
    ) -> Result<ServiceReply, TransportError>;
}

#[async_trait]
impl<T: RecognitionTransport + ?Sized> RecognitionTransport for std::sync::Arc<T> {
    async fn submit(
        &self,
        image: &PreparedImage,
        request: &RecognitionRequest,
    ) -> Result<ServiceReply, TransportError> {
        (**self).submit(image, request).await
    }
}

/// Engine fallback and backoff policy
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Tries per engine before moving to the next one
    pub attempts_per_engine: u32,
    /// Engines appended after the requested one
    pub fallback_engines: Vec<EngineId>,
    /// Backoff unit after a transport failure
    pub network_backoff: Duration,
    /// Backoff unit after an HTTP 5xx
    pub server_error_backoff: Duration,
    /// Backoff unit after a processing timeout
    pub timeout_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts_per_engine: 2,
            fallback_engines: vec![EngineId(2), EngineId(1)],
            network_backoff: Duration::from_millis(600),
            server_error_backoff: Duration::from_millis(500),
            timeout_backoff: Duration::from_millis(600),
        }
    }
}

impl RetryPolicy {
    /// Requested engine first, then the fallbacks, without duplicates
    pub fn engine_plan(&self, requested: EngineId) -> Vec<EngineId> {
        let mut plan = vec![requested];
        for engine in &self.fallback_engines {
            if !plan.contains(engine) {
                plan.push(*engine);
            }
        }
        plan
    }
}

/// Hard bounds an upload must satisfy before it is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_bytes: usize,
    pub max_side: u32,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            max_side: DEFAULT_MAX_SIDE,
        }
    }
}

impl From<&PrepareOptions> for UploadLimits {
    fn from(options: &PrepareOptions) -> Self {
        Self {
            max_bytes: options.max_bytes,
            max_side: options.max_side,
        }
    }
}

impl UploadLimits {
    pub fn admits(&self, image: &PreparedImage) -> bool {
        image.size() <= self.max_bytes && image.longest_side() <= self.max_side
    }
}

/// Successful recognition
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    /// Raw recognized text
    pub text: String,
    /// Engine that produced the text
    pub engine: EngineId,
    /// Total uploads made, including the successful one
    pub attempts: u32,
}

/// A retryable failure of a single attempt
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AttemptFailure {
    #[error("transport failure on engine {engine}: {message}")]
    Network { engine: EngineId, message: String },
    #[error("HTTP {status} from engine {engine}: {message}")]
    ServerError {
        engine: EngineId,
        status: u16,
        message: String,
    },
    #[error("engine {engine} timed out: {message}")]
    Timeout { engine: EngineId, message: String },
    #[error("engine {engine} returned no text")]
    EmptyText { engine: EngineId },
}

/// Terminal recognition failure
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("recognition rejected by engine {engine}: {message}")]
    Rejected {
        engine: EngineId,
        status: Option<u16>,
        message: String,
        attempts: u32,
    },
    #[error("recognition failed after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        last: Option<AttemptFailure>,
    },
    #[error("upload of {size} bytes, {longest_side}px exceeds the {max_bytes} byte / {max_side}px budget")]
    OverBudget {
        size: usize,
        longest_side: u32,
        max_bytes: usize,
        max_side: u32,
    },
    #[error("recognition cancelled")]
    Cancelled,
}

/// Whether a processing error message denotes the retryable timeout condition
pub fn is_timeout_message(message: &str) -> bool {
    message.to_ascii_uppercase().contains("E101") || message.to_ascii_lowercase().contains("timed out")
}

/// Runs the engine plan against a transport
pub struct RecognitionOrchestrator<T> {
    transport: T,
    policy: RetryPolicy,
    limits: UploadLimits,
}

impl<T: RecognitionTransport> RecognitionOrchestrator<T> {
    pub fn new(transport: T) -> Self {
        Self::with_policy(transport, RetryPolicy::default())
    }

    pub fn with_policy(transport: T, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            limits: UploadLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: UploadLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn limits(&self) -> UploadLimits {
        self.limits
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Recognize text in `image`, walking the engine plan until one try succeeds
    pub async fn recognize(
        &self,
        image: &PreparedImage,
        options: &RecognitionOptions,
        cancel: &CancellationToken,
    ) -> Result<Recognition, RecognitionError> {
        if !self.limits.admits(image) {
            warn!(size = image.size(), side = image.longest_side(), "Refusing over-budget upload");
            return Err(RecognitionError::OverBudget {
                size: image.size(),
                longest_side: image.longest_side(),
                max_bytes: self.limits.max_bytes,
                max_side: self.limits.max_side,
            });
        }

        let plan = self.policy.engine_plan(options.engine);
        let tries_per_engine = self.policy.attempts_per_engine.max(1);
        let total_tries = plan.len() as u32 * tries_per_engine;

        let mut attempts = 0u32;
        let mut last = None;

        for engine in plan {
            for attempt in 1..=tries_per_engine {
                if cancel.is_cancelled() {
                    return Err(RecognitionError::Cancelled);
                }

                attempts += 1;
                let request = RecognitionRequest {
                    language: options.language.clone(),
                    engine,
                    scale: options.scale,
                    detect_orientation: options.detect_orientation,
                };

                debug!(engine = %engine, attempt, "Submitting image for recognition");

                let reply = tokio::select! {
                    _ = cancel.cancelled() => return Err(RecognitionError::Cancelled),
                    reply = self.transport.submit(image, &request) => reply,
                };

                let (failure, backoff) = match reply {
                    Ok(ServiceReply::Text(text)) if !text.trim().is_empty() => {
                        info!(engine = %engine, attempts, "Recognition succeeded ({} chars)", text.len());
                        return Ok(Recognition { text, engine, attempts });
                    }
                    Ok(ServiceReply::Text(_)) => (AttemptFailure::EmptyText { engine }, Duration::ZERO),
                    Ok(ServiceReply::HttpStatus { status, message }) if status >= 500 => (
                        AttemptFailure::ServerError { engine, status, message },
                        self.policy.server_error_backoff * attempt,
                    ),
                    Ok(ServiceReply::HttpStatus { status, message }) => {
                        warn!(engine = %engine, status, "Recognition rejected: {}", message);
                        return Err(RecognitionError::Rejected {
                            engine,
                            status: Some(status),
                            message,
                            attempts,
                        });
                    }
                    Ok(ServiceReply::ProcessingError { message }) if is_timeout_message(&message) => (
                        AttemptFailure::Timeout { engine, message },
                        self.policy.timeout_backoff * attempt,
                    ),
                    Ok(ServiceReply::ProcessingError { message }) => {
                        warn!(engine = %engine, "Recognition processing error: {}", message);
                        return Err(RecognitionError::Rejected {
                            engine,
                            status: None,
                            message,
                            attempts,
                        });
                    }
                    Err(err) => (
                        AttemptFailure::Network {
                            engine,
                            message: err.to_string(),
                        },
                        self.policy.network_backoff * attempt,
                    ),
                };

                warn!(engine = %engine, attempt, "Recognition attempt failed: {}", failure);
                last = Some(failure);

                if attempts < total_tries && !backoff.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(RecognitionError::Cancelled),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }

        Err(RecognitionError::Exhausted { attempts, last })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Transport that replays a fixed script and records the engines it saw
    struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<ServiceReply, TransportError>>>,
        engines: Mutex<Vec<EngineId>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Result<ServiceReply, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                engines: Mutex::new(Vec::new()),
            })
        }

        fn engines(&self) -> Vec<EngineId> {
            self.engines.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RecognitionTransport for ScriptedTransport {
        async fn submit(
            &self,
            _image: &PreparedImage,
            request: &RecognitionRequest,
        ) -> Result<ServiceReply, TransportError> {
            self.engines.lock().unwrap().push(request.engine);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Unavailable("script exhausted".into())))
        }
    }

    fn image() -> PreparedImage {
        PreparedImage {
            data: vec![1, 2, 3],
            mime: "image/jpeg".into(),
            width: 10,
            height: 10,
            reencoded: false,
        }
    }

    fn timeout() -> Result<ServiceReply, TransportError> {
        Ok(ServiceReply::ProcessingError {
            message: "E101: Timed out waiting for results".into(),
        })
    }

    fn text(t: &str) -> Result<ServiceReply, TransportError> {
        Ok(ServiceReply::Text(t.into()))
    }

    #[test]
    fn test_engine_plan_deduplicates() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.engine_plan(EngineId(3)), vec![EngineId(3), EngineId(2), EngineId(1)]);
        assert_eq!(policy.engine_plan(EngineId(2)), vec![EngineId(2), EngineId(1)]);
        assert_eq!(policy.engine_plan(EngineId(1)), vec![EngineId(1), EngineId(2)]);
    }

    #[test]
    fn test_timeout_detection() {
        assert!(is_timeout_message("E101: something"));
        assert!(is_timeout_message("Server Timed Out"));
        assert!(!is_timeout_message("E301: Unable to parse image"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_success_short_circuits() {
        let transport = ScriptedTransport::new(vec![text("MODEL: SUN-10K-G")]);
        let orchestrator = RecognitionOrchestrator::new(transport.clone());

        let result = orchestrator
            .recognize(&image(), &RecognitionOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.engine, EngineId(3));
        assert_eq!(result.attempts, 1);
        assert_eq!(transport.engines(), vec![EngineId(3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_timeouts_then_fallback_engine() {
        let transport = ScriptedTransport::new(vec![timeout(), timeout(), text("S/N: 2201A00123456789")]);
        let orchestrator = RecognitionOrchestrator::new(transport.clone());

        let result = orchestrator
            .recognize(&image(), &RecognitionOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.text, "S/N: 2201A00123456789");
        assert_eq!(result.engine, EngineId(2));
        assert_eq!(result.attempts, 3);
        assert_eq!(transport.engines(), vec![EngineId(3), EngineId(3), EngineId(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_aborts_plan() {
        let transport = ScriptedTransport::new(vec![
            Ok(ServiceReply::HttpStatus {
                status: 403,
                message: "invalid api key".into(),
            }),
            text("never reached"),
        ]);
        let orchestrator = RecognitionOrchestrator::new(transport.clone());

        let err = orchestrator
            .recognize(&image(), &RecognitionOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, RecognitionError::Rejected { status: Some(403), attempts: 1, .. }));
        assert_eq!(transport.engines().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_timeout_processing_error_aborts_plan() {
        let transport = ScriptedTransport::new(vec![Ok(ServiceReply::ProcessingError {
            message: "E301: Unable to recognize the file type".into(),
        })]);
        let orchestrator = RecognitionOrchestrator::new(transport);

        let err = orchestrator
            .recognize(&image(), &RecognitionOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, RecognitionError::Rejected { status: None, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_errors_and_network_failures_are_retried() {
        let transport = ScriptedTransport::new(vec![
            Ok(ServiceReply::HttpStatus {
                status: 502,
                message: "bad gateway".into(),
            }),
            Err(TransportError::Unavailable("connection reset".into())),
            text("SOLIS S6-GR1P5K"),
        ]);
        let orchestrator = RecognitionOrchestrator::new(transport);

        let result = orchestrator
            .recognize(&image(), &RecognitionOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.engine, EngineId(2));
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_over_budget_upload_is_refused() {
        let transport = ScriptedTransport::new(vec![text("never reached")]);
        let orchestrator = RecognitionOrchestrator::new(transport.clone());
        let oversized = PreparedImage {
            data: vec![0u8; 3 * 1024 * 1024],
            mime: "image/jpeg".into(),
            width: 5000,
            height: 4000,
            reencoded: false,
        };

        let err = orchestrator
            .recognize(&oversized, &RecognitionOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RecognitionError::OverBudget {
                size: 3_145_728,
                longest_side: 5000,
                ..
            }
        ));
        assert!(transport.engines().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_geometry_is_refused() {
        let transport = ScriptedTransport::new(vec![text("never reached")]);
        let orchestrator = RecognitionOrchestrator::new(transport.clone()).with_limits(UploadLimits {
            max_bytes: 1024,
            max_side: 8,
        });

        let err = orchestrator
            .recognize(&image(), &RecognitionOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, RecognitionError::OverBudget { longest_side: 10, max_side: 8, .. }));
        assert!(transport.engines().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_backoff_grows_per_attempt() {
        let transport = ScriptedTransport::new(vec![timeout(), timeout(), text("DEYE")]);
        let orchestrator = RecognitionOrchestrator::new(transport);

        let started = tokio::time::Instant::now();
        let result = orchestrator
            .recognize(&image(), &RecognitionOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        // 600ms after the first try, 1200ms after the second
        assert_eq!(result.attempts, 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1800), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(1810), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_then_network_backoff() {
        let transport = ScriptedTransport::new(vec![
            Ok(ServiceReply::HttpStatus {
                status: 502,
                message: "bad gateway".into(),
            }),
            Err(TransportError::Unavailable("connection reset".into())),
            text("DEYE"),
        ]);
        let orchestrator = RecognitionOrchestrator::new(transport);

        let started = tokio::time::Instant::now();
        orchestrator
            .recognize(&image(), &RecognitionOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        // 500ms after the 502 on attempt 1, 1200ms after the network error on attempt 2
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1700), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(1710), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_last_failure() {
        let transport = ScriptedTransport::new(vec![timeout(), timeout(), timeout(), timeout(), timeout(), timeout()]);
        let orchestrator = RecognitionOrchestrator::new(transport.clone());

        let err = orchestrator
            .recognize(&image(), &RecognitionOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            RecognitionError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 6);
                assert!(matches!(last, Some(AttemptFailure::Timeout { engine: EngineId(1), .. })));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(transport.engines().len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_text_moves_on() {
        let transport = ScriptedTransport::new(vec![text("   "), text("DEYE")]);
        let orchestrator = RecognitionOrchestrator::new(transport);

        let result = orchestrator
            .recognize(&image(), &RecognitionOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.text, "DEYE");
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_first_attempt() {
        let transport = ScriptedTransport::new(vec![text("never reached")]);
        let orchestrator = RecognitionOrchestrator::new(transport.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = orchestrator
            .recognize(&image(), &RecognitionOptions::default(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, RecognitionError::Cancelled));
        assert!(transport.engines().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_abandons_retries() {
        let transport = ScriptedTransport::new(vec![timeout(), text("never reached")]);
        let orchestrator = RecognitionOrchestrator::new(transport.clone());
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let err = orchestrator
            .recognize(&image(), &RecognitionOptions::default(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, RecognitionError::Cancelled));
        assert_eq!(transport.engines().len(), 1);
    }
}
