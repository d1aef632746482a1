//! Scan Service
//!
//! Runs the whole nameplate pipeline for one photo: upload budget,
//! recognition, field extraction, photo archival and the hand-off to the
//! inventory. Scans run either to completion (`scan`) or in the background
//! after a synchronous acceptance check (`submit`).

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::analysis::{self, ExtractionProfile, NameplateRecord};
use crate::capture::CapturedImage;
use crate::config::AppConfig;
use crate::storage::{HttpPhotoStore, LocalPhotoStore, PhotoStore, StorageError, StoredPhoto};
use crate::vision::{
    prepare, EngineId, OcrSpaceClient, PrepareOptions, PreparedImage, PreprocessError, RecognitionError,
    RecognitionOptions, RecognitionOrchestrator, RecognitionTransport, RetryPolicy, TransportError, UploadLimits,
};

/// Result of a completed scan
#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub request_id: String,
    pub record: NameplateRecord,
    /// Engine that produced the text
    pub engine: EngineId,
    /// Uploads made to the recognition service
    pub attempts: u32,
    pub photo: Option<StoredPhoto>,
}

/// Acknowledgement for a background scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanTicket {
    pub request_id: String,
    pub status: String,
    pub message: String,
}

impl ScanTicket {
    fn accepted(request_id: String) -> Self {
        Self {
            request_id,
            status: "processing_background".to_string(),
            message: "Accepted. Processing...".to_string(),
        }
    }
}

/// A scan accepted for background processing
pub struct BackgroundScan {
    pub ticket: ScanTicket,
    pub handle: JoinHandle<Result<ScanOutcome, ScanError>>,
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Recognition(#[from] RecognitionError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("preprocessing task failed: {0}")]
    Worker(#[from] JoinError),
}

/// Receives scans that resolved both brand and model
#[async_trait]
pub trait InventorySink: Send + Sync {
    async fn assign(&self, installation_id: &str, outcome: &ScanOutcome) -> anyhow::Result<()>;
}

/// Sink that only logs assignments
pub struct LogSink;

#[async_trait]
impl InventorySink for LogSink {
    async fn assign(&self, installation_id: &str, outcome: &ScanOutcome) -> anyhow::Result<()> {
        info!(
            installation_id,
            request_id = %outcome.request_id,
            serial = outcome.record.serial.as_deref().unwrap_or("-"),
            "Assigning {}",
            outcome.record.display_name()
        );
        Ok(())
    }
}

/// End-to-end scan pipeline
#[derive(Clone)]
pub struct ScanService {
    orchestrator: Arc<RecognitionOrchestrator<Arc<dyn RecognitionTransport>>>,
    prepare_options: PrepareOptions,
    recognition: RecognitionOptions,
    profile: ExtractionProfile,
    photos: Option<Arc<dyn PhotoStore>>,
    sink: Arc<dyn InventorySink>,
    /// Cancels background scans on shutdown
    shutdown: CancellationToken,
}

impl ScanService {
    /// Create a service with default settings around `transport`
    pub fn new(transport: Arc<dyn RecognitionTransport>) -> Self {
        Self {
            orchestrator: Arc::new(RecognitionOrchestrator::new(transport)),
            prepare_options: PrepareOptions::default(),
            recognition: RecognitionOptions::default(),
            profile: ExtractionProfile::default(),
            photos: None,
            sink: Arc::new(LogSink),
            shutdown: CancellationToken::new(),
        }
    }

    /// Build the service described by `config`, talking to OCR.space
    pub fn from_config(config: &AppConfig) -> Result<Self, ScanError> {
        let client = OcrSpaceClient::new(
            config.ocr.endpoint.clone(),
            config.ocr.api_key.clone(),
            config.ocr.timeout(),
        )?;

        let photos: Option<Arc<dyn PhotoStore>> =
            match (&config.storage.photo_service_url, &config.storage.photo_dir) {
                (Some(url), _) => Some(Arc::new(HttpPhotoStore::new(url, config.ocr.timeout())?) as Arc<dyn PhotoStore>),
                (None, Some(dir)) => Some(Arc::new(LocalPhotoStore::new(dir.clone())) as Arc<dyn PhotoStore>),
                (None, None) => None,
            };

        let mut service = Self::new(Arc::new(client))
            .with_policy(config.retry.policy())
            .with_prepare_options(config.preprocess.options())
            .with_recognition_options(config.ocr.recognition_options())
            .with_profile(config.extraction.profile());
        service.photos = photos;

        Ok(service)
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.rebuild_orchestrator(policy);
        self
    }

    /// Preprocessing settings; the byte and edge bounds are also enforced on
    /// every upload.
    pub fn with_prepare_options(mut self, options: PrepareOptions) -> Self {
        self.prepare_options = options;
        self.rebuild_orchestrator(self.orchestrator.policy().clone());
        self
    }

    fn rebuild_orchestrator(&mut self, policy: RetryPolicy) {
        let transport = Arc::clone(self.orchestrator.transport());
        let limits = UploadLimits::from(&self.prepare_options);
        self.orchestrator = Arc::new(RecognitionOrchestrator::with_policy(transport, policy).with_limits(limits));
    }

    pub fn with_recognition_options(mut self, options: RecognitionOptions) -> Self {
        self.recognition = options;
        self
    }

    pub fn with_profile(mut self, profile: ExtractionProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_photo_store(mut self, store: Arc<dyn PhotoStore>) -> Self {
        self.photos = Some(store);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn InventorySink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn profile(&self) -> &ExtractionProfile {
        &self.profile
    }

    /// Scan `image` to completion
    pub async fn scan(
        &self,
        image: &CapturedImage,
        installation_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome, ScanError> {
        let request_id = Uuid::new_v4().to_string();
        let prepared = self.prepare_blocking(image).await?;
        self.run(request_id, prepared, installation_id, cancel).await
    }

    /// Accept `image` for background processing.
    ///
    /// Preprocessing completes before returning, so budget failures are
    /// reported here rather than lost in the background task.
    pub async fn submit(
        &self,
        image: &CapturedImage,
        installation_id: Option<String>,
    ) -> Result<BackgroundScan, ScanError> {
        let request_id = Uuid::new_v4().to_string();
        let prepared = self.prepare_blocking(image).await?;

        let service = self.clone();
        let cancel = self.shutdown.child_token();
        let task_id = request_id.clone();
        let handle = tokio::spawn(async move {
            let result = service
                .run(task_id.clone(), prepared, installation_id.as_deref(), &cancel)
                .await;
            if let Err(e) = &result {
                error!(request_id = %task_id, "Background scan failed: {}", e);
            }
            result
        });

        info!(request_id = %request_id, "Scan accepted for background processing");

        Ok(BackgroundScan {
            ticket: ScanTicket::accepted(request_id),
            handle,
        })
    }

    /// Decode and re-encode on the blocking pool
    async fn prepare_blocking(&self, image: &CapturedImage) -> Result<PreparedImage, ScanError> {
        let image = image.clone();
        let options = self.prepare_options.clone();
        let prepared = tokio::task::spawn_blocking(move || prepare(&image, &options)).await??;
        Ok(prepared)
    }

    /// Cancel all background scans
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn run(
        &self,
        request_id: String,
        prepared: PreparedImage,
        installation_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome, ScanError> {
        let recognition = self
            .orchestrator
            .recognize(&prepared, &self.recognition, cancel)
            .await?;

        let record = analysis::extract(&recognition.text, &self.profile);
        info!(
            request_id = %request_id,
            brand = ?record.brand,
            model = record.model.as_deref().unwrap_or("-"),
            serial = record.serial.as_deref().unwrap_or("-"),
            "Nameplate extracted"
        );

        let photo = match &self.photos {
            Some(store) => {
                let owner = installation_id.unwrap_or("unassigned");
                match store.store(&prepared, owner, record.serial.as_deref()).await {
                    Ok(photo) => Some(photo),
                    Err(e) => {
                        warn!(request_id = %request_id, "Photo storage failed: {}", e);
                        None
                    }
                }
            }
            None => None,
        };

        let outcome = ScanOutcome {
            request_id,
            record,
            engine: recognition.engine,
            attempts: recognition.attempts,
            photo,
        };

        match installation_id {
            Some(installation_id) if outcome.record.is_assignable() => {
                if let Err(e) = self.sink.assign(installation_id, &outcome).await {
                    warn!(request_id = %outcome.request_id, "Inventory assignment failed: {:#}", e);
                }
            }
            Some(_) => info!(request_id = %outcome.request_id, "Detection incomplete, skipping assign"),
            None => {}
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Brand;
    use crate::vision::{RecognitionRequest, ServiceReply};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FixedText(&'static str);

    #[async_trait]
    impl RecognitionTransport for FixedText {
        async fn submit(
            &self,
            _image: &PreparedImage,
            _request: &RecognitionRequest,
        ) -> Result<ServiceReply, TransportError> {
            Ok(ServiceReply::Text(self.0.to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        assigned: Mutex<Vec<(String, ScanOutcome)>>,
    }

    #[async_trait]
    impl InventorySink for RecordingSink {
        async fn assign(&self, installation_id: &str, outcome: &ScanOutcome) -> anyhow::Result<()> {
            self.assigned
                .lock()
                .unwrap()
                .push((installation_id.to_string(), outcome.clone()));
            Ok(())
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl PhotoStore for BrokenStore {
        async fn store(
            &self,
            _photo: &PreparedImage,
            _installation_id: &str,
            _serial: Option<&str>,
        ) -> Result<StoredPhoto, StorageError> {
            Err(StorageError::Malformed("offline".into()))
        }
    }

    fn photo() -> CapturedImage {
        CapturedImage::new(vec![0xff, 0xd8, 0xff, 0xe0], "image/jpeg", 640, 480)
    }

    const DEYE_LABEL: &str = "DEYE\nMODEL: SUN-10K-G  S/N: 2201A00123456789";

    #[tokio::test]
    async fn test_scan_assigns_and_stores_photo() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let service = ScanService::new(Arc::new(FixedText(DEYE_LABEL)))
            .with_photo_store(Arc::new(LocalPhotoStore::new(dir.path())))
            .with_sink(sink.clone());

        let outcome = service
            .scan(&photo(), Some("inst-9"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.record.brand, Some(Brand::Deye));
        assert_eq!(outcome.engine, EngineId(3));
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.photo.is_some());

        let assigned = sink.assigned.lock().unwrap();
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].0, "inst-9");
        assert_eq!(assigned[0].1.record.model.as_deref(), Some("SUN-10K-G"));
    }

    #[tokio::test]
    async fn test_unresolved_scan_is_not_assigned() {
        let sink = Arc::new(RecordingSink::default());
        let service = ScanService::new(Arc::new(FixedText("GENERIC LABEL 123"))).with_sink(sink.clone());

        let outcome = service
            .scan(&photo(), Some("inst-9"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.record.brand, None);
        assert!(sink.assigned.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_is_not_fatal() {
        let service = ScanService::new(Arc::new(FixedText(DEYE_LABEL))).with_photo_store(Arc::new(BrokenStore));

        let outcome = service.scan(&photo(), None, &CancellationToken::new()).await.unwrap();

        assert!(outcome.photo.is_none());
        assert_eq!(outcome.record.serial.as_deref(), Some("2201A00123456789"));
    }

    #[tokio::test]
    async fn test_cancelled_scan() {
        let service = ScanService::new(Arc::new(FixedText(DEYE_LABEL)));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = service.scan(&photo(), None, &cancel).await.unwrap_err();
        assert!(matches!(err, ScanError::Recognition(RecognitionError::Cancelled)));
    }

    #[tokio::test]
    async fn test_submit_returns_ticket_and_finishes_in_background() {
        let sink = Arc::new(RecordingSink::default());
        let service = ScanService::new(Arc::new(FixedText(DEYE_LABEL))).with_sink(sink.clone());

        let scan = service.submit(&photo(), Some("inst-1".to_string())).await.unwrap();
        assert_eq!(scan.ticket.status, "processing_background");
        assert_eq!(scan.ticket.message, "Accepted. Processing...");

        let outcome = scan.handle.await.unwrap().unwrap();
        assert_eq!(outcome.request_id, scan.ticket.request_id);
        assert_eq!(sink.assigned.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_rejects_unpreparable_input_synchronously() {
        let service = ScanService::new(Arc::new(FixedText(DEYE_LABEL))).with_prepare_options(PrepareOptions {
            max_bytes: 4,
            ..PrepareOptions::default()
        });
        let document = CapturedImage::new(b"%PDF-1.7 nameplate".to_vec(), "application/pdf", 0, 0);

        let result = service.submit(&document, None).await;
        assert!(matches!(result, Err(ScanError::Preprocess(PreprocessError::NotAnImage(_)))));
    }

    #[tokio::test]
    async fn test_upload_limits_follow_prepare_options() {
        let options = PrepareOptions {
            max_bytes: 2048,
            max_side: 1024,
            ..PrepareOptions::default()
        };
        let service = ScanService::new(Arc::new(FixedText(DEYE_LABEL)))
            .with_prepare_options(options)
            .with_policy(RetryPolicy::default());

        assert_eq!(
            service.orchestrator.limits(),
            UploadLimits {
                max_bytes: 2048,
                max_side: 1024
            }
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_scan_prepares_large_photo_off_the_runtime() {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_fn(3000, 2000, |x, y| {
            image::Rgb([(x / 12) as u8, (y / 8) as u8, 128])
        }));
        let mut png = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let captured = CapturedImage::new(png, "image/png", 3000, 2000);
        let service = ScanService::new(Arc::new(FixedText(DEYE_LABEL)));

        let outcome = service.scan(&captured, None, &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.record.model.as_deref(), Some("SUN-10K-G"));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_background_scans() {
        let service = ScanService::new(Arc::new(FixedText(DEYE_LABEL)));
        service.shutdown();

        let scan = service.submit(&photo(), None).await.unwrap();
        let result = scan.handle.await.unwrap();
        assert!(matches!(result, Err(ScanError::Recognition(RecognitionError::Cancelled))));
    }
}
