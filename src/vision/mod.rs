//! Vision/OCR Layer
//!
//! Prepares captured photos for upload and obtains recognized text from the
//! external recognition service:
//! - `preprocess`: size and geometry budget for uploads
//! - `recognition`: engine fallback and retry orchestration
//! - `ocr_space`: OCR.space HTTP transport

pub mod ocr_space;
pub mod preprocess;
pub mod recognition;

pub use ocr_space::OcrSpaceClient;
pub use preprocess::{prepare, OutputFormat, PrepareOptions, PreparedImage, PreprocessError};
pub use recognition::{
    AttemptFailure, EngineId, Recognition, RecognitionError, RecognitionOptions, RecognitionOrchestrator,
    RecognitionRequest, RecognitionTransport, RetryPolicy, ServiceReply, TransportError, UploadLimits,
};
