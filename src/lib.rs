//! Nameplate Scan - equipment nameplate extraction engine
//!
//! Reads a photographed inverter or battery label and produces a structured
//! record (brand, category, model, serial, rating) for inventory assignment.

pub mod analysis;
pub mod app;
pub mod capture;
pub mod config;
pub mod storage;
pub mod vision;

pub use analysis::{extract, Brand, Category, ExtractionProfile, NameplateRecord};
pub use app::{InventorySink, LogSink, ScanError, ScanOutcome, ScanService, ScanTicket};
