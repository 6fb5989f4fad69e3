//! OCR Server Library
//!
//! HTTP front end for a vision-language OCR model. The model runs behind an
//! [`engine::EngineBackend`]; this crate owns its lifecycle, the per-request
//! pipeline and the on-disk staging areas.
//!
//! # Modules
//!
//! - `engine`: Engine lifecycle manager and backend seam
//! - `ocr`: Inference request pipeline
//! - `cleanup`: Age-based maintenance sweep
//! - `routes`: HTTP endpoints

pub mod cleanup;
pub mod config;
pub mod engine;
pub mod error;
pub mod ocr;
pub mod routes;
pub mod state;
