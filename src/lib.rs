//! Formins Server Library
//!
//! PDF form field inference: detect prompts through a document-analysis
//! oracle, synthesize interactive widgets for them, and fill them back in.
//! The server binary in main.rs wires these modules behind an HTTP API.
//!
//! # Modules
//!
//! - `forms`: Classification, geometry, synthesis, analysis and filling
//! - `oracle`: Document analysis service client
//! - `routes`: HTTP handlers

pub mod config;
pub mod error;
pub mod forms;
pub mod oracle;
pub mod routes;
pub mod state;
