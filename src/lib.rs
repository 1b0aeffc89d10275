//! Document Agent Orchestrator
//!
//! A request-routing workflow engine for a document-editing assistant:
//! - Classifies each natural-language request into one of four operations
//! - Optionally augments it with live financial data (cached, retry-bounded)
//! - Executes exactly one operation handler
//! - Synthesizes a single structured response
//!
//! PIPELINE:
//! INGRESS -> ROUTE -> AUGMENT? -> HANDLE -> SYNTHESIZE
//!
//! Every stage catches its own failures; the engine always terminates with a
//! well-formed response.

pub mod api;
pub mod augmentation;
pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod host;
pub mod models;
pub mod nlu;
pub mod orchestrator;
pub mod provider;
pub mod router;
pub mod synthesizer;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use orchestrator::WorkflowEngine;
