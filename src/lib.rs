//! # rustsds
//!
//! Multi-source Safety Data Sheet generator - Rust Microservice
//!
//! ## Modules
//!
//! - [`molecule`] - SMILES parsing, substructure matching and descriptors
//! - [`hazards`] - Structural hazard rules
//! - [`toxicity`] - Rule-based acute toxicity prediction
//! - [`compound`] - PubChem identity lookup
//! - [`sources`] - Regulatory data adapters (PubChem, ChemIDplus, NIST, ECHA)
//! - [`fusion`] - Priority merge and validation of partial records
//! - [`backfill`] - Generative and canned filling of the remaining gaps
//! - [`assembler`] - The 16-section document
//! - [`render`] - JSON, CSV, DOCX and PDF output
//! - [`pipeline`] - End-to-end generation
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rustsds::{OutputFormat, PipelineConfig, SdsGenerator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let generator = SdsGenerator::from_config(PipelineConfig::default())?;
//!     let sds = generator.generate("CCO").await?;
//!     println!("{}: {} unresolved fields", sds.compound_name, sds.unresolved_fields.len());
//!     let pdf = generator.generate_rendered("CCO", OutputFormat::Pdf).await?;
//!     std::fs::write(&pdf.filename, &pdf.bytes)?;
//!     Ok(())
//! }
//! ```

pub mod assembler;
pub mod backfill;
pub mod cache;
pub mod compound;
pub mod config;
pub mod error;
pub mod fusion;
pub mod hazards;
pub mod llm;
pub mod molecule;
pub mod normalize;
pub mod pipeline;
pub mod prompts;
pub mod render;
pub mod schema;
pub mod sources;
pub mod toxicity;

pub use assembler::SdsDocument;
pub use config::PipelineConfig;
pub use error::{Result, SdsError, SourceError};
pub use llm::LlmConfig;
pub use pipeline::SdsGenerator;
pub use render::{OutputFormat, RenderedDocument};
