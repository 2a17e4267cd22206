//! Core types, configuration, and error handling for prwarden.
//!
//! This crate provides the shared foundation used by the other prwarden crates:
//! - [`WardenError`]: unified error type using `thiserror`
//! - [`WardenConfig`]: configuration loaded from `.prwarden.toml`
//! - The run data model: [`Trigger`], [`Instruction`], [`Mode`],
//!   [`ReviewContext`], [`AnalysisResult`], [`RemediationBranch`]

mod config;
mod error;
mod types;

pub use config::{
    ContextConfig, GitHubConfig, LlmConfig, LlmProvider, PublishConfig, RemediationConfig,
    TriggerConfig, WardenConfig,
};
pub use error::WardenError;
pub use types::{
    AnalysisResult, ChangedFile, EventKind, FileEdit, Instruction, Mode, OmitReason, OmittedFile,
    OutputFormat, PriorCommand, RemediationBranch, RemediationPr, ReviewContext, SubjectKind,
    SubjectMetadata, SubjectRef, Trigger,
};

/// A convenience `Result` type for prwarden operations.
pub type Result<T> = std::result::Result<T, WardenError>;
