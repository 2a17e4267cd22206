//! Orchestration core: from a trigger to exactly one published comment.
//!
//! trigger → [`classifier`] → [`context`] → [`analysis`] →
//! [`remediation`] (fix mode only) → [`publish`], driven by [`pipeline`].

pub mod analysis;
pub mod classifier;
pub mod context;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod publish;
pub mod remediation;
