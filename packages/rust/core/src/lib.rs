//! Core engines for the Briefdesk editorial pipeline: orchestration,
//! verification, drafting, compliance scanning, annotation, and review
//! support.

pub mod annotate;
pub mod compliance;
pub mod drafting;
pub mod pipeline;
pub mod prompts;
pub mod review;
pub mod verification;

#[cfg(test)]
pub(crate) mod testing;

pub use annotate::annotate_content;
pub use pipeline::{CancelToken, Pipeline, ProgressObserver, SilentObserver};
pub use review::{Disclaimer, can_approve, compute_disclaimers};
