//! Shared types, error model, and configuration for Briefdesk.
//!
//! This crate is the foundation depended on by all other Briefdesk crates.
//! It provides:
//! - [`BriefdeskError`] — the unified error type
//! - Domain types ([`Edition`], [`Article`], [`SectionDraft`], [`ComplianceFlag`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, GenerativeConfig, ProvidersConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from,
};
pub use error::{BriefdeskError, Result};
pub use types::{
    Article, AuditEntry, ComplianceFlag, Edition, EditionId, EditionStatus, GenerationMode,
    SectionDraft, Severity,
};
