//! Shared types, error model, and configuration for lazylist.
//!
//! This crate is the foundation depended on by all other lazylist crates.
//! It provides:
//! - [`LazyListError`]: the unified error type
//! - Domain types ([`Item`], [`ExtractionResult`])
//! - Configuration ([`AppConfig`], [`ScrollConfig`], [`EngineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DEFAULT_STABLE_CHECKS, DefaultsConfig, EngineConfig, EngineSection, ListingConfig,
    MAX_SCROLLS_LIMIT, ScrollConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from,
};
pub use error::{LazyListError, Result};
pub use types::{ExtractionResult, Item};
