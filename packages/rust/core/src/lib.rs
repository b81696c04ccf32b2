//! Search orchestration for lazylist.
//!
//! Ties page materialization and schema-constrained extraction into one
//! end-to-end workflow ([`pipeline::run_search`]).

pub mod pipeline;

pub use pipeline::{
    ProgressReporter, SearchConfig, SearchReport, SilentProgress, run_search, search_url,
};
