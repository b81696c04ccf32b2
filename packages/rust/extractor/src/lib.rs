//! Schema-constrained extraction from materialized HTML.
//!
//! This crate provides:
//! - [`schema`]: strict output contracts derived from Rust types
//! - [`engine`]: the [`ExtractionEngine`] seam and an OpenAI-compatible backend
//! - [`extract`] / [`extract_listing`]: one engine call plus validation

pub mod engine;
pub mod schema;

pub use engine::{EngineRequest, ExtractionEngine, OpenAiEngine};
pub use schema::{ExtractionSchema, OutputContract};

use tracing::{info, instrument};

use lazylist_shared::{ExtractionResult, LazyListError, Result};

/// Instruction used for product listings.
pub const DEFAULT_INSTRUCTION: &str = "Extract all products.";

/// Run `engine` once over `content` and validate the answer against `T`.
///
/// No retries and no repair: a non-conforming answer is an
/// [`LazyListError::ExtractionEngine`] error.
#[instrument(skip_all, fields(engine = engine.name(), bytes = content.len()))]
pub async fn extract<T: OutputContract>(
    engine: &dyn ExtractionEngine,
    content: &str,
    instruction: &str,
) -> Result<T> {
    if instruction.trim().is_empty() {
        return Err(LazyListError::validation(
            "extraction instruction must not be empty",
        ));
    }

    let schema = T::contract();
    let request = EngineRequest {
        prompt: instruction,
        source: content,
        schema: &schema,
    };

    let raw = engine.run(&request).await?;
    schema.validate(raw)
}

/// Extract listing items with [`DEFAULT_INSTRUCTION`].
pub async fn extract_listing(
    engine: &dyn ExtractionEngine,
    content: &str,
) -> Result<ExtractionResult> {
    let result: ExtractionResult = extract(engine, content, DEFAULT_INSTRUCTION).await?;
    info!(items = result.len(), "listing extracted");
    Ok(result)
}
