//! Mosaic - demand-driven asset pipeline for moddable applications
//!
//! Mosaic merges any number of read-only content sources into one
//! case-insensitive namespace, applies layered `.patch` overlays per path,
//! and serves typed, cached payloads - structured documents, decoded images,
//! decoded audio, fonts, raw byte blobs - from a fixed pool of worker
//! threads.
//!
//! The entry point is [`AssetPipeline`]; see the [`pipeline`] module for a
//! usage sketch. Sources are anything implementing [`Source`]; directory
//! trees and writable in-memory overlays ship in-crate. Script-based
//! patches run through the embedder-provided [`ScriptRuntime`] boundary.

pub mod cache;
pub mod config;
pub mod error;
pub mod frames;
pub mod id;
pub mod index;
pub mod path;
pub mod payload;
pub mod pipeline;
pub mod script;
pub mod source;

mod build;
mod patch;

pub use cache::{CacheStats, CleanupStats};
pub use config::EngineConfig;
pub use error::AssetError;
pub use frames::{FrameSpec, Rect};
pub use id::{AssetId, AssetKind, Directive};
pub use path::AssetPath;
pub use payload::{AssetPayload, AudioData, FontData, ImageData};
pub use pipeline::{AssetPipeline, PipelineBuilder};
pub use script::{ScriptContext, ScriptError, ScriptRuntime, ScriptValue};
pub use source::{DirectorySource, MemorySource, Source, SourceError, SourceMetadata};
