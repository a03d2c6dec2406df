//! Typed asset builders.
//!
//! One builder per payload kind, all driven by the cache orchestrator.
//! Builders are re-entrant against the orchestrator: when a build needs
//! another asset (a parent document, a sprite sheet, a mask image) it asks
//! the injected [`DependencyGateway`], which either hands back a cached
//! payload or enqueues the dependency and reports "not ready". A builder
//! never blocks; it returns [`BuildOutcome::Pending`] and the orchestrator
//! requeues the entry behind the dependency.

mod audio;
mod document;
mod image;

pub(crate) use audio::post_process_audio;

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::AssetError;
use crate::frames::FrameResolver;
use crate::id::{AssetId, AssetKind};
use crate::index::{FileDescriptor, OverlayIndex};
use crate::patch::PatchPipeline;
use crate::payload::{AssetPayload, FontData};

/// Result of one build attempt.
pub(crate) enum BuildOutcome {
    /// The payload is complete and can be cached.
    Ready(AssetPayload),

    /// The payload needs a post-process phase before it is served
    /// (compressed audio awaiting the decompression decision).
    PostProcess(AssetPayload),

    /// A dependency is not cached yet; requeue and retry later. Internal
    /// control flow only — this never surfaces as an error.
    Pending,
}

/// Non-blocking dependency access into the orchestrator.
///
/// `Ok(Some(_))` is a cached payload, `Ok(None)` means the dependency was
/// enqueued and is not ready, `Err` re-raises the dependency's failure
/// tombstone.
pub(crate) trait DependencyGateway: Sync {
    fn try_dependency(&self, id: &AssetId) -> Result<Option<AssetPayload>, AssetError>;
}

/// Everything a builder may touch, injected per build.
pub(crate) struct BuildContext<'a> {
    pub index: &'a OverlayIndex,
    pub patches: &'a PatchPipeline,
    pub frames: &'a FrameResolver,
    pub config: &'a EngineConfig,
    pub deps: &'a dyn DependencyGateway,
}

impl BuildContext<'_> {
    /// Descriptor lookup with the uniform not-found error.
    pub(crate) fn descriptor(&self, id: &AssetId) -> Result<&FileDescriptor, AssetError> {
        self.index
            .descriptor(id.path())
            .ok_or_else(|| AssetError::NotFound {
                path: id.path().to_string(),
            })
    }

    /// Base bytes of an id's path, read from the owning source.
    pub(crate) fn read_base(&self, id: &AssetId) -> Result<Vec<u8>, AssetError> {
        let descriptor = self.descriptor(id)?;
        descriptor.read().map_err(|err| AssetError::Source {
            path: id.path().to_string(),
            message: err.to_string(),
        })
    }
}

/// Builds one asset, dispatching on its kind.
pub(crate) fn build_asset(ctx: &BuildContext<'_>, id: &AssetId) -> Result<BuildOutcome, AssetError> {
    match id.kind() {
        AssetKind::Document => document::build(ctx, id),
        AssetKind::Image => image::build(ctx, id),
        AssetKind::Audio => audio::build(ctx, id),
        AssetKind::Font => build_font(ctx, id),
        AssetKind::Bytes => build_bytes(ctx, id),
    }
}

/// Runs the post-process phase of a loaded payload.
pub(crate) fn post_process_asset(
    ctx: &BuildContext<'_>,
    id: &AssetId,
    payload: AssetPayload,
) -> Result<AssetPayload, AssetError> {
    match payload {
        AssetPayload::Audio(audio) => post_process_audio(ctx, id, audio),
        other => Ok(other),
    }
}

fn build_font(ctx: &BuildContext<'_>, id: &AssetId) -> Result<BuildOutcome, AssetError> {
    let bytes = ctx.read_base(id)?;
    let font = fontdue::Font::from_bytes(bytes, fontdue::FontSettings::default()).map_err(
        |message| AssetError::Parse {
            path: id.path().to_string(),
            message: message.to_string(),
        },
    )?;
    Ok(BuildOutcome::Ready(AssetPayload::Font(Arc::new(FontData {
        font,
    }))))
}

/// Raw bytes pass through verbatim; the patch pipeline never applies.
fn build_bytes(ctx: &BuildContext<'_>, id: &AssetId) -> Result<BuildOutcome, AssetError> {
    let bytes = ctx.read_base(id)?;
    Ok(BuildOutcome::Ready(AssetPayload::Bytes(Arc::new(bytes))))
}


#[cfg(test)]
mod tests {
    use super::testing::Fixture;
    use super::*;

    #[test]
    fn test_bytes_builder_returns_raw_buffer() {
        let fixture = Fixture::new(&[("blob.bin", vec![1, 2, 3])]);
        let id = AssetId::parse(AssetKind::Bytes, "blob.bin").unwrap();
        let outcome = build_asset(&fixture.context(), &id).unwrap();
        match outcome {
            BuildOutcome::Ready(AssetPayload::Bytes(bytes)) => {
                assert_eq!(*bytes, vec![1, 2, 3]);
            }
            _ => panic!("expected ready bytes payload"),
        }
    }

    #[test]
    fn test_bytes_builder_ignores_patch_chain() {
        // A patch attached to the blob must not alter the raw buffer.
        let fixture = Fixture::new(&[
            ("blob.bin", vec![9, 9]),
            ("blob.bin.patch", br#"{"a":1}"#.to_vec()),
        ]);
        let id = AssetId::parse(AssetKind::Bytes, "blob.bin").unwrap();
        let outcome = build_asset(&fixture.context(), &id).unwrap();
        match outcome {
            BuildOutcome::Ready(AssetPayload::Bytes(bytes)) => assert_eq!(*bytes, vec![9, 9]),
            _ => panic!("expected ready bytes payload"),
        }
    }

    #[test]
    fn test_missing_path_is_not_found() {
        let fixture = Fixture::new(&[]);
        let id = AssetId::parse(AssetKind::Bytes, "ghost.bin").unwrap();
        assert!(matches!(
            build_asset(&fixture.context(), &id),
            Err(AssetError::NotFound { .. })
        ));
    }

    #[test]
    fn test_invalid_font_bytes_fail_parse() {
        let fixture = Fixture::new(&[("fonts/ui.ttf", vec![0, 1, 2, 3])]);
        let id = AssetId::parse(AssetKind::Font, "fonts/ui.ttf").unwrap();
        assert!(matches!(
            build_asset(&fixture.context(), &id),
            Err(AssetError::Parse { .. })
        ));
    }
}
