//! Typed asset payloads.
//!
//! Every cached artifact is one of five payload kinds behind an `Arc`.
//! Callers receive clones of the `Arc`, so a payload stays alive for as
//! long as anyone holds it, independent of cache eviction.
//!
//! The cache's persistence test is [`AssetPayload::is_externally_retained`]:
//! the slot itself accounts for one strong reference, so a count above one
//! means either a caller still holds the payload or another cache slot
//! shares it (an alias frame sharing its sibling's image). Retained
//! payloads are never evicted, only timestamp-refreshed.

use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use serde_json::Value;

use crate::frames::FrameSpec;
use crate::id::AssetKind;

/// A decoded image plus the frame specification governing it, if any.
#[derive(Debug)]
pub struct ImageData {
    /// Decoded pixels. Held bottom-up, the way the render layer uploads
    /// them; frame rectangles are authored top-down and flipped at crop
    /// time.
    pub pixels: RgbaImage,

    /// Frame spec resolved from the image's sidecar, when one exists.
    pub frames: Option<Arc<FrameSpec>>,
}

impl ImageData {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// Decoded or still-compressed audio.
#[derive(Debug)]
pub enum AudioData {
    /// Interleaved f32 PCM.
    Pcm {
        samples: Vec<f32>,
        sample_rate: u32,
        channels: u16,
        duration: Duration,
    },

    /// The original compressed container, passed through when the clip is
    /// too long to decompress eagerly. The playback layer streams it.
    Compressed {
        bytes: Vec<u8>,
        codec: String,
        duration: Option<Duration>,
    },
}

impl AudioData {
    /// Total duration, when known.
    pub fn duration(&self) -> Option<Duration> {
        match self {
            AudioData::Pcm { duration, .. } => Some(*duration),
            AudioData::Compressed { duration, .. } => *duration,
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, AudioData::Compressed { .. })
    }
}

/// A render-ready font handle.
pub struct FontData {
    pub font: fontdue::Font,
}

impl std::fmt::Debug for FontData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontData")
            .field("glyphs", &self.font.glyph_count())
            .finish()
    }
}

/// One cached artifact.
#[derive(Debug, Clone)]
pub enum AssetPayload {
    Document(Arc<Value>),
    Image(Arc<ImageData>),
    Audio(Arc<AudioData>),
    Font(Arc<FontData>),
    Bytes(Arc<Vec<u8>>),
}

impl AssetPayload {
    /// The payload's kind.
    pub fn kind(&self) -> AssetKind {
        match self {
            AssetPayload::Document(_) => AssetKind::Document,
            AssetPayload::Image(_) => AssetKind::Image,
            AssetPayload::Audio(_) => AssetKind::Audio,
            AssetPayload::Font(_) => AssetKind::Font,
            AssetPayload::Bytes(_) => AssetKind::Bytes,
        }
    }

    /// Whether any holder beyond the owning cache slot keeps this payload
    /// alive.
    pub fn is_externally_retained(&self) -> bool {
        self.strong_count() > 1
    }

    fn strong_count(&self) -> usize {
        match self {
            AssetPayload::Document(arc) => Arc::strong_count(arc),
            AssetPayload::Image(arc) => Arc::strong_count(arc),
            AssetPayload::Audio(arc) => Arc::strong_count(arc),
            AssetPayload::Font(arc) => Arc::strong_count(arc),
            AssetPayload::Bytes(arc) => Arc::strong_count(arc),
        }
    }

    pub fn into_document(self) -> Option<Arc<Value>> {
        match self {
            AssetPayload::Document(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn into_image(self) -> Option<Arc<ImageData>> {
        match self {
            AssetPayload::Image(image) => Some(image),
            _ => None,
        }
    }

    pub fn into_audio(self) -> Option<Arc<AudioData>> {
        match self {
            AssetPayload::Audio(audio) => Some(audio),
            _ => None,
        }
    }

    pub fn into_font(self) -> Option<Arc<FontData>> {
        match self {
            AssetPayload::Font(font) => Some(font),
            _ => None,
        }
    }

    pub fn into_bytes(self) -> Option<Arc<Vec<u8>>> {
        match self {
            AssetPayload::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_mapping() {
        let doc = AssetPayload::Document(Arc::new(json!({})));
        assert_eq!(doc.kind(), AssetKind::Document);
        let bytes = AssetPayload::Bytes(Arc::new(vec![1, 2]));
        assert_eq!(bytes.kind(), AssetKind::Bytes);
    }

    #[test]
    fn test_retention_tracks_external_holders() {
        let slot = AssetPayload::Bytes(Arc::new(vec![1, 2, 3]));
        assert!(!slot.is_externally_retained());

        let handle = slot.clone();
        assert!(slot.is_externally_retained());

        drop(handle);
        assert!(!slot.is_externally_retained());
    }

    #[test]
    fn test_retention_counts_shared_slots() {
        // Two cache slots sharing one payload (alias image) retain each
        // other.
        let first = AssetPayload::Bytes(Arc::new(vec![0u8; 4]));
        let second = first.clone();
        assert!(first.is_externally_retained());
        assert!(second.is_externally_retained());
    }

    #[test]
    fn test_audio_duration() {
        let pcm = AudioData::Pcm {
            samples: vec![0.0; 44_100],
            sample_rate: 44_100,
            channels: 1,
            duration: Duration::from_secs(1),
        };
        assert_eq!(pcm.duration(), Some(Duration::from_secs(1)));
        assert!(!pcm.is_compressed());

        let compressed = AudioData::Compressed {
            bytes: vec![],
            codec: "vorbis".to_string(),
            duration: None,
        };
        assert_eq!(compressed.duration(), None);
        assert!(compressed.is_compressed());
    }

    #[test]
    fn test_typed_accessors() {
        let doc = AssetPayload::Document(Arc::new(json!({"a": 1})));
        assert!(doc.clone().into_document().is_some());
        assert!(doc.into_image().is_none());
    }
}
