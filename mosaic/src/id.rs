//! Asset identity.
//!
//! An [`AssetId`] names one loadable, cacheable artifact: a payload kind, a
//! base path, an optional sub-path, and an optional ordered list of
//! transform directives. Requests arrive as query strings:
//!
//! ```text
//! data/config.json                 plain document
//! data/config.json:/window/width   structural query into the document
//! gfx/sheet.png:walk_0             named frame of a sprite sheet
//! gfx/sheet.png:walk_0?flipx?scale:2   frame with transforms
//! ```
//!
//! Sub-paths apply to documents (JSON Pointer) and images (frame name);
//! directives apply to images only. Parsing is strict: an unknown directive
//! or a sub-path on an audio asset is an [`AssetError::InvalidPath`], raised
//! synchronously and never cached.

use std::fmt;

use crate::error::AssetError;
use crate::path::AssetPath;

/// Payload kind of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Document,
    Image,
    Audio,
    Font,
    Bytes,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssetKind::Document => "document",
            AssetKind::Image => "image",
            AssetKind::Audio => "audio",
            AssetKind::Font => "font",
            AssetKind::Bytes => "bytes",
        };
        f.write_str(name)
    }
}

/// Maximum integer scale factor accepted by `scale:N`.
pub const MAX_SCALE_FACTOR: u32 = 16;

/// One image transform, applied in request order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Directive {
    /// Mirror horizontally.
    FlipX,
    /// Mirror vertically.
    FlipY,
    /// Rotate clockwise by 90, 180 or 270 degrees.
    Rotate(u16),
    /// Integer nearest-neighbour upscale, factor in `1..=MAX_SCALE_FACTOR`.
    Scale(u32),
    /// Convert to grayscale, preserving alpha.
    Grayscale,
    /// Multiply the alpha channel by another image's alpha. The referenced
    /// image is a build dependency and must resolve first.
    Mask(AssetPath),
}

impl Directive {
    /// Parses one `?directive` segment of a query string.
    fn parse(raw: &str, query: &str) -> Result<Self, AssetError> {
        let invalid = |reason: String| AssetError::InvalidPath {
            path: query.to_string(),
            reason,
        };

        let (name, arg) = match raw.find(':') {
            Some(idx) => (&raw[..idx], Some(&raw[idx + 1..])),
            None => (raw, None),
        };

        match (name, arg) {
            ("flipx", None) => Ok(Directive::FlipX),
            ("flipy", None) => Ok(Directive::FlipY),
            ("rot", Some(deg)) => match deg {
                "90" => Ok(Directive::Rotate(90)),
                "180" => Ok(Directive::Rotate(180)),
                "270" => Ok(Directive::Rotate(270)),
                other => Err(invalid(format!("unsupported rotation '{other}'"))),
            },
            ("scale", Some(factor)) => {
                let factor: u32 = factor
                    .parse()
                    .map_err(|_| invalid(format!("bad scale factor '{factor}'")))?;
                if factor == 0 || factor > MAX_SCALE_FACTOR {
                    return Err(invalid(format!(
                        "scale factor {factor} outside 1..={MAX_SCALE_FACTOR}"
                    )));
                }
                Ok(Directive::Scale(factor))
            }
            ("grayscale", None) => Ok(Directive::Grayscale),
            ("mask", Some(path)) => Ok(Directive::Mask(AssetPath::new(path)?)),
            _ => Err(invalid(format!("unknown directive '{raw}'"))),
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::FlipX => f.write_str("flipx"),
            Directive::FlipY => f.write_str("flipy"),
            Directive::Rotate(deg) => write!(f, "rot:{deg}"),
            Directive::Scale(factor) => write!(f, "scale:{factor}"),
            Directive::Grayscale => f.write_str("grayscale"),
            Directive::Mask(path) => write!(f, "mask:{path}"),
        }
    }
}

/// Composite key identifying one loadable artifact.
///
/// Equality and hashing cover every field, so `sheet.png`, `sheet.png:a`
/// and `sheet.png:a?flipx` occupy three distinct cache slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetId {
    kind: AssetKind,
    path: AssetPath,
    sub_path: Option<String>,
    directives: Vec<Directive>,
}

impl AssetId {
    /// A plain id: kind and base path only.
    pub fn new(kind: AssetKind, path: AssetPath) -> Self {
        Self {
            kind,
            path,
            sub_path: None,
            directives: Vec::new(),
        }
    }

    /// Parses a query string of the form `path[:sub][?directive...]`.
    pub fn parse(kind: AssetKind, query: &str) -> Result<Self, AssetError> {
        let invalid = |reason: &str| AssetError::InvalidPath {
            path: query.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = query.split('?');
        let head = segments.next().unwrap_or_default();

        let (raw_path, sub_path) = match head.find(':') {
            Some(idx) => (&head[..idx], Some(head[idx + 1..].to_string())),
            None => (head, None),
        };
        let path = AssetPath::new(raw_path)?;

        if let Some(sub) = &sub_path {
            if sub.is_empty() {
                return Err(invalid("empty sub-path"));
            }
            match kind {
                AssetKind::Document => {
                    if !sub.starts_with('/') {
                        return Err(invalid("document sub-path must be a JSON pointer"));
                    }
                }
                AssetKind::Image => {}
                _ => return Err(invalid("sub-paths apply to documents and images only")),
            }
        }

        let mut directives = Vec::new();
        for segment in segments {
            if kind != AssetKind::Image {
                return Err(invalid("directives apply to images only"));
            }
            if segment.is_empty() {
                return Err(invalid("empty directive"));
            }
            directives.push(Directive::parse(segment, query)?);
        }

        Ok(Self {
            kind,
            path,
            sub_path,
            directives,
        })
    }

    pub fn kind(&self) -> AssetKind {
        self.kind
    }

    pub fn path(&self) -> &AssetPath {
        &self.path
    }

    pub fn sub_path(&self) -> Option<&str> {
        self.sub_path.as_deref()
    }

    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    /// Returns a copy with the given sub-path.
    pub fn with_sub_path(&self, sub_path: impl Into<String>) -> Self {
        Self {
            sub_path: Some(sub_path.into()),
            ..self.clone()
        }
    }

    /// Returns a copy with the given directive list.
    pub fn with_directives(&self, directives: Vec<Directive>) -> Self {
        Self {
            directives,
            ..self.clone()
        }
    }

    /// The same id without its directives. Directived image builds depend
    /// on this form.
    pub fn without_directives(&self) -> Self {
        Self {
            directives: Vec::new(),
            ..self.clone()
        }
    }

    /// The plain base id: kind and path only.
    pub fn base(&self) -> Self {
        Self::new(self.kind, self.path.clone())
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)?;
        if let Some(sub) = &self.sub_path {
            write!(f, ":{sub}")?;
        }
        for directive in &self.directives {
            write!(f, "?{directive}")?;
        }
        Ok(())
    }
}
