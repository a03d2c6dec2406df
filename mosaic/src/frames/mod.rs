//! Sprite frame specifications.
//!
//! A frames sidecar maps named rectangles (and aliases) onto a base image,
//! so `gfx/sheet.png:walk_0` can crop one sprite out of a pre-packed sheet.
//! This is bookkeeping over existing sheets only; nothing here packs
//! rectangles.
//!
//! Sidecar JSON:
//!
//! ```json
//! {
//!   "frames":  { "walk_0": [0, 0, 16, 16] },
//!   "grid":    { "begin": [0, 0], "size": [8, 8], "dimensions": [2, 2],
//!                "names": ["a", null, "c", "d"] },
//!   "aliases": { "idle": "walk_0" }
//! }
//! ```
//!
//! Lookup order for image `<dir>/<name>.<ext>`: `<dir>/<name>.frames`, then
//! `<dir>/default.frames`, then the same pair one directory up, until the
//! namespace root. First match wins. Both the per-image best-sidecar result
//! and the parsed spec per sidecar path are cached, instance-scoped so
//! separate pipelines (e.g. under test) stay isolated.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::debug;

use crate::error::AssetError;
use crate::index::OverlayIndex;
use crate::path::AssetPath;

/// Sidecar file extension (with dot).
pub const FRAMES_EXTENSION: &str = ".frames";

/// Sidecar base name applying to every image in (and below) a directory.
pub const DEFAULT_FRAMES_NAME: &str = "default.frames";

/// A named rectangle inside a base image, in top-down texture coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// A rectangle with zero width or height holds no pixels.
    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }
}

#[derive(Deserialize)]
struct RawSpec {
    #[serde(default)]
    frames: HashMap<String, [u32; 4]>,
    #[serde(default)]
    grid: Option<RawGrid>,
    #[serde(default)]
    aliases: HashMap<String, String>,
}

#[derive(Deserialize)]
struct RawGrid {
    #[serde(default)]
    begin: [u32; 2],
    size: [u32; 2],
    dimensions: [u32; 2],
    #[serde(default)]
    names: Option<Vec<Option<String>>>,
}

/// Parsed frame specification of one sidecar file.
#[derive(Debug)]
pub struct FrameSpec {
    /// Namespace path of the sidecar this spec was parsed from.
    spec_path: AssetPath,
    frames: HashMap<String, Rect>,
    /// Alias → terminal frame name, fully resolved at parse time.
    aliases: HashMap<String, String>,
}

impl FrameSpec {
    /// Parses and validates sidecar bytes.
    pub fn parse(bytes: &[u8], spec_path: &AssetPath) -> Result<Self, AssetError> {
        let parse_err = |message: String| AssetError::Parse {
            path: spec_path.to_string(),
            message,
        };

        let raw: RawSpec = serde_json::from_slice(bytes)
            .map_err(|err| parse_err(format!("invalid frames sidecar: {err}")))?;

        let mut frames = HashMap::new();
        for (name, [x, y, w, h]) in raw.frames {
            let rect = Rect::new(x, y, w, h);
            if rect.is_empty() {
                return Err(parse_err(format!("frame '{name}' has an empty rectangle")));
            }
            frames.insert(name, rect);
        }

        if let Some(grid) = raw.grid {
            let [cell_w, cell_h] = grid.size;
            let [rows, cols] = grid.dimensions;
            if cell_w == 0 || cell_h == 0 {
                return Err(parse_err("grid cell size must be non-zero".to_string()));
            }
            if rows == 0 || cols == 0 {
                return Err(parse_err("grid dimensions must be non-zero".to_string()));
            }
            let cell_count = (rows as usize) * (cols as usize);
            if let Some(names) = &grid.names {
                if names.len() > cell_count {
                    return Err(parse_err(format!(
                        "grid name table has {} entries for {} cells",
                        names.len(),
                        cell_count
                    )));
                }
            }

            let [begin_x, begin_y] = grid.begin;
            for row in 0..rows {
                for col in 0..cols {
                    let index = (row as usize) * (cols as usize) + (col as usize);
                    let name = match &grid.names {
                        // Unnamed cells are skipped; missing tail entries too.
                        Some(names) => match names.get(index) {
                            Some(Some(name)) => name.clone(),
                            _ => continue,
                        },
                        // No name table: auto-name by raster index.
                        None => index.to_string(),
                    };
                    let rect = Rect::new(
                        begin_x + col * cell_w,
                        begin_y + row * cell_h,
                        cell_w,
                        cell_h,
                    );
                    // Explicit frames win over grid cells of the same name.
                    frames.entry(name).or_insert(rect);
                }
            }
        }

        // Resolve aliases eagerly: at most alias_count + 1 hops, anything
        // longer is a cycle.
        let max_hops = raw.aliases.len() + 1;
        let mut aliases = HashMap::new();
        for (alias, first_target) in &raw.aliases {
            if frames.contains_key(alias) {
                return Err(parse_err(format!(
                    "'{alias}' is both a frame and an alias"
                )));
            }
            let mut target = first_target.clone();
            let mut hops = 1;
            while let Some(next) = raw.aliases.get(&target) {
                hops += 1;
                if hops > max_hops {
                    return Err(parse_err(format!(
                        "alias '{alias}' does not terminate (cycle)"
                    )));
                }
                target = next.clone();
            }
            if !frames.contains_key(&target) {
                return Err(parse_err(format!(
                    "alias '{alias}' points at unknown frame '{target}'"
                )));
            }
            aliases.insert(alias.clone(), target);
        }

        Ok(Self {
            spec_path: spec_path.clone(),
            frames,
            aliases,
        })
    }

    /// Path of the sidecar this spec came from.
    pub fn spec_path(&self) -> &AssetPath {
        &self.spec_path
    }

    /// Rectangle of a directly named frame.
    pub fn rect(&self, name: &str) -> Option<Rect> {
        self.frames.get(name).copied()
    }

    /// Terminal frame name an alias resolves to, if `name` is an alias.
    pub fn alias_target(&self, name: &str) -> Option<&str> {
        self.aliases.get(name).map(String::as_str)
    }

    /// Number of named frames (aliases excluded).
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

/// Locates and caches frame specifications per image.
pub(crate) struct FrameResolver {
    index: Arc<OverlayIndex>,
    /// Image path → best sidecar path ("none anywhere" cached as `None`).
    by_image: Mutex<HashMap<AssetPath, Option<AssetPath>>>,
    /// Sidecar path → parsed spec.
    by_spec: Mutex<HashMap<AssetPath, Arc<FrameSpec>>>,
}

impl FrameResolver {
    pub(crate) fn new(index: Arc<OverlayIndex>) -> Self {
        Self {
            index,
            by_image: Mutex::new(HashMap::new()),
            by_spec: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the parsed spec governing an image, or `None` when no
    /// sidecar exists anywhere up to the namespace root.
    ///
    /// A sidecar that exists but fails to parse is an error; it aborts the
    /// requesting asset's load only.
    pub(crate) fn spec_for_image(
        &self,
        image: &AssetPath,
    ) -> Result<Option<Arc<FrameSpec>>, AssetError> {
        let best = {
            let mut cache = self.by_image.lock();
            match cache.get(image) {
                Some(best) => best.clone(),
                None => {
                    let best = self.locate(image);
                    cache.insert(image.clone(), best.clone());
                    best
                }
            }
        };

        match best {
            Some(spec_path) => self.parse(&spec_path).map(Some),
            None => Ok(None),
        }
    }

    fn locate(&self, image: &AssetPath) -> Option<AssetPath> {
        let stem_candidate = format!("{}{}", image.stem(), FRAMES_EXTENSION);
        let mut dir = image.parent().to_string();

        loop {
            for name in [stem_candidate.as_str(), DEFAULT_FRAMES_NAME] {
                let candidate = AssetPath::from_parts(&dir, name);
                if self.index.contains(&candidate) {
                    debug!(image = %image, sidecar = %candidate, "resolved frames sidecar");
                    return Some(candidate);
                }
            }
            if dir.is_empty() {
                return None;
            }
            dir = match dir.rfind('/') {
                Some(idx) => dir[..idx].to_string(),
                None => String::new(),
            };
        }
    }

    fn parse(&self, spec_path: &AssetPath) -> Result<Arc<FrameSpec>, AssetError> {
        if let Some(spec) = self.by_spec.lock().get(spec_path) {
            return Ok(Arc::clone(spec));
        }

        let bytes = self.index.read(spec_path)?;
        let spec = Arc::new(FrameSpec::parse(&bytes, spec_path)?);
        self.by_spec
            .lock()
            .insert(spec_path.clone(), Arc::clone(&spec));
        Ok(spec)
    }
}
