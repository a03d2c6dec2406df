//! Image builder.
//!
//! Three request shapes, each cached under its own id:
//!
//! - `sheet.png` — decode the base bytes, run script patches, attach the
//!   resolved frame spec.
//! - `sheet.png:frame` — crop one named rectangle out of the cached parent
//!   image. Frame rectangles are authored top-down while decoded images are
//!   held bottom-up, so the crop origin is flipped vertically. An alias
//!   resolves by depending on the aliased sibling instead, carrying any
//!   directive suffixes, and shares the sibling's payload.
//! - `sheet.png?flipx?scale:2` — depend on the zero-directive form and
//!   apply the ordered transform list. `mask:` transforms additionally
//!   depend on the referenced whole image.

use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::RgbaImage;

use crate::error::AssetError;
use crate::frames::Rect;
use crate::id::{AssetId, Directive};
use crate::payload::{AssetPayload, ImageData};

use super::{BuildContext, BuildOutcome};

pub(crate) fn build(ctx: &BuildContext<'_>, id: &AssetId) -> Result<BuildOutcome, AssetError> {
    match id.sub_path() {
        Some(frame) => framed(ctx, id, frame),
        None if id.directives().is_empty() => plain(ctx, id),
        None => directived(ctx, id),
    }
}

fn plain(ctx: &BuildContext<'_>, id: &AssetId) -> Result<BuildOutcome, AssetError> {
    let descriptor = ctx.descriptor(id)?;
    let bytes = descriptor.read().map_err(|err| AssetError::Source {
        path: id.path().to_string(),
        message: err.to_string(),
    })?;

    let decoded = image::load_from_memory(&bytes)
        .map_err(|err| AssetError::Parse {
            path: id.path().to_string(),
            message: err.to_string(),
        })?
        .to_rgba8();

    let patched = ctx
        .patches
        .apply_image(decoded, id.path(), &descriptor.patches);

    // No sidecar is fine for a plain image; only frame requests need one.
    let frames = ctx.frames.spec_for_image(id.path())?;

    Ok(BuildOutcome::Ready(AssetPayload::Image(Arc::new(
        ImageData {
            pixels: patched,
            frames,
        },
    ))))
}

fn framed(ctx: &BuildContext<'_>, id: &AssetId, frame: &str) -> Result<BuildOutcome, AssetError> {
    let parent_id = id.base();
    let Some(parent) = ctx.deps.try_dependency(&parent_id)? else {
        return Ok(BuildOutcome::Pending);
    };
    let parent = expect_image(parent, id)?;

    let Some(spec) = parent.frames.clone() else {
        return Err(AssetError::NoFrames {
            path: id.path().to_string(),
        });
    };

    // Aliases delegate to the aliased sibling, directives and all, and
    // share its payload. The shared Arc is what keeps alias pairs resident
    // together under eviction.
    if let Some(target) = spec.alias_target(frame) {
        let sibling = parent_id
            .with_sub_path(target)
            .with_directives(id.directives().to_vec());
        return match ctx.deps.try_dependency(&sibling)? {
            Some(payload) => Ok(BuildOutcome::Ready(payload)),
            None => Ok(BuildOutcome::Pending),
        };
    }

    let Some(rect) = spec.rect(frame) else {
        return Err(AssetError::UnknownFrame {
            spec_path: spec.spec_path().to_string(),
            frame: frame.to_string(),
        });
    };

    // A directived frame depends on its zero-directive form; the crop
    // happens once, there.
    if !id.directives().is_empty() {
        return match ctx.deps.try_dependency(&id.without_directives())? {
            Some(payload) => {
                let base = expect_image(payload, id)?;
                apply_directives(ctx, &base, id)
            }
            None => Ok(BuildOutcome::Pending),
        };
    }

    let pixels = crop_frame(&parent, rect, &spec.spec_path().to_string(), frame)?;
    Ok(BuildOutcome::Ready(AssetPayload::Image(Arc::new(
        ImageData {
            pixels,
            frames: None,
        },
    ))))
}

fn directived(ctx: &BuildContext<'_>, id: &AssetId) -> Result<BuildOutcome, AssetError> {
    match ctx.deps.try_dependency(&id.without_directives())? {
        Some(payload) => {
            let base = expect_image(payload, id)?;
            apply_directives(ctx, &base, id)
        }
        None => Ok(BuildOutcome::Pending),
    }
}

/// Crops a top-down authored rectangle out of a bottom-up image.
fn crop_frame(
    parent: &ImageData,
    rect: Rect,
    spec_path: &str,
    frame: &str,
) -> Result<RgbaImage, AssetError> {
    let (width, height) = (parent.width(), parent.height());
    if rect.x + rect.w > width || rect.y + rect.h > height {
        return Err(AssetError::Parse {
            path: spec_path.to_string(),
            message: format!(
                "frame '{frame}' ({},{} {}x{}) exceeds image bounds {}x{}",
                rect.x, rect.y, rect.w, rect.h, width, height
            ),
        });
    }

    let flipped_y = height - rect.y - rect.h;
    Ok(imageops::crop_imm(&parent.pixels, rect.x, flipped_y, rect.w, rect.h).to_image())
}

fn apply_directives(
    ctx: &BuildContext<'_>,
    base: &ImageData,
    id: &AssetId,
) -> Result<BuildOutcome, AssetError> {
    let mut pixels = base.pixels.clone();

    for directive in id.directives() {
        pixels = match directive {
            Directive::FlipX => imageops::flip_horizontal(&pixels),
            Directive::FlipY => imageops::flip_vertical(&pixels),
            Directive::Rotate(degrees) => match degrees {
                90 => imageops::rotate90(&pixels),
                180 => imageops::rotate180(&pixels),
                270 => imageops::rotate270(&pixels),
                other => {
                    return Err(AssetError::InvalidPath {
                        path: id.to_string(),
                        reason: format!("unsupported rotation {other}"),
                    })
                }
            },
            Directive::Scale(factor) => imageops::resize(
                &pixels,
                pixels.width() * factor,
                pixels.height() * factor,
                FilterType::Nearest,
            ),
            Directive::Grayscale => grayscale(&pixels),
            Directive::Mask(mask_path) => {
                // Reference dependency on a whole other image.
                let mask_id = AssetId::new(crate::id::AssetKind::Image, mask_path.clone());
                let Some(mask) = ctx.deps.try_dependency(&mask_id)? else {
                    return Ok(BuildOutcome::Pending);
                };
                let mask = expect_image(mask, id)?;
                apply_mask(pixels, &mask, id)?
            }
        };
    }

    Ok(BuildOutcome::Ready(AssetPayload::Image(Arc::new(
        ImageData {
            pixels,
            frames: None,
        },
    ))))
}

fn grayscale(pixels: &RgbaImage) -> RgbaImage {
    let mut out = pixels.clone();
    for pixel in out.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        let luma =
            (0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b)).round() as u8;
        pixel.0 = [luma, luma, luma, a];
    }
    out
}

fn apply_mask(
    mut pixels: RgbaImage,
    mask: &ImageData,
    id: &AssetId,
) -> Result<RgbaImage, AssetError> {
    if mask.width() != pixels.width() || mask.height() != pixels.height() {
        return Err(AssetError::Parse {
            path: id.to_string(),
            message: format!(
                "mask is {}x{} but image is {}x{}",
                mask.width(),
                mask.height(),
                pixels.width(),
                pixels.height()
            ),
        });
    }
    for (pixel, mask_pixel) in pixels.pixels_mut().zip(mask.pixels.pixels()) {
        let alpha = u16::from(pixel.0[3]) * u16::from(mask_pixel.0[3]) / 255;
        pixel.0[3] = alpha as u8;
    }
    Ok(pixels)
}

fn expect_image(payload: AssetPayload, id: &AssetId) -> Result<Arc<ImageData>, AssetError> {
    match payload {
        AssetPayload::Image(image) => Ok(image),
        other => Err(AssetError::Parse {
            path: id.to_string(),
            message: format!("dependency resolved to a {} payload", other.kind()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Fixture;
    use super::*;
    use crate::id::AssetKind;
    use image::Rgba;

    fn image_id(query: &str) -> AssetId {
        AssetId::parse(AssetKind::Image, query).unwrap()
    }

    fn png_bytes(image: &RgbaImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Png,
            )
            .unwrap();
        bytes
    }

    /// 4x4 image whose rows (top to bottom in storage) are solid red,
    /// green, blue, white.
    fn striped_image() -> RgbaImage {
        let rows = [
            Rgba([255u8, 0, 0, 255]),
            Rgba([0, 255, 0, 255]),
            Rgba([0, 0, 255, 255]),
            Rgba([255, 255, 255, 255]),
        ];
        RgbaImage::from_fn(4, 4, |_, y| rows[y as usize])
    }

    fn cached_image(pixels: RgbaImage, frames: Option<Arc<crate::frames::FrameSpec>>) -> AssetPayload {
        AssetPayload::Image(Arc::new(ImageData { pixels, frames }))
    }

    fn spec(json: &str) -> Arc<crate::frames::FrameSpec> {
        Arc::new(
            crate::frames::FrameSpec::parse(
                json.as_bytes(),
                &crate::path::AssetPath::new("sheet.frames").unwrap(),
            )
            .unwrap(),
        )
    }

    fn build_ready(fixture: &Fixture, id: &AssetId) -> Arc<ImageData> {
        match build(&fixture.context(), id).unwrap() {
            BuildOutcome::Ready(AssetPayload::Image(image)) => image,
            _ => panic!("expected a ready image"),
        }
    }

    #[test]
    fn test_plain_image_decodes_and_resolves_frames() {
        let fixture = Fixture::new(&[
            ("gfx/sheet.png", png_bytes(&striped_image())),
            (
                "gfx/sheet.frames",
                br#"{"frames": {"f": [0, 0, 4, 2]}}"#.to_vec(),
            ),
        ]);
        let image = build_ready(&fixture, &image_id("gfx/sheet.png"));
        assert_eq!(image.width(), 4);
        assert_eq!(image.height(), 4);
        assert!(image.frames.is_some());
    }

    #[test]
    fn test_plain_image_without_sidecar_has_no_frames() {
        let fixture = Fixture::new(&[("gfx/a.png", png_bytes(&striped_image()))]);
        let image = build_ready(&fixture, &image_id("gfx/a.png"));
        assert!(image.frames.is_none());
    }

    #[test]
    fn test_undecodable_image_is_parse_error() {
        let fixture = Fixture::new(&[("gfx/a.png", b"not a png".to_vec())]);
        assert!(matches!(
            build(&fixture.context(), &image_id("gfx/a.png")),
            Err(AssetError::Parse { .. })
        ));
    }

    #[test]
    fn test_frame_pends_until_parent_is_cached() {
        let fixture = Fixture::new(&[]);
        let outcome = build(&fixture.context(), &image_id("gfx/sheet.png:f")).unwrap();
        assert!(matches!(outcome, BuildOutcome::Pending));
        assert_eq!(
            fixture.deps.enqueued.lock().as_slice(),
            &[image_id("gfx/sheet.png")]
        );
    }

    #[test]
    fn test_frame_crop_flips_vertically() {
        // Top-down rect (0,0,4,2) over a bottom-up image selects the
        // storage rows starting at height - 0 - 2 = 2: blue and white.
        let fixture = Fixture::new(&[]);
        fixture.deps.insert(
            image_id("gfx/sheet.png"),
            cached_image(
                striped_image(),
                Some(spec(r#"{"frames": {"top": [0, 0, 4, 2]}}"#)),
            ),
        );

        let cropped = build_ready(&fixture, &image_id("gfx/sheet.png:top"));
        assert_eq!(cropped.width(), 4);
        assert_eq!(cropped.height(), 2);
        assert_eq!(cropped.pixels.get_pixel(0, 0).0, [0, 0, 255, 255]);
        assert_eq!(cropped.pixels.get_pixel(0, 1).0, [255, 255, 255, 255]);
        // Cropped frames carry no spec of their own.
        assert!(cropped.frames.is_none());
    }

    #[test]
    fn test_frame_without_sidecar_is_no_frames_error() {
        let fixture = Fixture::new(&[]);
        fixture
            .deps
            .insert(image_id("gfx/sheet.png"), cached_image(striped_image(), None));
        assert!(matches!(
            build(&fixture.context(), &image_id("gfx/sheet.png:f")),
            Err(AssetError::NoFrames { .. })
        ));
    }

    #[test]
    fn test_unknown_frame_name_is_error() {
        let fixture = Fixture::new(&[]);
        fixture.deps.insert(
            image_id("gfx/sheet.png"),
            cached_image(
                striped_image(),
                Some(spec(r#"{"frames": {"f": [0, 0, 2, 2]}}"#)),
            ),
        );
        assert!(matches!(
            build(&fixture.context(), &image_id("gfx/sheet.png:ghost")),
            Err(AssetError::UnknownFrame { .. })
        ));
    }

    #[test]
    fn test_frame_out_of_bounds_is_error() {
        let fixture = Fixture::new(&[]);
        fixture.deps.insert(
            image_id("gfx/sheet.png"),
            cached_image(
                striped_image(),
                Some(spec(r#"{"frames": {"big": [0, 0, 8, 8]}}"#)),
            ),
        );
        assert!(matches!(
            build(&fixture.context(), &image_id("gfx/sheet.png:big")),
            Err(AssetError::Parse { .. })
        ));
    }

    #[test]
    fn test_alias_depends_on_sibling_with_directives() {
        let fixture = Fixture::new(&[]);
        fixture.deps.insert(
            image_id("gfx/sheet.png"),
            cached_image(
                striped_image(),
                Some(spec(
                    r#"{"frames": {"real": [0, 0, 2, 2]}, "aliases": {"alias": "real"}}"#,
                )),
            ),
        );

        // First attempt: sibling (with carried directives) not cached yet.
        let id = image_id("gfx/sheet.png:alias?flipx");
        assert!(matches!(
            build(&fixture.context(), &id).unwrap(),
            BuildOutcome::Pending
        ));
        assert!(fixture
            .deps
            .enqueued
            .lock()
            .contains(&image_id("gfx/sheet.png:real?flipx")));

        // Sibling cached: the alias shares its payload verbatim.
        let sibling_payload = cached_image(striped_image(), None);
        fixture
            .deps
            .insert(image_id("gfx/sheet.png:real?flipx"), sibling_payload.clone());
        let via_alias = build_ready(&fixture, &id);
        match sibling_payload {
            AssetPayload::Image(sibling) => assert!(Arc::ptr_eq(&via_alias, &sibling)),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_directived_image_applies_transform_order() {
        let fixture = Fixture::new(&[]);
        fixture
            .deps
            .insert(image_id("gfx/a.png"), cached_image(striped_image(), None));

        // flipy turns the striped image upside down; scale:2 doubles it.
        let image = build_ready(&fixture, &image_id("gfx/a.png?flipy?scale:2"));
        assert_eq!(image.width(), 8);
        assert_eq!(image.height(), 8);
        // After flipy the first storage row is white.
        assert_eq!(image.pixels.get_pixel(0, 0).0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_directived_pends_on_zero_directive_form() {
        let fixture = Fixture::new(&[]);
        let outcome = build(&fixture.context(), &image_id("gfx/a.png?flipx")).unwrap();
        assert!(matches!(outcome, BuildOutcome::Pending));
        assert_eq!(
            fixture.deps.enqueued.lock().as_slice(),
            &[image_id("gfx/a.png")]
        );
    }

    #[test]
    fn test_grayscale_preserves_alpha() {
        let fixture = Fixture::new(&[]);
        let base = RgbaImage::from_pixel(1, 1, Rgba([255, 0, 0, 128]));
        fixture
            .deps
            .insert(image_id("gfx/a.png"), cached_image(base, None));

        let image = build_ready(&fixture, &image_id("gfx/a.png?grayscale"));
        let pixel = image.pixels.get_pixel(0, 0).0;
        assert_eq!(pixel[0], pixel[1]);
        assert_eq!(pixel[1], pixel[2]);
        assert_eq!(pixel[3], 128);
    }

    #[test]
    fn test_mask_multiplies_alpha_and_pends_on_reference() {
        let fixture = Fixture::new(&[]);
        let base = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 200]));
        fixture
            .deps
            .insert(image_id("gfx/a.png"), cached_image(base, None));

        // The mask reference is a dependency of its own.
        let id = image_id("gfx/a.png?mask:gfx/m.png");
        assert!(matches!(
            build(&fixture.context(), &id).unwrap(),
            BuildOutcome::Pending
        ));
        assert!(fixture
            .deps
            .enqueued
            .lock()
            .contains(&image_id("gfx/m.png")));

        let mask = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 127]));
        fixture
            .deps
            .insert(image_id("gfx/m.png"), cached_image(mask, None));
        let image = build_ready(&fixture, &id);
        // 200 * 127 / 255 = 99
        assert_eq!(image.pixels.get_pixel(0, 0).0[3], 99);
    }

    #[test]
    fn test_mask_dimension_mismatch_is_error() {
        let fixture = Fixture::new(&[]);
        fixture.deps.insert(
            image_id("gfx/a.png"),
            cached_image(RgbaImage::new(2, 2), None),
        );
        fixture.deps.insert(
            image_id("gfx/m.png"),
            cached_image(RgbaImage::new(4, 4), None),
        );
        assert!(matches!(
            build(&fixture.context(), &image_id("gfx/a.png?mask:gfx/m.png")),
            Err(AssetError::Parse { .. })
        ));
    }
}
