//! Command implementations.

use mosaic::{AssetError, AssetKind, AssetPayload, AssetPipeline, AudioData};

/// A boxed error string keeps clap-level and engine-level failures uniform.
pub type CommandResult = Result<(), String>;

pub fn digest(pipeline: &AssetPipeline) -> CommandResult {
    let digest = pipeline.digest().map_err(display)?;
    println!("{digest}");
    Ok(())
}

pub fn list(
    pipeline: &AssetPipeline,
    ext: Option<&str>,
    prefix: Option<&str>,
) -> CommandResult {
    let mut paths = match (ext, prefix) {
        (Some(ext), None) => pipeline.paths_with_extension(ext),
        (None, Some(prefix)) => pipeline.paths_with_prefix(prefix),
        (None, None) => pipeline.paths_with_prefix(""),
        (Some(ext), Some(prefix)) => {
            let wanted = ext.to_lowercase();
            pipeline
                .paths_with_prefix(prefix)
                .into_iter()
                .filter(|path| path.extension() == Some(wanted.as_str()))
                .collect()
        }
    };
    paths.sort();
    for path in paths {
        println!("{path}");
    }
    Ok(())
}

pub fn sources(pipeline: &AssetPipeline, path: &str) -> CommandResult {
    let provenance = pipeline.sources_for(path).map_err(display)?;
    for (index, metadata) in provenance.iter().enumerate() {
        let role = if index == 0 { "owner" } else { "patch" };
        match &metadata.version {
            Some(version) => println!("{role}\t{} ({version})", metadata.name),
            None => println!("{role}\t{}", metadata.name),
        }
    }
    Ok(())
}

pub fn show(pipeline: &AssetPipeline, kind: &str, query: &str) -> CommandResult {
    let kind = parse_kind(kind)?;
    let payload = pipeline.fetch(kind, query).map_err(display)?;
    println!("{}", summarize(&payload));
    Ok(())
}

fn parse_kind(raw: &str) -> Result<AssetKind, String> {
    match raw {
        "document" => Ok(AssetKind::Document),
        "image" => Ok(AssetKind::Image),
        "audio" => Ok(AssetKind::Audio),
        "font" => Ok(AssetKind::Font),
        "bytes" => Ok(AssetKind::Bytes),
        other => Err(format!(
            "unknown kind '{other}' (expected document, image, audio, font or bytes)"
        )),
    }
}

fn summarize(payload: &AssetPayload) -> String {
    match payload {
        AssetPayload::Document(doc) => {
            serde_json_summary(doc)
        }
        AssetPayload::Image(image) => format!(
            "image {}x{}{}",
            image.width(),
            image.height(),
            match &image.frames {
                Some(spec) => format!(", {} frames", spec.frame_count()),
                None => String::new(),
            }
        ),
        AssetPayload::Audio(audio) => match &**audio {
            AudioData::Pcm {
                sample_rate,
                channels,
                duration,
                ..
            } => format!("audio pcm {channels}ch {sample_rate}Hz {duration:?}"),
            AudioData::Compressed {
                codec, duration, ..
            } => format!("audio compressed ({codec}) {duration:?}"),
        },
        AssetPayload::Font(_) => "font (render-ready)".to_string(),
        AssetPayload::Bytes(bytes) => format!("{} bytes", bytes.len()),
    }
}

fn serde_json_summary(doc: &serde_json::Value) -> String {
    serde_json::to_string_pretty(doc).unwrap_or_else(|_| doc.to_string())
}

fn display(err: AssetError) -> String {
    err.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kind_accepts_all_kinds() {
        for (raw, kind) in [
            ("document", AssetKind::Document),
            ("image", AssetKind::Image),
            ("audio", AssetKind::Audio),
            ("font", AssetKind::Font),
            ("bytes", AssetKind::Bytes),
        ] {
            assert_eq!(parse_kind(raw).unwrap(), kind);
        }
        assert!(parse_kind("texture").is_err());
    }

    #[test]
    fn test_summarize_bytes() {
        let payload = AssetPayload::Bytes(std::sync::Arc::new(vec![0u8; 16]));
        assert_eq!(summarize(&payload), "16 bytes");
    }
}
