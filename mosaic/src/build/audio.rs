//! Audio builder and post-process phase.
//!
//! The load phase probes the container. PCM tracks (wav and friends)
//! decode immediately. Compressed tracks are flagged for the post-process
//! phase, where short clips — up to `audio_decompress_max` — are eagerly
//! decoded to interleaved f32 PCM and anything longer passes through
//! compressed for the playback layer to stream. Clips whose duration the
//! container does not declare are treated as long.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{
    CodecType, DecoderOptions, CODEC_TYPE_PCM_F32BE, CODEC_TYPE_PCM_F32LE, CODEC_TYPE_PCM_F64BE,
    CODEC_TYPE_PCM_F64LE, CODEC_TYPE_PCM_S16BE, CODEC_TYPE_PCM_S16LE, CODEC_TYPE_PCM_S24BE,
    CODEC_TYPE_PCM_S24LE, CODEC_TYPE_PCM_S32BE, CODEC_TYPE_PCM_S32LE, CODEC_TYPE_PCM_S8,
    CODEC_TYPE_PCM_U16BE, CODEC_TYPE_PCM_U16LE, CODEC_TYPE_PCM_U24BE, CODEC_TYPE_PCM_U24LE,
    CODEC_TYPE_PCM_U32BE, CODEC_TYPE_PCM_U32LE, CODEC_TYPE_PCM_U8,
};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use crate::error::AssetError;
use crate::id::AssetId;
use crate::payload::{AssetPayload, AudioData};

use super::{BuildContext, BuildOutcome};

const PCM_CODECS: &[CodecType] = &[
    CODEC_TYPE_PCM_S8,
    CODEC_TYPE_PCM_U8,
    CODEC_TYPE_PCM_S16LE,
    CODEC_TYPE_PCM_S16BE,
    CODEC_TYPE_PCM_U16LE,
    CODEC_TYPE_PCM_U16BE,
    CODEC_TYPE_PCM_S24LE,
    CODEC_TYPE_PCM_S24BE,
    CODEC_TYPE_PCM_U24LE,
    CODEC_TYPE_PCM_U24BE,
    CODEC_TYPE_PCM_S32LE,
    CODEC_TYPE_PCM_S32BE,
    CODEC_TYPE_PCM_U32LE,
    CODEC_TYPE_PCM_U32BE,
    CODEC_TYPE_PCM_F32LE,
    CODEC_TYPE_PCM_F32BE,
    CODEC_TYPE_PCM_F64LE,
    CODEC_TYPE_PCM_F64BE,
];

fn is_pcm_codec(codec: CodecType) -> bool {
    PCM_CODECS.contains(&codec)
}

pub(crate) fn build(ctx: &BuildContext<'_>, id: &AssetId) -> Result<BuildOutcome, AssetError> {
    let bytes = ctx.read_base(id)?;
    let extension = id.path().extension().map(str::to_string);

    let format = open_format(&bytes, extension.as_deref(), id)?;
    let (codec, duration) = track_info(format.as_ref(), id)?;

    if is_pcm_codec(codec) {
        let audio = decode_to_pcm(format, id)?;
        return Ok(BuildOutcome::Ready(AssetPayload::Audio(Arc::new(audio))));
    }

    debug!(id = %id, codec = ?codec, duration = ?duration,
        "compressed audio flagged for post-processing");
    Ok(BuildOutcome::PostProcess(AssetPayload::Audio(Arc::new(
        AudioData::Compressed {
            bytes,
            codec: format!("{codec:?}"),
            duration,
        },
    ))))
}

/// Post-process phase: decide between eager decompression and passthrough.
pub(crate) fn post_process_audio(
    ctx: &BuildContext<'_>,
    id: &AssetId,
    audio: Arc<AudioData>,
) -> Result<AssetPayload, AssetError> {
    let AudioData::Compressed {
        bytes, duration, ..
    } = &*audio
    else {
        return Ok(AssetPayload::Audio(audio));
    };

    let decompress = duration
        .map(|d| d <= ctx.config.audio_decompress_max)
        .unwrap_or(false);
    if !decompress {
        debug!(id = %id, duration = ?duration, "keeping audio compressed");
        return Ok(AssetPayload::Audio(audio));
    }

    let extension = id.path().extension().map(str::to_string);
    let format = open_format(bytes, extension.as_deref(), id)?;
    let decoded = decode_to_pcm(format, id)?;
    Ok(AssetPayload::Audio(Arc::new(decoded)))
}

fn open_format(
    bytes: &[u8],
    extension: Option<&str>,
    id: &AssetId,
) -> Result<Box<dyn FormatReader>, AssetError> {
    let stream = MediaSourceStream::new(
        Box::new(Cursor::new(bytes.to_vec())),
        Default::default(),
    );
    let mut hint = Hint::new();
    if let Some(extension) = extension {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| AssetError::Parse {
            path: id.path().to_string(),
            message: format!("unrecognized audio container: {err}"),
        })?;
    Ok(probed.format)
}

fn track_info(
    format: &dyn FormatReader,
    id: &AssetId,
) -> Result<(CodecType, Option<Duration>), AssetError> {
    let track = format.default_track().ok_or_else(|| AssetError::Parse {
        path: id.path().to_string(),
        message: "container has no default audio track".to_string(),
    })?;
    let params = &track.codec_params;
    let duration = match (params.n_frames, params.sample_rate) {
        (Some(frames), Some(rate)) if rate > 0 => {
            Some(Duration::from_secs_f64(frames as f64 / f64::from(rate)))
        }
        _ => None,
    };
    Ok((params.codec, duration))
}

fn decode_to_pcm(mut format: Box<dyn FormatReader>, id: &AssetId) -> Result<AudioData, AssetError> {
    let parse_err = |message: String| AssetError::Parse {
        path: id.path().to_string(),
        message,
    };

    let track = format
        .default_track()
        .ok_or_else(|| parse_err("container has no default audio track".to_string()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(44_100);
    let mut channels = track
        .codec_params
        .channels
        .map(|set| set.count() as u16)
        .unwrap_or(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|err| parse_err(format!("unsupported codec: {err}")))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            // End of stream.
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => return Err(parse_err(format!("packet read failed: {err}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                if sample_buf.is_none() {
                    let spec = *decoded.spec();
                    sample_rate = spec.rate;
                    channels = spec.channels.count() as u16;
                    sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
                }
                if let Some(buf) = &mut sample_buf {
                    buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buf.samples());
                }
            }
            // Recoverable: skip the malformed packet.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(err) => return Err(parse_err(format!("decode failed: {err}"))),
        }
    }

    if channels == 0 {
        return Err(parse_err("track reports zero channels".to_string()));
    }
    let frame_count = samples.len() / channels as usize;
    let duration = Duration::from_secs_f64(frame_count as f64 / f64::from(sample_rate));

    Ok(AudioData::Pcm {
        samples,
        sample_rate,
        channels,
        duration,
    })
}
