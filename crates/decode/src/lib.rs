use std::fs::File;
use std::io::Cursor;
use std::path::Path;

use quartet_transport::AudioArc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unsupported or unrecognized audio format: {0}")]
    Format(String),

    #[error("no decodable audio track")]
    NoTrack,

    #[error("audio contains no samples")]
    Empty,

    #[error("decoder failed: {0}")]
    Codec(String),

    #[error("io error: {0}")]
    Io(String),
}

impl From<SymphoniaError> for DecodeError {
    fn from(err: SymphoniaError) -> Self {
        match err {
            SymphoniaError::Unsupported(what) => DecodeError::Format(what.to_string()),
            SymphoniaError::IoError(e) => DecodeError::Io(e.to_string()),
            other => DecodeError::Codec(other.to_string()),
        }
    }
}

/// Extension of the last path segment of a URL or path, ignoring any query
/// string or fragment. Used as the format hint for probing.
pub fn extension_hint(location: &str) -> Option<&str> {
    let path = location.split(['?', '#']).next().unwrap_or(location);
    let segment = path.rsplit('/').next()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext)
}

/// Decode an in-memory encoded track into interleaved f32 PCM at its native rate.
pub fn decode_bytes(bytes: Vec<u8>, hint: Option<&str>) -> Result<AudioArc, DecodeError> {
    decode_source(Box::new(Cursor::new(bytes)), hint)
}

pub fn decode_file(path: &Path) -> Result<AudioArc, DecodeError> {
    let file = File::open(path).map_err(|e| DecodeError::Io(e.to_string()))?;
    let hint = path.extension().and_then(|e| e.to_str());
    decode_source(Box::new(file), hint)
}

fn decode_source(source: Box<dyn MediaSource>, extension: Option<&str>) -> Result<AudioArc, DecodeError> {
    let mss = MediaSourceStream::new(source, Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = probed.format;

    let track = format.default_track().ok_or(DecodeError::NoTrack)?;

    let track_id = track.id;

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();
    let mut layout = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(reason)) => {
                log::warn!("skipping corrupt packet: {reason}");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        check_layout(&mut layout, spec.rate, spec.channels.count() as u16)?;

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    let Some((sample_rate, channels)) =
        layout.filter(|&(_, channels)| channels > 0 && !samples.is_empty())
    else {
        return Err(DecodeError::Empty);
    };

    log::debug!(
        "decoded {} samples, {} Hz, {} channels",
        samples.len(),
        sample_rate,
        channels
    );

    Ok(AudioArc::new(samples, sample_rate, channels))
}

/// The first decoded packet fixes the rate and channel count; a later packet
/// that disagrees would leave the interleaved samples misaligned.
fn check_layout(
    layout: &mut Option<(u32, u16)>,
    sample_rate: u32,
    channels: u16,
) -> Result<(), DecodeError> {
    match *layout {
        None => {
            *layout = Some((sample_rate, channels));
            Ok(())
        }
        Some(first) if first == (sample_rate, channels) => Ok(()),
        Some((first_rate, first_channels)) => Err(DecodeError::Codec(format!(
            "stream changed from {first_channels} ch at {first_rate} Hz \
             to {channels} ch at {sample_rate} Hz"
        ))),
    }
}
