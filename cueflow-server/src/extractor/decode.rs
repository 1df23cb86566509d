//! PCM extraction via symphonia
//!
//! Decodes an audio file to mono f32 at its native sample rate. Multi-channel
//! input is averaged down; the signal analysis that follows has no use for
//! stereo separation.

use std::path::Path;
use std::time::Instant;

use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use super::ExtractError;

/// Decoded mono PCM
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Mono samples, normalised to `[-1, 1]`
    pub samples: Vec<f32>,
    /// Native sample rate in Hz
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

/// Decode the whole file to mono PCM, giving up at `deadline`.
pub fn decode_mono(path: &Path, deadline: Instant) -> Result<DecodedAudio, ExtractError> {
    let file = std::fs::File::open(path)
        .map_err(|err| ExtractError::Internal(format!("open failed: {err}")))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension() {
        hint.with_extension(ext.to_str().unwrap_or(""));
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| ExtractError::UnsupportedFormat(format!("probe failed: {err}")))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| ExtractError::CorruptFile("no audio tracks found".to_string()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| ExtractError::CorruptFile("sample rate missing".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|err| ExtractError::UnsupportedFormat(format!("no decoder: {err}")))?;

    let mut samples = Vec::new();
    loop {
        if Instant::now() >= deadline {
            return Err(ExtractError::Timeout(format!(
                "decode exceeded budget: {}",
                path.display()
            )));
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => {
                return Err(ExtractError::CorruptFile(format!("read failed: {err}")));
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => append_mono(&decoded, &mut samples),
            // A decoder reset mid-stream is recoverable; bad data is not.
            Err(symphonia::core::errors::Error::ResetRequired) => continue,
            Err(symphonia::core::errors::Error::DecodeError(err)) => {
                return Err(ExtractError::CorruptFile(format!("decode failed: {err}")));
            }
            Err(err) => {
                return Err(ExtractError::CorruptFile(format!("decode failed: {err}")));
            }
        }
    }

    if samples.is_empty() {
        return Err(ExtractError::CorruptFile(format!(
            "no decodable audio: {}",
            path.display()
        )));
    }

    debug!(
        path = %path.display(),
        samples = samples.len(),
        sample_rate,
        "decoded mono PCM"
    );
    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

/// Average all channels of a decoded buffer into the mono accumulator
fn append_mono(decoded: &AudioBufferRef<'_>, out: &mut Vec<f32>) {
    match decoded {
        AudioBufferRef::F32(buf) => mixdown(buf, out, |s| s),
        AudioBufferRef::F64(buf) => mixdown(buf, out, |s| s as f32),
        AudioBufferRef::S8(buf) => mixdown(buf, out, |s| f32::from(s) / 128.0),
        AudioBufferRef::S16(buf) => mixdown(buf, out, |s| f32::from(s) / 32768.0),
        AudioBufferRef::S24(buf) => mixdown(buf, out, |s| s.inner() as f32 / 8_388_608.0),
        AudioBufferRef::S32(buf) => mixdown(buf, out, |s| s as f32 / 2_147_483_648.0),
        AudioBufferRef::U8(buf) => mixdown(buf, out, |s| (f32::from(s) - 128.0) / 128.0),
        AudioBufferRef::U16(buf) => mixdown(buf, out, |s| (f32::from(s) - 32768.0) / 32768.0),
        AudioBufferRef::U24(buf) => {
            mixdown(buf, out, |s| (s.inner() as f32 - 8_388_608.0) / 8_388_608.0)
        }
        AudioBufferRef::U32(buf) => mixdown(buf, out, |s| {
            (s as f64 / 2_147_483_648.0 - 1.0) as f32
        }),
    }
}

fn mixdown<S, F>(buf: &symphonia::core::audio::AudioBuffer<S>, out: &mut Vec<f32>, convert: F)
where
    S: symphonia::core::sample::Sample,
    F: Fn(S) -> f32,
{
    let channels = buf.spec().channels.count();
    let frames = buf.frames();
    if channels == 0 || frames == 0 {
        return;
    }
    out.reserve(frames);
    if channels == 1 {
        let chan = buf.chan(0);
        out.extend(chan.iter().take(frames).map(|&s| convert(s)));
        return;
    }
    let scale = 1.0 / channels as f32;
    for frame in 0..frames {
        let mut acc = 0.0f32;
        for ch in 0..channels {
            acc += convert(buf.chan(ch)[frame]);
        }
        out.push(acc * scale);
    }
}
