//! Built-in signal-analysis feature extractor
//!
//! Decodes to mono PCM, then derives:
//! - an RMS energy envelope (and the stored energy time series)
//! - tempo, from autocorrelation of the onset strength signal
//! - musical key, from a Goertzel chromagram correlated against
//!   Krumhansl-style key profiles
//! - the remaining score fields from envelope and brightness proxies
//!
//! All of it is deterministic over the input bytes, which is what the cache's
//! stability contract needs.

use std::path::Path;
use std::time::Instant;

use tracing::debug;

use cueflow_common::models::{Confidence, EnergyPoint, Features};
use cueflow_common::mood::{MoodClassifier, MoodInputs};
use cueflow_common::theory::MusicalKey;

use super::decode::{decode_mono, DecodedAudio};
use super::{ExtractError, ExtractOptions, Extraction, FeatureExtractor};

/// Envelope frame rate used for onset analysis, frames per second
const ENVELOPE_FPS: f64 = 50.0;

/// Krumhansl-Kessler major key profile, C-rooted
const MAJOR_PROFILE: [f64; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];

/// Krumhansl-Kessler minor key profile, C-rooted
const MINOR_PROFILE: [f64; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

/// The default production extractor
#[derive(Debug, Default)]
pub struct SignalExtractor {
    classifier: MoodClassifier,
}

impl SignalExtractor {
    pub fn new() -> Self {
        Self {
            classifier: MoodClassifier::new(),
        }
    }
}

impl FeatureExtractor for SignalExtractor {
    fn extract(&self, path: &Path, options: &ExtractOptions) -> Result<Extraction, ExtractError> {
        let deadline = Instant::now() + options.analysis_timeout;
        let audio = decode_mono(path, deadline)?;
        let duration = audio.duration_seconds();
        if duration < 1.0 {
            return Err(ExtractError::CorruptFile(format!(
                "audio too short to analyse: {duration:.2}s"
            )));
        }

        let hop = (f64::from(audio.sample_rate) / ENVELOPE_FPS).max(1.0) as usize;
        let envelope = rms_envelope(&audio.samples, hop);
        if envelope.len() < 4 {
            return Err(ExtractError::CorruptFile(
                "audio too short to analyse".to_string(),
            ));
        }

        let (bpm, bpm_confidence) = estimate_bpm(&envelope, ENVELOPE_FPS);
        if Instant::now() >= deadline {
            return Err(ExtractError::Timeout(format!(
                "analysis exceeded budget: {}",
                path.display()
            )));
        }

        let (key, key_confidence) = estimate_key(&audio, deadline)?;

        let overall_rms = rms(&audio.samples);
        let energy = energy_from_rms(overall_rms);
        let brightness = brightness(&audio.samples);
        let onset_density = onset_density(&envelope, ENVELOPE_FPS);
        let modulation = envelope_modulation(&envelope);

        let valence = (0.20
            + if key.is_minor() { 0.0 } else { 0.35 }
            + 0.45 * brightness)
            .clamp(0.0, 1.0);
        let tempo_factor = (1.0 - (bpm - 122.0).abs() / 122.0).clamp(0.0, 1.0);
        let danceability = (0.55 * bpm_confidence + 0.45 * tempo_factor).clamp(0.0, 1.0);
        let acousticness = (1.0 - 0.7 * brightness - 0.3 * onset_density).clamp(0.0, 1.0);
        let instrumentalness = (1.0 - modulation).clamp(0.0, 1.0);

        let (energy_timeseries, stride_seconds) = energy_timeseries(&audio, duration);

        let classification = self.classifier.classify(MoodInputs {
            energy,
            valence,
            bpm,
            acousticness,
            minor: key.is_minor(),
        });

        let features = Features {
            bpm: bpm.clamp(40.0, 240.0),
            key,
            camelot: key.camelot(),
            energy,
            valence,
            danceability,
            acousticness,
            instrumentalness,
            mood: classification.mood,
            mood_scores: classification.scores,
            energy_timeseries,
            stride_seconds,
            confidence: Confidence {
                bpm: bpm_confidence,
                key: key_confidence,
                energy: 0.95,
                mood: classification.confidence,
            },
        };

        debug!(
            path = %path.display(),
            bpm = features.bpm,
            key = %features.key,
            energy = features.energy,
            mood = %features.mood,
            "extraction complete"
        );

        Ok(Extraction {
            features,
            duration_seconds: duration,
            sample_rate: Some(audio.sample_rate),
        })
    }
}

/// RMS over consecutive `hop`-sample windows
fn rms_envelope(samples: &[f32], hop: usize) -> Vec<f64> {
    samples
        .chunks(hop.max(1))
        .map(|chunk| rms(chunk))
        .collect()
}

fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum / samples.len() as f64).sqrt()
}

/// Map an RMS level to the `[0, 1]` energy scale. A full-scale sine
/// (RMS ≈ 0.707) maps to 1.0; the square root lifts quiet material the way
/// perceived loudness does.
fn energy_from_rms(rms: f64) -> f64 {
    (rms * std::f64::consts::SQRT_2).clamp(0.0, 1.0).sqrt()
}

/// Tempo from autocorrelation of the onset strength signal.
///
/// Returns `(bpm, confidence)`. Rhythm-free material (a pure tone, silence)
/// yields a neutral 120 BPM at near-zero confidence rather than an error.
fn estimate_bpm(envelope: &[f64], fps: f64) -> (f64, f64) {
    // Onset strength: positive envelope difference.
    let onsets: Vec<f64> = envelope
        .windows(2)
        .map(|w| (w[1] - w[0]).max(0.0))
        .collect();
    let total: f64 = onsets.iter().sum();
    if total <= 1e-9 {
        return (120.0, 0.02);
    }

    let lag_min = (fps * 60.0 / 240.0).floor().max(1.0) as usize;
    let lag_max = ((fps * 60.0 / 40.0).ceil() as usize).min(onsets.len().saturating_sub(1));
    if lag_max <= lag_min {
        return (120.0, 0.02);
    }

    let mut best_lag = lag_min;
    let mut best_score = f64::MIN;
    let mut score_sum = 0.0;
    let mut scores = vec![0.0; lag_max + 1];
    for lag in lag_min..=lag_max {
        let mut acc = 0.0;
        for i in 0..(onsets.len() - lag) {
            acc += onsets[i] * onsets[i + lag];
        }
        let score = acc / (onsets.len() - lag) as f64;
        scores[lag] = score;
        score_sum += score;
        if score > best_score {
            best_score = score;
            best_lag = lag;
        }
    }

    // Parabolic interpolation around the peak for sub-lag precision.
    let refined_lag = if best_lag > lag_min && best_lag < lag_max {
        let (y0, y1, y2) = (
            scores[best_lag - 1],
            scores[best_lag],
            scores[best_lag + 1],
        );
        let denom = y0 - 2.0 * y1 + y2;
        if denom.abs() > 1e-12 {
            best_lag as f64 + 0.5 * (y0 - y2) / denom
        } else {
            best_lag as f64
        }
    } else {
        best_lag as f64
    };

    let bpm = (60.0 * fps / refined_lag).clamp(40.0, 240.0);
    let mean_score = score_sum / (lag_max - lag_min + 1) as f64;
    let prominence = if mean_score > 1e-12 {
        (best_score / mean_score - 1.0).max(0.0)
    } else {
        0.0
    };
    let confidence = (prominence / (1.0 + prominence)).clamp(0.0, 1.0);
    (bpm, confidence)
}

/// Onsets per second relative to a dense-percussion reference, `[0, 1]`
fn onset_density(envelope: &[f64], fps: f64) -> f64 {
    if envelope.len() < 2 {
        return 0.0;
    }
    let mean: f64 = envelope.iter().sum::<f64>() / envelope.len() as f64;
    let threshold = mean * 0.5;
    let mut onsets = 0usize;
    for w in envelope.windows(2) {
        if w[1] - w[0] > threshold {
            onsets += 1;
        }
    }
    let per_second = onsets as f64 / (envelope.len() as f64 / fps);
    (per_second / 8.0).clamp(0.0, 1.0)
}

/// Coefficient of variation of the envelope, squashed to `[0, 1]`.
/// Heavily modulated material (vocals, dynamic arrangements) scores high.
fn envelope_modulation(envelope: &[f64]) -> f64 {
    if envelope.len() < 2 {
        return 0.0;
    }
    let mean: f64 = envelope.iter().sum::<f64>() / envelope.len() as f64;
    if mean <= 1e-9 {
        return 0.0;
    }
    let var: f64 = envelope
        .iter()
        .map(|v| (v - mean) * (v - mean))
        .sum::<f64>()
        / envelope.len() as f64;
    (var.sqrt() / mean / 1.5).clamp(0.0, 1.0)
}

/// Zero-crossing-rate brightness proxy, `[0, 1]`
fn brightness(samples: &[f32]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let mut crossings = 0usize;
    for w in samples.windows(2) {
        if (w[0] >= 0.0) != (w[1] >= 0.0) {
            crossings += 1;
        }
    }
    let zcr = crossings as f64 / (samples.len() - 1) as f64;
    (zcr / 0.2).clamp(0.0, 1.0)
}

/// Key estimation: Goertzel chromagram over C3..B5, correlated against the
/// 24 rotated key profiles.
fn estimate_key(audio: &DecodedAudio, deadline: Instant) -> Result<(MusicalKey, f64), ExtractError> {
    // Analysis window: up to the first 60 seconds, decimated 4:1. Key is a
    // global property; more data sharpens nothing.
    let max_samples = (audio.sample_rate as usize) * 60;
    let taken = &audio.samples[..audio.samples.len().min(max_samples)];
    let decimated: Vec<f32> = taken.iter().step_by(4).copied().collect();
    let rate = f64::from(audio.sample_rate) / 4.0;

    let mut chroma = [0.0f64; 12];
    for midi in 48..=83u32 {
        if Instant::now() >= deadline {
            return Err(ExtractError::Timeout("key analysis exceeded budget".to_string()));
        }
        let freq = 440.0 * 2f64.powf((f64::from(midi) - 69.0) / 12.0);
        if freq >= rate / 2.0 {
            continue;
        }
        let power = goertzel_power(&decimated, rate, freq);
        chroma[(midi % 12) as usize] += power;
    }

    let total: f64 = chroma.iter().sum();
    if total <= 1e-12 {
        // Tonally empty; report the neutral default with no confidence.
        let key: MusicalKey = "Am".parse().expect("static key parses");
        return Ok((key, 0.0));
    }
    for bin in chroma.iter_mut() {
        *bin /= total;
    }

    let mut best = (0u8, false, f64::MIN);
    let mut runner_up = f64::MIN;
    for root in 0..12u8 {
        for minor in [false, true] {
            let profile = if minor { &MINOR_PROFILE } else { &MAJOR_PROFILE };
            let score = profile_correlation(&chroma, profile, root);
            if score > best.2 {
                runner_up = best.2;
                best = (root, minor, score);
            } else if score > runner_up {
                runner_up = score;
            }
        }
    }

    let key = MusicalKey::new(best.0, best.1)
        .map_err(|err| ExtractError::Internal(err.to_string()))?;
    let confidence = if runner_up.is_finite() {
        ((best.2 - runner_up) * 4.0).clamp(0.0, 1.0)
    } else {
        0.0
    };
    Ok((key, confidence))
}

/// Goertzel single-bin power at `freq`, normalised by window length
fn goertzel_power(samples: &[f32], sample_rate: f64, freq: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let omega = 2.0 * std::f64::consts::PI * freq / sample_rate;
    let coeff = 2.0 * omega.cos();
    let mut s_prev = 0.0f64;
    let mut s_prev2 = 0.0f64;
    for &sample in samples {
        let s = f64::from(sample) + coeff * s_prev - s_prev2;
        s_prev2 = s_prev;
        s_prev = s;
    }
    let power = s_prev * s_prev + s_prev2 * s_prev2 - coeff * s_prev * s_prev2;
    (power / samples.len() as f64).max(0.0)
}

/// Pearson correlation between the chroma vector and a profile rotated to
/// `root`
fn profile_correlation(chroma: &[f64; 12], profile: &[f64; 12], root: u8) -> f64 {
    let chroma_mean: f64 = chroma.iter().sum::<f64>() / 12.0;
    let profile_mean: f64 = profile.iter().sum::<f64>() / 12.0;
    let mut num = 0.0;
    let mut den_c = 0.0;
    let mut den_p = 0.0;
    for pc in 0..12usize {
        let c = chroma[(pc + root as usize) % 12] - chroma_mean;
        let p = profile[pc] - profile_mean;
        num += c * p;
        den_c += c * c;
        den_p += p * p;
    }
    if den_c <= 1e-15 || den_p <= 1e-15 {
        return 0.0;
    }
    num / (den_c * den_p).sqrt()
}

/// The stored energy time series: stride `duration / 63` clamped to
/// `[0.25 s, 5 s]`, relaxed further for very short files so at least 8
/// samples always come out.
fn energy_timeseries(audio: &DecodedAudio, duration: f64) -> (Vec<EnergyPoint>, f64) {
    let mut stride = (duration / 63.0).clamp(0.25, 5.0);
    if duration / stride < 8.0 {
        stride = duration / 8.0;
    }
    let window = (stride * f64::from(audio.sample_rate)).max(1.0) as usize;
    let mut points = Vec::new();
    let mut t = 0.0;
    let mut offset = 0usize;
    while t < duration && offset < audio.samples.len() {
        let end = (offset + window).min(audio.samples.len());
        points.push(EnergyPoint {
            t,
            v: energy_from_rms(rms(&audio.samples[offset..end])),
        });
        t += stride;
        offset = end;
    }
    (points, stride)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Synthetic mono audio at 44.1 kHz
    fn synth(duration: f64, generator: impl Fn(f64) -> f32) -> DecodedAudio {
        let sample_rate = 44_100u32;
        let n = (duration * f64::from(sample_rate)) as usize;
        let samples = (0..n)
            .map(|i| generator(i as f64 / f64::from(sample_rate)))
            .collect();
        DecodedAudio {
            samples,
            sample_rate,
        }
    }

    fn click_track(duration: f64, bpm: f64) -> DecodedAudio {
        let beat = 60.0 / bpm;
        synth(duration, move |t| {
            let phase = t % beat;
            if phase < 0.02 {
                // Short decaying burst on each beat
                (1.0 - phase / 0.02) as f32 * 0.9
            } else {
                0.0
            }
        })
    }

    #[test]
    fn test_rms_of_known_signals() {
        assert_eq!(rms(&[]), 0.0);
        assert!((rms(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-6);
        let sine = synth(1.0, |t| (t * 440.0 * std::f64::consts::TAU).sin() as f32);
        assert!((rms(&sine.samples) - std::f64::consts::FRAC_1_SQRT_2).abs() < 0.01);
    }

    #[test]
    fn test_energy_scale_endpoints() {
        assert_eq!(energy_from_rms(0.0), 0.0);
        assert!((energy_from_rms(std::f64::consts::FRAC_1_SQRT_2) - 1.0).abs() < 1e-6);
        assert!(energy_from_rms(5.0) <= 1.0);
    }

    #[test]
    fn test_bpm_from_click_track() {
        for target in [90.0, 120.0, 128.0] {
            let audio = click_track(20.0, target);
            let hop = (f64::from(audio.sample_rate) / ENVELOPE_FPS) as usize;
            let envelope = rms_envelope(&audio.samples, hop);
            let (bpm, confidence) = estimate_bpm(&envelope, ENVELOPE_FPS);
            // The autocorrelation peak may land on a metrical multiple;
            // accept the target or its half/double.
            let candidates = [target, target / 2.0, target * 2.0];
            assert!(
                candidates.iter().any(|c| (bpm - c).abs() < 3.0),
                "expected ~{target} (or a multiple), got {bpm}"
            );
            assert!(confidence > 0.2, "confidence too low: {confidence}");
        }
    }

    #[test]
    fn test_toneless_audio_gets_neutral_bpm() {
        let audio = synth(5.0, |_| 0.3);
        let hop = (f64::from(audio.sample_rate) / ENVELOPE_FPS) as usize;
        let envelope = rms_envelope(&audio.samples, hop);
        let (bpm, confidence) = estimate_bpm(&envelope, ENVELOPE_FPS);
        assert_eq!(bpm, 120.0);
        assert!(confidence < 0.1);
    }

    #[test]
    fn test_key_profile_correlation_recovers_rotation() {
        // A chroma that IS the A-rotated minor profile must classify as Am.
        let mut chroma = [0.0f64; 12];
        for pc in 0..12usize {
            chroma[(pc + 9) % 12] = MINOR_PROFILE[pc];
        }
        let total: f64 = chroma.iter().sum();
        for bin in chroma.iter_mut() {
            *bin /= total;
        }
        let mut best = (0u8, false, f64::MIN);
        for root in 0..12u8 {
            for minor in [false, true] {
                let profile = if minor { &MINOR_PROFILE } else { &MAJOR_PROFILE };
                let score = profile_correlation(&chroma, profile, root);
                if score > best.2 {
                    best = (root, minor, score);
                }
            }
        }
        assert_eq!(best.0, 9, "expected root A");
        assert!(best.1, "expected minor mode");
    }

    #[test]
    fn test_estimate_key_on_a_minor_triad() {
        // A4 + C5 + E5: the pitch classes of A minor.
        let audio = synth(4.0, |t| {
            let tau = std::f64::consts::TAU;
            (0.3 * (t * 440.00 * tau).sin()
                + 0.3 * (t * 523.25 * tau).sin()
                + 0.3 * (t * 659.25 * tau).sin()) as f32
        });
        let deadline = Instant::now() + std::time::Duration::from_secs(60);
        let (key, _confidence) = estimate_key(&audio, deadline).unwrap();
        // Root must be one of the sounded pitch classes; A and C dominate.
        assert!(
            [9u8, 0u8, 4u8].contains(&key.pitch_class()),
            "implausible key {key} for an A-minor triad"
        );
    }

    #[test]
    fn test_goertzel_isolates_tone() {
        let audio = synth(1.0, |t| (t * 440.0 * std::f64::consts::TAU).sin() as f32);
        let at_tone = goertzel_power(&audio.samples, 44_100.0, 440.0);
        let off_tone = goertzel_power(&audio.samples, 44_100.0, 622.25);
        assert!(at_tone > off_tone * 100.0);
    }

    #[test]
    fn test_timeseries_always_has_eight_points() {
        for duration in [1.5f64, 2.0, 10.0, 120.0, 600.0] {
            let audio = synth(duration.min(12.0), |t| (t * 220.0).sin() as f32);
            let effective = audio.duration_seconds();
            let (points, stride) = energy_timeseries(&audio, effective);
            assert!(points.len() >= 8, "{} points for {effective}s", points.len());
            assert_eq!(points[0].t, 0.0);
            let last = points.last().unwrap();
            assert!(last.t + stride >= effective - 1e-6);
            for w in points.windows(2) {
                assert!(w[1].t >= w[0].t);
            }
        }
    }

    #[test]
    fn test_full_extraction_over_wav() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("fixture.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&wav, spec).unwrap();
        for i in 0..(44_100 * 4) {
            let t = i as f64 / 44_100.0;
            let beat = t % 0.5;
            let click = if beat < 0.02 { 0.8 * (1.0 - beat / 0.02) } else { 0.0 };
            let tone = 0.25 * (t * 440.0 * std::f64::consts::TAU).sin();
            let sample = ((tone + click) * f64::from(i16::MAX)) as i16;
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        let extractor = SignalExtractor::new();
        let extraction = extractor.extract(&wav, &ExtractOptions::default()).unwrap();

        assert!((extraction.duration_seconds - 4.0).abs() < 0.1);
        let features = &extraction.features;
        features.validate(extraction.duration_seconds).unwrap();
        assert!((40.0..=240.0).contains(&features.bpm));
        assert!((0.0..=1.0).contains(&features.energy));
        assert_eq!(features.camelot, features.key.camelot());

        // Same bytes, second call: the stability contract.
        let again = extractor.extract(&wav, &ExtractOptions::default()).unwrap();
        assert!((again.features.bpm - features.bpm).abs() <= 0.1);
        assert!((again.features.energy - features.energy).abs() <= 0.01);
    }

    #[test]
    fn test_garbage_bytes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.wav");
        std::fs::write(&bogus, b"this is not audio at all").unwrap();
        let extractor = SignalExtractor::new();
        let err = extractor
            .extract(&bogus, &ExtractOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            ExtractError::UnsupportedFormat(_) | ExtractError::CorruptFile(_)
        ));
    }
}
