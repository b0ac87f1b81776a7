//! Sample-rate conversion from the microphone's native rate to the 16 kHz
//! the ASR and wake recognizer require.
//!
//! Policy: if the ratio is an integer within 0.001, use
//! stride-decimation (cheap, no ringing); otherwise fall back to a
//! polyphase resampler (`rubato`). If neither path is viable the raw
//! samples pass through unchanged with a logged warning — a Decode-class
//! situation should never be fatal here.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::warn;

/// Converts i16 mono PCM from `native_rate` to `target_rate`.
pub enum RateConverter {
    /// `native_rate == target_rate`.
    Passthrough,
    /// Integer decimation factor (e.g. 48000 -> 16000 is a factor of 3).
    Decimate { factor: usize },
    /// General polyphase resampler for non-integer ratios.
    Polyphase(Box<FastFixedIn<f32>>),
}

impl RateConverter {
    pub fn new(native_rate: u32, target_rate: u32) -> Self {
        if native_rate == target_rate {
            return RateConverter::Passthrough;
        }

        let ratio = native_rate as f64 / target_rate as f64;
        let rounded = ratio.round();
        if (ratio - rounded).abs() < 0.001 && rounded >= 1.0 {
            return RateConverter::Decimate { factor: rounded as usize };
        }

        let out_ratio = target_rate as f64 / native_rate as f64;
        match FastFixedIn::<f32>::new(out_ratio, 1.0, PolynomialDegree::Cubic, 1024, 1) {
            Ok(r) => RateConverter::Polyphase(Box::new(r)),
            Err(e) => {
                warn!("polyphase resampler init failed ({e}); passing audio through unchanged");
                RateConverter::Passthrough
            }
        }
    }

    /// Resample one block of mono i16 PCM. Output length varies with the
    /// strategy and is not guaranteed to match any fixed frame size.
    pub fn process(&mut self, input: &[i16]) -> Vec<i16> {
        match self {
            RateConverter::Passthrough => input.to_vec(),
            RateConverter::Decimate { factor } => {
                input.iter().step_by(*factor).copied().collect()
            }
            RateConverter::Polyphase(resampler) => {
                let input_f32: Vec<f32> = input.iter().map(|s| *s as f32 / i16::MAX as f32).collect();
                let chunk_size = resampler.input_frames_next();
                let mut out = Vec::new();
                let mut offset = 0;
                while offset + chunk_size <= input_f32.len() {
                    let chunk = &input_f32[offset..offset + chunk_size];
                    match resampler.process(&[chunk], None) {
                        Ok(produced) => {
                            out.extend(produced[0].iter().map(|s| {
                                (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
                            }));
                        }
                        Err(e) => {
                            warn!("polyphase resample error: {e}");
                        }
                    }
                    offset += chunk_size;
                }
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_when_rates_match() {
        let mut rc = RateConverter::new(16_000, 16_000);
        let input = vec![1i16, 2, 3, 4];
        assert_eq!(rc.process(&input), input);
    }

    #[test]
    fn decimates_integer_ratio() {
        let mut rc = RateConverter::new(48_000, 16_000);
        let input: Vec<i16> = (0..9).collect();
        let out = rc.process(&input);
        assert_eq!(out, vec![0, 3, 6]);
    }

    #[test]
    fn polyphase_used_for_non_integer_ratio() {
        let mut rc = RateConverter::new(44_100, 16_000);
        assert!(matches!(rc, RateConverter::Polyphase(_)));
        let input = vec![0i16; 2048];
        let out = rc.process(&input);
        assert!(!out.is_empty());
    }
}
