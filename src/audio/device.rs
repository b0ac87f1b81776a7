//! Input device selection heuristics.
//!
//! Scores candidate device names so the Audio Source prefers an actual
//! microphone over a loopback/monitor device when the configured index is
//! unavailable — the same heuristic a desktop dictation pipeline needs
//! when `cpal`'s device list includes system-output monitors.

const LOOPBACK_KEYWORDS: &[&str] = &[
    "stereo mix",
    "loopback",
    "monitor of",
    "what u hear",
    "virtual output",
];

const MIC_KEYWORDS: &[&str] = &["microphone", "mic", "headset", "array", "usb", "webcam"];

pub fn is_loopback_like(name: &str) -> bool {
    let lowered = name.to_ascii_lowercase();
    LOOPBACK_KEYWORDS.iter().any(|k| lowered.contains(k))
}

pub fn mic_preference_score(name: &str) -> i32 {
    let lowered = name.to_ascii_lowercase();
    let mut score = 0;
    if is_loopback_like(&lowered) {
        score -= 16;
    } else {
        score += 8;
    }
    if MIC_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        score += 6;
    }
    score
}
