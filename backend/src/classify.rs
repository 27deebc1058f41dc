//! Mapping from resolver failure text to user-facing errors.
//!
//! yt-dlp reports failures as free text, so this is substring matching
//! against its current wording. When upstream rewords a message the failure
//! degrades to [`ErrorKind::Unclassified`] and the raw text is returned.

use crate::error::{ApiError, ErrorKind};

struct FailurePattern {
    needle: &'static str,
    kind: ErrorKind,
    code: &'static str,
    message: &'static str,
    hint: &'static str,
}

/// Checked in order; needles are lowercase.
const FAILURE_PATTERNS: [FailurePattern; 2] = [
    FailurePattern {
        needle: "confirm you're not a bot",
        kind: ErrorKind::BotChallengeDetected,
        code: "BOT_DETECTION",
        message: "YouTube blocked this request with a bot check.",
        hint: "Upload fresh YouTube cookies from a logged-in browser session and try again.",
    },
    FailurePattern {
        needle: "requested format is not available",
        kind: ErrorKind::FormatUnavailable,
        code: "FORMAT_UNAVAILABLE",
        message: "The requested format is not available for this media.",
        hint: "Try the other output format or a different URL.",
    },
];

pub fn classify_failure(message: &str) -> ApiError {
    let normalized = message.replace(['\u{2019}', '\u{2018}'], "'").to_lowercase();

    FAILURE_PATTERNS
        .iter()
        .find(|pattern| normalized.contains(pattern.needle))
        .map(|pattern| {
            ApiError::new(pattern.kind, pattern.message)
                .with_code(pattern.code)
                .with_hint(pattern.hint)
        })
        .unwrap_or_else(|| ApiError::new(ErrorKind::Unclassified, message.trim()))
}
