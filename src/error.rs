//! Custom error types for friendrec.
//!
//! Provides structured error handling with detailed context for better
//! diagnostics and user experience.

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for friendrec operations.
///
/// Each variant provides specific context about what went wrong,
/// enabling better error messages and programmatic error handling.
#[derive(Error, Debug)]
pub enum FriendRecError {
    // =========================================================================
    // Embedding Store Errors
    // =========================================================================
    /// The embedding file is missing or malformed. Fatal at startup.
    #[error("Failed to load embeddings from '{path}': {reason}")]
    StoreLoad { path: PathBuf, reason: String },

    /// A row index outside `[0, len)` reached the store.
    ///
    /// The recommendation engine bounds-checks identifiers before touching the
    /// store, so seeing this outside the store's own tests is a bug.
    #[error("Row index {index} out of range for store of {len} vectors")]
    IndexOutOfRange { index: usize, len: usize },

    // =========================================================================
    // User Directory Errors
    // =========================================================================
    /// The user directory CSV could not be read or decoded.
    #[error("Failed to load user directory from '{path}': {reason}")]
    DirectoryLoad { path: PathBuf, reason: String },

    // =========================================================================
    // Request Errors
    // =========================================================================
    /// A request parameter was missing or malformed.
    #[error("Invalid '{name}' parameter: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// HTTP server failed to bind or run.
    #[error("Server error: {0}")]
    Server(String),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file could not be read or parsed.
    #[error("Invalid configuration in '{path}': {reason}")]
    ConfigError { path: PathBuf, reason: String },
}

/// Result type alias for friendrec operations.
pub type Result<T> = std::result::Result<T, FriendRecError>;

impl FriendRecError {
    /// Create a store load error.
    pub fn store_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::StoreLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a directory load error.
    pub fn directory_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::DirectoryLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid parameter error.
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Get a suggestion for how to fix this error, if applicable.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::StoreLoad { .. } => Some(
                "Pass --embeddings <path> pointing at a .json (array of rows) or .npy (2-D float) file.",
            ),
            Self::DirectoryLoad { .. } => Some(
                "The directory must be a CSV with a header containing 'uid' and 'info' columns.",
            ),
            Self::InvalidParameter { .. } => Some("Identifiers and k must be integers, e.g. ?id=1&k=5."),
            Self::ConfigError { .. } => Some("Run 'friendrec config --init' to see a valid config file."),
            Self::IndexOutOfRange { .. } | Self::Server(_) => None,
        }
    }
}

// =============================================================================
// CLI Error Formatting Utilities
// =============================================================================

use colored::Colorize;

/// Format a structured CLI error with explanation and suggestions.
///
/// # Arguments
/// * `title` - Brief error title (e.g., "Conflicting options")
/// * `explanation` - What went wrong and why
/// * `suggestions` - List of actionable suggestions
#[must_use]
pub fn format_error(title: &str, explanation: &str, suggestions: &[&str]) -> String {
    use std::fmt::Write;

    let mut output = format!("{} {}", "✗".red().bold(), title.bold());

    if !explanation.is_empty() {
        let _ = write!(output, "\n\n   {explanation}");
    }

    if !suggestions.is_empty() {
        output.push_str("\n\n   ");
        if suggestions.len() == 1 {
            let _ = write!(output, "{} {}", "Hint:".cyan(), suggestions[0]);
        } else {
            let _ = write!(output, "{}:", "Try".cyan());
            for suggestion in suggestions {
                let _ = write!(output, "\n     {} {}", "•".dimmed(), suggestion);
            }
        }
    }

    output
}

/// Calculate the Levenshtein edit distance between two strings.
///
/// Used for "did you mean?" suggestions on config keys and REPL commands.
#[must_use]
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let a_len = a_chars.len();
    let b_len = b_chars.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    // Two rows instead of the full matrix
    let mut prev_row: Vec<usize> = (0..=b_len).collect();
    let mut curr_row: Vec<usize> = vec![0; b_len + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        curr_row[0] = i + 1;

        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
        }

        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b_len]
}

/// Find the best match from a list of candidates for a given input.
///
/// Returns `Some(match)` if a sufficiently close match is found (edit distance
/// at most `max_distance`, default 2), `None` otherwise. An input that already
/// matches a candidate gets `None`, since there is nothing to suggest.
#[must_use]
pub fn find_closest_match<'a>(
    input: &str,
    candidates: &[&'a str],
    max_distance: Option<usize>,
) -> Option<&'a str> {
    let max_dist = max_distance.unwrap_or(2);
    let input_lower = input.to_lowercase();

    if candidates
        .iter()
        .any(|candidate| candidate.to_lowercase() == input_lower)
    {
        return None;
    }

    candidates
        .iter()
        .map(|&candidate| {
            let distance = levenshtein_distance(&input_lower, &candidate.to_lowercase());
            (candidate, distance)
        })
        .filter(|(_, distance)| *distance <= max_dist && *distance > 0)
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}

/// Format a "did you mean?" suggestion.
#[must_use]
pub fn format_did_you_mean(suggestion: &str) -> String {
    format!("Did you mean '{}'?", suggestion.green())
}

/// Format an error for an unknown value with "did you mean?" support.
pub fn format_unknown_value_error(kind: &str, input: &str, valid_options: &[&str]) -> String {
    let title = format!("Unknown {kind}: '{input}'");

    let mut suggestions = Vec::new();

    if let Some(closest) = find_closest_match(input, valid_options, None) {
        suggestions.push(format_did_you_mean(closest));
    }

    if valid_options.len() <= 8 {
        suggestions.push(format!("Valid {kind}s: {}", valid_options.join(", ")));
    }

    let suggestion_refs: Vec<&str> = suggestions.iter().map(String::as_str).collect();
    format_error(&title, "", &suggestion_refs)
}

/// Standard valid config keys.
pub const VALID_CONFIG_KEYS: &[&str] = &[
    "paths.embeddings",
    "paths.directory",
    "recommend.top_k",
    "server.host",
    "server.port",
    "output.format",
    "output.colors",
];
