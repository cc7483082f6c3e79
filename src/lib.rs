//! friendrec - embedding-based friend recommendations
//!
//! This library ranks students by cosine similarity of precomputed embedding
//! vectors and serves the closest classmates as friend recommendations.
//!
//! # Modules
//!
//! - [`store`] - Embedding matrix loading and similarity scans
//! - [`recommend`] - Top-k recommendation engine
//! - [`directory`] - `uid,info` roster with encoding fallback
//! - [`server`] - HTTP JSON surface
//! - [`cli`] - Command-line interface definitions
//! - [`error`] - Custom error types with rich context

pub mod cli;
pub mod config;
pub mod directory;
pub mod doctor;
pub mod error;
pub mod logging;
pub mod model;
pub mod perf;
pub mod recommend;
pub mod repl;
pub mod server;
pub mod similarity;
pub mod store;

pub use cli::*;
pub use config::Config;
pub use directory::UserDirectory;
pub use error::{
    FriendRecError, Result, VALID_CONFIG_KEYS, find_closest_match,
    format_did_you_mean, format_error, format_unknown_value_error,
};
pub use model::*;
pub use recommend::RecommendationEngine;
pub use store::{EmbeddingStore, StoreStats};

/// Number of friends recommended when the caller does not say.
pub const DEFAULT_TOP_K: usize = 5;

/// Default embedding filename inside the data directory.
pub const DEFAULT_EMBEDDINGS_NAME: &str = "user_embeddings.npy";

/// Default roster filename inside the data directory.
pub const DEFAULT_DIRECTORY_NAME: &str = "users.csv";

/// Standard width for header dividers in CLI output.
pub const HEADER_DIVIDER_WIDTH: usize = 40;

/// Horizontal rule printed under section headers.
#[must_use]
pub fn header_divider() -> String {
    "─".repeat(HEADER_DIVIDER_WIDTH)
}

/// Get the default data directory for friendrec
#[must_use]
pub fn default_data_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("friendrec")
}

/// Get the default embedding file path
#[must_use]
pub fn default_embeddings_path() -> std::path::PathBuf {
    default_data_dir().join(DEFAULT_EMBEDDINGS_NAME)
}

/// Get the default roster path
#[must_use]
pub fn default_directory_path() -> std::path::PathBuf {
    default_data_dir().join(DEFAULT_DIRECTORY_NAME)
}

/// Format an unsigned integer with thousands separators.
#[must_use]
pub fn format_number_usize(value: usize) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);

    for (idx, ch) in digits.chars().rev().enumerate() {
        if idx > 0 && idx % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    out.chars().rev().collect()
}

/// Quote a CSV field, doubling embedded quotes and flattening newlines.
#[must_use]
pub fn csv_escape_text(text: &str) -> String {
    format!(
        "\"{}\"",
        text.replace('"', "\"\"").replace(['\n', '\r'], " ")
    )
}

#[cfg(test)]
mod tests {
    use super::{
        HEADER_DIVIDER_WIDTH, csv_escape_text, default_directory_path, default_embeddings_path,
        format_number_usize, header_divider,
    };

    #[test]
    fn format_number_adds_separators() {
        assert_eq!(format_number_usize(0), "0");
        assert_eq!(format_number_usize(999), "999");
        assert_eq!(format_number_usize(1000), "1,000");
        assert_eq!(format_number_usize(12_345_678), "12,345,678");
    }

    #[test]
    fn csv_escape_text_quotes_and_flattens() {
        assert_eq!(csv_escape_text("Hello\r\n\"world\", ok"), "\"Hello  \"\"world\"\", ok\"");
        assert_eq!(csv_escape_text("张三"), "\"张三\"");
    }

    #[test]
    fn header_divider_uses_shared_width() {
        let divider = header_divider();
        assert_eq!(divider.chars().count(), HEADER_DIVIDER_WIDTH);
        assert!(divider.chars().all(|c| c == '─'));
    }

    #[test]
    fn default_paths_share_data_dir() {
        assert!(default_embeddings_path().ends_with("friendrec/user_embeddings.npy"));
        assert!(default_directory_path().ends_with("friendrec/users.csv"));
    }
}
