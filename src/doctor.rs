//! Health checks for `friendrec doctor`.
//!
//! Each check returns a [`HealthCheck`]; the CLI renders them and exits
//! non-zero if any has [`CheckStatus::Error`].

use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

use crate::directory::UserDirectory;
use crate::model::UserId;
use crate::perf::RECOMMEND;
use crate::recommend::RecommendationEngine;
use crate::store::EmbeddingStore;

/// High-level category for a health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckCategory {
    Store,
    Directory,
    Performance,
}

/// Status for an individual health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warning,
    Error,
}

impl CheckStatus {
    /// Whether the check is healthy enough for continued operation.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Single health check result.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub category: CheckCategory,
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl HealthCheck {
    fn pass(category: CheckCategory, name: &str, message: String) -> Self {
        Self {
            category,
            name: name.to_string(),
            status: CheckStatus::Pass,
            message,
            suggestion: None,
        }
    }

    fn warning(category: CheckCategory, name: &str, message: String, suggestion: String) -> Self {
        Self {
            category,
            name: name.to_string(),
            status: CheckStatus::Warning,
            message,
            suggestion: Some(suggestion),
        }
    }
}

/// Number of example ids quoted in a warning.
const EXAMPLE_IDS: usize = 3;

/// Recommend calls made by the latency check.
const LATENCY_SAMPLES: usize = 20;

fn format_examples(ids: &[UserId]) -> String {
    let shown: Vec<String> = ids.iter().take(EXAMPLE_IDS).map(ToString::to_string).collect();
    format!(
        "{}{}",
        shown.join(", "),
        if ids.len() > EXAMPLE_IDS { ", ..." } else { "" }
    )
}

/// Report for an embedding file that failed to load.
#[must_use]
pub fn check_store_load_failure(path: &Path, error: &crate::FriendRecError) -> HealthCheck {
    HealthCheck {
        category: CheckCategory::Store,
        name: "Embedding Store".to_string(),
        status: CheckStatus::Error,
        message: format!("{}: {error}", path.display()),
        suggestion: error.suggestion().map(ToString::to_string),
    }
}

/// Store size and dimension.
#[must_use]
pub fn check_store_shape(store: &EmbeddingStore) -> HealthCheck {
    HealthCheck::pass(
        CheckCategory::Store,
        "Embedding Store",
        format!(
            "{} students, {} dimensions",
            crate::format_number_usize(store.len()),
            store.dimension()
        ),
    )
}

/// Rows whose embedding is the zero vector. They score 0 against everyone.
#[must_use]
pub fn check_zero_vectors(store: &EmbeddingStore) -> HealthCheck {
    let zero: Vec<UserId> = (0..store.len())
        .filter(|&i| store.norm(i).is_some_and(|n| n <= 0.0))
        .map(UserId::from_index)
        .collect();

    if zero.is_empty() {
        HealthCheck::pass(CheckCategory::Store, "Zero Vectors", "none".to_string())
    } else {
        HealthCheck::warning(
            CheckCategory::Store,
            "Zero Vectors",
            format!("{} students have an all-zero embedding", zero.len()),
            format!(
                "These students get arbitrary recommendations: {}",
                format_examples(&zero)
            ),
        )
    }
}

/// Rows that are bit-for-bit copies of an earlier row.
#[must_use]
pub fn check_duplicate_rows(store: &EmbeddingStore) -> HealthCheck {
    let mut seen: HashMap<Vec<u32>, usize> = HashMap::with_capacity(store.len());
    let mut duplicates: Vec<UserId> = Vec::new();

    for (index, row) in store.rows().enumerate() {
        let key: Vec<u32> = row.iter().map(|v| v.to_bits()).collect();
        if seen.insert(key, index).is_some() {
            duplicates.push(UserId::from_index(index));
        }
    }

    if duplicates.is_empty() {
        HealthCheck::pass(
            CheckCategory::Store,
            "Duplicate Embeddings",
            format!("{} distinct rows", seen.len()),
        )
    } else {
        HealthCheck::warning(
            CheckCategory::Store,
            "Duplicate Embeddings",
            format!("{} rows repeat an earlier row", duplicates.len()),
            format!("Duplicated students: {}", format_examples(&duplicates)),
        )
    }
}

/// Whether a roster was configured and loaded.
#[must_use]
pub fn check_directory_present(directory: &UserDirectory, path: Option<&Path>) -> HealthCheck {
    match path {
        None => HealthCheck::warning(
            CheckCategory::Directory,
            "User Directory",
            "no directory configured".to_string(),
            "Pass --directory <users.csv> to show names instead of ids".to_string(),
        ),
        Some(path) if directory.is_empty() => HealthCheck::warning(
            CheckCategory::Directory,
            "User Directory",
            format!("{} could not be loaded or has no rows", path.display()),
            "The file must be CSV with 'uid' and 'info' header columns".to_string(),
        ),
        Some(path) => {
            let mut message = format!(
                "{} entries from {} ({})",
                crate::format_number_usize(directory.len()),
                path.display(),
                directory.encoding().as_str()
            );
            if directory.skipped_rows() > 0 {
                let _ = write!(message, ", {} rows skipped", directory.skipped_rows());
            }
            HealthCheck::pass(CheckCategory::Directory, "User Directory", message)
        }
    }
}

/// Store ids that have no roster entry.
#[must_use]
pub fn check_directory_coverage(store: &EmbeddingStore, directory: &UserDirectory) -> HealthCheck {
    let missing: Vec<UserId> = (0..store.len())
        .map(UserId::from_index)
        .filter(|id| directory.get(*id).is_none())
        .collect();

    if missing.is_empty() {
        HealthCheck::pass(
            CheckCategory::Directory,
            "Directory Coverage",
            "every student has info".to_string(),
        )
    } else {
        HealthCheck::warning(
            CheckCategory::Directory,
            "Directory Coverage",
            format!(
                "{} of {} students have no info",
                missing.len(),
                store.len()
            ),
            format!("Placeholder shown for: {}", format_examples(&missing)),
        )
    }
}

/// Roster ids that no embedding row can produce.
#[must_use]
pub fn check_directory_extras(store: &EmbeddingStore, directory: &UserDirectory) -> HealthCheck {
    let extras: Vec<UserId> = directory
        .ids()
        .filter(|id| id.to_index(store.len()).is_none())
        .collect();

    if extras.is_empty() {
        HealthCheck::pass(
            CheckCategory::Directory,
            "Directory Range",
            format!("all ids within 1..={}", store.len()),
        )
    } else {
        HealthCheck::warning(
            CheckCategory::Directory,
            "Directory Range",
            format!("{} ids outside 1..={}", extras.len(), store.len()),
            format!("These entries are never recommended: {}", format_examples(&extras)),
        )
    }
}

/// Time a spread of recommend calls against the `RECOMMEND` budget.
#[must_use]
pub fn measure_recommend_latency(engine: &RecommendationEngine, top_k: usize) -> HealthCheck {
    let len = engine.len();
    let step = (len / LATENCY_SAMPLES).max(1);
    let mut durations: Vec<f64> = Vec::with_capacity(LATENCY_SAMPLES);

    for index in (0..len).step_by(step).take(LATENCY_SAMPLES) {
        let id = UserId::from_index(index).get();
        let start = Instant::now();
        let _ = engine.recommend(id, top_k);
        durations.push(start.elapsed().as_secs_f64() * 1000.0);
    }

    durations.sort_by(f64::total_cmp);
    let median = durations.get(durations.len() / 2).copied().unwrap_or(0.0);
    let worst = durations.last().copied().unwrap_or(0.0);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let status = RECOMMEND.status(std::time::Duration::from_micros((median * 1000.0) as u64));
    let message = format!(
        "p50={median:.2}ms, max={worst:.2}ms (n={}, target {}ms)",
        durations.len(),
        RECOMMEND.target.as_millis()
    );

    if status.is_ok() {
        HealthCheck::pass(CheckCategory::Performance, "Recommend Latency", message)
    } else {
        HealthCheck::warning(
            CheckCategory::Performance,
            "Recommend Latency",
            message,
            "Use a release build; stores above 4096 rows are scanned in parallel".to_string(),
        )
    }
}

/// Run every check against a loaded store and directory.
#[must_use]
pub fn run_all(
    engine: &RecommendationEngine,
    directory: &UserDirectory,
    directory_path: Option<&Path>,
    top_k: usize,
) -> Vec<HealthCheck> {
    info!("Running health checks");
    let store = engine.store();

    let mut checks = vec![
        check_store_shape(store),
        check_zero_vectors(store),
        check_duplicate_rows(store),
        check_directory_present(directory, directory_path),
    ];
    if !directory.is_empty() {
        checks.push(check_directory_coverage(store, directory));
        checks.push(check_directory_extras(store, directory));
    }

    debug!("Probing recommend latency");
    checks.push(measure_recommend_latency(engine, top_k));
    checks
}

/// Whether any check failed hard.
#[must_use]
pub fn has_errors(checks: &[HealthCheck]) -> bool {
    checks.iter().any(|c| c.status == CheckStatus::Error)
}
