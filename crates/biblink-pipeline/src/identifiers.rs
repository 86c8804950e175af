//! Identifier set extraction
//!
//! Streams a query's rows and collects the values bound to an identifier
//! kind's reserved variable. A failed query is returned as an error, which
//! callers must keep apart from an empty set.

use futures::StreamExt;
use std::collections::HashSet;
use tracing::info;

use biblink_core::{ExtractionOutcome, IdentifierKind, RepositoryConnection, Result};
use biblink_normalize::Normalizer;

use crate::progress::ExtractProgress;

/// Collect the identifiers bound in `query`'s results
///
/// With a normalizer only valid formatted values are kept; without one
/// the raw bound values are collected as they are. Rows that do not bind
/// the variable are skipped.
pub async fn identifier_set(
    connection: &dyn RepositoryConnection,
    query: &str,
    kind: IdentifierKind,
    normalizer: Option<&Normalizer>,
    extract_message_records: usize,
) -> Result<HashSet<String>> {
    let variable = kind.variable_name();
    let mut progress = ExtractProgress::new(kind.display_name(), extract_message_records);
    let mut identifiers = HashSet::new();

    let mut rows = connection.query(query).await?;
    while let Some(row) = rows.next().await {
        let row = row?;
        progress.row();

        let Some(raw) = row.get(variable) else {
            continue;
        };

        match normalizer {
            Some(normalizer) => {
                if let Some(value) = normalizer.identifier(raw, kind).into_option() {
                    identifiers.insert(value);
                }
            }
            None => {
                identifiers.insert(raw.to_string());
            }
        }
    }

    progress.finish();
    Ok(identifiers)
}

/// Filters applied while collecting formatted identifiers
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentifierFilter<'a> {
    /// Keep only values in this set; extraction stops once all are found
    pub inclusion: Option<&'a HashSet<String>>,
    /// Drop values in this set
    pub exclusion: Option<&'a HashSet<String>>,
}

impl<'a> IdentifierFilter<'a> {
    pub fn including(inclusion: &'a HashSet<String>) -> Self {
        Self {
            inclusion: Some(inclusion),
            exclusion: None,
        }
    }

    pub fn excluding(exclusion: &'a HashSet<String>) -> Self {
        Self {
            inclusion: None,
            exclusion: Some(exclusion),
        }
    }

    fn admits(&self, value: &str) -> bool {
        if let Some(inclusion) = self.inclusion {
            if !inclusion.contains(value) {
                return false;
            }
        }
        !self
            .exclusion
            .is_some_and(|exclusion| exclusion.contains(value))
    }

    fn covered(&self, found: usize) -> bool {
        self.inclusion
            .is_some_and(|inclusion| !inclusion.is_empty() && inclusion.len() == found)
    }
}

/// Collect formatted identifiers, applying inclusion then exclusion then
/// validity, and counting the invalid ones
pub async fn formatted_identifier_set(
    connection: &dyn RepositoryConnection,
    query: &str,
    kind: IdentifierKind,
    normalizer: &Normalizer,
    filter: IdentifierFilter<'_>,
    extract_message_records: usize,
) -> Result<ExtractionOutcome> {
    let variable = kind.variable_name();
    let name = kind.display_name();
    let mut progress = ExtractProgress::new(name, extract_message_records);
    let mut outcome = ExtractionOutcome::default();

    let mut rows = connection.query(query).await?;
    while let Some(row) = rows.next().await {
        let row = row?;
        progress.row();

        let formatted = normalizer.identifier(row.get(variable).unwrap_or_default(), kind);
        if !filter.admits(&formatted.value) {
            continue;
        }

        if formatted.is_valid {
            outcome.identifiers.insert(formatted.value);
            if filter.covered(outcome.identifiers.len()) {
                break;
            }
        } else {
            outcome.invalid_count += 1;
        }
    }

    progress.finish();
    if outcome.invalid_count > 0 {
        info!("invalid {} count : {}", name, outcome.invalid_count);
    }
    if outcome.is_empty() {
        if progress.rows() > 0 {
            info!("no new {} records found", name);
        } else {
            info!("no {} records found", name);
        }
    }

    Ok(outcome)
}
