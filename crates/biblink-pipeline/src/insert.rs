//! Batched transactional record insertion
//!
//! Rows whose formatted identifier is in the matched set are turned into
//! records and written to the source's named graph in the destination,
//! one transaction per batch. A failed batch is logged and counted as not
//! inserted; the remaining batches still run.

use futures::StreamExt;
use std::collections::HashSet;
use tracing::{debug, error, info};

use biblink_core::{
    ExtractedRecord, FormatResult, IdentifierKind, Literal, Quad, QueryRow,
    RepositoryConnection, Result, Schema,
};
use biblink_normalize::Normalizer;

use crate::progress::InsertProgress;

/// Counters of one insertion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertSummary {
    /// Records written by committed transactions
    pub saved: usize,
    /// Records lost to failed transactions
    pub failed: usize,
    pub invalid_titles: usize,
    pub invalid_years: usize,
}

/// Writes records of one source into the destination
pub struct RecordInserter<'a> {
    pub destination: &'a dyn RepositoryConnection,
    pub schema: &'a Schema,
    pub kind: IdentifierKind,
    /// Named graph receiving the source's records
    pub graph: String,
    pub batch_size: usize,
    pub insert_message_records: usize,
}

impl RecordInserter<'_> {
    /// Stream `query` from `source` and insert every matching row
    ///
    /// Errors while streaming are logged and end the run; the summary then
    /// holds what was committed so far.
    pub async fn insert(
        &self,
        source: &dyn RepositoryConnection,
        query: &str,
        identifiers: &HashSet<String>,
        normalizer: &Normalizer,
    ) -> InsertSummary {
        let mut summary = InsertSummary::default();
        if let Err(e) = self
            .insert_rows(source, query, identifiers, normalizer, &mut summary)
            .await
        {
            error!(error = %e, "Record insertion stopped");
        }

        if summary.invalid_titles > 0 {
            info!("invalid title count : {}", summary.invalid_titles);
        }
        if summary.invalid_years > 0 {
            info!("invalid year count : {}", summary.invalid_years);
        }
        summary
    }

    async fn insert_rows(
        &self,
        source: &dyn RepositoryConnection,
        query: &str,
        identifiers: &HashSet<String>,
        normalizer: &Normalizer,
        summary: &mut InsertSummary,
    ) -> Result<()> {
        let batch_size = self.batch_size.max(1);
        let mut progress = InsertProgress::new(self.kind.display_name(), self.insert_message_records);
        let mut records = HashSet::new();

        let mut rows = source.query(query).await?;
        while let Some(row) = rows.next().await {
            let row = row?;
            let Some(record) = self.record_from_row(&row, identifiers, normalizer, summary) else {
                continue;
            };

            records.insert(record);
            if records.len() >= batch_size {
                self.flush(&mut records, summary).await;
                progress.update(summary.saved);
            }
        }

        if !records.is_empty() {
            self.flush(&mut records, summary).await;
            progress.update(summary.saved);
        }
        Ok(())
    }

    fn record_from_row(
        &self,
        row: &QueryRow,
        identifiers: &HashSet<String>,
        normalizer: &Normalizer,
        summary: &mut InsertSummary,
    ) -> Option<ExtractedRecord> {
        let identifier = normalizer
            .identifier(row.get(self.kind.variable_name()).unwrap_or_default(), self.kind)
            .into_option()?;
        if !identifiers.contains(&identifier) {
            return None;
        }
        let subject = row.get("subject")?;

        // An unbound year is empty, not invalid
        let year = match row.get("year") {
            Some(raw) => {
                let year = normalizer.year(raw);
                if !year.is_valid {
                    summary.invalid_years += 1;
                }
                year
            }
            None => FormatResult::invalid(),
        };

        let Some(title) = row.get("title").map(|t| normalizer.title(t)).filter(|t| t.is_valid)
        else {
            summary.invalid_titles += 1;
            return None;
        };

        Some(ExtractedRecord::new(
            subject,
            identifier,
            title.value,
            year.value,
        ))
    }

    async fn flush(&self, records: &mut HashSet<ExtractedRecord>, summary: &mut InsertSummary) {
        let count = records.len();
        match self.execute_transaction(records).await {
            Ok(()) => summary.saved += count,
            Err(e) => {
                error!(error = %e, records = count, "Failed to save batch");
                summary.failed += count;
            }
        }
        records.clear();
    }

    /// Write one batch in a single transaction
    ///
    /// A failed addition rolls the transaction back so nothing of the
    /// batch is kept; otherwise the commit decides.
    async fn execute_transaction(&self, records: &HashSet<ExtractedRecord>) -> Result<()> {
        let mut transaction = self.destination.begin().await?;

        let mut added = Ok(());
        for quad in records.iter().flat_map(|record| self.quads(record)) {
            added = transaction.add(&quad).await;
            if added.is_err() {
                break;
            }
        }

        if let Err(e) = added {
            if let Err(rollback) = transaction.rollback().await {
                error!(error = %rollback, "Rollback failed");
            }
            return Err(e);
        }

        transaction.commit().await?;
        debug!(records = records.len(), graph = %self.graph, "Committed batch");
        Ok(())
    }

    /// Identifier and title quads, plus a year quad when the year is known
    pub fn quads(&self, record: &ExtractedRecord) -> Vec<Quad> {
        let mut quads = vec![
            Quad::new(
                &record.subject,
                self.schema.identifier_property(self.kind),
                Literal::string(&record.identifier),
                &self.graph,
            ),
            Quad::new(
                &record.subject,
                self.schema.title_property(),
                Literal::string(&record.title),
                &self.graph,
            ),
        ];

        if !record.year.is_empty() {
            quads.push(Quad::new(
                &record.subject,
                self.schema.year_property(),
                Literal::gyear(&record.year),
                &self.graph,
            ));
        }
        quads
    }
}
