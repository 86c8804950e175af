//! BibLink Pipeline - Identifier matching between two repositories
//!
//! Extracts the identifiers of one kind from source A and source B,
//! intersects them, and saves the records of both sources that carry a
//! shared identifier into the destination repository:
//!
//! 1. Validate the three endpoints and check their authorization
//! 2. Optionally load the identifiers already saved for source B
//! 3. Extract source A identifiers (minus the saved ones)
//! 4. Extract source B identifiers restricted to source A's
//! 5. Insert matching records of A, then of B, in batched transactions
//!
//! Author: hephaex@gmail.com

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

use biblink_core::{
    BibLinkError, EndpointRole, IdentifierKind, PipelineSettings, ReplacementRules,
    RepositoryConnection, RepositoryEndpoint, RepositoryGateway, Result, Schema,
};
use biblink_normalize::Normalizer;

pub mod identifiers;
pub mod insert;
pub mod progress;

pub use identifiers::{formatted_identifier_set, identifier_set, IdentifierFilter};
pub use insert::{InsertSummary, RecordInserter};
pub use progress::{ExtractProgress, InsertProgress};

// ============================================================================
// Requests and Reports
// ============================================================================

/// One matching run against a source B
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    /// Query selecting `subject`, the identifier variable, `title` and `year` from source A
    pub source_a_query: String,
    /// Same selection against source B
    pub source_b_query: String,
    pub source_b: RepositoryEndpoint,
    pub kind: IdentifierKind,
    /// Skip identifiers already saved for source B
    pub save_new_only: bool,
    /// `None` disables the replacement stage for source B
    pub source_b_rules: Option<ReplacementRules>,
}

impl ExtractionRequest {
    pub fn new(
        source_a_query: impl Into<String>,
        source_b_query: impl Into<String>,
        source_b: RepositoryEndpoint,
        kind: IdentifierKind,
    ) -> Self {
        Self {
            source_a_query: source_a_query.into(),
            source_b_query: source_b_query.into(),
            source_b,
            kind,
            save_new_only: false,
            source_b_rules: None,
        }
    }

    pub fn save_new_only(mut self, save_new_only: bool) -> Self {
        self.save_new_only = save_new_only;
        self
    }

    pub fn with_source_b_rules(mut self, rules: ReplacementRules) -> Self {
        self.source_b_rules = Some(rules);
        self
    }
}

/// What a run found and saved
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    /// Identifiers already saved for source B (save-new-only runs)
    pub existing_identifiers: usize,
    /// Valid identifiers of source A after exclusion
    pub source_a_identifiers: usize,
    pub source_a_invalid: usize,
    /// Identifiers found in both sources
    pub matched_identifiers: usize,
    pub source_b_invalid: usize,
    pub source_a: InsertSummary,
    pub source_b: InsertSummary,
}

impl ExtractionReport {
    pub fn source_a_saved(&self) -> usize {
        self.source_a.saved
    }

    pub fn source_b_saved(&self) -> usize {
        self.source_b.saved
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Matches records of source A against other sources and saves them to
/// the destination; holds open connections to source A and the destination
pub struct ExtractionPipeline {
    gateway: Arc<dyn RepositoryGateway>,
    source_a: RepositoryEndpoint,
    destination: RepositoryEndpoint,
    source_a_connection: Box<dyn RepositoryConnection>,
    destination_connection: Box<dyn RepositoryConnection>,
    source_a_normalizer: Normalizer,
    settings: PipelineSettings,
}

impl ExtractionPipeline {
    /// Open the source A and destination connections
    pub async fn connect(
        gateway: Arc<dyn RepositoryGateway>,
        source_a: RepositoryEndpoint,
        destination: RepositoryEndpoint,
        source_a_rules: Option<ReplacementRules>,
        settings: PipelineSettings,
    ) -> Result<Self> {
        settings.validate()?;

        let source_a_connection = gateway.connect(&source_a).await?;
        let destination_connection = match gateway.connect(&destination).await {
            Ok(connection) => connection,
            Err(e) => {
                let _ = source_a_connection.close().await;
                return Err(e);
            }
        };

        Ok(Self {
            gateway,
            source_a,
            destination,
            source_a_connection,
            destination_connection,
            source_a_normalizer: Normalizer::new(source_a_rules.as_ref()),
            settings,
        })
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run one match and return the number of source B records saved
    ///
    /// Every failure is logged and reported as 0.
    pub async fn extract(&self, request: &ExtractionRequest) -> usize {
        match self.run(request).await {
            Ok(report) => report.source_b_saved(),
            Err(BibLinkError::ConfigurationMissing(_)) => 0,
            Err(e) => {
                error!(error = %e, kind = %request.kind, "Extraction aborted");
                0
            }
        }
    }

    /// Run one match and report what was found and saved
    ///
    /// Missing configuration, authorization failures and failed identifier
    /// queries are errors. Finding no identifiers is not: the report then
    /// shows the empty extraction and nothing saved.
    pub async fn run(&self, request: &ExtractionRequest) -> Result<ExtractionReport> {
        self.check_parameters(&request.source_b)?;

        for endpoint in [&self.source_a, &request.source_b, &self.destination] {
            self.gateway.authorize(endpoint).await?;
        }

        let source_b_connection = self.gateway.connect(&request.source_b).await?;
        let result = self.run_with(source_b_connection.as_ref(), request).await;
        if let Err(e) = source_b_connection.close().await {
            warn!(error = %e, repository = %request.source_b.repository_id, "Failed to close connection");
        }
        result
    }

    async fn run_with(
        &self,
        source_b_connection: &dyn RepositoryConnection,
        request: &ExtractionRequest,
    ) -> Result<ExtractionReport> {
        let kind = request.kind;
        let name = kind.display_name();
        let every = self.settings.extract_message_records;
        let schema = Schema::new(&self.destination.schema_url);
        let source_b_normalizer = Normalizer::new(request.source_b_rules.as_ref());
        let mut report = ExtractionReport::default();

        let existing = if request.save_new_only {
            info!(
                "Retrieving {} data of {} from repository {}...",
                name, request.source_b.repository_name, self.destination.repository_id
            );
            let query = schema.existing_identifiers_query(&request.source_b.repository_name, kind);
            let existing =
                identifier_set(self.destination_connection.as_ref(), &query, kind, None, every)
                    .await?;
            info!("unique records found : {}", existing.len());
            report.existing_identifiers = existing.len();
            Some(existing)
        } else {
            None
        };

        info!(
            "Extracting {} data from repository {}...",
            name, self.source_a.repository_id
        );
        let source_a = formatted_identifier_set(
            self.source_a_connection.as_ref(),
            &request.source_a_query,
            kind,
            &self.source_a_normalizer,
            IdentifierFilter {
                inclusion: None,
                exclusion: existing.as_ref(),
            },
            every,
        )
        .await?;
        report.source_a_identifiers = source_a.len();
        report.source_a_invalid = source_a.invalid_count;
        if source_a.is_empty() {
            return Ok(report);
        }
        info!("total unique records found : {}", source_a.len());

        info!(
            "Extracting {} data from repository {}...",
            name, request.source_b.repository_id
        );
        let matched = formatted_identifier_set(
            source_b_connection,
            &request.source_b_query,
            kind,
            &source_b_normalizer,
            IdentifierFilter::including(&source_a.identifiers),
            every,
        )
        .await?;
        report.matched_identifiers = matched.len();
        report.source_b_invalid = matched.invalid_count;
        if matched.is_empty() {
            return Ok(report);
        }
        info!("matching unique records found : {}", matched.len());

        report.source_a = self
            .save(
                self.source_a_connection.as_ref(),
                &self.source_a,
                &request.source_a_query,
                &matched.identifiers,
                &self.source_a_normalizer,
                &schema,
                kind,
            )
            .await;
        report.source_b = self
            .save(
                source_b_connection,
                &request.source_b,
                &request.source_b_query,
                &matched.identifiers,
                &source_b_normalizer,
                &schema,
                kind,
            )
            .await;

        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    async fn save(
        &self,
        source: &dyn RepositoryConnection,
        endpoint: &RepositoryEndpoint,
        query: &str,
        identifiers: &HashSet<String>,
        normalizer: &Normalizer,
        schema: &Schema,
        kind: IdentifierKind,
    ) -> InsertSummary {
        info!("Saving records from repository {}...", endpoint.repository_id);
        let inserter = RecordInserter {
            destination: self.destination_connection.as_ref(),
            schema,
            kind,
            graph: schema.data_graph(&endpoint.repository_name),
            batch_size: self.settings.insert_batch_size,
            insert_message_records: self.settings.insert_message_records,
        };

        let summary = inserter.insert(source, query, identifiers, normalizer).await;
        info!("total records saved : {}", summary.saved);
        summary
    }

    /// Warn about every missing endpoint field; error if there was any
    fn check_parameters(&self, source_b: &RepositoryEndpoint) -> Result<()> {
        let checks = [
            ("source A", &self.source_a, EndpointRole::Source),
            ("source B", source_b, EndpointRole::Source),
            ("destination", &self.destination, EndpointRole::Destination),
        ];

        let mut missing = Vec::new();
        for (label, endpoint, role) in checks {
            for field in endpoint.missing_fields(role) {
                warn!("{} parameter missing for the {} repository", field, label);
                missing.push(format!("{label} {field}"));
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(BibLinkError::ConfigurationMissing(missing.join(", ")))
        }
    }

    /// Release the source A and destination connections
    pub async fn close(self) -> Result<()> {
        let source_a = self.source_a_connection.close().await;
        let destination = self.destination_connection.close().await;
        source_a.and(destination)
    }
}
