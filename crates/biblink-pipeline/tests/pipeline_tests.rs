//! End-to-end matching runs against in-memory repositories

use std::collections::HashSet;
use std::sync::Arc;

use biblink_core::{
    BibLinkError, IdentifierKind, Literal, PipelineSettings, Quad, QueryRow, RepositoryEndpoint,
    Schema,
};
use biblink_normalize::Normalizer;
use biblink_pipeline::{
    formatted_identifier_set, identifier_set, ExtractionPipeline, ExtractionRequest,
    IdentifierFilter,
};
use biblink_store::{MemoryGateway, MemoryRepository};
use tokio_test::assert_ok;

const SCHEMA: &str = "http://example.org/biblink";
const QUERY_A: &str = "SELECT ?subject ?isbn ?title ?year WHERE { a }";
const QUERY_B: &str = "SELECT ?subject ?isbn ?title ?year WHERE { b }";

struct Fixture {
    source_a: MemoryRepository,
    source_b: MemoryRepository,
    destination: MemoryRepository,
    gateway: MemoryGateway,
}

impl Fixture {
    fn new() -> Self {
        let source_a = MemoryRepository::new();
        let source_b = MemoryRepository::new();
        let destination = MemoryRepository::new();
        let gateway = MemoryGateway::new()
            .with_repository("library-a", source_a.clone())
            .with_repository("library-b", source_b.clone())
            .with_repository("links", destination.clone());

        Self {
            source_a,
            source_b,
            destination,
            gateway,
        }
    }

    async fn pipeline(&self, settings: PipelineSettings) -> ExtractionPipeline {
        self.pipeline_to(destination(), settings).await
    }

    async fn pipeline_to(
        &self,
        destination: RepositoryEndpoint,
        settings: PipelineSettings,
    ) -> ExtractionPipeline {
        ExtractionPipeline::connect(
            Arc::new(self.gateway.clone()),
            source_a(),
            destination,
            None,
            settings,
        )
        .await
        .expect("pipeline should connect")
    }
}

fn source_a() -> RepositoryEndpoint {
    RepositoryEndpoint::new("memory://a", "library-a", "Library A")
}

fn source_b() -> RepositoryEndpoint {
    RepositoryEndpoint::new("memory://b", "library-b", "Library B")
}

fn destination() -> RepositoryEndpoint {
    RepositoryEndpoint::new("memory://dest", "links", "Links").with_schema_url(SCHEMA)
}

fn request() -> ExtractionRequest {
    ExtractionRequest::new(QUERY_A, QUERY_B, source_b(), IdentifierKind::Isbn)
}

fn row(subject: &str, isbn: &str, title: &str, year: &str) -> QueryRow {
    QueryRow::new()
        .with("subject", subject)
        .with("isbn", isbn)
        .with("title", title)
        .with("year", year)
}

fn settings(batch_size: usize) -> PipelineSettings {
    PipelineSettings {
        insert_batch_size: batch_size,
        extract_message_records: 2,
        insert_message_records: 2,
    }
}

/// Three ISBNs shared by both sources, in different spellings
fn shared_rows(fixture: &Fixture) {
    fixture.source_a.respond(
        QUERY_A,
        vec![
            row("http://a/1", "0-306-40615-2", "Optics", "1999"),
            row("http://a/2", "080442957X", "Waves", "2001-05"),
            row("http://a/3", "9780262033848", "Algorithms", "2009"),
        ],
    );
    fixture.source_b.respond(
        QUERY_B,
        vec![
            row("http://b/1", "9780306406157", "OPTICS", "1999"),
            row("http://b/2", "978-0-8044-2957-3", "Waves", "2001"),
            row("http://b/3", "978 0262033848", "Algorithms", "2009"),
        ],
    );
}

// ============================================================================
// Matching
// ============================================================================

#[tokio::test]
async fn test_only_shared_identifiers_are_saved() {
    let fixture = Fixture::new();
    fixture.source_a.respond(
        QUERY_A,
        vec![
            row("http://a/1", "0-306-40615-2", "Optics", "1999"),
            row("http://a/2", "080442957X", "Waves", "2001-05"),
            row("http://a/3", "9780262033848", "Algorithms", ""),
            row("http://a/4", "12345", "Broken", "2000"),
        ],
    );
    fixture.source_b.respond(
        QUERY_B,
        vec![
            row("http://b/1", "9780306406157", "Optics", "1999"),
            row("http://b/2", "978-0-8044-2957-3", "Waves", "2001"),
            row("http://b/3", "9780131103627", "C", "1988"),
        ],
    );

    let pipeline = fixture.pipeline(PipelineSettings::default()).await;
    let report = pipeline.run(&request()).await.unwrap();

    assert_eq!(report.source_a_identifiers, 3);
    assert_eq!(report.source_a_invalid, 1);
    assert_eq!(report.matched_identifiers, 2);
    assert_eq!(report.source_a_saved(), 2);
    assert_eq!(report.source_b_saved(), 2);

    let committed = fixture.destination.committed();
    assert_eq!(committed.len(), 12);
    assert!(committed.contains(&Quad::new(
        "http://a/1",
        "http://example.org/biblink/property/isbn",
        Literal::string("9780306406157"),
        "http://example.org/biblink/graph/library_a",
    )));
    assert!(committed.contains(&Quad::new(
        "http://b/2",
        "http://example.org/biblink/property/year",
        Literal::gyear("2001"),
        "http://example.org/biblink/graph/library_b",
    )));
    assert!(!committed.iter().any(|q| q.subject == "http://a/3"));
    assert!(!committed.iter().any(|q| q.subject == "http://b/3"));
}

#[tokio::test]
async fn test_extract_returns_source_b_count() {
    let fixture = Fixture::new();
    shared_rows(&fixture);

    let pipeline = fixture.pipeline(PipelineSettings::default()).await;
    assert_eq!(pipeline.extract(&request()).await, 3);
}

#[tokio::test]
async fn test_no_shared_identifiers_saves_nothing() {
    let fixture = Fixture::new();
    fixture
        .source_a
        .respond(QUERY_A, vec![row("http://a/1", "0306406152", "Optics", "1999")]);
    fixture
        .source_b
        .respond(QUERY_B, vec![row("http://b/1", "9780131103627", "C", "1988")]);

    let pipeline = fixture.pipeline(PipelineSettings::default()).await;
    let report = pipeline.run(&request()).await.unwrap();

    assert_eq!(report.source_a_identifiers, 1);
    assert_eq!(report.matched_identifiers, 0);
    assert_eq!(fixture.destination.transactions_begun(), 0);
}

#[tokio::test]
async fn test_source_b_extraction_stops_once_all_matched() {
    let fixture = Fixture::new();
    fixture.source_a.respond(
        QUERY_A,
        vec![
            row("http://a/1", "0306406152", "Optics", "1999"),
            row("http://a/2", "080442957X", "Waves", "2001"),
        ],
    );
    fixture
        .source_b
        .respond(
            QUERY_B,
            vec![
                row("http://b/1", "0306406152", "Optics", "1999"),
                row("http://b/2", "080442957X", "Waves", "2001"),
                row("http://b/3", "9780131103627", "C", "1988"),
            ],
        )
        .fail_stream_after(QUERY_B, 2);

    let pipeline = fixture.pipeline(PipelineSettings::default()).await;
    let report = pipeline.run(&request()).await.unwrap();

    // The stream error after the second row is never reached while matching
    assert_eq!(report.matched_identifiers, 2);
    assert_eq!(report.source_a_saved(), 2);
}

#[tokio::test]
async fn test_duplicate_rows_are_saved_once() {
    let fixture = Fixture::new();
    fixture.source_a.respond(
        QUERY_A,
        vec![
            row("http://a/1", "0306406152", "Optics", "1999"),
            row("http://a/1", "0-306-40615-2", "Optics", "1999"),
        ],
    );
    fixture
        .source_b
        .respond(QUERY_B, vec![row("http://b/1", "9780306406157", "Optics", "1999")]);

    let pipeline = fixture.pipeline(PipelineSettings::default()).await;
    let report = pipeline.run(&request()).await.unwrap();

    assert_eq!(report.source_a_saved(), 1);
    assert_eq!(report.source_b_saved(), 1);
}

// ============================================================================
// Save New Only
// ============================================================================

#[tokio::test]
async fn test_save_new_only_skips_saved_identifiers() {
    let fixture = Fixture::new();
    shared_rows(&fixture);

    let existing_query =
        Schema::new(SCHEMA).existing_identifiers_query("Library B", IdentifierKind::Isbn);
    fixture.destination.respond(
        existing_query.clone(),
        vec![QueryRow::new()
            .with("subject", "http://b/1")
            .with("isbn", "9780306406157")],
    );

    let pipeline = fixture.pipeline(PipelineSettings::default()).await;
    let report = pipeline.run(&request().save_new_only(true)).await.unwrap();

    assert_eq!(report.existing_identifiers, 1);
    assert_eq!(report.source_a_identifiers, 2);
    assert_eq!(report.matched_identifiers, 2);
    assert_eq!(report.source_b_saved(), 2);
    assert_eq!(fixture.destination.executed_queries(), vec![existing_query]);
    assert!(!fixture
        .destination
        .committed()
        .iter()
        .any(|q| q.subject == "http://a/1" || q.subject == "http://b/1"));
}

#[tokio::test]
async fn test_save_new_only_rerun_is_a_no_op() {
    let fixture = Fixture::new();
    shared_rows(&fixture);

    let existing_query =
        Schema::new(SCHEMA).existing_identifiers_query("Library B", IdentifierKind::Isbn);
    let saved: Vec<QueryRow> = ["9780306406157", "9780804429573", "9780262033848"]
        .into_iter()
        .map(|isbn| QueryRow::new().with("isbn", isbn))
        .collect();
    fixture.destination.respond(existing_query, saved);

    let pipeline = fixture.pipeline(PipelineSettings::default()).await;
    let report = pipeline.run(&request().save_new_only(true)).await.unwrap();

    assert_eq!(report.existing_identifiers, 3);
    assert_eq!(report.source_a_identifiers, 0);
    assert_eq!(report.source_b_saved(), 0);
    assert_eq!(fixture.destination.transactions_begun(), 0);
    // Source B is never queried when source A has nothing new
    assert!(fixture.source_b.executed_queries().is_empty());
}

// ============================================================================
// Batching and Transactions
// ============================================================================

#[tokio::test]
async fn test_exact_batch_commits_once() {
    let fixture = Fixture::new();
    fixture.source_a.respond(
        QUERY_A,
        vec![
            row("http://a/1", "0306406152", "Optics", "1999"),
            row("http://a/2", "080442957X", "Waves", "2001"),
        ],
    );
    fixture.source_b.respond(
        QUERY_B,
        vec![
            row("http://b/1", "0306406152", "Optics", "1999"),
            row("http://b/2", "080442957X", "Waves", "2001"),
        ],
    );

    let pipeline = fixture.pipeline(settings(2)).await;
    let report = pipeline.run(&request()).await.unwrap();

    assert_eq!(report.source_a_saved(), 2);
    assert_eq!(report.source_b_saved(), 2);
    // One transaction per source, no trailing flush
    assert_eq!(fixture.destination.transactions_begun(), 2);
    assert_eq!(fixture.destination.commits(), 2);
}

#[tokio::test]
async fn test_remainder_is_flushed() {
    let fixture = Fixture::new();
    shared_rows(&fixture);

    let pipeline = fixture.pipeline(settings(2)).await;
    let report = pipeline.run(&request()).await.unwrap();

    assert_eq!(report.source_a_saved(), 3);
    assert_eq!(report.source_b_saved(), 3);
    assert_eq!(fixture.destination.transactions_begun(), 4);
}

#[tokio::test]
async fn test_failed_commit_does_not_stop_the_run() {
    let fixture = Fixture::new();
    shared_rows(&fixture);
    fixture.destination.fail_commit(2);

    let pipeline = fixture.pipeline(settings(1)).await;
    let report = pipeline.run(&request()).await.unwrap();

    assert_eq!(report.source_a.saved, 2);
    assert_eq!(report.source_a.failed, 1);
    assert_eq!(report.source_b.saved, 3);
    assert_eq!(fixture.destination.transactions_begun(), 6);
    assert_eq!(fixture.destination.commits(), 5);
}

#[tokio::test]
async fn test_failed_additions_roll_back() {
    let fixture = Fixture::new();
    shared_rows(&fixture);
    fixture.destination.fail_adds();

    let pipeline = fixture.pipeline(settings(2)).await;
    let report = pipeline.run(&request()).await.unwrap();

    assert_eq!(report.source_a_saved(), 0);
    assert_eq!(report.source_b_saved(), 0);
    assert_eq!(report.source_b.failed, 3);
    assert_eq!(fixture.destination.rollbacks(), 4);
    assert_eq!(fixture.destination.commits(), 0);
    assert!(fixture.destination.committed().is_empty());
}

// ============================================================================
// Titles and Years
// ============================================================================

#[tokio::test]
async fn test_invalid_year_keeps_record_without_year() {
    let fixture = Fixture::new();
    fixture
        .source_a
        .respond(QUERY_A, vec![row("http://a/1", "0306406152", "Optics", "19xx")]);
    fixture.source_b.respond(
        QUERY_B,
        vec![QueryRow::new()
            .with("subject", "http://b/1")
            .with("isbn", "0306406152")
            .with("title", "Optics")],
    );

    let pipeline = fixture.pipeline(PipelineSettings::default()).await;
    let report = pipeline.run(&request()).await.unwrap();

    assert_eq!(report.source_a.saved, 1);
    assert_eq!(report.source_a.invalid_years, 1);
    assert_eq!(report.source_b.saved, 1);
    assert_eq!(report.source_b.invalid_years, 0);

    let committed = fixture.destination.committed();
    assert_eq!(committed.len(), 4);
    assert!(!committed
        .iter()
        .any(|q| q.predicate == "http://example.org/biblink/property/year"));
}

#[tokio::test]
async fn test_invalid_title_drops_record() {
    let fixture = Fixture::new();
    fixture.source_a.respond(
        QUERY_A,
        vec![
            row("http://a/1", "0306406152", "Optics", "1999"),
            row("http://a/2", "080442957X", "()", "2001"),
        ],
    );
    fixture.source_b.respond(
        QUERY_B,
        vec![
            row("http://b/1", "0306406152", "Optics", "1999"),
            row("http://b/2", "080442957X", "Waves", "2001"),
            QueryRow::new()
                .with("subject", "http://b/3")
                .with("isbn", "080442957X"),
        ],
    );

    let pipeline = fixture.pipeline(PipelineSettings::default()).await;
    let report = pipeline.run(&request()).await.unwrap();

    assert_eq!(report.matched_identifiers, 2);
    assert_eq!(report.source_a.saved, 1);
    assert_eq!(report.source_a.invalid_titles, 1);
    assert_eq!(report.source_b.saved, 2);
    assert_eq!(report.source_b.invalid_titles, 1);
}

#[tokio::test]
async fn test_titles_are_formatted() {
    let fixture = Fixture::new();
    fixture.source_a.respond(
        QUERY_A,
        vec![row("http://a/1", "0306406152", "The  Art of (Computer) Programming", "1968")],
    );
    fixture
        .source_b
        .respond(QUERY_B, vec![row("http://b/1", "0306406152", "Art", "1968")]);

    let pipeline = fixture.pipeline(PipelineSettings::default()).await;
    assert_ok!(pipeline.run(&request()).await);

    assert!(fixture.destination.committed().contains(&Quad::new(
        "http://a/1",
        "http://example.org/biblink/property/title",
        Literal::string("the art of computer programming"),
        "http://example.org/biblink/graph/library_a",
    )));
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_missing_configuration_aborts() {
    let fixture = Fixture::new();
    shared_rows(&fixture);

    let no_schema = RepositoryEndpoint::new("memory://dest", "links", "Links");
    let pipeline = fixture
        .pipeline_to(no_schema, PipelineSettings::default())
        .await;

    assert_eq!(pipeline.extract(&request()).await, 0);
    let result = pipeline.run(&request()).await;
    assert!(matches!(result, Err(BibLinkError::ConfigurationMissing(msg)) if msg.contains("schemaURL")));

    let mut unnamed = request();
    unnamed.source_b.repository_name.clear();
    assert!(matches!(
        pipeline.run(&unnamed).await,
        Err(BibLinkError::ConfigurationMissing(_))
    ));

    assert!(fixture.source_a.executed_queries().is_empty());
    assert_eq!(fixture.source_b.connections_opened(), 0);
}

#[tokio::test]
async fn test_authorization_failure_aborts() {
    let fixture = Fixture::new();
    let gateway = fixture.gateway.clone().deny("library-b");
    let pipeline = ExtractionPipeline::connect(
        Arc::new(gateway),
        source_a(),
        destination(),
        None,
        PipelineSettings::default(),
    )
    .await
    .unwrap();

    assert_eq!(pipeline.extract(&request()).await, 0);
    assert!(matches!(
        pipeline.run(&request()).await,
        Err(BibLinkError::AuthorizationFailure { .. })
    ));
    assert_eq!(fixture.source_b.connections_opened(), 0);
}

#[tokio::test]
async fn test_query_failure_differs_from_empty_result() {
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline(PipelineSettings::default()).await;

    // No canned rows: an empty but successful extraction
    let report = pipeline.run(&request()).await.unwrap();
    assert_eq!(report.source_a_identifiers, 0);

    fixture.source_a.fail_query(QUERY_A);
    assert!(matches!(
        pipeline.run(&request()).await,
        Err(BibLinkError::QueryExecution(_))
    ));
    assert_eq!(pipeline.extract(&request()).await, 0);
}

#[tokio::test]
async fn test_source_b_connection_is_always_closed() {
    let fixture = Fixture::new();
    shared_rows(&fixture);
    let pipeline = fixture.pipeline(PipelineSettings::default()).await;

    assert_ok!(pipeline.run(&request()).await);
    fixture.source_b.fail_query(QUERY_B);
    assert!(pipeline.run(&request()).await.is_err());

    assert_eq!(fixture.source_b.connections_opened(), 2);
    assert_eq!(fixture.source_b.connections_closed(), 2);
}

#[tokio::test]
async fn test_close_releases_held_connections() {
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline(PipelineSettings::default()).await;
    assert_ok!(pipeline.close().await);

    assert_eq!(fixture.source_a.connections_closed(), 1);
    assert_eq!(fixture.destination.connections_closed(), 1);
}

#[tokio::test]
async fn test_zero_batch_size_is_rejected() {
    let fixture = Fixture::new();
    let result = ExtractionPipeline::connect(
        Arc::new(fixture.gateway.clone()),
        source_a(),
        destination(),
        None,
        settings(0),
    )
    .await;
    assert!(matches!(result, Err(BibLinkError::Config(_))));
}

// ============================================================================
// Identifier Sets
// ============================================================================

#[tokio::test]
async fn test_identifier_set_raw_and_formatted() {
    let repository = MemoryRepository::new();
    repository.respond(
        "Q",
        vec![
            QueryRow::new().with("isbn", "0306406152"),
            QueryRow::new().with("isbn", "not an isbn"),
            QueryRow::new().with("title", "unbound"),
        ],
    );
    let gateway = MemoryGateway::new().with_repository("r", repository);
    let connection = gateway_connect(&gateway, "r").await;

    let raw = identifier_set(connection.as_ref(), "Q", IdentifierKind::Isbn, None, 1)
        .await
        .unwrap();
    assert_eq!(raw.len(), 2);
    assert!(raw.contains("not an isbn"));

    let normalizer = Normalizer::new(None);
    let formatted = identifier_set(
        connection.as_ref(),
        "Q",
        IdentifierKind::Isbn,
        Some(&normalizer),
        1,
    )
    .await
    .unwrap();
    assert_eq!(formatted, HashSet::from(["9780306406157".to_string()]));
}

#[tokio::test]
async fn test_formatted_set_counts_invalid_and_excludes() {
    let repository = MemoryRepository::new();
    repository.respond(
        "Q",
        vec![
            QueryRow::new().with("doi", "10.1000/abc"),
            QueryRow::new().with("doi", "doi:10.1000/ABC"),
            QueryRow::new().with("doi", "10.1000/def"),
            QueryRow::new().with("doi", "no-doi-here"),
        ],
    );
    let gateway = MemoryGateway::new().with_repository("r", repository);
    let connection = gateway_connect(&gateway, "r").await;

    let exclusion = HashSet::from(["10.1000/DEF".to_string()]);
    let outcome = formatted_identifier_set(
        connection.as_ref(),
        "Q",
        IdentifierKind::Doi,
        &Normalizer::new(None),
        IdentifierFilter::excluding(&exclusion),
        10,
    )
    .await
    .unwrap();

    assert_eq!(outcome.identifiers, HashSet::from(["10.1000/ABC".to_string()]));
    assert_eq!(outcome.invalid_count, 1);
}

async fn gateway_connect(
    gateway: &MemoryGateway,
    id: &str,
) -> Box<dyn biblink_core::RepositoryConnection> {
    use biblink_core::RepositoryGateway;
    gateway
        .connect(&RepositoryEndpoint::new("memory://", id, id))
        .await
        .unwrap()
}
