//! BibLink Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout BibLink:
//! - Identifier kinds and their categories
//! - Extraction records and outcomes
//! - Repository endpoints and string replacement rules
//! - Similarity and tolerance parameters
//! - Common error types
//! - Repository gateway traits (query streaming, transactional writes)
//! - Configuration management and the destination schema

pub mod config;
pub mod rdf;
pub mod schema;

pub use config::{
    AppConfig, ConfigError, DownloadSettings, HttpConfig, LoggingConfig, PipelineSettings,
    SourceRules,
};
pub use rdf::{Literal, Quad, XsdDatatype};
pub use schema::Schema;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for BibLink operations
#[derive(Error, Debug)]
pub enum BibLinkError {
    #[error("Missing configuration: {0}")]
    ConfigurationMissing(String),

    #[error("Authorization failed for the server {server}: {reason}")]
    AuthorizationFailure { server: String, reason: String },

    #[error("Query execution failed: {0}")]
    QueryExecution(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, BibLinkError>;

// ============================================================================
// Identifier Kinds
// ============================================================================

/// Bibliographic identifier schemes understood by the linker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    ArxivId,
    Doi,
    Isbn,
    Issn,
    JournalTitle,
    Lccn,
    Oclc,
    Pmid,
}

/// Identifier category
///
/// - `A`: precise identifiers, checksum- or grammar-validated
/// - `B`: identifiers that need year/title context to disambiguate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    A,
    B,
}

impl IdentifierKind {
    /// Every identifier kind, in declaration order
    pub const ALL: [IdentifierKind; 8] = [
        Self::ArxivId,
        Self::Doi,
        Self::Isbn,
        Self::Issn,
        Self::JournalTitle,
        Self::Lccn,
        Self::Oclc,
        Self::Pmid,
    ];

    /// Name of the query variable (and destination property) carrying this identifier
    pub fn variable_name(&self) -> &'static str {
        match self {
            Self::ArxivId => "arxivID",
            Self::Doi => "doi",
            Self::Isbn => "isbn",
            Self::Issn => "issn",
            Self::JournalTitle => "journalTitle",
            Self::Lccn => "lccn",
            Self::Oclc => "oclc",
            Self::Pmid => "pmid",
        }
    }

    /// Human-readable name used in log messages
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::ArxivId => "arXiv ID",
            Self::Doi => "DOI",
            Self::Isbn => "ISBN",
            Self::Issn => "ISSN",
            Self::JournalTitle => "journal title",
            Self::Lccn => "LCCN",
            Self::Oclc => "OCLC",
            Self::Pmid => "PMID",
        }
    }

    pub fn category(&self) -> Category {
        match self {
            Self::Issn | Self::JournalTitle => Category::B,
            Self::ArxivId | Self::Doi | Self::Isbn | Self::Lccn | Self::Oclc | Self::Pmid => {
                Category::A
            }
        }
    }

    /// Whether extraction queries for this kind must bind `?year`
    pub fn requires_year(&self) -> bool {
        self.category() == Category::B
    }
}

impl std::fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for IdentifierKind {
    type Err = BibLinkError;

    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_lowercase();

        match key.as_str() {
            "arxiv" | "arxivid" => Ok(Self::ArxivId),
            "doi" => Ok(Self::Doi),
            "isbn" => Ok(Self::Isbn),
            "issn" => Ok(Self::Issn),
            "journaltitle" | "journal" => Ok(Self::JournalTitle),
            "lccn" => Ok(Self::Lccn),
            "oclc" => Ok(Self::Oclc),
            "pmid" => Ok(Self::Pmid),
            _ => Err(BibLinkError::InvalidValue(format!(
                "unknown identifier kind: {s}"
            ))),
        }
    }
}

/// Category-A identifier kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryAKind {
    ArxivId,
    Doi,
    Isbn,
    Lccn,
    Oclc,
    Pmid,
}

impl From<CategoryAKind> for IdentifierKind {
    fn from(kind: CategoryAKind) -> Self {
        match kind {
            CategoryAKind::ArxivId => Self::ArxivId,
            CategoryAKind::Doi => Self::Doi,
            CategoryAKind::Isbn => Self::Isbn,
            CategoryAKind::Lccn => Self::Lccn,
            CategoryAKind::Oclc => Self::Oclc,
            CategoryAKind::Pmid => Self::Pmid,
        }
    }
}

/// Category-B identifier kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryBKind {
    Issn,
    JournalTitle,
}

impl From<CategoryBKind> for IdentifierKind {
    fn from(kind: CategoryBKind) -> Self {
        match kind {
            CategoryBKind::Issn => Self::Issn,
            CategoryBKind::JournalTitle => Self::JournalTitle,
        }
    }
}

// ============================================================================
// Normalization Results and Extracted Data
// ============================================================================

/// Outcome of normalizing a raw string
///
/// `value` carries no meaning when `is_valid` is false; it is left empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatResult {
    pub is_valid: bool,
    pub value: String,
}

impl FormatResult {
    pub fn valid(value: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            value: value.into(),
        }
    }

    pub fn invalid() -> Self {
        Self::default()
    }

    /// The normalized value, if valid
    pub fn into_option(self) -> Option<String> {
        self.is_valid.then_some(self.value)
    }
}

/// A record read from a source repository and destined for the destination
///
/// Identity covers all four fields, so two rows for the same subject and
/// identifier with differently formatted titles are distinct records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub subject: String,
    pub identifier: String,
    pub title: String,
    /// Four digits, or empty when the source had no usable year
    pub year: String,
}

impl ExtractedRecord {
    pub fn new(
        subject: impl Into<String>,
        identifier: impl Into<String>,
        title: impl Into<String>,
        year: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            identifier: identifier.into(),
            title: title.into(),
            year: year.into(),
        }
    }
}

/// Identifier set produced by one extraction pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionOutcome {
    pub identifiers: HashSet<String>,
    pub invalid_count: usize,
}

impl ExtractionOutcome {
    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }
}

// ============================================================================
// Repository Endpoints
// ============================================================================

/// HTTP basic credentials for a repository server
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Role an endpoint plays in a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointRole {
    Source,
    Destination,
}

/// Connection parameters for one repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryEndpoint {
    /// Base URL of the repository server
    pub server_url: String,

    /// Repository ID set on the server
    pub repository_id: String,

    /// Alias of the repository, used to name its graph in the destination
    #[serde(default)]
    pub repository_name: String,

    /// Base URL of the destination vocabulary (destination only)
    #[serde(default)]
    pub schema_url: String,

    #[serde(default)]
    pub credentials: Option<Credentials>,
}

impl RepositoryEndpoint {
    pub fn new(
        server_url: impl Into<String>,
        repository_id: impl Into<String>,
        repository_name: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            repository_id: repository_id.into(),
            repository_name: repository_name.into(),
            ..Default::default()
        }
    }

    pub fn with_schema_url(mut self, schema_url: impl Into<String>) -> Self {
        self.schema_url = schema_url.into();
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Names of the required fields that are blank for the given role
    pub fn missing_fields(&self, role: EndpointRole) -> Vec<&'static str> {
        let mut missing = Vec::new();

        if self.repository_id.is_empty() {
            missing.push("repositoryID");
        }
        if role == EndpointRole::Source && self.repository_name.is_empty() {
            missing.push("repositoryName");
        }
        if self.server_url.is_empty() {
            missing.push("serverURL");
        }
        if role == EndpointRole::Destination && self.schema_url.is_empty() {
            missing.push("schemaURL");
        }
        if let Some(credentials) = &self.credentials {
            if credentials.username.is_empty() {
                missing.push("credentials username");
            }
            if credentials.password.is_empty() {
                missing.push("credentials password");
            }
        }

        missing
    }
}

// ============================================================================
// String Replacement Rules
// ============================================================================

/// Where a replacement rule applies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplacementMode {
    /// Replace every literal occurrence
    #[default]
    Anywhere,
    /// Replace only a trailing occurrence
    BeforeEnd,
    /// Replace occurrences at or after `index`
    AfterIndex,
    /// Replace occurrences before `index`
    BeforeIndex,
    /// `search` is a regular expression
    Regex,
}

impl std::str::FromStr for ReplacementMode {
    type Err = BibLinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace(['_', '-'], "").as_str() {
            "anywhere" => Ok(Self::Anywhere),
            "beforeend" => Ok(Self::BeforeEnd),
            "afterindex" => Ok(Self::AfterIndex),
            "beforeindex" => Ok(Self::BeforeIndex),
            "regex" => Ok(Self::Regex),
            _ => Err(BibLinkError::InvalidValue(format!(
                "unknown replacement mode: {s}"
            ))),
        }
    }
}

/// A user-defined search and replace applied before built-in normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringReplacementRule {
    /// Literal text, or a pattern when `mode` is `Regex`
    pub search: String,

    #[serde(default)]
    pub replacement: String,

    #[serde(default)]
    pub mode: ReplacementMode,

    /// Split point for `AfterIndex`/`BeforeIndex`, clamped to the input length
    #[serde(default)]
    pub index: i64,
}

impl StringReplacementRule {
    pub fn new(
        search: impl Into<String>,
        replacement: impl Into<String>,
        mode: ReplacementMode,
    ) -> Self {
        Self {
            search: search.into(),
            replacement: replacement.into(),
            mode,
            index: 0,
        }
    }

    pub fn with_index(mut self, index: i64) -> Self {
        self.index = index;
        self
    }
}

/// Replacement rule lists for one source, keyed by identifier kind, title and year
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplacementRules {
    pub arxiv_id: Vec<StringReplacementRule>,
    pub doi: Vec<StringReplacementRule>,
    pub isbn: Vec<StringReplacementRule>,
    pub issn: Vec<StringReplacementRule>,
    pub lccn: Vec<StringReplacementRule>,
    pub oclc: Vec<StringReplacementRule>,
    pub pmid: Vec<StringReplacementRule>,
    pub title: Vec<StringReplacementRule>,
    pub year: Vec<StringReplacementRule>,
}

impl ReplacementRules {
    /// Rules for an identifier kind; journal titles share the title rules
    pub fn for_kind(&self, kind: IdentifierKind) -> &[StringReplacementRule] {
        match kind {
            IdentifierKind::ArxivId => &self.arxiv_id,
            IdentifierKind::Doi => &self.doi,
            IdentifierKind::Isbn => &self.isbn,
            IdentifierKind::Issn => &self.issn,
            IdentifierKind::JournalTitle => &self.title,
            IdentifierKind::Lccn => &self.lccn,
            IdentifierKind::Oclc => &self.oclc,
            IdentifierKind::Pmid => &self.pmid,
        }
    }

    pub fn title(&self) -> &[StringReplacementRule] {
        &self.title
    }

    pub fn year(&self) -> &[StringReplacementRule] {
        &self.year
    }
}

// ============================================================================
// Similarity and Tolerance
// ============================================================================

/// Set-based similarity coefficient
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMeasure {
    Cosine,
    #[default]
    Dice,
    Jaccard,
    Overlap,
}

impl std::str::FromStr for SimilarityMeasure {
    type Err = BibLinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "dice" => Ok(Self::Dice),
            "jaccard" => Ok(Self::Jaccard),
            "overlap" => Ok(Self::Overlap),
            _ => Err(BibLinkError::InvalidValue(format!(
                "unknown similarity measure: {s}"
            ))),
        }
    }
}

/// Unit a shingle is built from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShingleUnit {
    Word,
    #[default]
    Char,
}

impl std::str::FromStr for ShingleUnit {
    type Err = BibLinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "word" | "words" => Ok(Self::Word),
            "char" | "chars" | "character" => Ok(Self::Char),
            _ => Err(BibLinkError::InvalidValue(format!(
                "unknown shingle unit: {s}"
            ))),
        }
    }
}

/// Similarity measure plus shingling parameters
///
/// Deserialized values go through [`SimilaritySelector::new`], so a
/// configured shingle size of 0 is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSelector")]
pub struct SimilaritySelector {
    pub measure: SimilarityMeasure,
    pub unit: ShingleUnit,
    pub size: usize,
}

impl SimilaritySelector {
    pub fn new(measure: SimilarityMeasure, unit: ShingleUnit, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(BibLinkError::InvalidValue(
                "shingle size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            measure,
            unit,
            size,
        })
    }
}

#[derive(Deserialize)]
struct RawSelector {
    measure: SimilarityMeasure,
    unit: ShingleUnit,
    size: usize,
}

impl TryFrom<RawSelector> for SimilaritySelector {
    type Error = BibLinkError;

    fn try_from(raw: RawSelector) -> Result<Self> {
        Self::new(raw.measure, raw.unit, raw.size)
    }
}

impl Default for SimilaritySelector {
    fn default() -> Self {
        Self {
            measure: SimilarityMeasure::Dice,
            unit: ShingleUnit::Char,
            size: 2,
        }
    }
}

/// Title-similarity cutoffs and maximum year difference for link acceptance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawTolerance")]
pub struct ToleranceThresholds {
    /// Title threshold for category-B identified data
    title_threshold: f64,
    /// Title threshold for category-A identified data with years present
    title_threshold_a: f64,
    /// Title threshold for category-A identified data without years
    title_threshold_b: f64,
    year_max_difference: u32,
}

impl ToleranceThresholds {
    /// Thresholds outside [0, 1] fall back to 1.0; the year difference is taken as absolute
    pub fn new(
        title_threshold: f64,
        title_threshold_a: f64,
        title_threshold_b: f64,
        year_max_difference: i64,
    ) -> Self {
        Self {
            title_threshold: unit_or_one(title_threshold),
            title_threshold_a: unit_or_one(title_threshold_a),
            title_threshold_b: unit_or_one(title_threshold_b),
            year_max_difference: u32::try_from(year_max_difference.unsigned_abs())
                .unwrap_or(u32::MAX),
        }
    }

    pub fn title_threshold(&self) -> f64 {
        self.title_threshold
    }

    pub fn title_threshold_a(&self) -> f64 {
        self.title_threshold_a
    }

    pub fn title_threshold_b(&self) -> f64 {
        self.title_threshold_b
    }

    pub fn year_max_difference(&self) -> u32 {
        self.year_max_difference
    }

    /// (threshold with year, threshold without year, max year difference)
    pub fn category_a(&self) -> (f64, f64, u32) {
        (
            self.title_threshold_a,
            self.title_threshold_b,
            self.year_max_difference,
        )
    }

    pub fn category_b(&self) -> f64 {
        self.title_threshold
    }
}

/// Thresholds as written in configuration, before the range rules apply
#[derive(Deserialize)]
struct RawTolerance {
    title_threshold: f64,
    title_threshold_a: f64,
    title_threshold_b: f64,
    year_max_difference: i64,
}

impl From<RawTolerance> for ToleranceThresholds {
    fn from(raw: RawTolerance) -> Self {
        Self::new(
            raw.title_threshold,
            raw.title_threshold_a,
            raw.title_threshold_b,
            raw.year_max_difference,
        )
    }
}

impl Default for ToleranceThresholds {
    fn default() -> Self {
        Self::new(1.0, 1.0, 1.0, 0)
    }
}

fn unit_or_one(value: f64) -> f64 {
    if (0.0..=1.0).contains(&value) {
        value
    } else {
        1.0
    }
}

// ============================================================================
// Query Rows
// ============================================================================

/// One result row: variable name to lexical value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryRow {
    bindings: HashMap<String, String>,
}

impl QueryRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding (builder style)
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.bindings.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.bindings.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.bindings.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            bindings: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Stream of result rows; dropping it releases the underlying result
pub type RowStream = BoxStream<'static, Result<QueryRow>>;

// ============================================================================
// Traits
// ============================================================================

/// An open connection to one repository
#[async_trait::async_trait]
pub trait RepositoryConnection: Send + Sync {
    /// Execute a SELECT query and stream its rows
    async fn query(&self, sparql: &str) -> Result<RowStream>;

    /// Begin a write transaction
    async fn begin(&self) -> Result<Box<dyn Transaction>>;

    /// Release the connection
    async fn close(&self) -> Result<()>;
}

/// A write transaction on a destination repository
#[async_trait::async_trait]
pub trait Transaction: Send {
    /// Add a quad to the transaction
    async fn add(&mut self, quad: &Quad) -> Result<()>;

    /// Commit everything added so far
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard everything added so far
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Factory for authorized repository connections
#[async_trait::async_trait]
pub trait RepositoryGateway: Send + Sync {
    /// Check that the server is reachable and accepts the endpoint's credentials
    async fn authorize(&self, endpoint: &RepositoryEndpoint) -> Result<()>;

    /// Open a connection to the endpoint's repository
    async fn connect(&self, endpoint: &RepositoryEndpoint)
        -> Result<Box<dyn RepositoryConnection>>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_names() {
        assert_eq!(IdentifierKind::ArxivId.variable_name(), "arxivID");
        assert_eq!(IdentifierKind::JournalTitle.variable_name(), "journalTitle");
        assert_eq!(IdentifierKind::Isbn.variable_name(), "isbn");
        assert_eq!(IdentifierKind::Pmid.variable_name(), "pmid");
    }

    #[test]
    fn test_categories() {
        assert_eq!(IdentifierKind::Issn.category(), Category::B);
        assert_eq!(IdentifierKind::JournalTitle.category(), Category::B);
        assert_eq!(IdentifierKind::Doi.category(), Category::A);
        assert!(IdentifierKind::Issn.requires_year());
        assert!(!IdentifierKind::Lccn.requires_year());
        assert_eq!(IdentifierKind::from(CategoryAKind::Oclc), IdentifierKind::Oclc);
        assert_eq!(
            IdentifierKind::from(CategoryBKind::JournalTitle),
            IdentifierKind::JournalTitle
        );
    }

    #[test]
    fn test_identifier_kind_parse() {
        assert_eq!(
            "arXiv".parse::<IdentifierKind>().unwrap(),
            IdentifierKind::ArxivId
        );
        assert_eq!(
            "journal_title".parse::<IdentifierKind>().unwrap(),
            IdentifierKind::JournalTitle
        );
        assert_eq!("ISBN".parse::<IdentifierKind>().unwrap(), IdentifierKind::Isbn);
        assert!("ean".parse::<IdentifierKind>().is_err());
    }

    #[test]
    fn test_missing_source_fields() {
        let endpoint = RepositoryEndpoint::new("http://localhost:8080/rdf4j-server", "", "");
        let missing = endpoint.missing_fields(EndpointRole::Source);
        assert_eq!(missing, vec!["repositoryID", "repositoryName"]);
    }

    #[test]
    fn test_missing_destination_fields() {
        let endpoint = RepositoryEndpoint::new("http://localhost:8080", "links", "")
            .with_credentials(Credentials::new("admin", ""));
        let missing = endpoint.missing_fields(EndpointRole::Destination);
        assert_eq!(missing, vec!["schemaURL", "credentials password"]);

        let complete = RepositoryEndpoint::new("http://localhost:8080", "links", "")
            .with_schema_url("http://example.org/biblink");
        assert!(complete.missing_fields(EndpointRole::Destination).is_empty());
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let debug = format!("{:?}", Credentials::new("admin", "secret"));
        assert!(debug.contains("admin"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_record_identity_uses_all_fields() {
        let mut set = HashSet::new();
        set.insert(ExtractedRecord::new("http://a/1", "9780306406153", "optics", "1999"));
        set.insert(ExtractedRecord::new("http://a/1", "9780306406153", "optics", "1999"));
        set.insert(ExtractedRecord::new("http://a/1", "9780306406153", "optics", ""));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_rules_for_journal_title_use_title_rules() {
        let rules = ReplacementRules {
            title: vec![StringReplacementRule::new("&", "and", ReplacementMode::Anywhere)],
            ..Default::default()
        };
        assert_eq!(rules.for_kind(IdentifierKind::JournalTitle).len(), 1);
        assert!(rules.for_kind(IdentifierKind::Issn).is_empty());
    }

    #[test]
    fn test_tolerance_out_of_range_falls_back() {
        let tolerance = ToleranceThresholds::new(1.5, 0.8, -0.1, -3);
        assert_eq!(tolerance.title_threshold(), 1.0);
        assert_eq!(tolerance.title_threshold_a(), 0.8);
        assert_eq!(tolerance.title_threshold_b(), 1.0);
        assert_eq!(tolerance.year_max_difference(), 3);
        assert_eq!(tolerance.category_a(), (0.8, 1.0, 3));
        assert_eq!(tolerance.category_b(), 1.0);
    }

    #[test]
    fn test_selector_rejects_zero_size() {
        assert!(SimilaritySelector::new(SimilarityMeasure::Jaccard, ShingleUnit::Word, 0).is_err());
        let selector =
            SimilaritySelector::new(SimilarityMeasure::Jaccard, ShingleUnit::Word, 2).unwrap();
        assert_eq!(selector.size, 2);
    }

    #[test]
    fn test_query_row_lookup() {
        let row = QueryRow::new()
            .with("subject", "http://example.org/book/1")
            .with("isbn", "0-306-40615-2");
        assert_eq!(row.get("isbn"), Some("0-306-40615-2"));
        assert_eq!(row.get("year"), None);

        let collected: QueryRow = [("title", "Optics")].into_iter().collect();
        assert_eq!(collected.len(), 1);
    }

    #[test]
    fn test_format_result_option() {
        assert_eq!(FormatResult::valid("x").into_option(), Some("x".to_string()));
        assert_eq!(FormatResult::invalid().into_option(), None);
    }
}
