//! In-memory repositories
//!
//! Queries are answered from canned row lists keyed by the exact query
//! text, and committed quads are recorded for inspection. Failures can be
//! injected per query, on additions and on chosen commits.

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use biblink_core::{
    BibLinkError, Quad, QueryRow, RepositoryConnection, RepositoryEndpoint, RepositoryGateway,
    Result, RowStream, Transaction,
};

// ============================================================================
// Repository
// ============================================================================

#[derive(Debug, Default)]
struct RepositoryState {
    responses: HashMap<String, Vec<QueryRow>>,
    failing_queries: HashSet<String>,
    /// Query text to the number of rows yielded before the stream fails
    failing_streams: HashMap<String, usize>,
    fail_adds: bool,
    /// 1-based commit ordinals that fail
    failing_commits: HashSet<usize>,

    executed_queries: Vec<String>,
    committed: Vec<Quad>,
    transactions_begun: usize,
    commit_attempts: usize,
    commits: usize,
    rollbacks: usize,
    connections_opened: usize,
    connections_closed: usize,
}

/// A repository held in memory; clones share state
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    state: Arc<Mutex<RepositoryState>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RepositoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer `query` with `rows`
    pub fn respond(&self, query: impl Into<String>, rows: Vec<QueryRow>) -> &Self {
        self.state().responses.insert(query.into(), rows);
        self
    }

    /// Make `query` fail before yielding any row
    pub fn fail_query(&self, query: impl Into<String>) -> &Self {
        self.state().failing_queries.insert(query.into());
        self
    }

    /// Make the row stream of `query` fail after `rows` rows
    pub fn fail_stream_after(&self, query: impl Into<String>, rows: usize) -> &Self {
        self.state().failing_streams.insert(query.into(), rows);
        self
    }

    /// Make every `add` on a transaction fail
    pub fn fail_adds(&self) -> &Self {
        self.state().fail_adds = true;
        self
    }

    /// Make the `ordinal`-th commit attempt (1-based) fail
    pub fn fail_commit(&self, ordinal: usize) -> &Self {
        self.state().failing_commits.insert(ordinal);
        self
    }

    /// Quads of every committed transaction, in commit order
    pub fn committed(&self) -> Vec<Quad> {
        self.state().committed.clone()
    }

    pub fn executed_queries(&self) -> Vec<String> {
        self.state().executed_queries.clone()
    }

    pub fn transactions_begun(&self) -> usize {
        self.state().transactions_begun
    }

    pub fn commits(&self) -> usize {
        self.state().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.state().rollbacks
    }

    pub fn connections_opened(&self) -> usize {
        self.state().connections_opened
    }

    pub fn connections_closed(&self) -> usize {
        self.state().connections_closed
    }
}

// ============================================================================
// Gateway
// ============================================================================

/// Gateway resolving endpoints to in-memory repositories by repository ID
#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
    repositories: HashMap<String, MemoryRepository>,
    denied: HashSet<String>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `repository` under `repository_id`
    pub fn with_repository(
        mut self,
        repository_id: impl Into<String>,
        repository: MemoryRepository,
    ) -> Self {
        self.repositories.insert(repository_id.into(), repository);
        self
    }

    /// Reject authorization for `repository_id`
    pub fn deny(mut self, repository_id: impl Into<String>) -> Self {
        self.denied.insert(repository_id.into());
        self
    }

    fn lookup(&self, endpoint: &RepositoryEndpoint) -> Result<&MemoryRepository> {
        self.repositories
            .get(&endpoint.repository_id)
            .ok_or_else(|| {
                BibLinkError::Connection(format!(
                    "Unknown repository {} on {}",
                    endpoint.repository_id, endpoint.server_url
                ))
            })
    }
}

#[async_trait]
impl RepositoryGateway for MemoryGateway {
    async fn authorize(&self, endpoint: &RepositoryEndpoint) -> Result<()> {
        if self.denied.contains(&endpoint.repository_id) {
            return Err(BibLinkError::AuthorizationFailure {
                server: endpoint.server_url.clone(),
                reason: "credentials rejected".to_string(),
            });
        }
        self.lookup(endpoint).map(|_| ())
    }

    async fn connect(
        &self,
        endpoint: &RepositoryEndpoint,
    ) -> Result<Box<dyn RepositoryConnection>> {
        let repository = self.lookup(endpoint)?.clone();
        repository.state().connections_opened += 1;
        Ok(Box::new(MemoryConnection { repository }))
    }
}

// ============================================================================
// Connection and Transaction
// ============================================================================

struct MemoryConnection {
    repository: MemoryRepository,
}

#[async_trait]
impl RepositoryConnection for MemoryConnection {
    async fn query(&self, sparql: &str) -> Result<RowStream> {
        let mut state = self.repository.state();
        state.executed_queries.push(sparql.to_string());

        if state.failing_queries.contains(sparql) {
            return Err(BibLinkError::QueryExecution(format!(
                "Injected failure for query: {sparql}"
            )));
        }

        let rows = state.responses.get(sparql).cloned().unwrap_or_default();
        let stream: Vec<Result<QueryRow>> = match state.failing_streams.get(sparql) {
            Some(&after) => rows
                .into_iter()
                .take(after)
                .map(Ok)
                .chain(std::iter::once(Err(BibLinkError::QueryExecution(
                    "Injected stream failure".to_string(),
                ))))
                .collect(),
            None => rows.into_iter().map(Ok).collect(),
        };

        Ok(futures::stream::iter(stream).boxed())
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        self.repository.state().transactions_begun += 1;
        Ok(Box::new(MemoryTransaction {
            repository: self.repository.clone(),
            pending: Vec::new(),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.repository.state().connections_closed += 1;
        Ok(())
    }
}

struct MemoryTransaction {
    repository: MemoryRepository,
    pending: Vec<Quad>,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn add(&mut self, quad: &Quad) -> Result<()> {
        if self.repository.state().fail_adds {
            return Err(BibLinkError::Transaction("Injected add failure".to_string()));
        }
        self.pending.push(quad.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction {
            repository,
            pending,
        } = *self;
        let mut state = repository.state();
        state.commit_attempts += 1;
        if state.failing_commits.contains(&state.commit_attempts) {
            return Err(BibLinkError::Transaction(format!(
                "Injected failure for commit {}",
                state.commit_attempts
            )));
        }
        state.commits += 1;
        state.committed.extend(pending);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.repository.state().rollbacks += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biblink_core::Literal;
    use futures::TryStreamExt;

    fn endpoint(id: &str) -> RepositoryEndpoint {
        RepositoryEndpoint::new("memory://", id, id)
    }

    fn quad(n: usize) -> Quad {
        Quad::new(
            format!("http://example.org/b/{n}"),
            "http://example.org/p",
            Literal::string(n.to_string()),
            "http://example.org/g",
        )
    }

    #[tokio::test]
    async fn test_canned_query() {
        let repo = MemoryRepository::new();
        repo.respond("SELECT 1", vec![QueryRow::new().with("x", "1")]);
        let gateway = MemoryGateway::new().with_repository("a", repo.clone());

        let conn = gateway.connect(&endpoint("a")).await.unwrap();
        let rows: Vec<QueryRow> = conn.query("SELECT 1").await.unwrap().try_collect().await.unwrap();
        assert_eq!(rows.len(), 1);

        let empty: Vec<QueryRow> = conn.query("SELECT 2").await.unwrap().try_collect().await.unwrap();
        assert!(empty.is_empty());
        assert_eq!(repo.executed_queries(), vec!["SELECT 1", "SELECT 2"]);
    }

    #[tokio::test]
    async fn test_injected_query_failures() {
        let repo = MemoryRepository::new();
        repo.respond("Q", vec![QueryRow::new(), QueryRow::new(), QueryRow::new()])
            .fail_stream_after("Q", 2)
            .fail_query("BAD");
        let gateway = MemoryGateway::new().with_repository("a", repo);
        let conn = gateway.connect(&endpoint("a")).await.unwrap();

        assert!(conn.query("BAD").await.is_err());

        let results: Vec<Result<QueryRow>> = conn.query("Q").await.unwrap().collect().await;
        assert_eq!(results.len(), 3);
        assert!(results[2].is_err());
    }

    #[tokio::test]
    async fn test_commit_records_quads() {
        let repo = MemoryRepository::new();
        repo.fail_commit(2);
        let gateway = MemoryGateway::new().with_repository("dest", repo.clone());
        let conn = gateway.connect(&endpoint("dest")).await.unwrap();

        let mut txn = conn.begin().await.unwrap();
        txn.add(&quad(1)).await.unwrap();
        txn.commit().await.unwrap();

        let mut txn = conn.begin().await.unwrap();
        txn.add(&quad(2)).await.unwrap();
        assert!(txn.commit().await.is_err());

        let mut txn = conn.begin().await.unwrap();
        txn.add(&quad(3)).await.unwrap();
        txn.rollback().await.unwrap();

        conn.close().await.unwrap();

        assert_eq!(repo.committed(), vec![quad(1)]);
        assert_eq!(repo.transactions_begun(), 3);
        assert_eq!(repo.commits(), 1);
        assert_eq!(repo.rollbacks(), 1);
        assert_eq!(repo.connections_opened(), 1);
        assert_eq!(repo.connections_closed(), 1);
    }

    #[tokio::test]
    async fn test_authorization() {
        let gateway = MemoryGateway::new()
            .with_repository("a", MemoryRepository::new())
            .with_repository("b", MemoryRepository::new())
            .deny("b");

        assert!(gateway.authorize(&endpoint("a")).await.is_ok());
        assert!(matches!(
            gateway.authorize(&endpoint("b")).await,
            Err(BibLinkError::AuthorizationFailure { .. })
        ));
        assert!(matches!(
            gateway.authorize(&endpoint("missing")).await,
            Err(BibLinkError::Connection(_))
        ));
    }
}
