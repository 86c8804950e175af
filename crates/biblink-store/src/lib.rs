//! BibLink Store - Repository gateways and the download pool
//!
//! Provides concrete implementations of the repository contracts:
//! - RDF4J HTTP protocol (SPARQL queries, transactional N-Quads writes)
//! - In-memory repositories with canned answers and failure injection
//!
//! plus the bounded, retrying download pool used by bulk retrieval jobs.
//!
//! Author: hephaex@gmail.com

pub mod download;
pub mod memory;
pub mod sparql;

pub use download::{
    DownloadPool, DownloadReport, DownloadSummary, DownloadTask, Fetcher, HttpFetcher,
    TaskOutcome,
};
pub use memory::{MemoryGateway, MemoryRepository};
pub use sparql::{HttpTransaction, SparqlConnection, SparqlHttpGateway};
