//! RDF4J HTTP protocol gateway
//!
//! Queries are sent as SPARQL 1.1 protocol POSTs and answered in the
//! SPARQL TSV results format, which is decoded line by line while the
//! body is still arriving. Writes use the RDF4J transaction API: a
//! transaction resource is created, quads are added as N-Quads documents,
//! then the resource is committed or deleted.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::{debug, error, warn};

use biblink_core::{
    rdf, BibLinkError, Credentials, HttpConfig, Quad, QueryRow, RepositoryConnection,
    RepositoryEndpoint, RepositoryGateway, Result, RowStream, Transaction,
};

const SPARQL_RESULTS_TSV: &str = "text/tab-separated-values";
const NQUADS: &str = "application/n-quads";

// ============================================================================
// SPARQL TSV Results
// ============================================================================

fn malformed(reason: impl std::fmt::Display) -> BibLinkError {
    BibLinkError::QueryExecution(format!("Failed to parse results: {reason}"))
}

/// Incremental decoder of a SPARQL TSV results body
///
/// The first line names the variables. Every later line is one row, ready
/// as soon as its newline has been received; an empty cell is unbound.
#[derive(Debug, Default)]
struct TsvRowDecoder {
    pending: Vec<u8>,
    variables: Option<Vec<String>>,
}

impl TsvRowDecoder {
    /// Rows completed by `chunk`
    fn push(&mut self, chunk: &[u8]) -> Result<Vec<QueryRow>> {
        self.pending.extend_from_slice(chunk);

        let mut rows = Vec::new();
        let mut consumed = 0;
        while let Some(end) = self.pending[consumed..].iter().position(|&b| b == b'\n') {
            let line = &self.pending[consumed..consumed + end];
            if let Some(row) = decode_line(&mut self.variables, line)? {
                rows.push(row);
            }
            consumed += end + 1;
        }
        self.pending.drain(..consumed);
        Ok(rows)
    }

    /// The last row, when the body does not end with a newline
    fn finish(&mut self) -> Result<Option<QueryRow>> {
        let line = std::mem::take(&mut self.pending);
        decode_line(&mut self.variables, &line)
    }
}

fn decode_line(variables: &mut Option<Vec<String>>, line: &[u8]) -> Result<Option<QueryRow>> {
    let line = std::str::from_utf8(line).map_err(malformed)?;
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.is_empty() {
        return Ok(None);
    }

    let Some(names) = variables else {
        let names = line
            .split('\t')
            .map(|name| name.strip_prefix('?').map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| malformed("header is not a variable list"))?;
        *variables = Some(names);
        return Ok(None);
    };

    let cells: Vec<&str> = line.split('\t').collect();
    if cells.len() != names.len() {
        return Err(malformed(format!(
            "row has {} cells for {} variables",
            cells.len(),
            names.len()
        )));
    }

    let mut row = QueryRow::new();
    for (name, cell) in names.iter().zip(cells) {
        if !cell.is_empty() {
            row.insert(name.as_str(), term_value(cell)?);
        }
    }
    Ok(Some(row))
}

/// Plain value of a term: IRIs lose their brackets, literals their quotes,
/// language tag and datatype. Blank nodes and bare numbers stay as written.
fn term_value(term: &str) -> Result<String> {
    if let Some(iri) = term.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
        return Ok(iri.to_string());
    }
    match term.strip_prefix('"') {
        Some(quoted) => literal_value(quoted),
        None => Ok(term.to_string()),
    }
}

fn literal_value(quoted: &str) -> Result<String> {
    let mut value = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => return Ok(value),
            '\\' => {
                let unescaped = match chars.next() {
                    Some('t') => '\t',
                    Some('n') => '\n',
                    Some('r') => '\r',
                    Some('b') => '\u{8}',
                    Some('f') => '\u{c}',
                    Some('"') => '"',
                    Some('\'') => '\'',
                    Some('\\') => '\\',
                    Some('u') => code_point(&mut chars, 4)?,
                    Some('U') => code_point(&mut chars, 8)?,
                    _ => return Err(malformed("invalid escape in literal")),
                };
                value.push(unescaped);
            }
            c => value.push(c),
        }
    }
    Err(malformed("unterminated literal"))
}

fn code_point(chars: &mut std::str::Chars<'_>, digits: usize) -> Result<char> {
    let hex: String = chars.by_ref().take(digits).collect();
    if hex.len() != digits || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(malformed("invalid unicode escape in literal"));
    }
    u32::from_str_radix(&hex, 16)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| malformed("invalid unicode escape in literal"))
}

// ============================================================================
// Gateway
// ============================================================================

/// Gateway to repositories served over the RDF4J HTTP protocol
#[derive(Clone)]
pub struct SparqlHttpGateway {
    client: Client,
    config: HttpConfig,
}

impl SparqlHttpGateway {
    /// Create a gateway with the configured connect/read timeouts
    pub fn new(config: HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.read_timeout())
            .build()
            .map_err(|e| BibLinkError::Connection(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }
}

fn server_base(endpoint: &RepositoryEndpoint) -> &str {
    endpoint.server_url.trim_end_matches('/')
}

fn with_auth(request: RequestBuilder, credentials: Option<&Credentials>) -> RequestBuilder {
    match credentials {
        Some(c) => request.basic_auth(&c.username, Some(&c.password)),
        None => request,
    }
}

#[async_trait]
impl RepositoryGateway for SparqlHttpGateway {
    async fn authorize(&self, endpoint: &RepositoryEndpoint) -> Result<()> {
        let server = server_base(endpoint).to_string();
        let request = self.client.get(format!("{server}/protocol"));

        let response = with_auth(request, endpoint.credentials.as_ref())
            .send()
            .await
            .map_err(|e| BibLinkError::AuthorizationFailure {
                server: server.clone(),
                reason: e.to_string(),
            })?;

        match response.status() {
            status if status.is_success() => {
                debug!(server = %server, "Authorized");
                Ok(())
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(BibLinkError::AuthorizationFailure {
                    server,
                    reason: "credentials rejected".to_string(),
                })
            }
            status => Err(BibLinkError::AuthorizationFailure {
                server,
                reason: format!("unexpected status {status}"),
            }),
        }
    }

    async fn connect(
        &self,
        endpoint: &RepositoryEndpoint,
    ) -> Result<Box<dyn RepositoryConnection>> {
        let repository_url = format!(
            "{}/repositories/{}",
            server_base(endpoint),
            endpoint.repository_id
        );
        debug!(repository = %repository_url, "Opening connection");

        Ok(Box::new(SparqlConnection {
            client: self.client.clone(),
            server_url: server_base(endpoint).to_string(),
            repository_url,
            credentials: endpoint.credentials.clone(),
            chunk_size: self.config.transaction_chunk_size.max(1),
        }))
    }
}

// ============================================================================
// Connection
// ============================================================================

/// An open connection to one repository on an RDF4J server
pub struct SparqlConnection {
    client: Client,
    server_url: String,
    repository_url: String,
    credentials: Option<Credentials>,
    chunk_size: usize,
}

impl SparqlConnection {
    /// Resolve a transaction `Location` header, which may be relative to the server
    fn resolve_location(&self, location: &str) -> String {
        if location.starts_with("http://") || location.starts_with("https://") {
            location.to_string()
        } else if location.starts_with('/') {
            let origin = origin_of(&self.server_url);
            format!("{origin}{location}")
        } else {
            format!("{}/transactions/{location}", self.repository_url)
        }
    }
}

/// Scheme and authority of a URL (`http://host:port`)
fn origin_of(url: &str) -> &str {
    let after_scheme = url.find("://").map(|i| i + 3).unwrap_or(0);
    match url[after_scheme..].find('/') {
        Some(i) => &url[..after_scheme + i],
        None => url,
    }
}

#[async_trait]
impl RepositoryConnection for SparqlConnection {
    async fn query(&self, sparql: &str) -> Result<RowStream> {
        let request = self
            .client
            .post(&self.repository_url)
            .header("Accept", SPARQL_RESULTS_TSV)
            .form(&[("query", sparql)]);

        let response = with_auth(request, self.credentials.as_ref())
            .send()
            .await
            .map_err(|e| BibLinkError::QueryExecution(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(BibLinkError::QueryExecution(format!(
                "Server returned {status}: {error_text}"
            )));
        }
        debug!(repository = %self.repository_url, "Query answered");

        // Rows are decoded chunk by chunk; the stream ends after the first error
        let chunks = Box::pin(response.bytes_stream());
        let rows = futures::stream::unfold(
            Some((chunks, TsvRowDecoder::default())),
            |state| async move {
                let Some((mut chunks, mut decoder)) = state else {
                    return None;
                };

                let (decoded, next) = match chunks.next().await {
                    Some(Ok(chunk)) => {
                        let decoded = decoder.push(&chunk);
                        let next = decoded.is_ok().then_some((chunks, decoder));
                        (decoded, next)
                    }
                    Some(Err(e)) => (
                        Err(BibLinkError::QueryExecution(format!(
                            "Failed to read results: {e}"
                        ))),
                        None,
                    ),
                    None => (decoder.finish().map(|row| row.into_iter().collect()), None),
                };

                let items: Vec<Result<QueryRow>> = match decoded {
                    Ok(rows) => rows.into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(e)],
                };
                Some((futures::stream::iter(items), next))
            },
        )
        .flatten();

        Ok(rows.boxed())
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let request = self
            .client
            .post(format!("{}/transactions", self.repository_url));

        let response = with_auth(request, self.credentials.as_ref())
            .send()
            .await
            .map_err(|e| BibLinkError::Transaction(format!("Failed to begin: {e}")))?;

        if !response.status().is_success() {
            return Err(BibLinkError::Transaction(format!(
                "Failed to begin: server returned {}",
                response.status()
            )));
        }

        let location = response
            .headers()
            .get("Location")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                BibLinkError::Transaction("Server returned no transaction location".to_string())
            })?;

        Ok(Box::new(HttpTransaction {
            client: self.client.clone(),
            location: self.resolve_location(location),
            credentials: self.credentials.clone(),
            buffer: Vec::new(),
            chunk_size: self.chunk_size,
        }))
    }

    async fn close(&self) -> Result<()> {
        debug!(repository = %self.repository_url, "Closing connection");
        Ok(())
    }
}

// ============================================================================
// Transaction
// ============================================================================

/// A server-side transaction; added quads are buffered and sent in chunks
pub struct HttpTransaction {
    client: Client,
    location: String,
    credentials: Option<Credentials>,
    buffer: Vec<Quad>,
    chunk_size: usize,
}

impl HttpTransaction {
    fn action_url(&self, action: &str) -> String {
        let separator = if self.location.contains('?') { '&' } else { '?' };
        format!("{}{separator}action={action}", self.location)
    }

    /// Delete the transaction resource, discarding everything sent to it
    async fn delete(&self) -> Result<()> {
        let request = self.client.delete(&self.location);
        let response = with_auth(request, self.credentials.as_ref())
            .send()
            .await
            .map_err(|e| BibLinkError::Transaction(format!("Failed to roll back: {e}")))?;

        if !response.status().is_success() {
            return Err(BibLinkError::Transaction(format!(
                "Failed to roll back: server returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn send_commit(&self) -> Result<()> {
        let request = self.client.put(self.action_url("COMMIT"));
        let response = with_auth(request, self.credentials.as_ref())
            .send()
            .await
            .map_err(|e| BibLinkError::Transaction(format!("Failed to commit: {e}")))?;

        if !response.status().is_success() {
            return Err(BibLinkError::Transaction(format!(
                "Failed to commit: server returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let body = rdf::to_nquads(&self.buffer);
        let request = self
            .client
            .put(self.action_url("ADD"))
            .header("Content-Type", NQUADS)
            .body(body);

        let response = with_auth(request, self.credentials.as_ref())
            .send()
            .await
            .map_err(|e| BibLinkError::Transaction(format!("Failed to add data: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(BibLinkError::Transaction(format!(
                "Failed to add data: server returned {status}: {error_text}"
            )));
        }

        debug!(quads = self.buffer.len(), "Sent quads");
        self.buffer.clear();
        Ok(())
    }
}

#[async_trait]
impl Transaction for HttpTransaction {
    async fn add(&mut self, quad: &Quad) -> Result<()> {
        self.buffer.push(quad.clone());
        if self.buffer.len() >= self.chunk_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Send the remaining quads and commit; on any failure the
    /// transaction is deleted before the error is returned
    async fn commit(mut self: Box<Self>) -> Result<()> {
        let committed = match self.flush().await {
            Ok(()) => self.send_commit().await,
            Err(e) => Err(e),
        };

        if let Err(e) = committed {
            warn!(error = %e, transaction = %self.location, "Rolling back unfinished transaction");
            if let Err(rollback) = self.delete().await {
                error!(error = %rollback, "Rollback failed");
            }
            return Err(e);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.delete().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(body: &str) -> Result<Vec<QueryRow>> {
        let mut decoder = TsvRowDecoder::default();
        let mut rows = decoder.push(body.as_bytes())?;
        rows.extend(decoder.finish()?);
        Ok(rows)
    }

    #[test]
    fn test_decode_rows() {
        let body = "?subject\t?isbn\t?year\n\
            <http://example.org/b/1>\t\"0306406152\"\t\"1999\"^^<http://www.w3.org/2001/XMLSchema#gYear>\n\
            <http://example.org/b/2>\t\t\n";

        let rows = decode(body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("subject"), Some("http://example.org/b/1"));
        assert_eq!(rows[0].get("isbn"), Some("0306406152"));
        assert_eq!(rows[0].get("year"), Some("1999"));
        assert_eq!(rows[1].get("isbn"), None);
        assert_eq!(rows[1].get("year"), None);
    }

    #[test]
    fn test_rows_complete_at_newline() {
        let mut decoder = TsvRowDecoder::default();

        let rows = decoder
            .push(b"?subject\t?title\n<http://example.org/b/1>\t\"Opt")
            .unwrap();
        assert!(rows.is_empty());

        let rows = decoder
            .push(b"ics\"@en\r\n<http://example.org/b/2>\t\"Waves\"\n<http://exa")
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("title"), Some("Optics"));
        assert_eq!(rows[1].get("title"), Some("Waves"));

        let rows = decoder.push(b"mple.org/b/3>\t\"Light\"").unwrap();
        assert!(rows.is_empty());
        let last = decoder.finish().unwrap().unwrap();
        assert_eq!(last.get("subject"), Some("http://example.org/b/3"));
    }

    #[test]
    fn test_literal_escapes() {
        assert_eq!(term_value(r#""a\tb\"c\\d""#).unwrap(), "a\tb\"c\\d");
        assert_eq!(term_value(r#""caf\u00E9""#).unwrap(), "café");
        assert_eq!(term_value("_:b0").unwrap(), "_:b0");
        assert_eq!(term_value("42").unwrap(), "42");
        assert!(term_value(r#""open"#).is_err());
        assert!(term_value(r#""bad\q""#).is_err());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode("<html>\n<body>\n"),
            Err(BibLinkError::QueryExecution(_))
        ));
        assert!(matches!(
            decode("?a\t?b\n\"x\"\n"),
            Err(BibLinkError::QueryExecution(_))
        ));
    }

    #[test]
    fn test_origin_of() {
        assert_eq!(
            origin_of("http://localhost:8080/rdf4j-server"),
            "http://localhost:8080"
        );
        assert_eq!(origin_of("http://localhost:8080"), "http://localhost:8080");
    }
}
