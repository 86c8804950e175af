//! Destination vocabulary
//!
//! Builds the property, graph and link-graph URIs of the destination
//! repository from its schema base URL.

use crate::IdentifierKind;

/// URI layout of the data saved in the destination repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    base: String,
}

impl Schema {
    /// Create a schema rooted at `base` (a trailing slash is ignored)
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Prefix shared by every property URI
    pub fn property_path(&self) -> String {
        format!("{}/property/", self.base)
    }

    /// Prefix shared by every named graph URI
    pub fn graph_path(&self) -> String {
        format!("{}/graph/", self.base)
    }

    pub fn property(&self, name: &str) -> String {
        format!("{}{}", self.property_path(), name)
    }

    pub fn identifier_property(&self, kind: IdentifierKind) -> String {
        self.property(kind.variable_name())
    }

    pub fn title_property(&self) -> String {
        self.property("title")
    }

    pub fn year_property(&self) -> String {
        self.property("year")
    }

    /// Named graph holding the data saved from a repository
    pub fn data_graph(&self, repository_name: &str) -> String {
        format!("{}{}", self.graph_path(), graph_segment(repository_name))
    }

    /// Prefix matching every link graph whose subjects come from `source_a`
    pub fn links_graph_prefix(&self, source_a: &str) -> String {
        format!("{}{}_to_", self.graph_path(), graph_segment(source_a))
    }

    /// Prefix matching the link graphs between two repositories
    pub fn links_graph_between(&self, source_a: &str, source_b: &str) -> String {
        format!(
            "{}{}",
            self.links_graph_prefix(source_a),
            graph_segment(source_b)
        )
    }

    /// Link graph between two repositories built from one identifier kind
    pub fn links_graph(&self, source_a: &str, source_b: &str, kind: IdentifierKind) -> String {
        format!(
            "{}_{}_links",
            self.links_graph_between(source_a, source_b),
            kind.variable_name().to_lowercase()
        )
    }

    /// Query listing the identifiers already saved for a repository
    pub fn existing_identifiers_query(&self, repository_name: &str, kind: IdentifierKind) -> String {
        let variable = kind.variable_name();
        format!(
            "PREFIX prop: <{property_path}>\n\
             \n\
             SELECT *\n\
             WHERE {{\n\
             \x20   GRAPH <{graph}> {{ ?subject prop:{variable} ?{variable} . }}\n\
             }}\n",
            property_path = self.property_path(),
            graph = self.data_graph(repository_name),
        )
    }
}

fn graph_segment(repository_name: &str) -> String {
    repository_name.to_lowercase().replace(' ', "_")
}
