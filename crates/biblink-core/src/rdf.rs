//! RDF quads written to the destination repository
//!
//! Subjects, predicates and graphs are IRIs; objects are typed literals.

use serde::{Deserialize, Serialize};

const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

/// Literal datatypes used by the destination layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum XsdDatatype {
    String,
    GYear,
}

impl XsdDatatype {
    pub fn iri(&self) -> String {
        match self {
            Self::String => format!("{XSD}string"),
            Self::GYear => format!("{XSD}gYear"),
        }
    }
}

/// A typed literal
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Literal {
    pub lexical: String,
    pub datatype: XsdDatatype,
}

impl Literal {
    pub fn string(lexical: impl Into<String>) -> Self {
        Self {
            lexical: lexical.into(),
            datatype: XsdDatatype::String,
        }
    }

    pub fn gyear(lexical: impl Into<String>) -> Self {
        Self {
            lexical: lexical.into(),
            datatype: XsdDatatype::GYear,
        }
    }
}

/// A triple plus the named graph it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quad {
    pub subject: String,
    pub predicate: String,
    pub object: Literal,
    pub graph: String,
}

impl Quad {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: Literal,
        graph: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object,
            graph: graph.into(),
        }
    }

    /// Serialize as one N-Quads line (without the trailing newline)
    pub fn to_nquad(&self) -> String {
        format!(
            "{} {} \"{}\"^^<{}> {} .",
            iri(&self.subject),
            iri(&self.predicate),
            escape_literal(&self.object.lexical),
            self.object.datatype.iri(),
            iri(&self.graph)
        )
    }
}

/// Serialize quads as an N-Quads document
pub fn to_nquads(quads: &[Quad]) -> String {
    let mut out = String::new();
    for quad in quads {
        out.push_str(&quad.to_nquad());
        out.push('\n');
    }
    out
}

fn iri(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('<');
    for c in value.chars() {
        match c {
            '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\' => {
                out.push_str(&format!("\\u{:04X}", c as u32));
            }
            c if (c as u32) <= 0x20 => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('>');
    out
}

fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}
