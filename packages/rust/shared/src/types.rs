//! RDF vocabulary types shared across probs-runner.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Iri
// ---------------------------------------------------------------------------

/// An absolute IRI identifying an RDF resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Iri(String);

impl Iri {
    pub fn new(iri: impl Into<String>) -> Self {
        Self(iri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// SPARQL/N-Triples form, `<iri>`.
    pub fn to_sparql(&self) -> String {
        format!("<{}>", self.0)
    }
}

impl std::fmt::Display for Iri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Iri {
    fn from(iri: &str) -> Self {
        Self::new(iri)
    }
}

impl From<String> for Iri {
    fn from(iri: String) -> Self {
        Self(iri)
    }
}

// ---------------------------------------------------------------------------
// Namespace
// ---------------------------------------------------------------------------

/// An IRI prefix that mints terms by appending a local name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Namespace(&'static str);

impl Namespace {
    pub const fn new(base: &'static str) -> Self {
        Self(base)
    }

    pub const fn base(&self) -> &'static str {
        self.0
    }

    /// Mint `<base><local>`.
    pub fn term(&self, local: &str) -> Iri {
        Iri(format!("{}{local}", self.0))
    }
}

/// The PRObs ontology.
pub const PROBS: Namespace = Namespace::new("https://ukfires.org/probs/ontology/");
/// PRObs system terms used by the pipeline scripts.
pub const SYS: Namespace = Namespace::new("https://ukfires.org/probs/system/");
pub const QUANTITYKIND: Namespace = Namespace::new("http://qudt.org/vocab/quantitykind/");
pub const PROV: Namespace = Namespace::new("http://www.w3.org/ns/prov#");
pub const RDF: Namespace = Namespace::new("http://www.w3.org/1999/02/22-rdf-syntax-ns#");
pub const RDFS: Namespace = Namespace::new("http://www.w3.org/2000/01/rdf-schema#");
pub const XSD: Namespace = Namespace::new("http://www.w3.org/2001/XMLSchema#");

// ---------------------------------------------------------------------------
// PrefixMap
// ---------------------------------------------------------------------------

/// Prefix name → namespace IRI bindings.
///
/// The empty string is a valid prefix name (`:Observation`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrefixMap(BTreeMap<String, String>);

impl PrefixMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in bindings every endpoint and engine session starts from.
    pub fn defaults() -> Self {
        [
            ("", PROBS),
            ("probs", PROBS),
            ("sys", SYS),
            ("rdf", RDF),
            ("rdfs", RDFS),
            ("prov", PROV),
            ("quantitykind", QUANTITYKIND),
        ]
        .into_iter()
        .map(|(prefix, ns)| (prefix.to_string(), ns.base().to_string()))
        .collect()
    }

    pub fn insert(&mut self, prefix: impl Into<String>, namespace: impl Into<String>) {
        self.0.insert(prefix.into(), namespace.into());
    }

    pub fn get(&self, prefix: &str) -> Option<&str> {
        self.0.get(prefix).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(p, ns)| (p.as_str(), ns.as_str()))
    }

    /// A copy of `self` with `overrides` applied on top; overrides win on conflict.
    pub fn merged(&self, overrides: &PrefixMap) -> PrefixMap {
        let mut merged = self.clone();
        for (prefix, ns) in overrides.iter() {
            merged.insert(prefix, ns);
        }
        merged
    }

    /// `PREFIX` declarations to place in front of a SPARQL query.
    pub fn sparql_prologue(&self) -> String {
        self.iter()
            .map(|(prefix, ns)| format!("PREFIX {prefix}: <{ns}>\n"))
            .collect()
    }

    /// `prefix` commands for an RDFox shell script.
    pub fn script_lines(&self) -> Vec<String> {
        self.iter()
            .map(|(prefix, ns)| format!("prefix {prefix}: <{ns}>"))
            .collect()
    }

    /// Shorten `iri` to `prefix:local` using the longest matching namespace.
    ///
    /// Named prefixes are preferred over the empty prefix when both bind the
    /// same namespace. Returns `None` when no namespace yields a valid local name.
    pub fn compact(&self, iri: &str) -> Option<String> {
        self.iter()
            .filter_map(|(prefix, ns)| {
                let local = iri.strip_prefix(ns)?;
                is_local_name(local).then_some((prefix, ns, local))
            })
            .max_by(|(pa, na, _), (pb, nb, _)| {
                na.len()
                    .cmp(&nb.len())
                    .then_with(|| (!pa.is_empty()).cmp(&!pb.is_empty()))
                    .then_with(|| pb.cmp(pa))
            })
            .map(|(prefix, _, local)| format!("{prefix}:{local}"))
    }
}

impl FromIterator<(String, String)> for PrefixMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Conservative check for a prefixed-name local part.
fn is_local_name(local: &str) -> bool {
    !local.is_empty()
        && !local.ends_with('.')
        && local
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
