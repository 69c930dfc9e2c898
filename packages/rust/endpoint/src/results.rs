//! Decoding of `application/sparql-results+json` into records.

use std::collections::BTreeMap;

use serde::Deserialize;

use probs_runner_shared::{Iri, PrefixMap, ProbsError, Result, XSD};

/// One result row: variable name → value, `None` when the variable is unbound.
pub type Record = BTreeMap<String, Option<Value>>;

/// How literals are decoded by [`crate::Endpoint::query_records`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LiteralMode {
    /// Map XSD numerics, booleans and strings onto native values.
    #[default]
    Native,
    /// Render every term as prefix-compacted N3 text.
    N3,
}

/// A decoded RDF term, or a value bound into a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Iri(Iri),
    BlankNode(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
    LangString { value: String, lang: String },
    /// A literal whose datatype has no native mapping.
    Typed { value: String, datatype: Iri },
    /// Pre-rendered N3 text.
    N3(String),
}

impl Value {
    pub fn iri(iri: impl Into<Iri>) -> Self {
        Self::Iri(iri.into())
    }

    pub fn as_iri(&self) -> Option<&Iri> {
        match self {
            Self::Iri(iri) => Some(iri),
            _ => None,
        }
    }

    /// Numeric value of a float or integer literal.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::LangString { value: s, .. } | Self::N3(s) => Some(s),
            _ => None,
        }
    }

    /// SPARQL term syntax, as used in a `VALUES` block.
    pub fn to_sparql(&self) -> String {
        match self {
            Self::Iri(iri) => iri.to_sparql(),
            Self::BlankNode(id) => format!("_:{id}"),
            Self::Integer(v) => v.to_string(),
            Self::Float(v) => format!("{}^^{}", quote(&xsd_double(*v)), XSD.term("double").to_sparql()),
            Self::Boolean(v) => v.to_string(),
            Self::String(s) => quote(s),
            Self::LangString { value, lang } => format!("{}@{lang}", quote(value)),
            Self::Typed { value, datatype } => format!("{}^^{}", quote(value), datatype.to_sparql()),
            Self::N3(text) => text.clone(),
        }
    }
}

impl From<Iri> for Value {
    fn from(iri: Iri) -> Self {
        Self::Iri(iri)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Iri(iri) => write!(f, "{iri}"),
            Self::BlankNode(id) => write!(f, "_:{id}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::String(s) | Self::N3(s) => f.write_str(s),
            Self::LangString { value, lang } => write!(f, "{value}@{lang}"),
            Self::Typed { value, datatype } => write!(f, "{value}^^<{datatype}>"),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ResultsDocument {
    head: Head,
    results: Option<Bindings>,
    boolean: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct Head {
    #[serde(default)]
    vars: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Bindings {
    bindings: Vec<BTreeMap<String, JsonTerm>>,
}

#[derive(Debug, Deserialize)]
struct JsonTerm {
    #[serde(rename = "type")]
    kind: String,
    value: String,
    datatype: Option<String>,
    #[serde(rename = "xml:lang")]
    lang: Option<String>,
}

/// Parse a SPARQL JSON results document into records.
///
/// Every record carries a key for each projected variable.
pub fn parse_records(body: &[u8], mode: LiteralMode, prefixes: &PrefixMap) -> Result<Vec<Record>> {
    let doc: ResultsDocument = serde_json::from_slice(body)
        .map_err(|e| ProbsError::decode(format!("invalid SPARQL JSON results: {e}")))?;

    let Some(results) = doc.results else {
        return Err(match doc.boolean {
            Some(_) => ProbsError::decode("boolean (ASK) results cannot be decoded as records"),
            None => ProbsError::decode("results document has no bindings"),
        });
    };

    results
        .bindings
        .into_iter()
        .map(|row| {
            let mut record: Record = doc.head.vars.iter().map(|v| (v.clone(), None)).collect();
            for (var, term) in row {
                record.insert(var, Some(decode_term(term, mode, prefixes)?));
            }
            Ok(record)
        })
        .collect()
}

fn decode_term(term: JsonTerm, mode: LiteralMode, prefixes: &PrefixMap) -> Result<Value> {
    match mode {
        LiteralMode::Native => decode_native(term),
        LiteralMode::N3 => Ok(Value::N3(render_n3(&term, prefixes)?)),
    }
}

fn decode_native(term: JsonTerm) -> Result<Value> {
    match term.kind.as_str() {
        "uri" => Ok(Value::Iri(Iri::new(term.value))),
        "bnode" => Ok(Value::BlankNode(term.value)),
        "literal" | "typed-literal" => decode_literal(term),
        other => Err(ProbsError::decode(format!("unknown term type '{other}'"))),
    }
}

fn decode_literal(term: JsonTerm) -> Result<Value> {
    if let Some(lang) = term.lang {
        return Ok(Value::LangString {
            value: term.value,
            lang,
        });
    }
    let Some(datatype) = term.datatype else {
        return Ok(Value::String(term.value));
    };
    let Some(local) = datatype.strip_prefix(XSD.base()) else {
        return Ok(Value::Typed {
            value: term.value,
            datatype: Iri::new(datatype),
        });
    };

    let bad = |value: &str| ProbsError::decode(format!("invalid xsd:{local} literal '{value}'"));
    match local {
        "double" | "float" | "decimal" => parse_xsd_double(&term.value)
            .map(Value::Float)
            .ok_or_else(|| bad(&term.value)),
        "integer" | "int" | "long" | "short" | "byte" | "nonNegativeInteger"
        | "positiveInteger" | "nonPositiveInteger" | "negativeInteger" | "unsignedInt"
        | "unsignedShort" | "unsignedByte" | "unsignedLong" => term
            .value
            .trim()
            .trim_start_matches('+')
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| bad(&term.value)),
        "boolean" => match term.value.trim() {
            "true" | "1" => Ok(Value::Boolean(true)),
            "false" | "0" => Ok(Value::Boolean(false)),
            _ => Err(bad(&term.value)),
        },
        "string" => Ok(Value::String(term.value)),
        _ => Ok(Value::Typed {
            value: term.value,
            datatype: Iri::new(datatype.clone()),
        }),
    }
}

fn render_n3(term: &JsonTerm, prefixes: &PrefixMap) -> Result<String> {
    let iri = |iri: &str| prefixes.compact(iri).unwrap_or_else(|| format!("<{iri}>"));
    match term.kind.as_str() {
        "uri" => Ok(iri(&term.value)),
        "bnode" => Ok(format!("_:{}", term.value)),
        "literal" | "typed-literal" => Ok(match (&term.lang, &term.datatype) {
            (Some(lang), _) => format!("{}@{lang}", quote(&term.value)),
            (None, Some(datatype)) => format!("{}^^{}", quote(&term.value), iri(datatype)),
            (None, None) => quote(&term.value),
        }),
        other => Err(ProbsError::decode(format!("unknown term type '{other}'"))),
    }
}

/// Parse an xsd:double lexical form, including `INF`, `-INF` and `NaN`.
fn parse_xsd_double(lexical: &str) -> Option<f64> {
    match lexical.trim() {
        "INF" | "+INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        other => other.parse().ok(),
    }
}

fn xsd_double(v: f64) -> String {
    if v.is_nan() {
        "NaN".into()
    } else if v.is_infinite() {
        if v > 0.0 { "INF".into() } else { "-INF".into() }
    } else {
        format!("{v:?}")
    }
}

/// Quote a string as a SPARQL/N3 literal.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
      "head": {"vars": ["obj", "value", "note"]},
      "results": {"bindings": [
        {"obj": {"type": "uri", "value": "https://ukfires.org/probs/ontology/data/simple/Object-Bread"},
         "value": {"type": "literal", "value": "6", "datatype": "http://www.w3.org/2001/XMLSchema#double"}},
        {"obj": {"type": "uri", "value": "https://ukfires.org/probs/ontology/data/simple/Object-Cake"},
         "value": {"type": "literal", "value": "3", "datatype": "http://www.w3.org/2001/XMLSchema#double"},
         "note": {"type": "literal", "value": "gâteau", "xml:lang": "fr"}}
      ]}
    }"#;

    #[test]
    fn native_decoding() {
        let records = parse_records(BODY.as_bytes(), LiteralMode::Native, &PrefixMap::defaults()).unwrap();
        assert_eq!(records.len(), 2);

        let bread = &records[0];
        assert_eq!(
            bread["obj"],
            Some(Value::iri("https://ukfires.org/probs/ontology/data/simple/Object-Bread"))
        );
        assert_eq!(bread["value"], Some(Value::Float(6.0)));
        assert_eq!(bread["note"], None);

        assert_eq!(records[1]["value"].as_ref().and_then(Value::as_f64), Some(3.0));
        assert_eq!(
            records[1]["note"],
            Some(Value::LangString {
                value: "gâteau".into(),
                lang: "fr".into()
            })
        );
    }

    #[test]
    fn n3_decoding_compacts_iris() {
        let mut prefixes = PrefixMap::defaults();
        prefixes.insert("xsd", XSD.base());
        let records = parse_records(BODY.as_bytes(), LiteralMode::N3, &prefixes).unwrap();
        assert_eq!(
            records[0]["value"],
            Some(Value::N3("\"6\"^^xsd:double".into()))
        );
        // "data/simple/..." is not a valid local name, so the IRI stays full.
        assert_eq!(
            records[0]["obj"],
            Some(Value::N3(
                "<https://ukfires.org/probs/ontology/data/simple/Object-Bread>".into()
            ))
        );
        assert_eq!(records[1]["note"], Some(Value::N3("\"gâteau\"@fr".into())));
    }

    #[test]
    fn typed_literals() {
        let body = r#"{"head": {"vars": ["n", "b", "d", "s"]}, "results": {"bindings": [{
            "n": {"type": "literal", "value": "42", "datatype": "http://www.w3.org/2001/XMLSchema#integer"},
            "b": {"type": "literal", "value": "true", "datatype": "http://www.w3.org/2001/XMLSchema#boolean"},
            "d": {"type": "literal", "value": "2018", "datatype": "http://www.w3.org/2001/XMLSchema#gYear"},
            "s": {"type": "bnode", "value": "b0"}
        }]}}"#;
        let records = parse_records(body.as_bytes(), LiteralMode::Native, &PrefixMap::new()).unwrap();
        let row = &records[0];
        assert_eq!(row["n"], Some(Value::Integer(42)));
        assert_eq!(row["b"], Some(Value::Boolean(true)));
        assert_eq!(
            row["d"],
            Some(Value::Typed {
                value: "2018".into(),
                datatype: XSD.term("gYear")
            })
        );
        assert_eq!(row["s"], Some(Value::BlankNode("b0".into())));
    }

    #[test]
    fn malformed_documents_are_decode_errors() {
        let ask = r#"{"head": {}, "boolean": true}"#;
        let err = parse_records(ask.as_bytes(), LiteralMode::Native, &PrefixMap::new()).unwrap_err();
        assert!(matches!(err, ProbsError::Decode { .. }));

        let bad_double = r#"{"head": {"vars": ["v"]}, "results": {"bindings": [
            {"v": {"type": "literal", "value": "six", "datatype": "http://www.w3.org/2001/XMLSchema#double"}}
        ]}}"#;
        let err = parse_records(bad_double.as_bytes(), LiteralMode::Native, &PrefixMap::new()).unwrap_err();
        assert!(err.to_string().contains("six"));
    }

    #[test]
    fn sparql_term_syntax() {
        assert_eq!(
            Value::iri("http://example.org/unfccc/1.").to_sparql(),
            "<http://example.org/unfccc/1.>"
        );
        assert_eq!(Value::String("say \"hi\"".into()).to_sparql(), r#""say \"hi\"""#);
        assert_eq!(
            Value::Float(6.0).to_sparql(),
            "\"6.0\"^^<http://www.w3.org/2001/XMLSchema#double>"
        );
        assert_eq!(Value::Integer(-3).to_sparql(), "-3");
    }
}
