//! PRObs observation lookup.

use probs_runner_shared::{Iri, PROBS, ProbsError, Result};

use crate::results::{Record, Value};

/// Whether a measurement is exact or only a lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundKind {
    Exact,
    LowerBound,
}

impl BoundKind {
    pub fn iri(&self) -> Iri {
        match self {
            Self::Exact => PROBS.term("ExactBound"),
            Self::LowerBound => PROBS.term("LowerBound"),
        }
    }

    fn from_iri(iri: &Iri) -> Option<Self> {
        [Self::Exact, Self::LowerBound]
            .into_iter()
            .find(|kind| &kind.iri() == iri)
    }
}

/// A PRObs observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub uri: Iri,
    pub time: Iri,
    pub region: Iri,
    pub metric: Iri,
    pub role: Iri,
    pub object: Option<Iri>,
    pub process: Option<Iri>,
    /// `NaN` when the observation has no measurement.
    pub measurement: f64,
    pub bound: BoundKind,
}

/// Dimensions to match observations on.
///
/// An object (or process) can be given directly or looked up through its
/// `:hasCode` classification code; a direct IRI wins when both are set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationQuery {
    pub time: Iri,
    pub region: Iri,
    pub metric: Iri,
    pub role: Iri,
    pub object: Option<Iri>,
    pub process: Option<Iri>,
    pub object_code: Option<String>,
    pub process_code: Option<String>,
}

impl ObservationQuery {
    pub fn new(time: impl Into<Iri>, region: impl Into<Iri>, metric: impl Into<Iri>, role: impl Into<Iri>) -> Self {
        Self {
            time: time.into(),
            region: region.into(),
            metric: metric.into(),
            role: role.into(),
            object: None,
            process: None,
            object_code: None,
            process_code: None,
        }
    }

    pub fn object(mut self, object: impl Into<Iri>) -> Self {
        self.object = Some(object.into());
        self
    }

    pub fn process(mut self, process: impl Into<Iri>) -> Self {
        self.process = Some(process.into());
        self
    }

    pub fn object_code(mut self, code: impl Into<String>) -> Self {
        self.object_code = Some(code.into());
        self
    }

    pub fn process_code(mut self, code: impl Into<String>) -> Self {
        self.process_code = Some(code.into());
        self
    }

    /// Query text and the bindings to attach to it.
    pub fn to_sparql(&self) -> (String, Vec<(String, Value)>) {
        let mut bindings = vec![
            ("time".to_string(), Value::Iri(self.time.clone())),
            ("region".to_string(), Value::Iri(self.region.clone())),
            ("metric".to_string(), Value::Iri(self.metric.clone())),
            ("role".to_string(), Value::Iri(self.role.clone())),
        ];
        let mut defined_by = String::new();
        let mut lookups = String::new();

        for (var, predicate, iri, code) in [
            ("object", "objectDefinedBy", &self.object, &self.object_code),
            ("process", "processDefinedBy", &self.process, &self.process_code),
        ] {
            let constrained = match (iri, code) {
                (Some(iri), _) => {
                    bindings.push((var.to_string(), Value::Iri(iri.clone())));
                    true
                }
                (None, Some(code)) => {
                    lookups.push_str(&format!(
                        "    ?{var} {} ?{var}_code .\n",
                        PROBS.term("hasCode").to_sparql()
                    ));
                    bindings.push((format!("{var}_code"), Value::String(code.clone())));
                    true
                }
                (None, None) => false,
            };
            if constrained {
                defined_by.push_str(&format!(
                    "         {} ?{var} ;\n",
                    PROBS.term(predicate).to_sparql()
                ));
            }
        }

        let p = |local: &str| PROBS.term(local).to_sparql();
        let query = format!(
            "SELECT ?obs ?measurement ?bound ?object ?process\n\
             WHERE {{\n\
             \x20   ?obs a {observation} ;\n\
             \x20        {time} ?time ;\n\
             \x20        {region} ?region ;\n\
             \x20        {metric} ?metric ;\n\
             \x20        {role} ?role ;\n\
             {defined_by}\
             \x20        {bound} ?bound .\n\
             {lookups}\
             \x20   OPTIONAL {{ ?obs {measurement} ?measurement . }}\n\
             }}\n\
             ORDER BY ?obs\n",
            observation = p("Observation"),
            time = p("hasTimePeriod"),
            region = p("hasRegion"),
            metric = p("metric"),
            role = p("hasRole"),
            bound = p("bound"),
            measurement = p("measurement"),
        );
        (query, bindings)
    }

    /// Decode one result row of [`Self::to_sparql`].
    pub(crate) fn decode(&self, record: &Record) -> Result<Observation> {
        let iri = |var: &str| -> Result<Option<Iri>> {
            match record.get(var).and_then(Option::as_ref) {
                Some(value) => value
                    .as_iri()
                    .cloned()
                    .map(Some)
                    .ok_or_else(|| ProbsError::decode(format!("?{var} is not an IRI: {value}"))),
                None => Ok(None),
            }
        };

        let uri = iri("obs")?.ok_or_else(|| ProbsError::decode("observation row without ?obs"))?;
        let bound_iri = iri("bound")?
            .ok_or_else(|| ProbsError::decode(format!("observation {uri} has no bound")))?;
        let bound = BoundKind::from_iri(&bound_iri)
            .ok_or_else(|| ProbsError::decode(format!("unknown bound kind {bound_iri}")))?;

        let measurement = match record.get("measurement").cloned().flatten() {
            None => f64::NAN,
            Some(value) => value.as_f64().ok_or_else(|| {
                ProbsError::decode(format!("measurement of {uri} is not numeric: {value}"))
            })?,
        };

        Ok(Observation {
            time: self.time.clone(),
            region: self.region.clone(),
            metric: self.metric.clone(),
            role: self.role.clone(),
            object: iri("object")?.or_else(|| self.object.clone()),
            process: iri("process")?.or_else(|| self.process.clone()),
            measurement,
            bound,
            uri,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probs_runner_shared::QUANTITYKIND;

    fn query() -> ObservationQuery {
        ObservationQuery::new(
            PROBS.term("TimePeriod_YearOf2018"),
            PROBS.term("RegionGBR"),
            QUANTITYKIND.term("Mass"),
            PROBS.term("ProcessOutput"),
        )
    }

    #[test]
    fn mandatory_dimensions_only() {
        let (text, bindings) = query().to_sparql();
        assert!(!text.contains("objectDefinedBy"));
        assert!(!text.contains("hasCode"));
        assert!(text.contains("OPTIONAL { ?obs <https://ukfires.org/probs/ontology/measurement> ?measurement . }"));
        let vars: Vec<_> = bindings.iter().map(|(v, _)| v.as_str()).collect();
        assert_eq!(vars, ["time", "region", "metric", "role"]);
    }

    #[test]
    fn direct_iri_wins_over_code() {
        let (text, bindings) = query()
            .object("http://example.org/unfccc/N2O")
            .object_code("N2O")
            .process_code("1.")
            .to_sparql();

        assert!(text.contains("<https://ukfires.org/probs/ontology/objectDefinedBy> ?object ;"));
        assert!(text.contains("<https://ukfires.org/probs/ontology/processDefinedBy> ?process ;"));
        assert!(text.contains("?process <https://ukfires.org/probs/ontology/hasCode> ?process_code ."));
        assert!(!text.contains("?object_code"));

        assert!(bindings.contains(&(
            "object".to_string(),
            Value::iri("http://example.org/unfccc/N2O")
        )));
        assert!(bindings.contains(&("process_code".to_string(), Value::String("1.".into()))));
    }

    #[test]
    fn decode_missing_measurement_is_nan() {
        let q = query();
        let record: Record = [
            ("obs".to_string(), Some(Value::iri("http://example.org/Obs"))),
            ("measurement".to_string(), None),
            ("bound".to_string(), Some(Value::Iri(PROBS.term("LowerBound")))),
            ("object".to_string(), None),
            ("process".to_string(), None),
        ]
        .into_iter()
        .collect();

        let obs = q.decode(&record).unwrap();
        assert!(obs.measurement.is_nan());
        assert_eq!(obs.bound, BoundKind::LowerBound);
        assert_eq!(obs.object, None);
        assert_eq!(obs.time, PROBS.term("TimePeriod_YearOf2018"));
    }

    #[test]
    fn decode_rejects_unknown_bound() {
        let record: Record = [
            ("obs".to_string(), Some(Value::iri("http://example.org/Obs"))),
            ("bound".to_string(), Some(Value::iri("http://example.org/Sideways"))),
        ]
        .into_iter()
        .collect();
        let err = query().decode(&record).unwrap_err();
        assert!(err.to_string().contains("Sideways"));
    }

    #[test]
    fn decode_rejects_literal_where_iri_expected() {
        let record: Record = [
            ("obs".to_string(), Some(Value::iri("http://example.org/Obs"))),
            ("bound".to_string(), Some(Value::Iri(PROBS.term("ExactBound")))),
            ("object".to_string(), Some(Value::String("N2O".into()))),
        ]
        .into_iter()
        .collect();
        let err = query().decode(&record).unwrap_err();
        assert!(err.to_string().contains("?object is not an IRI"), "{err}");
    }
}
