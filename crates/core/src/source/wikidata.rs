//! Wikidata SPARQL source.
//!
//! Looks up humans whose English label matches the candidate's name (and
//! death year, when known) and reads their cause of death (P509).

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::http::{build_client, check_status};
use super::retry::{with_backoff, RetryConfig};
use super::{
    CauseCandidate, FetchContext, SourceCategory, SourceError, SourceFinding, SourceProvider,
};
use crate::candidate::Candidate;

/// Confidence of a cause recorded on an unambiguous Wikidata item.
const STRUCTURED_CONFIDENCE: f64 = 0.9;

pub struct WikidataSource {
    id: String,
    category: SourceCategory,
    endpoint: String,
    client: Client,
    retry: RetryConfig,
}

impl WikidataSource {
    pub fn new(
        id: impl Into<String>,
        category: SourceCategory,
        endpoint: impl Into<String>,
        timeout: Duration,
        retry: RetryConfig,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            id: id.into(),
            category,
            endpoint: endpoint.into(),
            client: build_client(timeout)?,
            retry,
        })
    }
}

#[async_trait]
impl SourceProvider for WikidataSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn category(&self) -> SourceCategory {
        self.category
    }

    async fn fetch(
        &self,
        candidate: &Candidate,
        _ctx: &FetchContext,
    ) -> Result<Option<SourceFinding>, SourceError> {
        let query = build_query(&candidate.name, candidate.death_year());
        debug!(source = %self.id, candidate = %candidate.id, "Wikidata SPARQL lookup");

        let query = query.as_str();
        let body = with_backoff(&self.retry, &self.id, || async move {
            let response = self
                .client
                .get(&self.endpoint)
                .query(&[("query", query), ("format", "json")])
                .header(reqwest::header::ACCEPT, "application/sparql-results+json")
                .send()
                .await?;
            let response = check_status(response).await?;
            Ok(response.text().await?)
        })
        .await?;

        let parsed: SparqlResponse = serde_json::from_str(&body)
            .map_err(|e| SourceError::MalformedResponse(format!("SPARQL results: {}", e)))?;

        Ok(finding_from_bindings(parsed.results.bindings, body))
    }
}

#[derive(Debug, Deserialize)]
struct SparqlResponse {
    results: SparqlResults,
}

#[derive(Debug, Deserialize)]
struct SparqlResults {
    bindings: Vec<Binding>,
}

#[derive(Debug, Deserialize)]
struct Binding {
    person: SparqlValue,
    #[serde(rename = "causeLabel", default)]
    cause_label: Option<SparqlValue>,
}

#[derive(Debug, Deserialize)]
struct SparqlValue {
    value: String,
}

fn build_query(name: &str, death_year: Option<i32>) -> String {
    let label = name.trim().replace('\\', "\\\\").replace('"', "\\\"");
    let year_filter = death_year
        .map(|y| format!("FILTER(YEAR(?deathDate) = {})", y))
        .unwrap_or_default();
    format!(
        r#"SELECT ?person ?causeLabel WHERE {{
  ?person wdt:P31 wd:Q5 ;
          rdfs:label "{label}"@en ;
          wdt:P570 ?deathDate .
  {year_filter}
  OPTIONAL {{ ?person wdt:P509 ?cause . }}
  SERVICE wikibase:label {{ bd:serviceParam wikibase:language "en". }}
}}
LIMIT 20"#
    )
}

/// Turn result rows into a finding.
///
/// Rows are grouped per person; each person's causes form one answer. When
/// several people match, their answers compete and share the confidence.
fn finding_from_bindings(bindings: Vec<Binding>, payload: String) -> Option<SourceFinding> {
    let mut per_person: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for binding in bindings {
        let causes = per_person.entry(binding.person.value).or_default();
        if let Some(label) = binding.cause_label.map(|l| l.value.trim().to_string()) {
            if !label.is_empty() && !is_entity_id(&label) && !causes.contains(&label) {
                causes.push(label);
            }
        }
    }

    let people = per_person.len();
    if people == 0 {
        return None;
    }

    let mut answers: Vec<(String, usize)> = Vec::new();
    for causes in per_person.values().filter(|c| !c.is_empty()) {
        let answer = causes.join(", ");
        match answers.iter_mut().find(|(a, _)| a.eq_ignore_ascii_case(&answer)) {
            Some((_, count)) => *count += 1,
            None => answers.push((answer, 1)),
        }
    }
    if answers.is_empty() {
        return None;
    }

    let url = if people == 1 {
        per_person.keys().next().cloned()
    } else {
        None
    };
    let candidates = answers
        .into_iter()
        .map(|(cause, count)| {
            let score = STRUCTURED_CONFIDENCE * count as f64 / people as f64;
            CauseCandidate::new(cause, score).with_evidence("wikidata P509")
        })
        .collect();

    Some(SourceFinding::from_candidates(candidates, payload, url))
}

fn is_entity_id(label: &str) -> bool {
    label.len() > 1 && label.starts_with('Q') && label[1..].chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(json: &str) -> Vec<Binding> {
        serde_json::from_str::<SparqlResponse>(json).unwrap().results.bindings
    }

    #[test]
    fn test_query_escapes_and_filters_year() {
        let query = build_query("Dwayne \"The Rock\" Doe", Some(2021));
        assert!(query.contains(r#"rdfs:label "Dwayne \"The Rock\" Doe"@en"#));
        assert!(query.contains("FILTER(YEAR(?deathDate) = 2021)"));
        assert!(query.contains("wdt:P509"));

        let query = build_query("Jane Doe", None);
        assert!(!query.contains("FILTER"));
    }

    #[test]
    fn test_single_person() {
        let rows = bindings(
            r#"{"results": {"bindings": [
                {"person": {"value": "http://www.wikidata.org/entity/Q1"}, "causeLabel": {"value": "lung cancer"}},
                {"person": {"value": "http://www.wikidata.org/entity/Q1"}, "causeLabel": {"value": "pneumonia"}}
            ]}}"#,
        );
        let finding = finding_from_bindings(rows, "raw".into()).unwrap();
        assert_eq!(finding.cause.as_deref(), Some("lung cancer, pneumonia"));
        assert_eq!(finding.confidence, STRUCTURED_CONFIDENCE);
        assert_eq!(finding.alternatives.len(), 1);
        assert_eq!(finding.url.as_deref(), Some("http://www.wikidata.org/entity/Q1"));
    }

    #[test]
    fn test_namesakes_compete() {
        let rows = bindings(
            r#"{"results": {"bindings": [
                {"person": {"value": "Q1"}, "causeLabel": {"value": "stroke"}},
                {"person": {"value": "Q2"}, "causeLabel": {"value": "drowning"}}
            ]}}"#,
        );
        let finding = finding_from_bindings(rows, String::new()).unwrap();
        assert_eq!(finding.alternatives.len(), 2);
        assert_eq!(finding.alternatives[0].score, finding.alternatives[1].score);
        assert!(finding.url.is_none());
    }

    #[test]
    fn test_person_without_cause() {
        let rows = bindings(r#"{"results": {"bindings": [{"person": {"value": "Q1"}}]}}"#);
        assert!(finding_from_bindings(rows, String::new()).is_none());
        assert!(finding_from_bindings(Vec::new(), String::new()).is_none());
    }

    #[test]
    fn test_unlabelled_cause_is_skipped() {
        let rows = bindings(
            r#"{"results": {"bindings": [{"person": {"value": "Q1"}, "causeLabel": {"value": "Q12345"}}]}}"#,
        );
        assert!(finding_from_bindings(rows, String::new()).is_none());
    }
}
