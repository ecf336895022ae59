//! College Scorecard API client
//!
//! Builds Scorecard queries and runs them through a [`Fetcher`], trying
//! several name-matching strategies in turn. All strategies share the
//! fetcher's quota and execution budget; a quota rejection stops the
//! search early.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;
use std::fmt;
use tracing::{debug, info};

use crate::error::ScorecardError;
use crate::fetch::{FailureReason, FetchOptions, FetchResult, Fetcher, Sleeper, TokioSleeper};
use crate::http::HttpExecutor;
use crate::quota::QuotaStatus;

/// Fields requested by name searches
pub const SEARCH_FIELDS: &str =
    "id,school.name,school.city,school.state,school.ownership,school.school_url";

/// Fields requested when filling in a single college's details
pub const DETAIL_FIELDS: &[&str] = &[
    "id",
    "school.name",
    "school.city",
    "school.state",
    "school.ownership",
    "school.school_url",
    "latest.admissions.admission_rate.overall",
    "latest.student.retention_rate.four_year.full_time",
    "latest.completion.rate_suppressed.overall",
    "latest.earnings.10_yrs_after_entry.median",
    "latest.cost.attendance.academic_year",
    "latest.cost.avg_net_price.overall",
    "latest.admissions.sat_scores.25th_percentile.math",
    "latest.admissions.sat_scores.25th_percentile.critical_reading",
    "latest.admissions.sat_scores.75th_percentile.math",
    "latest.admissions.sat_scores.75th_percentile.critical_reading",
    "latest.admissions.sat_scores.average.overall",
    "latest.admissions.act_scores.25th_percentile.cumulative",
    "latest.admissions.act_scores.75th_percentile.cumulative",
    "latest.aid.pell_grant_rate",
    "latest.aid.median_debt.completers.overall",
];

/// Page size used for detail lookups
const DETAIL_PER_PAGE: u32 = 5;

/// Keys that are obviously not real
const PLACEHOLDER_KEYS: &[&str] = &["your_api_key_here", "DEMO_KEY"];

/// Shortest plausible api.data.gov key
const MIN_API_KEY_LEN: usize = 10;

/// Builds `base?k=v&...`, percent-encoding every key and value
pub fn build_url(base: &str, params: &[(String, String)]) -> String {
    let query: Vec<String> = params
        .iter()
        .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
        .collect();
    format!("{}?{}", base, query.join("&"))
}

/// Characters a URI component keeps as-is
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

fn encode(s: &str) -> String {
    utf8_percent_encode(s, COMPONENT).to_string()
}

/// Escapes regex metacharacters so `s` matches literally
pub fn escape_regex(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(
            c,
            '.' | '*' | '+' | '?' | '^' | '$' | '{' | '}' | '(' | ')' | '|' | '[' | ']' | '\\'
        ) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Institution control as reported by `school.ownership`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Public,
    PrivateNonprofit,
    PrivateForProfit,
}

impl Ownership {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Public),
            2 => Some(Self::PrivateNonprofit),
            3 => Some(Self::PrivateForProfit),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Public => "Public",
            Self::PrivateNonprofit => "Private (nonprofit)",
            Self::PrivateForProfit => "Private (for-profit)",
        }
    }

    /// Label for a raw ownership code; empty for unknown codes
    pub fn label_for_code(code: i64) -> &'static str {
        Self::from_code(code).map(|o| o.label()).unwrap_or("")
    }
}

impl fmt::Display for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a lookup matches the college name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    /// Server-side fuzzy search
    Search,
    /// Exact `school.name`
    Exact,
    /// `school.name` contains the query
    Regex,
}

impl MatchStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Exact => "exact",
            Self::Regex => "regex",
        }
    }

    fn param(&self, query: &str) -> (String, String) {
        match self {
            Self::Search => ("school.search".to_string(), query.to_string()),
            Self::Exact => ("school.name".to_string(), query.to_string()),
            Self::Regex => (
                "school.name".to_string(),
                format!("~.*{}.*", escape_regex(query)),
            ),
        }
    }
}

/// Result of a name search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    /// Records from the first strategy that found anything
    pub results: Vec<Value>,
    /// One note per strategy tried, e.g. `search:200(3) (cached)`
    pub notes: Vec<String>,
    /// Daily quota usage after the search
    pub quota_used: u32,
}

impl SearchOutcome {
    pub fn is_ok(&self) -> bool {
        !self.results.is_empty()
    }

    pub fn notes_line(&self) -> String {
        self.notes.join(" | ")
    }
}

/// Result of a detail lookup
#[derive(Debug, Clone, PartialEq)]
pub struct CollegeMatch {
    /// First matching record
    pub record: Value,
    pub notes: Vec<String>,
    pub quota_used: u32,
}

/// Non-empty `results` array of a Scorecard response
fn non_empty_results(payload: &Value) -> Option<&Vec<Value>> {
    payload
        .get("results")
        .and_then(Value::as_array)
        .filter(|results| !results.is_empty())
}

fn status_note(label: &str, result: &FetchResult) -> String {
    let status = match result {
        Ok(_) => "200".to_string(),
        Err(failure) if failure.reason == FailureReason::ParseError => "err".to_string(),
        Err(failure) => failure
            .status()
            .filter(|status| *status != 0)
            .map(|status| status.to_string())
            .unwrap_or_else(|| "err".to_string()),
    };
    format!("{}:{}", label, status)
}

fn is_two_letter_state(state: &str) -> bool {
    state.len() == 2 && state.chars().all(|c| c.is_ascii_uppercase())
}

/// Scorecard queries on top of a [`Fetcher`]
pub struct ScorecardClient<E: HttpExecutor, Z: Sleeper = TokioSleeper> {
    fetcher: Fetcher<E, Z>,
    api_key: String,
}

impl<E: HttpExecutor, Z: Sleeper> ScorecardClient<E, Z> {
    /// Creates a client, rejecting missing or placeholder API keys
    pub fn new(fetcher: Fetcher<E, Z>, api_key: impl Into<String>) -> Result<Self, ScorecardError> {
        let api_key = api_key.into().trim().to_string();
        if api_key.is_empty() {
            return Err(ScorecardError::MissingApiKey);
        }
        if PLACEHOLDER_KEYS.contains(&api_key.as_str()) || api_key.len() < MIN_API_KEY_LEN {
            return Err(ScorecardError::InvalidApiKey);
        }
        fetcher.config().validate()?;
        Ok(Self { fetcher, api_key })
    }

    pub fn fetcher(&self) -> &Fetcher<E, Z> {
        &self.fetcher
    }

    fn base_params(&self, per_page: u32, fields: String) -> Vec<(String, String)> {
        vec![
            ("api_key".to_string(), self.api_key.clone()),
            ("per_page".to_string(), per_page.to_string()),
            ("fields".to_string(), fields),
            ("school.operating".to_string(), "1".to_string()),
        ]
    }

    fn strategy_url(
        &self,
        base_params: &[(String, String)],
        strategy: MatchStrategy,
        query: &str,
    ) -> String {
        let mut params = base_params.to_vec();
        params.push(strategy.param(query));
        build_url(&self.fetcher.config().base_url, &params)
    }

    /// Searches colleges by name, optionally within a two-letter state
    ///
    /// Starts a fresh execution budget, then tries fuzzy search, exact
    /// name, and name-contains in order, stopping at the first strategy that
    /// returns records. An empty `results` list is not an error.
    pub async fn search_colleges(&self, query: &str, state: Option<&str>) -> SearchOutcome {
        self.fetcher.quota().restart_execution_timer();

        let mut base_params = self.base_params(
            self.fetcher.config().per_page,
            SEARCH_FIELDS.to_string(),
        );
        if let Some(state) = state.filter(|s| is_two_letter_state(s)) {
            base_params.push(("school.state".to_string(), state.to_string()));
        }

        let mut results = Vec::new();
        let mut notes = Vec::new();

        for strategy in [MatchStrategy::Search, MatchStrategy::Exact, MatchStrategy::Regex] {
            let url = self.strategy_url(&base_params, strategy, query);
            let result = self.fetcher.fetch(&url, FetchOptions::default()).await;

            if let Ok(fetched) = &result {
                if let Some(found) = non_empty_results(&fetched.payload) {
                    let cached = if fetched.served_from_cache { " (cached)" } else { "" };
                    notes.push(format!(
                        "{}:200({}){}",
                        strategy.label(),
                        found.len(),
                        cached
                    ));
                    results = found.clone();
                    break;
                }
            }

            notes.push(status_note(strategy.label(), &result));
            if let Err(failure) = &result {
                if failure.reason.is_quota_limit() {
                    notes.push("quota_limit".to_string());
                    break;
                }
            }
        }

        let quota_used = self.fetcher.quota().status().daily_usage;
        info!(
            query,
            found = results.len(),
            quota_used,
            notes = %notes.join(" | "),
            "college search finished"
        );
        SearchOutcome {
            results,
            notes,
            quota_used,
        }
    }

    /// Looks up one college's detail record by name
    ///
    /// Tries an exact name match, then name-contains if the first found
    /// nothing and quota remains. Detail lookups bypass the cache.
    pub async fn fetch_college_data(&self, name: &str) -> Result<CollegeMatch, ScorecardError> {
        self.fetcher
            .quota()
            .check()
            .map_err(|rejection| ScorecardError::Fetch(rejection.into()))?;

        let base_params = self.base_params(DETAIL_PER_PAGE, DETAIL_FIELDS.join(","));
        let mut notes = Vec::new();
        let mut record = None;

        for strategy in [MatchStrategy::Exact, MatchStrategy::Regex] {
            if strategy == MatchStrategy::Regex && !self.fetcher.quota().check_quota() {
                debug!(name, "skipping regex fallback, quota gate closed");
                break;
            }

            let url = self.strategy_url(&base_params, strategy, name);
            let result = self.fetcher.fetch(&url, FetchOptions::no_cache()).await;

            notes.push(status_note(strategy.label(), &result));

            if let Some(first) = result.ok().and_then(|fetched| {
                non_empty_results(&fetched.payload).and_then(|r| r.first().cloned())
            }) {
                record = Some(first);
                break;
            }
        }

        let notes_line = notes.join(" | ");
        match record {
            Some(record) => Ok(CollegeMatch {
                record,
                notes,
                quota_used: self.fetcher.quota().status().daily_usage,
            }),
            None => Err(ScorecardError::NoMatch {
                name: name.to_string(),
                notes: notes_line,
            }),
        }
    }

    /// Current quota usage
    pub fn quota_status(&self) -> QuotaStatus {
        self.fetcher.quota().status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_encodes_each_key_and_value() {
        let url = build_url(
            "https://example.com/schools",
            &[
                ("school.name".to_string(), "Texas A&M University".to_string()),
                ("fields".to_string(), "id,school.name".to_string()),
            ],
        );

        assert_eq!(
            url,
            "https://example.com/schools?school.name=Texas%20A%26M%20University&fields=id%2Cschool.name"
        );
    }

    #[test]
    fn test_build_url_keeps_unreserved_component_characters() {
        let url = build_url(
            "https://example.com/schools",
            &[("school.name".to_string(), "~.*St. Mary's (TX)!.*".to_string())],
        );

        assert_eq!(url, "https://example.com/schools?school.name=~.*St.%20Mary's%20(TX)!.*");
    }

    #[test]
    fn test_build_url_preserves_parameter_order() {
        let url = build_url(
            "https://example.com/s",
            &[
                ("b".to_string(), "2".to_string()),
                ("a".to_string(), "1".to_string()),
            ],
        );

        assert_eq!(url, "https://example.com/s?b=2&a=1");
    }

    #[test]
    fn test_escape_regex_escapes_metacharacters() {
        assert_eq!(escape_regex("St. John's (MD)"), r"St\. John's \(MD\)");
        assert_eq!(escape_regex(r"a+b*c?[d]{e}|f^g$h\i"), r"a\+b\*c\?\[d\]\{e\}\|f\^g\$h\\i");
        assert_eq!(escape_regex("Plain Name"), "Plain Name");
    }

    #[test]
    fn test_ownership_labels() {
        assert_eq!(Ownership::label_for_code(1), "Public");
        assert_eq!(Ownership::label_for_code(2), "Private (nonprofit)");
        assert_eq!(Ownership::label_for_code(3), "Private (for-profit)");
        assert_eq!(Ownership::label_for_code(0), "");
        assert_eq!(Ownership::label_for_code(4), "");
        assert_eq!(Ownership::PrivateNonprofit.to_string(), "Private (nonprofit)");
    }

    #[test]
    fn test_strategy_params() {
        assert_eq!(
            MatchStrategy::Search.param("Rice"),
            ("school.search".to_string(), "Rice".to_string())
        );
        assert_eq!(
            MatchStrategy::Exact.param("Rice"),
            ("school.name".to_string(), "Rice".to_string())
        );
        assert_eq!(
            MatchStrategy::Regex.param("St. Olaf"),
            ("school.name".to_string(), r"~.*St\. Olaf.*".to_string())
        );
    }

    #[test]
    fn test_two_letter_state_filter() {
        assert!(is_two_letter_state("TX"));
        assert!(!is_two_letter_state("tx"));
        assert!(!is_two_letter_state("TEX"));
        assert!(!is_two_letter_state(""));
    }

    #[test]
    fn test_non_empty_results() {
        let payload = serde_json::json!({"results": [{"id": 1}]});
        assert_eq!(non_empty_results(&payload).map(Vec::len), Some(1));

        let empty = serde_json::json!({"results": []});
        assert!(non_empty_results(&empty).is_none());

        let missing = serde_json::json!({"metadata": {}});
        assert!(non_empty_results(&missing).is_none());
    }
}
