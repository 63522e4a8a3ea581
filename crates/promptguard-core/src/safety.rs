//! Output validation, sanitization, and leak detection.
//!
//! Everything a provider returns passes through here before it leaves the
//! core. Structured responses are parsed and schema-checked; free text is
//! sanitized; exfiltration and PII detectors run in advisory mode (they
//! flag, they never block, because false positives are expected).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum sanitized text length in characters.
const MAX_TEXT_CHARS: usize = 20_000;

/// Maximum items kept in any JSON array echoed to clients.
const MAX_ARRAY_ITEMS: usize = 50;

static SCRIPT_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script>|<script\b[^>]*/?>").unwrap());
static IFRAME_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<iframe\b[^>]*>.*?</iframe>|<iframe\b[^>]*/?>").unwrap());

// Long encoded runs are the cheapest way to smuggle prompt or key material
// out through a model response.
static BASE64_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9+/=]{100,}").unwrap());
static HEX_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)[0-9a-f]{64,}").unwrap());
static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)https?://([^\s/<>"')]+)"#).unwrap());

static SSN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());
static CREDIT_CARD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:\d{4}[-\s]?){3}\d{4}\b").unwrap());
static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}").unwrap());
static PHONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:\+?1[-.\s]?)?\(?\d{3}\)?[-.\s]\d{3}[-.\s]\d{4}\b").unwrap());

static SENSITIVE_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)password|passwd|token|secret|credential|authorization|key\b").unwrap()
});

/// Result of structured parsing. `data` is only present when `valid`.
#[derive(Debug, Clone)]
pub struct ParseOutcome<T> {
    pub valid: bool,
    pub data: Option<T>,
    pub errors: Vec<String>,
}

impl<T> ParseOutcome<T> {
    fn ok(data: T) -> Self {
        Self {
            valid: true,
            data: Some(data),
            errors: Vec::new(),
        }
    }

    fn err(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            data: None,
            errors,
        }
    }
}

/// Kinds of personally identifiable information the scanner reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiType {
    Ssn,
    CreditCard,
    Email,
    Phone,
}

/// Advisory PII scan result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PiiScan {
    pub detected: bool,
    pub types: Vec<PiiType>,
}

/// Validates, sanitizes, and scans provider output.
#[derive(Debug, Clone)]
pub struct SafetyFilter {
    /// Domains a response may legitimately link to.
    allowed_link_domains: Vec<String>,
}

impl Default for SafetyFilter {
    fn default() -> Self {
        Self {
            allowed_link_domains: Vec::new(),
        }
    }
}

impl SafetyFilter {
    /// Create a filter with an allowlist of link domains.
    pub fn new(allowed_link_domains: Vec<String>) -> Self {
        Self {
            allowed_link_domains,
        }
    }

    /// Parse a structured response: strip markdown fences, pull the first
    /// balanced JSON object out of any surrounding prose, deserialize, then
    /// run the schema validator. On failure the caller gets field errors
    /// and must not use `data`.
    pub fn parse_structured<T, V>(&self, content: &str, validator: V) -> ParseOutcome<T>
    where
        T: DeserializeOwned,
        V: Fn(&T) -> Vec<String>,
    {
        let stripped = strip_code_fences(content);
        let Some(json) = extract_balanced_json(&stripped) else {
            return ParseOutcome::err(vec!["no JSON object found in response".to_string()]);
        };

        let parsed: T = match serde_json::from_str(json) {
            Ok(value) => value,
            Err(e) => return ParseOutcome::err(vec![format!("malformed JSON: {}", e)]),
        };

        let errors = validator(&parsed);
        if errors.is_empty() {
            ParseOutcome::ok(parsed)
        } else {
            tracing::warn!(target: "promptguard::safety", "Schema validation failed: {:?}", errors);
            ParseOutcome::err(errors)
        }
    }

    /// Strip active content and control characters, then bound the length.
    pub fn sanitize_text(&self, text: &str) -> String {
        let text = SCRIPT_TAG.replace_all(text, "");
        let text = IFRAME_TAG.replace_all(&text, "");
        let cleaned: String = text
            .chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
            .collect();

        if cleaned.chars().count() > MAX_TEXT_CHARS {
            cleaned.chars().take(MAX_TEXT_CHARS).collect()
        } else {
            cleaned
        }
    }

    /// Recursively cap every array in a JSON value to 50 items.
    pub fn cap_arrays(&self, value: &mut Value) {
        match value {
            Value::Array(items) => {
                items.truncate(MAX_ARRAY_ITEMS);
                for item in items {
                    self.cap_arrays(item);
                }
            }
            Value::Object(map) => {
                for (_, item) in map.iter_mut() {
                    self.cap_arrays(item);
                }
            }
            _ => {}
        }
    }

    /// Whether content looks like it is smuggling data out: long base64 or
    /// hex runs, or links to domains outside the allowlist.
    pub fn detect_exfiltration(&self, content: &str) -> bool {
        if BASE64_RUN.is_match(content) || HEX_RUN.is_match(content) {
            return true;
        }
        for capture in LINK.captures_iter(content) {
            let host = capture[1].to_ascii_lowercase();
            let allowed = self
                .allowed_link_domains
                .iter()
                .any(|d| host == *d || host.ends_with(&format!(".{}", d)));
            if !allowed {
                return true;
            }
        }
        false
    }

    /// Scan for PII patterns. Advisory only.
    pub fn detect_pii(&self, content: &str) -> PiiScan {
        let mut types = Vec::new();
        if SSN.is_match(content) {
            types.push(PiiType::Ssn);
        }
        if CREDIT_CARD.is_match(content) {
            types.push(PiiType::CreditCard);
        }
        if EMAIL.is_match(content) {
            types.push(PiiType::Email);
        }
        if PHONE.is_match(content) {
            types.push(PiiType::Phone);
        }
        PiiScan {
            detected: !types.is_empty(),
            types,
        }
    }
}

/// Mask the value of any key matching the sensitive-term list, recursively.
/// Applied to structured log payloads before they are written anywhere.
pub fn redact_sensitive(value: &mut Value) {
    if let Value::Object(map) = value {
        for (key, entry) in map.iter_mut() {
            if SENSITIVE_KEY.is_match(key) {
                *entry = Value::String("[REDACTED]".to_string());
            } else {
                redact_sensitive(entry);
            }
        }
    } else if let Value::Array(items) = value {
        for item in items {
            redact_sensitive(item);
        }
    }
}

/// Remove markdown code fences, keeping the fenced body.
fn strip_code_fences(content: &str) -> String {
    let trimmed = content.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        // Drop an optional language tag on the fence line.
        let body = match rest.split_once('\n') {
            Some((_, body)) => body,
            None => rest,
        };
        return body.trim_end_matches('`').trim().to_string();
    }
    trimmed.to_string()
}

/// Extract the first balanced `{...}` object, ignoring braces inside strings.
fn extract_balanced_json(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let bytes = content.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&content[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

// =========================================================================
// Authenticity report schema
// =========================================================================

/// Confidence bucket attached to an authenticity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Sub-scores contributing to a credibility score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub specificity: i32,
    pub consistency: i32,
    pub relationship_evidence: i32,
    pub language_authenticity: i32,
}

impl ScoreBreakdown {
    pub fn sum(&self) -> i32 {
        self.specificity + self.consistency + self.relationship_evidence + self.language_authenticity
    }
}

/// Structured authenticity analysis returned by the scoring task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticityReport {
    /// Composite credibility score, 0..=100.
    pub rcs_score: i32,
    /// Model confidence in the score.
    pub confidence: Confidence,
    /// Sub-scores that must sum to `rcs_score` within ±1.
    pub breakdown: ScoreBreakdown,
    /// Free-form reasoning, echoed after sanitization.
    #[serde(default)]
    pub reasoning: String,
    /// Notable strengths of the submitted content.
    #[serde(default)]
    pub strengths: Vec<String>,
    /// Credibility concerns found in the submitted content.
    #[serde(default)]
    pub concerns: Vec<String>,
}

/// Schema validator for [`AuthenticityReport`].
pub fn validate_authenticity(report: &AuthenticityReport) -> Vec<String> {
    let mut errors = Vec::new();
    if !(0..=100).contains(&report.rcs_score) {
        errors.push(format!(
            "rcs_score must be within 0..=100, got {}",
            report.rcs_score
        ));
    }
    let sum = report.breakdown.sum();
    if (sum - report.rcs_score).abs() > 1 {
        errors.push(format!(
            "breakdown sums to {} but rcs_score is {}",
            sum, report.rcs_score
        ));
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report_json(score: i32, spec: i32) -> String {
        json!({
            "rcs_score": score,
            "confidence": "high",
            "breakdown": {
                "specificity": spec,
                "consistency": 20,
                "relationship_evidence": 20,
                "language_authenticity": 20
            },
            "reasoning": "consistent detail"
        })
        .to_string()
    }

    #[test]
    fn test_parse_structured_accepts_fenced_json() {
        let filter = SafetyFilter::default();
        let content = format!("```json\n{}\n```", report_json(80, 20));
        let outcome = filter.parse_structured(&content, validate_authenticity);
        assert!(outcome.valid);
        assert_eq!(outcome.data.unwrap().rcs_score, 80);
    }

    #[test]
    fn test_parse_structured_extracts_json_from_prose() {
        let filter = SafetyFilter::default();
        let content = format!("Here is the analysis: {} Hope that helps!", report_json(81, 20));
        let outcome = filter.parse_structured(&content, validate_authenticity);
        assert!(outcome.valid);
    }

    #[test]
    fn test_breakdown_tolerance() {
        let filter = SafetyFilter::default();

        // Sums to 81 against a score of 80: within ±1, accepted.
        let outcome = filter.parse_structured(&report_json(80, 21), validate_authenticity);
        assert!(outcome.valid);

        // Sums to 85 against a score of 80: rejected with a field error.
        let outcome = filter.parse_structured(&report_json(80, 25), validate_authenticity);
        assert!(!outcome.valid);
        assert!(outcome.data.is_none());
        assert!(outcome.errors[0].contains("breakdown"));
    }

    #[test]
    fn test_sanitize_strips_active_content() {
        let filter = SafetyFilter::default();
        let dirty = "Hi<script>alert(1)</script> there\u{0007}\n<iframe src=\"x\"></iframe>done";
        let clean = filter.sanitize_text(dirty);
        assert!(!clean.contains("script"));
        assert!(!clean.contains("iframe"));
        assert!(!clean.contains('\u{0007}'));
        assert!(clean.contains("Hi"));
        assert!(clean.contains("done"));
    }

    #[test]
    fn test_cap_arrays_bounds_nested_lists() {
        let filter = SafetyFilter::default();
        let mut value = json!({ "items": (0..80).collect::<Vec<_>>(), "nested": { "more": (0..60).collect::<Vec<_>>() } });
        filter.cap_arrays(&mut value);
        assert_eq!(value["items"].as_array().unwrap().len(), 50);
        assert_eq!(value["nested"]["more"].as_array().unwrap().len(), 50);
    }

    #[test]
    fn test_exfiltration_detects_encoded_runs() {
        let filter = SafetyFilter::new(vec!["example.com".to_string()]);
        let base64_blob = "QUJD".repeat(30);
        assert!(filter.detect_exfiltration(&format!("data: {}", base64_blob)));
        assert!(filter.detect_exfiltration(&"deadbeef".repeat(10)));
        assert!(!filter.detect_exfiltration("a perfectly ordinary sentence"));
    }

    #[test]
    fn test_exfiltration_flags_unexpected_domains() {
        let filter = SafetyFilter::new(vec!["example.com".to_string()]);
        assert!(!filter.detect_exfiltration("see https://docs.example.com/guide"));
        assert!(filter.detect_exfiltration("see https://evil.io/collect?d=x"));
    }

    #[test]
    fn test_pii_detection_types() {
        let filter = SafetyFilter::default();
        let scan = filter.detect_pii("reach me at jane@corp.com or 555-867-5309, SSN 123-45-6789");
        assert!(scan.detected);
        assert!(scan.types.contains(&PiiType::Email));
        assert!(scan.types.contains(&PiiType::Phone));
        assert!(scan.types.contains(&PiiType::Ssn));

        assert!(!filter.detect_pii("no identifiers here").detected);
    }

    #[test]
    fn test_redact_sensitive_keys() {
        let mut payload = json!({
            "user": "jane",
            "password": "hunter2",
            "master_key": "abcd",
            "nested": { "api_key": "sk-123", "note": "fine" },
            "items": [{ "token": "t" }]
        });
        redact_sensitive(&mut payload);
        assert_eq!(payload["password"], "[REDACTED]");
        assert_eq!(payload["master_key"], "[REDACTED]");
        assert_eq!(payload["nested"]["api_key"], "[REDACTED]");
        assert_eq!(payload["items"][0]["token"], "[REDACTED]");
        assert_eq!(payload["user"], "jane");
        assert_eq!(payload["nested"]["note"], "fine");
    }
}
