//! JSON scenario definition for staged load tests.
//!
//! A [`Scenario`] names one target endpoint, how to call it, and an ordered
//! list of [`Stage`]s. Each stage ramps the active virtual-user count from the
//! previous stage's target to its own target over its duration.
//!
//! # Example JSON
//!
//! ```json
//! {
//!   "testName": "todos smoke",
//!   "targetUrl": "http://localhost:5000/todos",
//!   "method": "GET",
//!   "timeoutMs": 2000,
//!   "sleepMs": 100,
//!   "headers": { "Accept": "application/json" },
//!   "stages": [
//!     { "duration": "10s", "target": 10 },
//!     { "duration": "1m", "target": 50 },
//!     { "duration": "10s", "target": 0 }
//!   ]
//! }
//! ```

use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::loadtest::error::ScenarioError;

/// HTTP methods a scenario may use.
///
/// Deserialized from the upper-case method name; anything else is a parse
/// error, so an unsupported method never reaches the workers.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    /// Maps to the [`http::Method`] used by the transport.
    pub fn as_http(self) -> http::Method {
        match self {
            Self::Get => http::Method::GET,
            Self::Post => http::Method::POST,
            Self::Put => http::Method::PUT,
            Self::Delete => http::Method::DELETE,
            Self::Patch => http::Method::PATCH,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
        };
        f.write_str(s)
    }
}

/// One ramp segment: reach `target` active VUs over `duration`.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Stage {
    /// Length of the ramp window. Parsed from a duration string.
    #[serde(deserialize_with = "deserialize_duration")]
    pub duration: Duration,
    /// Active VU count to reach by the end of the stage.
    pub target: u32,
}

impl Stage {
    pub fn new(duration: Duration, target: u32) -> Self {
        Self { duration, target }
    }
}

/// Immutable description of a load test.
///
/// Built once by [`Scenario::load`] or [`Scenario::from_json`] and shared
/// read-only by the coordinator and every virtual user.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    /// Optional human-readable test name.
    #[serde(default)]
    pub test_name: Option<String>,
    /// Absolute `http`/`https` URL every request is sent to.
    pub target_url: String,
    /// HTTP method for every request.
    pub method: HttpMethod,
    /// Request bodies, rotated per iteration. Empty means no body.
    #[serde(default)]
    pub payload: Vec<String>,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Pause between iterations of one VU, in milliseconds.
    #[serde(default)]
    pub sleep_ms: u64,
    /// Headers added to every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Ramp stages, executed in declaration order.
    pub stages: Vec<Stage>,
}

impl Scenario {
    /// Parse a JSON string into a validated [`Scenario`].
    pub fn from_json(content: &str) -> Result<Self, ScenarioError> {
        let scenario: Self = serde_json::from_str(content)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Load and validate a [`Scenario`] from a file path.
    ///
    /// Returns [`ScenarioError::Io`] if the file cannot be read,
    /// [`ScenarioError::Parse`] if the JSON is malformed, or
    /// [`ScenarioError::Validation`] if validation fails.
    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let content = std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            source,
            path: path.display().to_string(),
        })?;
        tracing::trace!(path = %path.display(), "scenario file read");
        let scenario = Self::from_json(&content)?;
        tracing::debug!(
            path = %path.display(),
            stages = scenario.stages.len(),
            "scenario parsed"
        );
        Ok(scenario)
    }

    /// Validate that the scenario is semantically correct.
    ///
    /// Checks:
    /// - At least one stage is defined and every stage has a positive duration
    /// - `target_url` is an absolute `http` or `https` URL
    /// - `timeout_ms` is greater than zero
    /// - Every header name and value is a valid HTTP header token
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.stages.is_empty() {
            return Err(ScenarioError::validation(
                "Scenario must contain at least one stage",
            ));
        }

        for (i, stage) in self.stages.iter().enumerate() {
            if stage.duration.is_zero() {
                return Err(ScenarioError::validation(format!(
                    "Stage {} has a zero duration; each stage must have a positive duration",
                    i + 1
                )));
            }
        }

        let url = url::Url::parse(&self.target_url).map_err(|e| {
            ScenarioError::validation(format!("Invalid targetUrl '{}': {e}", self.target_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ScenarioError::validation(format!(
                "targetUrl must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.timeout_ms == 0 {
            return Err(ScenarioError::validation("timeoutMs must be greater than 0"));
        }

        for (name, value) in &self.headers {
            http::HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ScenarioError::validation(format!("Invalid header name '{name}'")))?;
            http::HeaderValue::from_str(value).map_err(|_| {
                ScenarioError::validation(format!("Invalid value for header '{name}'"))
            })?;
        }

        Ok(())
    }

    /// Name shown in summaries: the test name, or the target URL.
    pub fn display_name(&self) -> &str {
        self.test_name.as_deref().unwrap_or(&self.target_url)
    }

    /// Per-request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Inter-iteration sleep, or `None` when the scenario does not pause.
    pub fn sleep(&self) -> Option<Duration> {
        (self.sleep_ms > 0).then(|| Duration::from_millis(self.sleep_ms))
    }

    /// Highest stage target, i.e. the peak planned VU count.
    pub fn max_target(&self) -> u32 {
        self.stages.iter().map(|s| s.target).max().unwrap_or(0)
    }

    /// Sum of all stage durations.
    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }
}

/// Parse a stage duration string.
///
/// Accepts an integer suffixed with `s` (seconds), `m` (minutes), or `h`
/// (hours). A bare integer is seconds.
///
/// ```
/// use std::time::Duration;
/// use stagehand::loadtest::scenario::parse_duration;
///
/// assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
/// assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
/// assert_eq!(parse_duration("15").unwrap(), Duration::from_secs(15));
/// assert!(parse_duration("1d").is_err());
/// ```
pub fn parse_duration(value: &str) -> Result<Duration, ScenarioError> {
    let invalid = || ScenarioError::InvalidDuration {
        value: value.to_string(),
    };

    let (digits, multiplier) = if let Some(rest) = value.strip_suffix('s') {
        (rest, 1)
    } else if let Some(rest) = value.strip_suffix('m') {
        (rest, 60)
    } else if let Some(rest) = value.strip_suffix('h') {
        (rest, 3600)
    } else {
        (value, 1)
    };

    let amount: u64 = digits.parse().map_err(|_| invalid())?;
    let secs = amount.checked_mul(multiplier).ok_or_else(invalid)?;
    Ok(Duration::from_secs(secs))
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
{
  "targetUrl": "http://localhost:5000/todos",
  "method": "GET",
  "timeoutMs": 2000,
  "stages": [ { "duration": "10s", "target": 5 } ]
}
"#;

    #[test]
    fn test_parse_minimal_scenario() {
        let scenario = Scenario::from_json(MINIMAL).unwrap();
        assert_eq!(scenario.target_url, "http://localhost:5000/todos");
        assert_eq!(scenario.method, HttpMethod::Get);
        assert_eq!(scenario.timeout_ms, 2000);
        assert_eq!(scenario.sleep_ms, 0);
        assert!(scenario.headers.is_empty());
        assert!(scenario.payload.is_empty());
        assert!(scenario.test_name.is_none());
        assert_eq!(
            scenario.stages,
            vec![Stage::new(Duration::from_secs(10), 5)]
        );
    }

    #[test]
    fn test_parse_full_scenario() {
        let json = r#"
{
  "testName": "checkout",
  "targetUrl": "https://shop.example.com/api/cart",
  "method": "POST",
  "payload": ["{\"sku\":1}", "{\"sku\":2}"],
  "timeoutMs": 1500,
  "sleepMs": 250,
  "headers": { "Authorization": "Bearer abc", "X-Trace": "1" },
  "stages": [
    { "duration": "30s", "target": 10 },
    { "duration": "2m", "target": 40 },
    { "duration": "1h", "target": 40 },
    { "duration": "15", "target": 0 }
  ]
}
"#;
        let scenario = Scenario::from_json(json).unwrap();
        assert_eq!(scenario.display_name(), "checkout");
        assert_eq!(scenario.method, HttpMethod::Post);
        assert_eq!(scenario.payload.len(), 2);
        assert_eq!(scenario.sleep(), Some(Duration::from_millis(250)));
        assert_eq!(scenario.headers.get("X-Trace").map(String::as_str), Some("1"));
        assert_eq!(scenario.stages[1].duration, Duration::from_secs(120));
        assert_eq!(scenario.stages[2].duration, Duration::from_secs(3600));
        assert_eq!(scenario.stages[3].duration, Duration::from_secs(15));
        assert_eq!(scenario.max_target(), 40);
        assert_eq!(
            scenario.total_duration(),
            Duration::from_secs(30 + 120 + 3600 + 15)
        );
    }

    #[test]
    fn test_unsupported_method_is_parse_error() {
        let json = MINIMAL.replace("\"GET\"", "\"HEAD\"");
        let err = Scenario::from_json(&json).unwrap_err();
        assert!(matches!(err, ScenarioError::Parse { .. }), "got {err:?}");
    }

    #[test]
    fn test_invalid_duration_string_is_fatal() {
        let json = MINIMAL.replace("\"10s\"", "\"10 seconds\"");
        let err = Scenario::from_json(&json).unwrap_err();
        let msg = err.to_string();
        assert!(
            msg.contains("Invalid duration format"),
            "Error should mention the duration: {msg}"
        );
    }

    #[test]
    fn test_negative_target_is_parse_error() {
        let json = MINIMAL.replace("\"target\": 5", "\"target\": -1");
        assert!(matches!(
            Scenario::from_json(&json).unwrap_err(),
            ScenarioError::Parse { .. }
        ));
    }

    #[test]
    fn test_validate_requires_stages() {
        let json = MINIMAL.replace(r#"[ { "duration": "10s", "target": 5 } ]"#, "[]");
        let err = Scenario::from_json(&json).unwrap_err();
        assert!(matches!(err, ScenarioError::Validation { .. }));
    }

    #[test]
    fn test_validate_zero_duration_stage_fails() {
        let json = MINIMAL.replace("\"10s\"", "\"0s\"");
        let err = Scenario::from_json(&json).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Stage 1"), "Error should name the stage: {msg}");
    }

    #[test]
    fn test_validate_rejects_relative_url() {
        let json = MINIMAL.replace("http://localhost:5000/todos", "/todos");
        assert!(matches!(
            Scenario::from_json(&json).unwrap_err(),
            ScenarioError::Validation { .. }
        ));
    }

    #[test]
    fn test_validate_rejects_non_http_scheme() {
        let json = MINIMAL.replace("http://localhost:5000/todos", "ftp://localhost/todos");
        let msg = Scenario::from_json(&json).unwrap_err().to_string();
        assert!(msg.contains("http or https"), "got: {msg}");
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let json = MINIMAL.replace("2000", "0");
        assert!(matches!(
            Scenario::from_json(&json).unwrap_err(),
            ScenarioError::Validation { .. }
        ));
    }

    #[test]
    fn test_validate_rejects_bad_header_name() {
        let mut scenario = Scenario::from_json(MINIMAL).unwrap();
        scenario
            .headers
            .insert("Bad Header".to_string(), "x".to_string());
        let msg = scenario.validate().unwrap_err().to_string();
        assert!(msg.contains("Bad Header"), "got: {msg}");
    }

    #[test]
    fn test_parse_duration_forms() {
        assert_eq!(parse_duration("1s").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_duration("3m").unwrap(), Duration::from_secs(180));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("42").unwrap(), Duration::from_secs(42));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        for bad in ["", "s", "1.5s", "-5s", "5ms", "10d", "ten", " 5s"] {
            assert!(
                matches!(
                    parse_duration(bad),
                    Err(ScenarioError::InvalidDuration { .. })
                ),
                "'{bad}' should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_duration_overflow_is_error() {
        let huge = format!("{}h", u64::MAX);
        assert!(parse_duration(&huge).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut tmpfile = tempfile::NamedTempFile::new().unwrap();
        tmpfile.write_all(MINIMAL.as_bytes()).unwrap();
        tmpfile.flush().unwrap();

        let scenario = Scenario::load(tmpfile.path()).unwrap();
        assert_eq!(scenario.stages.len(), 1);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = Scenario::load(Path::new("/nonexistent/scenario.json"));
        assert!(matches!(result.unwrap_err(), ScenarioError::Io { .. }));
    }

    #[test]
    fn test_http_method_mapping() {
        assert_eq!(HttpMethod::Get.as_http(), http::Method::GET);
        assert_eq!(HttpMethod::Patch.as_http(), http::Method::PATCH);
        assert_eq!(HttpMethod::Delete.to_string(), "DELETE");
    }
}
