use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Individual validation issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    pub code: IssueCode,
    pub diagnostics: String,
    pub location: Option<String>,
}

impl ValidationIssue {
    pub fn fatal(code: IssueCode, diagnostics: String) -> Self {
        Self {
            severity: IssueSeverity::Fatal,
            code,
            diagnostics,
            location: None,
        }
    }

    pub fn error(code: IssueCode, diagnostics: String) -> Self {
        Self {
            severity: IssueSeverity::Error,
            code,
            diagnostics,
            location: None,
        }
    }

    pub fn warning(code: IssueCode, diagnostics: String) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            code,
            diagnostics,
            location: None,
        }
    }

    pub fn information(code: IssueCode, diagnostics: String) -> Self {
        Self {
            severity: IssueSeverity::Information,
            code,
            diagnostics,
            location: None,
        }
    }

    pub fn with_location(mut self, location: String) -> Self {
        self.location = Some(location);
        self
    }

    /// Cap the severity at `warning`. Used when external validation is
    /// unavailable and local findings must not fail the request.
    pub fn capped_at_warning(mut self) -> Self {
        if matches!(self.severity, IssueSeverity::Fatal | IssueSeverity::Error) {
            self.severity = IssueSeverity::Warning;
        }
        self
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self.severity, IssueSeverity::Fatal | IssueSeverity::Error)
    }

    /// OperationOutcome.issue JSON form
    pub fn to_json(&self) -> Value {
        let mut issue = serde_json::json!({
            "severity": self.severity.as_str(),
            "code": self.code.as_str(),
            "diagnostics": self.diagnostics,
        });

        if let Some(ref loc) = self.location {
            issue["location"] = serde_json::json!([loc]);
        }

        issue
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Fatal,
    Error,
    Warning,
    Information,
}

impl IssueSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fatal => "fatal",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Information => "information",
        }
    }

    /// Parse an OperationOutcome severity string. Unknown values map to
    /// `information` so a lenient external validator cannot fail a request
    /// with a severity this crate does not know.
    pub fn parse(s: &str) -> Self {
        match s {
            "fatal" => Self::Fatal,
            "error" => Self::Error,
            "warning" => Self::Warning,
            _ => Self::Information,
        }
    }
}

impl std::fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueCode {
    Invalid,
    Structure,
    Required,
    Value,
    Invariant,
    Processing,
    NotSupported,
    NotFound,
    CodeInvalid,
    BusinessRule,
    Exception,
    Timeout,
    Informational,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Structure => "structure",
            Self::Required => "required",
            Self::Value => "value",
            Self::Invariant => "invariant",
            Self::Processing => "processing",
            Self::NotSupported => "not-supported",
            Self::NotFound => "not-found",
            Self::CodeInvalid => "code-invalid",
            Self::BusinessRule => "business-rule",
            Self::Exception => "exception",
            Self::Timeout => "timeout",
            Self::Informational => "informational",
        }
    }
}

impl std::fmt::Display for IssueCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_json_form() {
        let issue = ValidationIssue::error(IssueCode::Required, "name is required".to_string())
            .with_location("Patient.name".to_string());

        let json = issue.to_json();
        assert_eq!(json["severity"], "error");
        assert_eq!(json["code"], "required");
        assert_eq!(json["location"][0], "Patient.name");
    }

    #[test]
    fn test_severity_capping() {
        let capped =
            ValidationIssue::error(IssueCode::Structure, "bad".to_string()).capped_at_warning();
        assert_eq!(capped.severity, IssueSeverity::Warning);

        let info = ValidationIssue::information(IssueCode::Informational, "fyi".to_string())
            .capped_at_warning();
        assert_eq!(info.severity, IssueSeverity::Information);
    }

    #[test]
    fn test_severity_parse_is_lenient() {
        assert_eq!(IssueSeverity::parse("error"), IssueSeverity::Error);
        assert_eq!(IssueSeverity::parse("bogus"), IssueSeverity::Information);
    }
}
