//! Compile diagnostics
//!
//! Nothing found while compiling a list is fatal. Every problem becomes a
//! [`Diagnostic`] returned next to the compiled index.

use std::fmt;

use crate::parser::{IgnoredOption, ParseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => f.write_str("warning"),
            Self::Error => f.write_str("error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Malformed line, skipped.
    ParseError,
    /// Recognized option the engine does not support; the rule is kept.
    UnknownOptionWarning,
    /// List produced no rules; the index allows everything.
    EmptyListWarning,
    /// Rule syntax outside the network filter grammar (element hiding).
    UnsupportedSyntax,
}

impl DiagnosticKind {
    pub fn severity(&self) -> Severity {
        match self {
            Self::ParseError => Severity::Error,
            Self::UnknownOptionWarning | Self::EmptyListWarning | Self::UnsupportedSyntax => {
                Severity::Warning
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParseError => "parse-error",
            Self::UnknownOptionWarning => "unknown-option",
            Self::EmptyListWarning => "empty-list",
            Self::UnsupportedSyntax => "unsupported-syntax",
        }
    }
}

/// One problem found while compiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Position of the list in the compile input.
    pub list_id: usize,
    /// 1-based line number; 0 for whole-list diagnostics.
    pub line: usize,
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
    /// Offending line text; empty for whole-list diagnostics.
    pub source: String,
}

impl Diagnostic {
    fn new(kind: DiagnosticKind, line: usize, message: String, source: &str) -> Self {
        Self {
            list_id: 0,
            line,
            severity: kind.severity(),
            kind,
            message,
            source: source.to_string(),
        }
    }

    pub fn parse_error(error: &ParseError, source: &str) -> Self {
        Self::new(DiagnosticKind::ParseError, error.line, error.reason.to_string(), source)
    }

    pub fn ignored_option(line: usize, option: &IgnoredOption, source: &str) -> Self {
        Self::new(
            DiagnosticKind::UnknownOptionWarning,
            line,
            format!("option `{}` ignored: {}", option.name, option.reason),
            source,
        )
    }

    pub fn unsupported_syntax(line: usize, source: &str) -> Self {
        Self::new(
            DiagnosticKind::UnsupportedSyntax,
            line,
            "element hiding rules are not supported".to_string(),
            source,
        )
    }

    pub fn empty_list() -> Self {
        Self::new(
            DiagnosticKind::EmptyListWarning,
            0,
            "list contains no valid rules".to_string(),
            "",
        )
    }

    pub fn with_list_id(mut self, list_id: usize) -> Self {
        self.list_id = list_id;
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.severity, self.kind.as_str())?;
        if self.line > 0 {
            write!(f, " list {} line {}", self.list_id, self.line)?;
        } else {
            write!(f, " list {}", self.list_id)?;
        }
        write!(f, ": {}", self.message)?;
        if !self.source.is_empty() {
            write!(f, " `{}`", self.source)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_follows_kind() {
        assert_eq!(DiagnosticKind::ParseError.severity(), Severity::Error);
        assert_eq!(DiagnosticKind::EmptyListWarning.severity(), Severity::Warning);
        assert_eq!(DiagnosticKind::UnsupportedSyntax.severity(), Severity::Warning);
    }

    #[test]
    fn display_includes_location() {
        let d = Diagnostic::unsupported_syntax(4, "example.com##.ad").with_list_id(2);
        assert_eq!(
            d.to_string(),
            "warning [unsupported-syntax] list 2 line 4: element hiding rules are not supported `example.com##.ad`"
        );
        assert_eq!(
            Diagnostic::empty_list().to_string(),
            "warning [empty-list] list 0: list contains no valid rules"
        );
    }
}
