//! Diagnostics and the validation report handed back to the model

use std::fmt;

use serde::{Deserialize, Serialize};

/// Header line of a report that found problems
pub const INVALID_HEADER: &str = "The query is invalid and has the below errors";

/// Whole report text when nothing was found
pub const VALID_MESSAGE: &str = "The query is valid.";

/// Position in the query text, both 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// One syntax problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub position: Position,
    pub message: String,
}

impl Diagnostic {
    pub fn new(position: Position, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) {}", self.position, self.message)
    }
}

/// Outcome of checking one query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationReport {
    pub fn new(mut diagnostics: Vec<Diagnostic>) -> Self {
        diagnostics.sort_by_key(|d| (d.position.line, d.position.column));
        diagnostics.dedup();
        Self { diagnostics }
    }

    pub fn is_valid(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Text form sent back to the model: the valid message, or a header
    /// followed by one line per diagnostic
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            return f.write_str(VALID_MESSAGE);
        }
        f.write_str(INVALID_HEADER)?;
        for diagnostic in &self.diagnostics {
            write!(f, "\n{}", diagnostic)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_report_renders_valid_message() {
        let report = ValidationReport::default();
        assert!(report.is_valid());
        assert_eq!(report.render(), "The query is valid.");
    }

    #[test]
    fn test_invalid_report_one_line_per_diagnostic() {
        let report = ValidationReport::new(vec![
            Diagnostic::new(Position::new(2, 5), "Unknown tabular operator 'wher'"),
            Diagnostic::new(Position::new(1, 10), "Unclosed '('"),
        ]);

        assert!(!report.is_valid());
        let rendered = report.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], INVALID_HEADER);
        assert_eq!(lines[1], "(1:10) Unclosed '('");
        assert_eq!(lines[2], "(2:5) Unknown tabular operator 'wher'");
    }

    #[test]
    fn test_duplicate_diagnostics_collapse() {
        let d = Diagnostic::new(Position::new(1, 1), "Query is empty");
        let report = ValidationReport::new(vec![d.clone(), d]);
        assert_eq!(report.diagnostics.len(), 1);
    }
}
