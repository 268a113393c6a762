//! User-facing diagnostics reported during an emit invocation.
//!
//! Messages are templates whose positional markers `{{m<i>}}` and
//! `{{c<i>}}` render method and class arguments; the rendered records
//! accumulate in a sink owned by the controller. Input-driven problems
//! never unwind the pipeline.

use serde::Serialize;
use std::cell::RefCell;
use std::fmt;

use crate::model::MethodReference;

/// Severity level of a diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        }
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        matches!(self, Severity::Error)
    }
}

/// The call site a diagnostic refers to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallLocation {
    pub method: MethodReference,
}

impl CallLocation {
    pub fn new(method: MethodReference) -> Self {
        Self { method }
    }
}

/// Positional template argument.
#[derive(Clone, Debug)]
pub enum DiagnosticArg {
    Method(MethodReference),
    Class(String),
}

/// A rendered diagnostic record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub location: Option<String>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity.as_str(), self.message)?;
        if let Some(location) = &self.location {
            write!(f, " (at {location})")?;
        }
        Ok(())
    }
}

/// Output format for [`format_diagnostics`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorFormat {
    Text,
    Json,
}

/// Accumulating sink. Interior mutability lets every pipeline stage report
/// through a shared borrow of the controller.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: RefCell<Vec<Diagnostic>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&self, location: Option<&CallLocation>, template: &str, args: &[DiagnosticArg]) {
        self.report(Severity::Error, location, template, args);
    }

    pub fn warning(&self, location: Option<&CallLocation>, template: &str, args: &[DiagnosticArg]) {
        self.report(Severity::Warning, location, template, args);
    }

    fn report(
        &self,
        severity: Severity,
        location: Option<&CallLocation>,
        template: &str,
        args: &[DiagnosticArg],
    ) {
        let diagnostic = Diagnostic {
            severity,
            location: location.map(|site| site.method.to_string()),
            message: render_template(template, args),
        };
        tracing::debug!(target: "javelin::diagnostics", %diagnostic, "reported");
        self.entries.borrow_mut().push(diagnostic);
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.entries.borrow().clone()
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|entry| entry.severity.is_error())
            .count()
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }
}

/// Substitute `{{m<i>}}` / `{{c<i>}}` markers with rendered arguments.
/// Markers whose index or kind does not match any argument pass through
/// untouched.
fn render_template(template: &str, args: &[DiagnosticArg]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let tail = &rest[open + 2..];
        match parse_marker(tail, args) {
            Some((rendered, consumed)) => {
                out.push_str(&rendered);
                rest = &tail[consumed..];
            }
            None => {
                out.push_str("{{");
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

fn parse_marker(tail: &str, args: &[DiagnosticArg]) -> Option<(String, usize)> {
    let kind = tail.chars().next()?;
    if kind != 'm' && kind != 'c' {
        return None;
    }
    let digits: String = tail[1..].chars().take_while(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    let close = 1 + digits.len();
    if !tail[close..].starts_with("}}") {
        return None;
    }
    let index: usize = digits.parse().ok()?;
    let rendered = match (kind, args.get(index)?) {
        ('m', DiagnosticArg::Method(method)) => method.to_string(),
        ('c', DiagnosticArg::Class(class)) => class.clone(),
        _ => return None,
    };
    Some((rendered, close + 2))
}

/// Render a batch of diagnostics for CLI or tooling consumers.
pub fn format_diagnostics(diagnostics: &[Diagnostic], format: ErrorFormat) -> String {
    match format {
        ErrorFormat::Text => {
            let mut out = String::new();
            for diagnostic in diagnostics {
                out.push_str(&diagnostic.to_string());
                out.push('\n');
            }
            out
        }
        ErrorFormat::Json => {
            serde_json::to_string_pretty(diagnostics).unwrap_or_else(|_| "[]".into())
        }
    }
}
