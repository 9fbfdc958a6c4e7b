use std::fmt;

use thiserror::Error;

/// Half-open byte range into a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

impl SourceSpan {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Span from the start of `self` to the end of `other`.
    pub const fn to(self, other: SourceSpan) -> Self {
        Self::new(self.start, other.end)
    }

    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    Lexer,
    Parser,
    /// Rejected specialization setup, such as an invalid signature.
    Compile,
}

impl DiagnosticKind {
    pub const fn label(&self) -> &'static str {
        match self {
            DiagnosticKind::Lexer => "lexer error",
            DiagnosticKind::Parser => "parse error",
            DiagnosticKind::Compile => "compile error",
        }
    }
}

/// Structural failure surfaced to the host. Scripts never produce these
/// while running; only lexing, parsing and specialization setup do.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Option<SourceSpan>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
            notes: Vec::new(),
        }
    }

    pub fn with_span(self, span: SourceSpan) -> Self {
        Self {
            span: Some(span),
            ..self
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Byte offset the diagnostic points at, if known.
    pub fn offset(&self) -> Option<usize> {
        self.span.map(|span| span.start)
    }

    /// Multi-line report with a caret under the offending source.
    pub fn render(&self, source: &str) -> String {
        let mut out = format!("{}: {}", self.kind.label(), self.message);
        if let Some(span) = self.span {
            let (line, column) = line_column(source, span.start);
            let text = source.lines().nth(line - 1).unwrap_or_default();
            let width = span.len().clamp(1, text.len().saturating_sub(column - 1).max(1));
            out.push_str(&format!(
                "\n --> {line}:{column}\n  | {text}\n  | {}{}",
                " ".repeat(column - 1),
                "^".repeat(width)
            ));
        }
        for note in &self.notes {
            out.push_str(&format!("\n  = note: {note}"));
        }
        out
    }
}

/// One-based line and column of a byte offset.
fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let before = source.get(..offset).unwrap_or(source);
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |idx| idx + 1);
    (line, before[line_start..].chars().count() + 1)
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.label(), self.message)?;
        if let Some(span) = self.span {
            write!(f, " at {}..{}", span.start, span.end)?;
        }
        for note in &self.notes {
            write!(f, " (note: {note})")?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

#[derive(Debug, Error)]
pub enum MolangError {
    #[error(transparent)]
    Diagnostic(#[from] Diagnostic),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MolangError {
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            MolangError::Diagnostic(diagnostic) => Some(diagnostic),
            MolangError::Io(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MolangError>;
