use std::io::Write;
use std::ops::Range;
use std::path::PathBuf;

/// Source information for where a diagnostic came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub file_path: PathBuf,
    pub content: String,
}

/// A diagnostic message that can be either a warning or an error
#[derive(Debug, Clone)]
pub enum Diagnostic {
    Warning(Warning),
    Error(Error),
}

/// Warning messages that don't prevent config loading
#[derive(Debug, Clone)]
pub enum Warning {
    EmptyConfig { file_path: PathBuf },
    /// A value was accepted but adjusted (e.g. clamped to a minimum)
    Adjusted(FieldMessage),
}

/// Error messages that indicate problems with the config
#[derive(Debug, Clone)]
pub enum Error {
    Validation(FieldMessage),
    Load(LoadError),
}

/// A message attached to a config field, optionally pointing at its span.
#[derive(Debug, Clone)]
pub struct FieldMessage {
    pub field_path: String,
    pub message: String,
    pub span: Option<Range<usize>>,
    pub source: Option<SourceInfo>,
}

pub type ValidationError = FieldMessage;

/// Error type for config loading failures (parse errors, IO errors)
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read config file '{}': {error}", path.display())]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file '{}': {error}", path.display())]
    Parse { path: PathBuf, error: String },
}

/// A collection of diagnostics (warnings and/or errors)
#[derive(Debug, Clone, Default)]
pub struct Diagnostics(pub Vec<Diagnostic>);

impl Diagnostics {
    pub fn has_errors(&self) -> bool {
        self.0.iter().any(Diagnostic::is_error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Warning> {
        self.0.iter().filter_map(|d| match d {
            Diagnostic::Warning(w) => Some(w),
            Diagnostic::Error(_) => None,
        })
    }

    pub fn errors(&self) -> impl Iterator<Item = &Error> {
        self.0.iter().filter_map(|d| match d {
            Diagnostic::Error(e) => Some(e),
            Diagnostic::Warning(_) => None,
        })
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format_diagnostics(&self.0))
    }
}

impl std::error::Error for Diagnostics {}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format_diagnostics(std::slice::from_ref(self)))
    }
}

impl Diagnostic {
    /// Returns true if this diagnostic is an error
    pub fn is_error(&self) -> bool {
        matches!(self, Diagnostic::Error(_))
    }

    /// Returns true if this diagnostic is a warning
    pub fn is_warning(&self) -> bool {
        matches!(self, Diagnostic::Warning(_))
    }

    /// Field path this diagnostic refers to, if any
    pub fn field_path(&self) -> Option<&str> {
        match self {
            Diagnostic::Warning(Warning::Adjusted(m)) | Diagnostic::Error(Error::Validation(m)) => {
                Some(&m.field_path)
            }
            _ => None,
        }
    }
}

impl From<LoadError> for Diagnostic {
    fn from(e: LoadError) -> Self {
        Diagnostic::Error(Error::Load(e))
    }
}

/// Format all diagnostics for display using Ariadne
pub fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    let mut output = Vec::new();

    for diagnostic in diagnostics {
        match diagnostic {
            Diagnostic::Warning(Warning::EmptyConfig { file_path }) => {
                let path = file_path.display().to_string();
                write_plain(
                    &mut output,
                    Severity::Warning,
                    "Empty configuration file",
                    &path,
                    &format!("Config file '{}' is empty and has no effect", path),
                );
            }
            Diagnostic::Warning(Warning::Adjusted(m)) => {
                write_field_message(&mut output, Severity::Warning, "Adjusted value", m);
            }
            Diagnostic::Error(Error::Validation(m)) => {
                write_field_message(&mut output, Severity::Error, "Validation error", m);
            }
            Diagnostic::Error(Error::Load(e)) => {
                let (title, path, detail) = match e {
                    LoadError::Io { path, error } => ("Failed to read config file", path, error),
                    LoadError::Parse { path, error } => {
                        ("Failed to parse config file", path, error)
                    }
                };
                write_plain(
                    &mut output,
                    Severity::Error,
                    title,
                    &path.display().to_string(),
                    detail,
                );
            }
        }
    }

    String::from_utf8_lossy(&output).to_string()
}

#[derive(Clone, Copy)]
enum Severity {
    Warning,
    Error,
}

/// Render a field message with Ariadne when the span is known, plain otherwise.
fn write_field_message(output: &mut Vec<u8>, severity: Severity, title: &str, m: &FieldMessage) {
    use ariadne::Color;
    use ariadne::Label;
    use ariadne::Report;
    use ariadne::ReportKind;
    use ariadne::Source;

    let title = format!("{} in '{}'", title, m.field_path);

    if let (Some(span), Some(source_info)) = (&m.span, &m.source) {
        let (kind, color) = match severity {
            Severity::Warning => (ReportKind::Warning, Color::Yellow),
            Severity::Error => (ReportKind::Error, Color::Red),
        };
        let file_id = source_info.file_path.to_string_lossy().to_string();
        let report = Report::build(kind, (file_id.clone(), span.clone()))
            .with_message(title)
            .with_label(
                Label::new((file_id.clone(), span.clone()))
                    .with_message(&m.message)
                    .with_color(color),
            )
            .finish();

        let source = Source::from(source_info.content.clone());
        report.write((file_id, source), &mut *output).ok();
    } else {
        let file_path = m
            .source
            .as_ref()
            .map(|s| s.file_path.display().to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        write_plain(output, severity, &title, &file_path, &m.message);
    }
}

/// Ariadne doesn't render notes well without source, so these are formatted by hand
fn write_plain(output: &mut Vec<u8>, severity: Severity, title: &str, path: &str, note: &str) {
    let header = match severity {
        Severity::Warning => "\x1b[33mWarning\x1b[0m",
        Severity::Error => "\x1b[31mError\x1b[0m",
    };
    writeln!(output, "{}: {}", header, title).ok();
    writeln!(output, "  ┌─ {}:1:1", path).ok();
    writeln!(output, "  │").ok();
    writeln!(output, "  = {}", note).ok();
    writeln!(output).ok();
}
