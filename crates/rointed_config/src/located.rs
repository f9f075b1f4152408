use std::ops::Deref;
use std::ops::Range;

use serde::Deserialize;

use crate::Diagnostic;
use crate::Error;
use crate::FieldMessage;
use crate::SourceInfo;
use crate::Warning;

/// A config value together with where it was written.
///
/// Deserialization only sees the TOML span. The file path and contents are
/// attached afterwards by [`crate::load_partial`] so diagnostics can point
/// back into the original file.
#[derive(Debug, Clone)]
pub struct Located<T> {
    value: T,
    span: Range<usize>,
    source: Option<SourceInfo>,
}

impl<T> Located<T> {
    pub fn new(value: T, span: Range<usize>, source: SourceInfo) -> Self {
        Self {
            value,
            span,
            source: Some(source),
        }
    }

    /// Wrap a value that has no position in any file (defaults, tests)
    pub fn unlocated(value: T) -> Self {
        Self {
            value,
            span: 0..0,
            source: None,
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.value
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }

    pub fn span(&self) -> &Range<usize> {
        &self.span
    }

    pub fn source(&self) -> Option<&SourceInfo> {
        self.source.as_ref()
    }

    /// Map the inner value while preserving location information
    pub fn map<U, F>(self, f: F) -> Located<U>
    where
        F: FnOnce(T) -> U,
    {
        Located {
            value: f(self.value),
            span: self.span,
            source: self.source,
        }
    }

    pub fn attach_source(&mut self, source: &SourceInfo) {
        self.source = Some(source.clone());
    }

    fn field_message(&self, field_path: &str, message: impl Into<String>) -> FieldMessage {
        let span = self.source.as_ref().map(|_| self.span.clone());
        FieldMessage {
            field_path: field_path.to_string(),
            message: message.into(),
            span,
            source: self.source.clone(),
        }
    }

    /// Build a validation error pointing at this value
    pub fn error(&self, field_path: &str, message: impl Into<String>) -> Diagnostic {
        Diagnostic::Error(Error::Validation(self.field_message(field_path, message)))
    }

    /// Build an "adjusted value" warning pointing at this value
    pub fn warning(&self, field_path: &str, message: impl Into<String>) -> Diagnostic {
        Diagnostic::Warning(Warning::Adjusted(self.field_message(field_path, message)))
    }
}

impl<T> Deref for Located<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<'de, T> Deserialize<'de> for Located<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let spanned = toml::Spanned::<T>::deserialize(deserializer)?;
        let span = spanned.span();

        Ok(Located {
            value: spanned.into_inner(),
            span,
            source: None,
        })
    }
}

impl<T: PartialEq> PartialEq for Located<T> {
    fn eq(&self, other: &Self) -> bool {
        // Location is irrelevant to equality
        self.value == other.value
    }
}

impl<T: Eq> Eq for Located<T> {}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[derive(Deserialize)]
    struct Doc {
        port: Located<u16>,
    }

    #[test]
    fn test_deserialize_records_span() {
        let content = "port = 8565\n";
        let doc: Doc = toml::from_str(content).unwrap();
        assert_eq!(*doc.port, 8565);
        assert_eq!(&content[doc.port.span().clone()], "8565");
        assert!(doc.port.source().is_none());
    }

    #[test]
    fn test_error_carries_span_once_source_attached() {
        let content = "port = 0\n";
        let mut doc: Doc = toml::from_str(content).unwrap();

        let Diagnostic::Error(Error::Validation(m)) = doc.port.error("api.port", "bad") else {
            panic!("expected validation error");
        };
        assert!(m.span.is_none());

        doc.port.attach_source(&SourceInfo {
            file_path: PathBuf::from("rointed.toml"),
            content: content.to_string(),
        });
        let Diagnostic::Warning(Warning::Adjusted(m)) = doc.port.warning("api.port", "odd") else {
            panic!("expected warning");
        };
        assert_eq!(m.span, Some(7..8));
        assert_eq!(m.field_path, "api.port");
    }

    #[test]
    fn test_equality_ignores_location() {
        let a = Located::new(
            5,
            0..1,
            SourceInfo {
                file_path: PathBuf::from("a.toml"),
                content: String::new(),
            },
        );
        assert_eq!(a, Located::unlocated(5));
        assert_eq!(a.map(|v| v * 2).into_inner(), 10);
    }
}
