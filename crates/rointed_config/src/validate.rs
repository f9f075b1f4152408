use crate::Diagnostic;
use crate::Error;
use crate::FieldMessage;
use crate::Located;
use crate::SourceInfo;

/// Conversion from the partial (as-written) config into the final config.
///
/// Errors are returned all at once so a single run reports every problem.
/// Warnings that do not stop loading (clamped values and the like) are
/// pushed onto `warnings`.
pub trait TryFromPartial: Sized {
    type Partial;

    fn try_from_partial(
        partial: Self::Partial,
        warnings: &mut Vec<Diagnostic>,
    ) -> Result<Self, Vec<Diagnostic>>;
}

/// Cross-field checks run after conversion. The default accepts everything.
pub trait Validate {
    fn validate(&self) -> Vec<Diagnostic> {
        Vec::new()
    }
}

/// Take a required value, or report it missing against the enclosing table.
pub fn required<T, U>(
    value: Option<Located<T>>,
    field_path: &str,
    table: Option<&Located<U>>,
    errors: &mut Vec<Diagnostic>,
) -> Option<T> {
    match value {
        Some(v) => Some(v.into_inner()),
        None => {
            let name = field_path.rsplit('.').next().unwrap_or(field_path);
            let message = format!("{} is required", name);
            errors.push(match table {
                Some(t) => t.error(field_path, message),
                None => Diagnostic::Error(Error::Validation(FieldMessage {
                    field_path: field_path.to_string(),
                    message,
                    span: None,
                    source: None,
                })),
            });
            None
        }
    }
}

/// Build a validation error that has no location in any file.
pub fn unlocated_error(
    field_path: &str,
    message: impl Into<String>,
    source: Option<&SourceInfo>,
) -> Diagnostic {
    Diagnostic::Error(Error::Validation(FieldMessage {
        field_path: field_path.to_string(),
        message: message.into(),
        span: None,
        source: source.cloned(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_present() {
        let mut errors = Vec::new();
        let v = required::<_, ()>(Some(Located::unlocated(3)), "a.b", None, &mut errors);
        assert_eq!(v, Some(3));
        assert!(errors.is_empty());
    }

    #[test]
    fn test_required_missing_reports_leaf_name() {
        let mut errors = Vec::new();
        let v: Option<String> =
            required::<_, ()>(None, "integrations.rointe.username", None, &mut errors);
        assert_eq!(v, None);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field_path(), Some("integrations.rointe.username"));
        assert!(errors[0].to_string().contains("username is required"));
    }
}
