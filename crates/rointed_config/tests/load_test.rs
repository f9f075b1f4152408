use std::fs;

use rointed_config::Diagnostic;
use rointed_config::LoadableConfig;
use rointed_config::Located;
use rointed_config::PartialConfig;
use rointed_config::SourceInfo;
use rointed_config::TryFromPartial;
use rointed_config::Validate;
use rointed_config::Warning;
use rointed_config::required;
use serde::Deserialize;
use tempfile::TempDir;

#[derive(Debug, Default, PartialEq)]
struct PollerConfig {
    name: String,
    interval_secs: u64,
}

#[derive(Debug, Default, Deserialize)]
struct PartialPollerConfig {
    name: Option<Located<String>>,
    interval_secs: Option<Located<u64>>,
}

impl PartialConfig for PartialPollerConfig {
    fn attach_source(&mut self, source: &SourceInfo) {
        if let Some(v) = &mut self.name {
            v.attach_source(source);
        }
        if let Some(v) = &mut self.interval_secs {
            v.attach_source(source);
        }
    }

    fn is_empty(&self) -> bool {
        self.name.is_none() && self.interval_secs.is_none()
    }
}

impl TryFromPartial for PollerConfig {
    type Partial = PartialPollerConfig;

    fn try_from_partial(
        partial: Self::Partial,
        warnings: &mut Vec<Diagnostic>,
    ) -> Result<Self, Vec<Diagnostic>> {
        let mut errors = Vec::new();
        let name = required::<_, ()>(partial.name, "name", None, &mut errors);

        let interval_secs = match partial.interval_secs {
            Some(v) if *v < 10 => {
                warnings.push(v.warning("interval_secs", "raised to 10"));
                10
            }
            Some(v) => v.into_inner(),
            None => 60,
        };

        match name {
            Some(name) if errors.is_empty() => Ok(PollerConfig {
                name,
                interval_secs,
            }),
            _ => Err(errors),
        }
    }
}

impl Validate for PollerConfig {
    fn validate(&self) -> Vec<Diagnostic> {
        if self.name.is_empty() {
            vec![rointed_config::unlocated_error(
                "name",
                "name must not be empty",
                None,
            )]
        } else {
            Vec::new()
        }
    }
}

fn write(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("poller.toml");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_loads_with_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "name = \"kitchen\"\n");

    let (config, diagnostics) = PollerConfig::from_file(&path).unwrap();
    assert_eq!(
        config,
        PollerConfig {
            name: "kitchen".to_string(),
            interval_secs: 60
        }
    );
    assert!(diagnostics.0.is_empty());
}

#[test]
fn test_clamped_value_is_a_warning() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "name = \"kitchen\"\ninterval_secs = 3\n");

    let (config, diagnostics) = PollerConfig::from_file(&path).unwrap();
    assert_eq!(config.interval_secs, 10);
    assert_eq!(diagnostics.0.len(), 1);

    let Diagnostic::Warning(Warning::Adjusted(m)) = &diagnostics.0[0] else {
        panic!("expected adjusted warning, got {:?}", diagnostics.0[0]);
    };
    let source = m.source.as_ref().unwrap();
    assert_eq!(&source.content[m.span.clone().unwrap()], "3");
}

#[test]
fn test_missing_required_field_fails() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "interval_secs = 30\n");

    let diagnostics = PollerConfig::from_file(&path).unwrap_err();
    assert!(diagnostics.has_errors());
    assert_eq!(diagnostics.0[0].field_path(), Some("name"));
}

#[test]
fn test_empty_file_warns_and_then_fails_conversion() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "");

    let diagnostics = PollerConfig::from_file(&path).unwrap_err();
    assert!(matches!(
        diagnostics.0[0],
        Diagnostic::Warning(Warning::EmptyConfig { .. })
    ));
    assert!(diagnostics.has_errors());
}

#[test]
fn test_cross_field_validation_runs() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "name = \"\"\n");

    let diagnostics = PollerConfig::from_file(&path).unwrap_err();
    assert!(
        diagnostics
            .to_string()
            .contains("name must not be empty")
    );
}

#[test]
fn test_parse_error_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "name = \n");

    let diagnostics = PollerConfig::from_file(&path).unwrap_err();
    assert!(diagnostics.to_string().contains("Failed to parse config file"));
}

#[test]
fn test_missing_file_is_reported() {
    let dir = TempDir::new().unwrap();
    let diagnostics = PollerConfig::from_file(&dir.path().join("nope.toml")).unwrap_err();
    assert!(diagnostics.to_string().contains("Failed to read config file"));
}
