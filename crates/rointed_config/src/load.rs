use std::path::Path;

use serde::de::DeserializeOwned;

use crate::Diagnostic;
use crate::Diagnostics;
use crate::LoadError;
use crate::SourceInfo;
use crate::TryFromPartial;
use crate::Validate;
use crate::Warning;

/// The raw, as-written form of a config file.
///
/// Every field is optional and wrapped in [`crate::Located`] so that
/// conversion into the final config can report precisely what is missing
/// or out of range.
pub trait PartialConfig: DeserializeOwned + Default {
    /// Attach file information to every located value in the partial config
    fn attach_source(&mut self, source: &SourceInfo);

    /// True when the file set nothing at all
    fn is_empty(&self) -> bool;
}

/// Read and parse a single TOML file into its partial form.
pub fn load_partial<P: PartialConfig>(path: &Path) -> Result<(P, SourceInfo), LoadError> {
    let content = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;

    let mut partial: P = toml::from_str(&content).map_err(|e| LoadError::Parse {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;

    let source = SourceInfo {
        file_path: path.to_path_buf(),
        content,
    };
    partial.attach_source(&source);

    Ok((partial, source))
}

/// Root configuration types that can be loaded from a file.
///
/// `from_file()` runs the whole pipeline:
/// 1. Read and parse the file into the partial config
/// 2. Warn if the file is empty
/// 3. Convert from partial to final config, collecting errors and warnings
/// 4. Validate cross-field constraints
/// 5. Return the config if no errors were found
pub trait LoadableConfig: Sized + Default + TryFromPartial + Validate
where
    Self::Partial: PartialConfig,
{
    fn from_file(path: &Path) -> Result<(Self, Diagnostics), Diagnostics> {
        // Step 1: Load
        let (partial, source) = load_partial::<Self::Partial>(path)
            .map_err(|e| Diagnostics(vec![Diagnostic::from(e)]))?;

        // Step 2: Empty file check
        let mut diagnostics = Vec::new();
        if partial.is_empty() {
            diagnostics.push(Diagnostic::Warning(Warning::EmptyConfig {
                file_path: source.file_path.clone(),
            }));
        }

        // Step 3: Convert
        let config = match Self::try_from_partial(partial, &mut diagnostics) {
            Ok(cfg) => cfg,
            Err(errs) => {
                diagnostics.extend(errs);
                Self::default()
            }
        };

        // Step 4: Validate
        diagnostics.extend(config.validate());

        // Step 5: Decide
        if diagnostics.iter().any(Diagnostic::is_error) {
            Err(Diagnostics(diagnostics))
        } else {
            Ok((config, Diagnostics(diagnostics)))
        }
    }
}

impl<T> LoadableConfig for T
where
    T: Sized + Default + TryFromPartial + Validate,
    T::Partial: PartialConfig,
{
}
