//! Configuration file parsing and structures.
//!
//! rointed reads a single TOML file. Every value is parsed into a partial,
//! span-carrying form first so problems can be reported against the file,
//! then converted and validated into [`Config`].

use std::collections::BTreeMap;
use std::net::IpAddr;

use rointed_config::Diagnostic;
use rointed_config::Located;
use rointed_config::SourceInfo;
use rointed_config::TryFromPartial;
use rointed_config::Validate;
use rointed_config::unlocated_error;
pub use rointed_config::Diagnostics;
pub use rointed_config::LoadableConfig;
pub use rointed_config::format_diagnostics;
use serde::Deserialize;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::integrations::rointe::PartialRointeConfig;
use crate::integrations::rointe::RointeConfig;

const DEFAULT_LISTEN: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8565;

#[derive(Debug, Default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub api: ApiConfig,
    pub integrations: IntegrationsConfig,
}

// LogLevel needs Deserialize because it's used in PartialLoggingConfig with toml::Spanned
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: LogLevel,

    /// Per-target levels, e.g. `"tower_http" = "debug"`
    pub overrides: BTreeMap<String, LogLevel>,
}

impl LoggingConfig {
    pub fn targets(&self) -> Targets {
        self.overrides
            .iter()
            .fold(Targets::new().with_default(self.level), |t, (target, level)| {
                t.with_target(target.clone(), *level)
            })
    }

    /// Install the global subscriber
    pub fn init(&self) {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(self.targets())
            .init();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    pub listen: IpAddr,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: IpAddr::from([127, 0, 0, 1]),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Default)]
pub struct IntegrationsConfig {
    pub rointe: Option<RointeConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialLoggingConfig {
    pub level: Option<Located<LogLevel>>,
    pub overrides: Option<BTreeMap<String, Located<LogLevel>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialApiConfig {
    pub listen: Option<Located<String>>,
    pub port: Option<Located<u16>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialIntegrationsConfig {
    pub rointe: Option<Located<PartialRointeConfig>>,
}

/// The whole file as written
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    pub logging: Option<PartialLoggingConfig>,
    pub api: Option<PartialApiConfig>,
    pub integrations: Option<PartialIntegrationsConfig>,
}

impl rointed_config::PartialConfig for PartialConfig {
    fn attach_source(&mut self, source: &SourceInfo) {
        if let Some(logging) = &mut self.logging {
            if let Some(v) = &mut logging.level {
                v.attach_source(source);
            }
            for v in logging.overrides.iter_mut().flat_map(|o| o.values_mut()) {
                v.attach_source(source);
            }
        }
        if let Some(api) = &mut self.api {
            if let Some(v) = &mut api.listen {
                v.attach_source(source);
            }
            if let Some(v) = &mut api.port {
                v.attach_source(source);
            }
        }
        if let Some(rointe) = self.integrations.as_mut().and_then(|i| i.rointe.as_mut()) {
            rointe.attach_source(source);
            rointe.get_mut().attach_source(source);
        }
    }

    fn is_empty(&self) -> bool {
        self.logging.is_none() && self.api.is_none() && self.integrations.is_none()
    }
}

impl TryFromPartial for Config {
    type Partial = PartialConfig;

    fn try_from_partial(
        partial: Self::Partial,
        warnings: &mut Vec<Diagnostic>,
    ) -> Result<Self, Vec<Diagnostic>> {
        let mut errors = Vec::new();

        let logging = partial
            .logging
            .map(|l| LoggingConfig {
                level: l.level.map(Located::into_inner).unwrap_or_default(),
                overrides: l
                    .overrides
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(k, v)| (k, v.into_inner()))
                    .collect(),
            })
            .unwrap_or_default();

        let mut api = ApiConfig::default();
        if let Some(partial_api) = partial.api {
            if let Some(listen) = partial_api.listen {
                match listen.parse::<IpAddr>() {
                    Ok(addr) => api.listen = addr,
                    Err(_) => errors.push(listen.error(
                        "api.listen",
                        format!(
                            "'{}' is not an IP address (default is {})",
                            *listen, DEFAULT_LISTEN
                        ),
                    )),
                }
            }
            if let Some(port) = partial_api.port {
                api.port = port.into_inner();
            }
        }

        let rointe = match partial.integrations.and_then(|i| i.rointe) {
            Some(table) => match RointeConfig::try_from_partial(table, warnings) {
                Ok(c) => Some(c),
                Err(errs) => {
                    errors.extend(errs);
                    None
                }
            },
            None => None,
        };

        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(Config {
            logging,
            api,
            integrations: IntegrationsConfig { rointe },
        })
    }
}

impl Validate for Config {
    fn validate(&self) -> Vec<Diagnostic> {
        let mut errors = Vec::new();
        if let Some(fixture) = self
            .integrations
            .rointe
            .as_ref()
            .and_then(|r| r.fixture.as_ref())
        {
            if !fixture.is_file() {
                errors.push(unlocated_error(
                    "integrations.rointe.fixture",
                    format!("fixture {} does not exist", fixture.display()),
                    None,
                ));
            }
        }
        errors
    }
}
