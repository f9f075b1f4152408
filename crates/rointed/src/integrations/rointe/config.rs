use std::path::PathBuf;
use std::time::Duration;

use rointed_config::Diagnostic;
use rointed_config::Located;
use rointed_config::SourceInfo;
use rointed_config::TryFromPartial;
use rointed_config::required;
use serde::Deserialize;

use super::DEFAULT_REFRESH_INTERVAL_SECS;
use super::MIN_REFRESH_INTERVAL_SECS;

const TABLE: &str = "integrations.rointe";

/// Configuration for the Rointe integration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub username: String,
    pub password: String,

    /// Installation id to poll, as listed by `rointed setup`
    pub installation: String,

    /// Account-level id the installation belongs to
    pub local_id: String,

    pub refresh_interval: Duration,

    /// JSON fixture seeding the simulated cloud. The bundled one is used when unset.
    pub fixture: Option<PathBuf>,
}

/// `[integrations.rointe]` as written
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    pub username: Option<Located<String>>,
    pub password: Option<Located<String>>,
    pub installation: Option<Located<String>>,
    pub local_id: Option<Located<String>>,
    pub refresh_interval_secs: Option<Located<u64>>,
    pub fixture: Option<Located<PathBuf>>,
}

impl PartialConfig {
    pub fn attach_source(&mut self, source: &SourceInfo) {
        for v in [
            &mut self.username,
            &mut self.password,
            &mut self.installation,
            &mut self.local_id,
        ]
        .into_iter()
        .flatten()
        {
            v.attach_source(source);
        }
        if let Some(v) = &mut self.refresh_interval_secs {
            v.attach_source(source);
        }
        if let Some(v) = &mut self.fixture {
            v.attach_source(source);
        }
    }
}

fn field(name: &str) -> String {
    format!("{}.{}", TABLE, name)
}

impl TryFromPartial for Config {
    type Partial = Located<PartialConfig>;

    fn try_from_partial(
        table: Self::Partial,
        warnings: &mut Vec<Diagnostic>,
    ) -> Result<Self, Vec<Diagnostic>> {
        let mut errors = Vec::new();
        let partial = table.get_ref();

        let username = required(
            partial.username.clone(),
            &field("username"),
            Some(&table),
            &mut errors,
        );
        let password = required(
            partial.password.clone(),
            &field("password"),
            Some(&table),
            &mut errors,
        );
        let installation = required(
            partial.installation.clone(),
            &field("installation"),
            Some(&table),
            &mut errors,
        );
        let local_id = required(
            partial.local_id.clone(),
            &field("local_id"),
            Some(&table),
            &mut errors,
        );

        let refresh_interval_secs = match &partial.refresh_interval_secs {
            Some(v) if **v < MIN_REFRESH_INTERVAL_SECS => {
                warnings.push(v.warning(
                    &field("refresh_interval_secs"),
                    format!(
                        "refresh interval below {}s, using {}s",
                        MIN_REFRESH_INTERVAL_SECS, MIN_REFRESH_INTERVAL_SECS
                    ),
                ));
                MIN_REFRESH_INTERVAL_SECS
            }
            Some(v) => **v,
            None => DEFAULT_REFRESH_INTERVAL_SECS,
        };

        let fixture = partial.fixture.clone().map(Located::into_inner);

        match (username, password, installation, local_id) {
            (Some(username), Some(password), Some(installation), Some(local_id))
                if errors.is_empty() =>
            {
                Ok(Config {
                    username,
                    password,
                    installation,
                    local_id,
                    refresh_interval: Duration::from_secs(refresh_interval_secs),
                    fixture,
                })
            }
            _ => Err(errors),
        }
    }
}
