//! Run configuration: target application constants, timing, thresholds and
//! load profiles.
//!
//! Everything is optional in the TOML file; a missing file means defaults.
//! The component ids are the server-assigned JSF form/field ids, which change
//! between application versions — they live in config so a redeploy doesn't
//! mean a recompile.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::executor::Stage;
use crate::flow::Phase;
use crate::report::Thresholds;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid token field pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Scheme and host of the target, e.g. `https://app.example.com`.
    pub base_url: String,
    /// Context path prefix applied to every endpoint.
    pub app_path: String,
    pub endpoints: Endpoints,
    pub components: Components,
    pub timeouts: Timeouts,
    pub delays: Delays,
    pub defaults: FilterDefaults,
    pub thresholds: Thresholds,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            app_path: String::new(),
            endpoints: Endpoints::default(),
            components: Components::default(),
            timeouts: Timeouts::default(),
            delays: Delays::default(),
            defaults: FilterDefaults::default(),
            thresholds: Thresholds::default(),
        }
    }
}

impl AppConfig {
    /// Load from TOML. A missing file is not an error: it means defaults,
    /// with the base url expected from the CLI or environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file; using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Full URL for an endpoint path.
    pub fn url(&self, endpoint: &str) -> String {
        format!("{}{}{}", self.base_url, self.app_path, endpoint)
    }
}

/// Application routes of the journey.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub login: String,
    pub menu: String,
    pub filter: String,
    pub detail: String,
    pub logout: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: "/index.xhtml".to_owned(),
            menu: "/App/Provisiones/Flujo/".to_owned(),
            filter: "/App/Provisiones/Flujo/index.xhtml".to_owned(),
            detail: "/App/Provisiones/Flujo/index.xhtml".to_owned(),
            logout: "/App/Provisiones/Flujo/index.xhtml".to_owned(),
        }
    }
}

/// Server-assigned component ids echoed in form payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Components {
    pub view_state_field: String,
    pub login_form: String,
    pub user_field: String,
    pub password_field: String,
    pub submit_field: String,
    pub submit_label: String,
    pub table_form: String,
    pub table: String,
    pub filter_field: String,
    pub detail_form: String,
    pub detail_source: String,
    pub detail_field: String,
    pub logout_form: String,
    pub logout_button: String,
    pub logout_label: String,
}

impl Default for Components {
    fn default() -> Self {
        Self {
            view_state_field: "javax.faces.ViewState".to_owned(),
            login_form: "j_idt5".to_owned(),
            user_field: "correo".to_owned(),
            password_field: "password".to_owned(),
            submit_field: "button".to_owned(),
            submit_label: "Ingresar".to_owned(),
            table_form: "frmConsultor".to_owned(),
            table: "flujoTable".to_owned(),
            filter_field: "clienteFilter".to_owned(),
            detail_form: "frmAfrm".to_owned(),
            detail_source: "j_idt97".to_owned(),
            detail_field: "tipoFujo".to_owned(),
            logout_form: "j_idt49".to_owned(),
            logout_button: "j_idt50".to_owned(),
            logout_label: "Cerrar sesión".to_owned(),
        }
    }
}

/// Per-step send budgets, milliseconds. Auth gets a longer budget than data
/// steps; a cold full page render the longest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub request_ms: u64,
    pub login_ms: u64,
    pub page_load_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request_ms: 30_000,
            login_ms: 45_000,
            page_load_ms: 60_000,
        }
    }
}

impl Timeouts {
    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }

    pub fn login(&self) -> Duration {
        Duration::from_millis(self.login_ms)
    }

    pub fn page_load(&self) -> Duration {
        Duration::from_millis(self.page_load_ms)
    }
}

/// Think time after each phase, seconds, jittered by `variance`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Delays {
    pub after_login: f64,
    pub after_menu: f64,
    pub after_filter: f64,
    pub after_detail: f64,
    pub after_logout: f64,
    /// Fractional jitter spread, e.g. `0.3` for ±30%.
    pub variance: f64,
}

impl Default for Delays {
    fn default() -> Self {
        Self {
            after_login: 1.0,
            after_menu: 2.0,
            after_filter: 2.0,
            after_detail: 2.0,
            after_logout: 2.0,
            variance: 0.3,
        }
    }
}

impl Delays {
    pub fn after(&self, phase: Phase) -> Duration {
        let seconds = match phase {
            Phase::Login => self.after_login,
            Phase::Menu => self.after_menu,
            Phase::Filter => self.after_filter,
            Phase::Detail => self.after_detail,
            Phase::Logout => self.after_logout,
        };
        Duration::from_secs_f64(seconds.max(0.0))
    }

    /// No think time at all; for tests and smoke wiring.
    pub fn none() -> Self {
        Self {
            after_login: 0.0,
            after_menu: 0.0,
            after_filter: 0.0,
            after_detail: 0.0,
            after_logout: 0.0,
            variance: 0.0,
        }
    }
}

/// Default business parameters for the filter and detail submissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterDefaults {
    pub client_filter: String,
    pub detail_kind: String,
}

impl Default for FilterDefaults {
    fn default() -> Self {
        Self {
            client_filter: "87".to_owned(),
            detail_kind: "1".to_owned(),
        }
    }
}

/// Canned concurrency ramps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Profile {
    /// One user for one minute; a wiring check.
    Smoke,
    /// The expected production shape.
    Load,
    /// Push past expected capacity.
    Stress,
    /// A sudden burst on a quiet system.
    Spike,
}

impl Profile {
    pub fn stages(self) -> Vec<Stage> {
        let m = |mins: u64| Duration::from_secs(mins * 60);
        let s = Duration::from_secs;
        match self {
            Profile::Smoke => vec![Stage::new(m(1), 1)],
            Profile::Load => vec![
                Stage::new(m(10), 7),
                Stage::new(m(15), 20),
                Stage::new(m(10), 3),
            ],
            Profile::Stress => vec![
                Stage::new(m(2), 10),
                Stage::new(m(5), 50),
                Stage::new(m(2), 100),
                Stage::new(m(5), 0),
            ],
            Profile::Spike => vec![
                Stage::new(m(1), 10),
                Stage::new(s(30), 100),
                Stage::new(m(2), 10),
                Stage::new(s(30), 0),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(dir.path().join("absent.toml")).unwrap();
        assert!(config.base_url.is_empty());
        assert_eq!(config.timeouts.login_ms, 45_000);
        assert_eq!(config.thresholds.p95_ms, 1_000);
    }

    #[test]
    fn partial_file_overrides_only_what_it_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arreo.toml");
        let mut file = fs::File::create(&path).unwrap();
        write!(
            file,
            r#"
base_url = "https://qa.example.com"

[timeouts]
login_ms = 10000

[thresholds]
failure_rate = 0.05
"#
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.base_url, "https://qa.example.com");
        assert_eq!(config.timeouts.login_ms, 10_000);
        // Untouched siblings keep their defaults.
        assert_eq!(config.timeouts.request_ms, 30_000);
        assert_eq!(config.thresholds.failure_rate, 0.05);
        assert_eq!(config.thresholds.p95_ms, 1_000);
        assert_eq!(config.components.login_form, "j_idt5");
    }

    #[test]
    fn url_joins_base_path_and_endpoint() {
        let config = AppConfig {
            base_url: "https://app.example.com".to_owned(),
            app_path: "/portal".to_owned(),
            ..AppConfig::default()
        };
        assert_eq!(
            config.url(&config.endpoints.login),
            "https://app.example.com/portal/index.xhtml"
        );
    }

    #[test]
    fn profiles_ramp_to_their_peaks() {
        let peak = |profile: Profile| {
            profile
                .stages()
                .iter()
                .map(|stage| stage.target)
                .max()
                .unwrap()
        };
        assert_eq!(peak(Profile::Smoke), 1);
        assert_eq!(peak(Profile::Load), 20);
        assert_eq!(peak(Profile::Stress), 100);
        assert_eq!(peak(Profile::Spike), 100);
    }

    #[test]
    fn delays_map_to_phases() {
        let delays = Delays::default();
        assert_eq!(delays.after(Phase::Login), Duration::from_secs(1));
        assert_eq!(delays.after(Phase::Menu), Duration::from_secs(2));
        assert_eq!(Delays::none().after(Phase::Logout), Duration::ZERO);
    }
}
