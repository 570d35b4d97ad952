use std::env;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use thiserror::Error;

/// Name of the local override file loaded on top of `.env`.
pub const DEFAULT_LOCAL_SETTINGS: &str = "localsettings.env";

/// Upper bound for day-valued settings (session age, activation window).
pub const MAX_DAYS: i64 = 3650;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("failed to load {path}: {source}")]
    LocalSettings {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
}

/// Where outgoing mail ends up.
#[derive(Debug, Clone, PartialEq)]
pub enum EmailBackend {
    Smtp(SmtpConfig),
    /// One file per message in the given directory.
    File(PathBuf),
    Console,
    Memory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub use_tls: bool,
}

/// Staff account created at startup if it does not exist yet.
#[derive(Debug, Clone)]
pub struct Superuser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: PathBuf,
    pub migrations_path: PathBuf,
    pub static_path: PathBuf,
    pub debug: bool,
    pub host_name: String,
    pub time_zone: Tz,
    pub account_activation_days: i64,
    pub session_age_days: i64,
    pub admins: Vec<String>,
    pub default_from_email: String,
    pub email_backend: EmailBackend,
    pub task_retries: u32,
    pub housekeeping_interval_secs: u64,
    pub superuser: Option<Superuser>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            database_path: PathBuf::from("data/markitdone.sqlite3"),
            migrations_path: PathBuf::from("migrations"),
            static_path: PathBuf::from("common_static"),
            debug: false,
            host_name: "markitdone.com".into(),
            time_zone: chrono_tz::America::Chicago,
            account_activation_days: 3,
            session_age_days: 14,
            admins: Vec::new(),
            default_from_email: "webmaster@markitdone.com".into(),
            email_backend: EmailBackend::Smtp(SmtpConfig {
                host: "localhost".into(),
                port: 25,
                user: String::new(),
                password: String::new(),
                use_tls: false,
            }),
            task_retries: 3,
            housekeeping_interval_secs: 3600,
            superuser: None,
        }
    }
}

impl Config {
    /// Load `.env`, then the local settings file over it, then read the
    /// process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let local = env::var("MARKITDONE_LOCAL_SETTINGS")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_LOCAL_SETTINGS));
        load_local_settings(&local)?;

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source. Unset variables keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let host_name = lookup("MARKITDONE_HOST_NAME").unwrap_or(defaults.host_name);

        let time_zone = match lookup("MARKITDONE_TIME_ZONE") {
            Some(name) => name.parse::<Tz>().map_err(|e| ConfigError::Invalid {
                name: "MARKITDONE_TIME_ZONE",
                reason: e.to_string(),
            })?,
            None => defaults.time_zone,
        };

        let email_backend = match lookup("MARKITDONE_EMAIL_BACKEND").as_deref() {
            None | Some("smtp") => EmailBackend::Smtp(SmtpConfig {
                host: lookup("MARKITDONE_EMAIL_HOST").unwrap_or_else(|| "localhost".into()),
                port: parse_or("MARKITDONE_EMAIL_PORT", lookup("MARKITDONE_EMAIL_PORT"), 25)?,
                user: lookup("MARKITDONE_EMAIL_HOST_USER").unwrap_or_default(),
                password: lookup("MARKITDONE_EMAIL_HOST_PASSWORD").unwrap_or_default(),
                use_tls: parse_bool(
                    "MARKITDONE_EMAIL_USE_TLS",
                    lookup("MARKITDONE_EMAIL_USE_TLS"),
                    false,
                )?,
            }),
            Some("file") => EmailBackend::File(
                lookup("MARKITDONE_EMAIL_FILE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("emails")),
            ),
            Some("console") => EmailBackend::Console,
            Some("memory") => EmailBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "MARKITDONE_EMAIL_BACKEND",
                    reason: format!("unknown backend '{}'", other),
                })
            }
        };

        let admins = parse_admins(lookup("MARKITDONE_ADMINS").as_deref().unwrap_or(""))?;

        let superuser = match lookup("MARKITDONE_SUPERUSER") {
            Some(spec) => Some(parse_superuser(
                &spec,
                lookup("MARKITDONE_SUPERUSER_PASSWORD_HASH"),
            )?),
            None => None,
        };

        Ok(Self {
            host: lookup("MARKITDONE_HOST").unwrap_or(defaults.host),
            port: parse_or("MARKITDONE_PORT", lookup("MARKITDONE_PORT"), defaults.port)?,
            database_path: lookup("MARKITDONE_DATABASE_URL")
                .map(|v| {
                    PathBuf::from(
                        v.strip_prefix("sqlite://")
                            .or_else(|| v.strip_prefix("sqlite:"))
                            .unwrap_or(&v),
                    )
                })
                .unwrap_or(defaults.database_path),
            migrations_path: lookup("MARKITDONE_MIGRATIONS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.migrations_path),
            static_path: lookup("MARKITDONE_STATIC_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.static_path),
            debug: parse_bool("MARKITDONE_DEBUG", lookup("MARKITDONE_DEBUG"), false)?,
            default_from_email: lookup("MARKITDONE_DEFAULT_FROM_EMAIL")
                .unwrap_or_else(|| format!("webmaster@{}", host_name)),
            host_name,
            time_zone,
            account_activation_days: parse_days(
                "MARKITDONE_ACCOUNT_ACTIVATION_DAYS",
                lookup("MARKITDONE_ACCOUNT_ACTIVATION_DAYS"),
                defaults.account_activation_days,
            )?,
            session_age_days: parse_days(
                "MARKITDONE_SESSION_AGE_DAYS",
                lookup("MARKITDONE_SESSION_AGE_DAYS"),
                defaults.session_age_days,
            )?,
            admins,
            email_backend,
            task_retries: parse_or(
                "MARKITDONE_TASK_RETRIES",
                lookup("MARKITDONE_TASK_RETRIES"),
                defaults.task_retries,
            )?,
            housekeeping_interval_secs: parse_or(
                "MARKITDONE_HOUSEKEEPING_INTERVAL_SECS",
                lookup("MARKITDONE_HOUSEKEEPING_INTERVAL_SECS"),
                defaults.housekeeping_interval_secs,
            )?,
            superuser,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Scheme and host used to build absolute links in emails.
    pub fn full_host(&self) -> String {
        format!("http://{}", self.host_name)
    }
}

fn load_local_settings(path: &Path) -> Result<(), ConfigError> {
    match dotenvy::from_path_override(path) {
        Ok(()) => {
            tracing::info!(path = %path.display(), "Loaded local settings");
            Ok(())
        }
        Err(e) if e.not_found() => Ok(()),
        Err(source) => Err(ConfigError::LocalSettings {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn parse_or<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(v) => v.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// A day count between 1 and [`MAX_DAYS`].
fn parse_days(name: &'static str, value: Option<String>, default: i64) -> Result<i64, ConfigError> {
    let days = parse_or(name, value, default)?;
    if !(1..=MAX_DAYS).contains(&days) {
        return Err(ConfigError::Invalid {
            name,
            reason: format!("{} is outside 1..={}", days, MAX_DAYS),
        });
    }
    Ok(days)
}

fn parse_bool(name: &'static str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(v) = value else {
        return Ok(default);
    };
    match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::Invalid {
            name,
            reason: format!("expected a boolean, got '{}'", other),
        }),
    }
}

/// Parse `Name <email>, other@example.com` into mailbox strings.
fn parse_admins(value: &str) -> Result<Vec<String>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            if entry.contains('@') {
                Ok(entry.to_string())
            } else {
                Err(ConfigError::Invalid {
                    name: "MARKITDONE_ADMINS",
                    reason: format!("'{}' has no email address", entry),
                })
            }
        })
        .collect()
}

fn parse_superuser(spec: &str, hash: Option<String>) -> Result<Superuser, ConfigError> {
    let (username, email) = spec
        .split_once(':')
        .map(|(u, e)| (u.trim(), e.trim()))
        .filter(|(u, e)| !u.is_empty() && e.contains('@'))
        .ok_or_else(|| ConfigError::Invalid {
            name: "MARKITDONE_SUPERUSER",
            reason: "expected 'username:email'".into(),
        })?;

    let password_hash = match hash {
        Some(h) if h.starts_with("$argon2id$") => h,
        Some(h) => {
            return Err(ConfigError::Invalid {
                name: "MARKITDONE_SUPERUSER_PASSWORD_HASH",
                reason: format!(
                    "must start with '$argon2id$', got {}...",
                    h.chars().take(12).collect::<String>()
                ),
            })
        }
        None => {
            return Err(ConfigError::Invalid {
                name: "MARKITDONE_SUPERUSER_PASSWORD_HASH",
                reason: "required when MARKITDONE_SUPERUSER is set".into(),
            })
        }
    };

    Ok(Superuser {
        username: username.to_string(),
        email: email.to_string(),
        password_hash,
    })
}
