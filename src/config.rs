//! Server configuration from the environment.
//!
//! `.env` is loaded by `main` before [`Config::from_env`] runs. Every key has
//! a default; a value that fails to parse falls back to it rather than
//! aborting start-up.

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DIAGRAM_ID: &str = "1";
const DEFAULT_MOTION_SCALE_FACTOR: f64 = 5.0;
const DEFAULT_CLIENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    /// Postgres URL. `None` selects the in-memory document store.
    pub database_url: Option<String>,
    /// Diagram assigned to control claims that do not name one.
    pub default_diagram_id: String,
    /// Tracker metres to stage units.
    pub motion_scale_factor: f64,
    /// Outbound queue depth per connection. A full queue drops pushes.
    pub client_channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: None,
            default_diagram_id: DEFAULT_DIAGRAM_ID.to_owned(),
            motion_scale_factor: DEFAULT_MOTION_SCALE_FACTOR,
            client_channel_capacity: DEFAULT_CLIENT_CHANNEL_CAPACITY,
        }
    }
}

impl Config {
    #[must_use]
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty());
        let default_diagram_id = std::env::var("DEFAULT_DIAGRAM_ID")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DIAGRAM_ID.to_owned());

        Self {
            port: env_parse("PORT", DEFAULT_PORT),
            database_url,
            default_diagram_id,
            motion_scale_factor: env_parse("MOTION_SCALE_FACTOR", DEFAULT_MOTION_SCALE_FACTOR),
            client_channel_capacity: env_parse("CLIENT_CHANNEL_CAPACITY", DEFAULT_CLIENT_CHANNEL_CAPACITY).max(1),
        }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
