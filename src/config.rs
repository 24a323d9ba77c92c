use base64::{engine::general_purpose, Engine as _};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} missing")]
    Missing(&'static str),
    #[error("SESSION_KEY must be base64")]
    SessionKeyEncoding,
    #[error("SESSION_KEY must decode to at least 32 bytes")]
    SessionKeyLength,
    #[error("{0} is not a valid number")]
    Number(&'static str),
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub session_key: Vec<u8>,
    pub bind_addr: String,
    pub media_root: PathBuf,
    pub max_connections: u32,
    pub secure_cookies: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let session_key_b64 = lookup("SESSION_KEY").ok_or(ConfigError::Missing("SESSION_KEY"))?;
        let session_key = general_purpose::STANDARD
            .decode(session_key_b64.trim())
            .map_err(|_| ConfigError::SessionKeyEncoding)?;
        if session_key.len() < 32 {
            return Err(ConfigError::SessionKeyLength);
        }

        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| {
            let port = lookup("PORT").unwrap_or_else(|| "3000".to_string());
            format!("0.0.0.0:{}", port)
        });

        let media_root = PathBuf::from(lookup("MEDIA_ROOT").unwrap_or_else(|| "media".to_string()));

        let max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Number("DB_MAX_CONNECTIONS"))?,
            None => 10,
        };

        // Secure flag only behind HTTPS hosting
        let secure_cookies = ["PRODUCTION", "RAILWAY_ENVIRONMENT", "RENDER", "FLY_APP_NAME"]
            .iter()
            .any(|key| lookup(key).is_some());

        Ok(Self {
            database_url,
            session_key,
            bind_addr,
            media_root,
            max_connections,
            secure_cookies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn key_b64() -> String {
        general_purpose::STANDARD.encode([7u8; 32])
    }

    #[test]
    fn defaults_apply_when_optional_values_are_absent() {
        let key = key_b64();
        let config = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/municipal"),
            ("SESSION_KEY", &key),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.media_root, PathBuf::from("media"));
        assert_eq!(config.max_connections, 10);
        assert!(!config.secure_cookies);
    }

    #[test]
    fn port_and_production_markers_are_honoured() {
        let key = key_b64();
        let config = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/municipal"),
            ("SESSION_KEY", &key),
            ("PORT", "8080"),
            ("RENDER", "1"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert!(config.secure_cookies);
    }

    #[test]
    fn short_session_key_is_rejected() {
        let short = general_purpose::STANDARD.encode([1u8; 8]);
        let err = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/municipal"),
            ("SESSION_KEY", &short),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::SessionKeyLength));
    }

    #[test]
    fn database_url_is_required() {
        let key = key_b64();
        let err = AppConfig::from_lookup(lookup_from(&[("SESSION_KEY", &key)])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }
}
