use std::env;

use citadel_core::{AppError, AppResult};
use tracing_subscriber::EnvFilter;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl AdminConfig {
    pub fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let max_connections = parse_env_u32("DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;

        if max_connections == 0 {
            return Err(AppError::Validation(
                "DATABASE_MAX_CONNECTIONS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            max_connections,
        })
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::Validation(format!("{name} is required")))
}

fn parse_env_u32(name: &str, default: u32) -> AppResult<u32> {
    match env::var(name) {
        Ok(value) => parse_u32(name, value.as_str()),
        Err(_) => Ok(default),
    }
}

fn parse_u32(name: &str, value: &str) -> AppResult<u32> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|error| AppError::Validation(format!("invalid {name} value '{value}': {error}")))
}

#[cfg(test)]
mod tests {
    use super::parse_u32;

    #[test]
    fn parse_u32_names_the_variable_on_failure() {
        let Err(error) = parse_u32("DATABASE_MAX_CONNECTIONS", "many") else {
            panic!("expected parse failure");
        };
        assert!(error.to_string().contains("DATABASE_MAX_CONNECTIONS"));
    }

    #[test]
    fn parse_u32_trims_whitespace() {
        assert_eq!(parse_u32("DATABASE_MAX_CONNECTIONS", " 8 ").ok(), Some(8));
    }
}
