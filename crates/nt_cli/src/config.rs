use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Args;
use nt_inference::{Config, ModelKind};

pub const LOG_LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];

/// Durations written as `90s`, `5m`, `1h30m` or a bare number of seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HumanDuration(pub Duration);

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut total_seconds = 0u64;
        let mut current_number = String::new();
        let mut has_number = false;

        for c in s.trim().chars() {
            if c.is_ascii_digit() {
                current_number.push(c);
                continue;
            }
            if c.is_whitespace() {
                continue;
            }
            let Ok(num) = current_number.parse::<u64>() else {
                return Err(format!("Invalid character in duration: {}", c));
            };
            let unit = match c {
                's' => 1,
                'm' => 60,
                'h' => 3600,
                'd' => 86400,
                _ => return Err(format!("Invalid duration unit: {}", c)),
            };
            total_seconds = num
                .checked_mul(unit)
                .and_then(|secs| total_seconds.checked_add(secs))
                .ok_or_else(|| format!("Duration too large: {}", s))?;
            current_number.clear();
            has_number = true;
        }

        // Trailing number without a unit is seconds.
        if !current_number.is_empty() {
            let num = current_number
                .parse::<u64>()
                .map_err(|_| "Invalid number in duration".to_string())?;
            total_seconds = total_seconds
                .checked_add(num)
                .ok_or_else(|| format!("Duration too large: {}", s))?;
            has_number = true;
        }

        if !has_number {
            return Err("Duration must include a number".to_string());
        }

        Ok(HumanDuration(Duration::from_secs(total_seconds)))
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0.as_secs())
    }
}

/// Process-wide settings; each flag falls back to its environment variable.
#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// Storage backend URL (memory:// or sqlite://path)
    #[arg(long, env = "DATABASE_URL", default_value = nt_storage::DEFAULT_STORAGE_URL, global = true)]
    pub database_url: String,

    /// Inference model
    #[arg(long, env = "LLM_MODEL", value_enum, default_value_t = ModelKind::Dummy, global = true)]
    pub model: ModelKind,

    #[arg(long, env = "LLM_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    #[arg(long, env = "LLM_API_URL", default_value = nt_inference::DEFAULT_API_URL, global = true)]
    pub api_url: String,

    #[arg(long, env = "LLM_CHAT_MODEL", global = true)]
    pub chat_model: Option<String>,

    #[arg(long, env = "LLM_EMBEDDING_MODEL", global = true)]
    pub embedding_model: Option<String>,

    /// Embedding size; defaults to the model's native size
    #[arg(long, env = "EMBEDDING_DIMENSIONS", global = true)]
    pub embedding_dimensions: Option<usize>,

    /// Lifetime of cached trending results (e.g. 5m, 90s)
    #[arg(long, env = "CACHE_TTL", default_value = "5m", global = true)]
    pub cache_ttl: HumanDuration,

    /// Shared trending cache; in-process when unset
    #[arg(long, env = "REDIS_URL", global = true)]
    pub redis_url: Option<String>,

    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Deadline for a single request, including model calls
    #[arg(long, env = "REQUEST_TIMEOUT", default_value = "25s", global = true)]
    pub request_timeout: HumanDuration,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            bail!(
                "invalid log level '{}': expected one of {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            );
        }
        if self.cache_ttl.0.is_zero() {
            bail!("cache TTL must be greater than 0");
        }
        if self.request_timeout.0.is_zero() {
            bail!("request timeout must be greater than 0");
        }
        if self.model == ModelKind::Openai && self.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            bail!("the openai model requires an API key (--api-key or LLM_API_KEY)");
        }
        if self.embedding_dimensions == Some(0) {
            bail!("embedding dimensions must be greater than 0");
        }
        Ok(())
    }

    pub fn inference_config(&self) -> Config {
        Config {
            api_key: self.api_key.clone(),
            api_url: self.api_url.clone(),
            model_name: Some(self.model.to_string()),
            chat_model: self.chat_model.clone(),
            embedding_model: self.embedding_model.clone(),
            embedding_dimensions: self.embedding_dimensions,
            request_timeout: self.request_timeout.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        settings: Settings,
    }

    fn parse(args: &[&str]) -> Settings {
        let mut argv = vec!["nt"];
        argv.extend_from_slice(args);
        TestCli::parse_from(argv).settings
    }

    #[test]
    fn test_human_duration() {
        assert_eq!("90s".parse::<HumanDuration>().unwrap().0, Duration::from_secs(90));
        assert_eq!("1h30m".parse::<HumanDuration>().unwrap().0, Duration::from_secs(5400));
        assert_eq!("45".parse::<HumanDuration>().unwrap().0, Duration::from_secs(45));
        assert_eq!("2d 1s".parse::<HumanDuration>().unwrap().0, Duration::from_secs(172_801));
        assert!("m".parse::<HumanDuration>().is_err());
        assert!("5w".parse::<HumanDuration>().is_err());
        assert!("".parse::<HumanDuration>().is_err());
    }

    #[test]
    fn test_flags_override_defaults() {
        let settings = parse(&["--cache-ttl", "90s", "--log-level", "debug", "--embedding-dimensions", "64"]);
        assert_eq!(settings.cache_ttl.0, Duration::from_secs(90));
        assert_eq!(settings.inference_config().dimensions().unwrap(), 64);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_settings() {
        assert!(parse(&["--log-level", "verbose"]).validate().is_err());
        assert!(parse(&["--cache-ttl", "0s"]).validate().is_err());
        assert!(parse(&["--model", "openai", "--api-key", " "]).validate().is_err());
        assert!(parse(&["--model", "openai", "--api-key", "sk-test"]).validate().is_ok());
    }
}
