use crate::config::types::{
    CheckpointConfig, CircuitBreakerConfig, Config, CrawlerConfig, PolitenessConfig, RetryConfig,
    UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_politeness_config(&config.politeness)?;
    validate_retry_config(&config.retry)?;
    validate_circuit_breaker_config(&config.circuit_breaker)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_checkpoint_config(&config.checkpoint)?;
    Ok(())
}

/// Validates crawler bounds and pool sizing
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_depth < -1 {
        return Err(ConfigError::Validation(format!(
            "max-depth must be -1 (unlimited) or >= 0, got {}",
            config.max_depth
        )));
    }

    if config.max_urls < -1 || config.max_urls == 0 {
        return Err(ConfigError::Validation(format!(
            "max-urls must be -1 (unlimited) or >= 1, got {}",
            config.max_urls
        )));
    }

    if config.workers < 1 || config.workers > 100 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 100, got {}",
            config.workers
        )));
    }

    validate_whole_seconds("health-check-interval", config.health_check_interval)?;
    validate_whole_seconds("stall-timeout", config.stall_timeout)?;

    if config.health_check_interval == 0 {
        return Err(ConfigError::Validation(
            "health-check-interval must be >= 1 second".to_string(),
        ));
    }

    if config.stall_timeout < config.health_check_interval {
        return Err(ConfigError::Validation(format!(
            "stall-timeout ({}s) must be >= health-check-interval ({}s)",
            config.stall_timeout, config.health_check_interval
        )));
    }

    for pattern in &config.allowed_domains {
        validate_domain_pattern(pattern)?;
    }

    Ok(())
}

fn validate_politeness_config(config: &PolitenessConfig) -> Result<(), ConfigError> {
    validate_seconds("rate-limit", config.rate_limit)?;
    validate_whole_seconds("robots-ttl", config.robots_ttl)?;
    validate_whole_seconds("robots-retry-cooldown", config.robots_retry_cooldown)?;

    if config.max_per_domain < 1 {
        return Err(ConfigError::Validation(format!(
            "max-per-domain must be >= 1, got {}",
            config.max_per_domain
        )));
    }

    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    validate_seconds("base-delay", config.base_delay)?;
    validate_seconds("max-delay", config.max_delay)?;
    validate_seconds("timeout", config.timeout)?;

    if config.timeout == 0.0 {
        return Err(ConfigError::Validation(
            "timeout must be greater than 0".to_string(),
        ));
    }

    if config.max_delay < config.base_delay {
        return Err(ConfigError::Validation(format!(
            "max-delay ({}) must be >= base-delay ({})",
            config.max_delay, config.base_delay
        )));
    }

    Ok(())
}

fn validate_circuit_breaker_config(config: &CircuitBreakerConfig) -> Result<(), ConfigError> {
    if config.failure_threshold < 1 {
        return Err(ConfigError::Validation(
            "failure-threshold must be >= 1".to_string(),
        ));
    }

    validate_seconds("cooldown", config.cooldown)?;
    validate_seconds("max-cooldown", config.max_cooldown)?;

    if config.max_cooldown < config.cooldown {
        return Err(ConfigError::Validation(format!(
            "max-cooldown ({}) must be >= cooldown ({})",
            config.max_cooldown, config.cooldown
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // The name doubles as the robots.txt product token
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler-name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "crawler-name must contain only letters, digits, '-' or '_', got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact-url: {}", e)))?;

    Ok(())
}

fn validate_checkpoint_config(config: &CheckpointConfig) -> Result<(), ConfigError> {
    if !config.enabled {
        return Ok(());
    }

    if config.path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "checkpoint path cannot be empty".to_string(),
        ));
    }

    if config.interval == 0 {
        return Err(ConfigError::Validation(
            "checkpoint interval must be >= 1 second".to_string(),
        ));
    }
    validate_whole_seconds("checkpoint interval", config.interval)?;

    Ok(())
}

/// Longest duration any setting may take (one week)
pub const MAX_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// Durations are given in seconds and must be finite, non-negative and
/// at most [`MAX_DURATION_SECS`]
fn validate_seconds(name: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::Validation(format!(
            "{} must be a non-negative number of seconds, got {}",
            name, value
        )));
    }
    if value > MAX_DURATION_SECS as f64 {
        return Err(ConfigError::Validation(format!(
            "{} must be at most {} seconds, got {}",
            name, MAX_DURATION_SECS, value
        )));
    }
    Ok(())
}

fn validate_whole_seconds(name: &str, value: u64) -> Result<(), ConfigError> {
    if value > MAX_DURATION_SECS {
        return Err(ConfigError::Validation(format!(
            "{} must be at most {} seconds, got {}",
            name, MAX_DURATION_SECS, value
        )));
    }
    Ok(())
}

/// Validates a domain pattern (supports wildcards)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    match pattern.strip_prefix("*.") {
        Some(domain) => validate_domain_string(domain),
        None => validate_domain_string(pattern),
    }
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    // Single-label hosts are only useful for local testing
    if !domain.contains('.') && domain != "localhost" {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'example.com')",
            domain
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_domain_pattern() {
        assert!(validate_domain_pattern("example.com").is_ok());
        assert!(validate_domain_pattern("*.example.com").is_ok());
        assert!(validate_domain_pattern("sub.example.com").is_ok());
        assert!(validate_domain_pattern("127.0.0.1").is_ok());
        assert!(validate_domain_pattern("localhost").is_ok());

        assert!(validate_domain_pattern("").is_err());
        assert!(validate_domain_pattern("*.").is_err());
        assert!(validate_domain_pattern("example").is_err());
        assert!(validate_domain_pattern(".example.com").is_err());
        assert!(validate_domain_pattern("example.com.").is_err());
        assert!(validate_domain_pattern("exa mple.com").is_err());
    }

    #[test]
    fn test_depth_and_url_limits() {
        let mut config = Config::default();
        config.crawler.max_depth = -2;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.crawler.max_urls = 0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.crawler.max_depth = -1;
        config.crawler.max_urls = -1;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_negative_durations_rejected() {
        let mut config = Config::default();
        config.politeness.rate_limit = -1.0;
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));

        let mut config = Config::default();
        config.retry.timeout = f64::NAN;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_oversized_durations_rejected() {
        let mut config = Config::default();
        config.circuit_breaker.max_cooldown = 1e20;
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));

        let mut config = Config::default();
        config.retry.timeout = (MAX_DURATION_SECS + 1) as f64;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.politeness.robots_ttl = u64::MAX;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.crawler.stall_timeout = u64::MAX;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.circuit_breaker.max_cooldown = MAX_DURATION_SECS as f64;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_backoff_bounds() {
        let mut config = Config::default();
        config.retry.base_delay = 10.0;
        config.retry.max_delay = 1.0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.circuit_breaker.cooldown = 100.0;
        config.circuit_breaker.max_cooldown = 10.0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_crawler_name_rules() {
        let mut config = Config::default();
        config.user_agent.crawler_name = "Bad Bot".to_string();
        assert!(validate(&config).is_err());

        config.user_agent.crawler_name = "Good_Bot-2".to_string();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_disabled_checkpoint_skips_checks() {
        let mut config = Config::default();
        config.checkpoint.enabled = false;
        config.checkpoint.interval = 0;
        assert!(validate(&config).is_ok());
    }
}
