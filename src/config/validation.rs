use crate::config::types::{Config, CrawlerConfig, OutputConfig, PolitenessConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration, including the presence of a seed URL
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_seed(config.seed_url.as_deref())?;
    validate_settings(config)
}

/// Validates everything except the seed URL
///
/// Config files may omit the seed and have it supplied on the command line.
pub fn validate_settings(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_politeness_config(&config.politeness)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the seed URL: it must be present, absolute and http(s)
fn validate_seed(seed: Option<&str>) -> Result<(), ConfigError> {
    let seed = seed.ok_or_else(|| ConfigError::InvalidUrl("no seed URL given".to_string()))?;

    let url = Url::parse(seed)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "Seed URL '{}' must use HTTP or HTTPS",
            seed
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(ConfigError::InvalidUrl(format!(
            "Seed URL '{}' has no host",
            seed
        )));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 100, got {}",
            config.concurrency
        )));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "request_timeout_secs must be >= 1, got {}",
            config.request_timeout_secs
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates politeness configuration
fn validate_politeness_config(config: &PolitenessConfig) -> Result<(), ConfigError> {
    validate_delay("delay", config.delay)?;

    for (host, delay) in &config.per_host {
        validate_host_key(host)?;
        validate_delay(&format!("per-host delay for '{}'", host), *delay)?;
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.output_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "output_dir cannot be empty".to_string(),
        ));
    }

    if config.metadata_flush_interval < 1 {
        return Err(ConfigError::Validation(format!(
            "metadata_flush_interval must be >= 1, got {}",
            config.metadata_flush_interval
        )));
    }

    Ok(())
}

fn validate_delay(name: &str, secs: f64) -> Result<(), ConfigError> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(ConfigError::Validation(format!(
            "{} must be a non-negative number of seconds, got {}",
            name, secs
        )));
    }
    Ok(())
}

/// Validates a per-host key: a host name or IP, optionally followed by `:port`
fn validate_host_key(key: &str) -> Result<(), ConfigError> {
    let (host, port) = match key.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (key, None),
    };

    if let Some(port) = port {
        if port.parse::<u16>().is_err() {
            return Err(ConfigError::Validation(format!(
                "Host '{}' has an invalid port",
                key
            )));
        }
    }

    if host.is_empty() {
        return Err(ConfigError::Validation(
            "Host cannot be empty".to_string(),
        ));
    }

    if !host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "Host '{}' contains invalid characters",
            key
        )));
    }

    if host.starts_with('.')
        || host.ends_with('.')
        || host.starts_with('-')
        || host.ends_with('-')
        || host.contains("..")
    {
        return Err(ConfigError::Validation(format!(
            "Host '{}' is malformed",
            key
        )));
    }

    Ok(())
}
