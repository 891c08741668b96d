use crate::core::{ProfError, Result};
use std::time::Duration;

/// Capture harness configuration
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Time between capture starts
    pub tick_interval: Duration,

    /// How long each capture records
    pub capture_duration: Duration,

    /// Sampling frequency in Hz
    pub sampling_frequency: i32,

    /// Shared libraries whose frames the sampler skips
    pub blocklist: Vec<String>,

    /// Capacity of the error stream
    pub error_buffer: usize,
}

impl HarnessConfig {
    pub fn new() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            capture_duration: Duration::from_secs(10),
            sampling_frequency: 100,
            blocklist: ["libc", "libgcc", "pthread", "vdso"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            error_buffer: 32,
        }
    }

    /// Set the tick interval
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the capture duration
    pub fn capture_duration(mut self, duration: Duration) -> Self {
        self.capture_duration = duration;
        self
    }

    /// Set the sampling frequency
    pub fn sampling_frequency(mut self, frequency: i32) -> Self {
        self.sampling_frequency = frequency;
        self
    }

    /// Replace the blocklist
    pub fn blocklist(mut self, blocklist: Vec<String>) -> Self {
        self.blocklist = blocklist;
        self
    }

    /// Set the error stream capacity
    pub fn error_buffer(mut self, capacity: usize) -> Self {
        self.error_buffer = capacity;
        self
    }

    /// Defaults overridden by `PGOPROF_INTERVAL_SECS`, `PGOPROF_DURATION_SECS`,
    /// `PGOPROF_FREQUENCY`, `PGOPROF_BLOCKLIST` (comma separated) and
    /// `PGOPROF_ERROR_BUFFER`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();

        if let Some(raw) = lookup("PGOPROF_INTERVAL_SECS") {
            config.tick_interval = Duration::from_secs(parse_number("PGOPROF_INTERVAL_SECS", &raw)?);
        }
        if let Some(raw) = lookup("PGOPROF_DURATION_SECS") {
            config.capture_duration = Duration::from_secs(parse_number("PGOPROF_DURATION_SECS", &raw)?);
        }
        if let Some(raw) = lookup("PGOPROF_FREQUENCY") {
            config.sampling_frequency = parse_number("PGOPROF_FREQUENCY", &raw)?;
        }
        if let Some(raw) = lookup("PGOPROF_BLOCKLIST") {
            config.blocklist = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(raw) = lookup("PGOPROF_ERROR_BUFFER") {
            config.error_buffer = parse_number("PGOPROF_ERROR_BUFFER", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(ProfError::InvalidConfig("tick interval must be positive".to_string()));
        }
        if self.capture_duration.is_zero() {
            return Err(ProfError::InvalidConfig("capture duration must be positive".to_string()));
        }
        if self.sampling_frequency <= 0 {
            return Err(ProfError::InvalidConfig(format!(
                "sampling frequency must be positive, got {}",
                self.sampling_frequency
            )));
        }
        if self.error_buffer == 0 {
            return Err(ProfError::InvalidConfig("error buffer must hold at least one error".to_string()));
        }
        Ok(())
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| ProfError::InvalidConfig(format!("{} must be a number, got '{}'", key, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = HarnessConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sampling_frequency, 100);
    }

    #[test]
    fn test_env_overrides() {
        let config = HarnessConfig::from_lookup(lookup(&[
            ("PGOPROF_INTERVAL_SECS", "30"),
            ("PGOPROF_DURATION_SECS", "5"),
            ("PGOPROF_BLOCKLIST", "libc, vdso ,"),
        ]))
        .unwrap();

        assert_eq!(config.tick_interval, Duration::from_secs(30));
        assert_eq!(config.capture_duration, Duration::from_secs(5));
        assert_eq!(config.blocklist, vec!["libc", "vdso"]);
    }

    #[test]
    fn test_bad_env_value_is_reported() {
        let err = HarnessConfig::from_lookup(lookup(&[("PGOPROF_FREQUENCY", "fast")])).unwrap_err();
        assert!(matches!(err, ProfError::InvalidConfig(msg) if msg.contains("PGOPROF_FREQUENCY")));
    }

    #[test]
    fn test_zero_interval_is_invalid() {
        let config = HarnessConfig::new().tick_interval(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
