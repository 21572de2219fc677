//! Engine configuration with builder-style overrides.
//!
//! Role-dependent numbers live in the policy table, not here; this holds the
//! role-independent knobs.

const DEFAULT_OTP_TTL_SECONDS: i64 = 5 * 60;
const DEFAULT_OTP_RATE_WINDOW_SECONDS: i64 = 15 * 60;
const DEFAULT_OTP_RATE_CEILING: i64 = 5;
const DEFAULT_REFRESH_LINEAGE_MAX_SECONDS: i64 = 7 * 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct TrustConfig {
    otp_ttl_seconds: i64,
    otp_rate_window_seconds: i64,
    otp_rate_ceiling: i64,
    refresh_lineage_max_seconds: i64,
}

impl TrustConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            otp_ttl_seconds: DEFAULT_OTP_TTL_SECONDS,
            otp_rate_window_seconds: DEFAULT_OTP_RATE_WINDOW_SECONDS,
            otp_rate_ceiling: DEFAULT_OTP_RATE_CEILING,
            refresh_lineage_max_seconds: DEFAULT_REFRESH_LINEAGE_MAX_SECONDS,
        }
    }

    #[must_use]
    pub fn with_otp_ttl_seconds(mut self, seconds: i64) -> Self {
        self.otp_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_otp_rate_window_seconds(mut self, seconds: i64) -> Self {
        self.otp_rate_window_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_otp_rate_ceiling(mut self, ceiling: i64) -> Self {
        self.otp_rate_ceiling = ceiling;
        self
    }

    #[must_use]
    pub fn with_refresh_lineage_max_seconds(mut self, seconds: i64) -> Self {
        self.refresh_lineage_max_seconds = seconds;
        self
    }

    #[must_use]
    pub fn otp_ttl_seconds(&self) -> i64 {
        self.otp_ttl_seconds
    }

    #[must_use]
    pub fn otp_rate_window_seconds(&self) -> i64 {
        self.otp_rate_window_seconds
    }

    #[must_use]
    pub fn otp_rate_ceiling(&self) -> i64 {
        self.otp_rate_ceiling
    }

    #[must_use]
    pub fn refresh_lineage_max_seconds(&self) -> i64 {
        self.refresh_lineage_max_seconds
    }
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_overrides() {
        let config = TrustConfig::new();
        assert_eq!(config.otp_ttl_seconds(), DEFAULT_OTP_TTL_SECONDS);
        assert_eq!(
            config.otp_rate_window_seconds(),
            DEFAULT_OTP_RATE_WINDOW_SECONDS
        );
        assert_eq!(config.otp_rate_ceiling(), DEFAULT_OTP_RATE_CEILING);
        assert_eq!(
            config.refresh_lineage_max_seconds(),
            DEFAULT_REFRESH_LINEAGE_MAX_SECONDS
        );

        let config = config
            .with_otp_ttl_seconds(60)
            .with_otp_rate_window_seconds(120)
            .with_otp_rate_ceiling(3)
            .with_refresh_lineage_max_seconds(3600);
        assert_eq!(config.otp_ttl_seconds(), 60);
        assert_eq!(config.otp_rate_window_seconds(), 120);
        assert_eq!(config.otp_rate_ceiling(), 3);
        assert_eq!(config.refresh_lineage_max_seconds(), 3600);
    }
}
