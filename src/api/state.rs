//! Shared state handed to every handler.

use crate::config::TrustConfig;
use crate::otp::OtpService;
use crate::session::SessionService;

pub struct TrustState {
    config: TrustConfig,
    otp: OtpService,
    sessions: SessionService,
}

impl TrustState {
    #[must_use]
    pub fn new(config: TrustConfig, otp: OtpService, sessions: SessionService) -> Self {
        Self {
            config,
            otp,
            sessions,
        }
    }

    #[must_use]
    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    #[must_use]
    pub fn otp(&self) -> &OtpService {
        &self.otp
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionService {
        &self.sessions
    }
}
