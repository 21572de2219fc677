//! Code delivery collaborator.
//!
//! The notification transport is a black box that can fail independently of
//! this core's own state. Dispatch happens after the credential transaction
//! commits; a failed dispatch is compensated by deleting the credential, not
//! by holding a lock across the network call.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::otp::code::{redacted_destination, Purpose};

#[derive(Clone, Debug)]
pub struct CodeMessage {
    pub destination: String,
    pub purpose: Purpose,
    /// Raw code, handed to the transport exactly once. Implementations must
    /// not log it.
    pub code: String,
}

#[async_trait]
pub trait CodeSender: Send + Sync {
    /// Deliver a message or return an error so the issuer can compensate.
    async fn send(&self, message: &CodeMessage) -> Result<()>;
}

/// Local dev sender: logs that a dispatch happened, never the code.
#[derive(Clone, Debug)]
pub struct LogCodeSender;

#[async_trait]
impl CodeSender for LogCodeSender {
    async fn send(&self, message: &CodeMessage) -> Result<()> {
        info!(
            destination = %redacted_destination(&message.destination),
            purpose = %message.purpose.as_str(),
            "code dispatch stub"
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{CodeMessage, CodeSender};
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Sender that records messages, optionally failing every dispatch.
    pub struct RecordingSender {
        pub sent: Mutex<Vec<CodeMessage>>,
        pub fail: bool,
    }

    impl RecordingSender {
        pub fn new(fail: bool) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    #[async_trait]
    impl CodeSender for RecordingSender {
        async fn send(&self, message: &CodeMessage) -> Result<()> {
            if self.fail {
                bail!("transport unavailable");
            }
            self.sent
                .lock()
                .expect("sender mutex poisoned")
                .push(message.clone());
            Ok(())
        }
    }
}
