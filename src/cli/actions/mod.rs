pub mod server;

use secrecy::SecretString;

use crate::config::TrustConfig;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: SecretString,
        config: TrustConfig,
    },
}
