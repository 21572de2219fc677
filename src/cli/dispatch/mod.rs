use crate::cli::actions::Action;
use crate::config::TrustConfig;
use anyhow::Result;
use secrecy::SecretString;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let config = TrustConfig::new()
        .with_otp_ttl_seconds(matches.get_one::<i64>("otp-ttl").copied().unwrap_or(300))
        .with_otp_rate_window_seconds(
            matches
                .get_one::<i64>("otp-rate-window")
                .copied()
                .unwrap_or(900),
        )
        .with_otp_rate_ceiling(
            matches
                .get_one::<i64>("otp-rate-ceiling")
                .copied()
                .unwrap_or(5),
        )
        .with_refresh_lineage_max_seconds(
            matches
                .get_one::<i64>("refresh-lineage-max")
                .copied()
                .unwrap_or(604_800),
        );

    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: matches
            .get_one("dsn")
            .map(|s: &String| SecretString::from(s.to_string()))
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --dsn"))?,
        config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use secrecy::ExposeSecret;

    #[test]
    fn builds_server_action_from_matches() -> Result<()> {
        let matches = commands::new().try_get_matches_from([
            "vigil",
            "--dsn",
            "postgres://localhost/vigil",
            "--otp-rate-ceiling",
            "3",
        ])?;
        let Action::Server { port, dsn, config } = handler(&matches)?;
        assert_eq!(port, 8080);
        assert_eq!(dsn.expose_secret(), "postgres://localhost/vigil");
        assert_eq!(config.otp_rate_ceiling(), 3);
        Ok(())
    }
}
