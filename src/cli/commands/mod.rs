use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ArgAction, ColorChoice, Command,
};

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("vigil")
        .about("Session and device trust engine")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("VIGIL_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("dsn")
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .env("VIGIL_DSN")
                .required(true),
        )
        .arg(
            Arg::new("otp-ttl")
                .long("otp-ttl")
                .help("One-time code lifetime in seconds")
                .default_value("300")
                .env("VIGIL_OTP_TTL")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("otp-rate-window")
                .long("otp-rate-window")
                .help("Rolling rate-limit window per destination, in seconds")
                .default_value("900")
                .env("VIGIL_OTP_RATE_WINDOW")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("otp-rate-ceiling")
                .long("otp-rate-ceiling")
                .help("Max codes per destination within the window")
                .default_value("5")
                .env("VIGIL_OTP_RATE_CEILING")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("refresh-lineage-max")
                .long("refresh-lineage-max")
                .help("Max age of a refresh lineage in seconds")
                .default_value("604800")
                .env("VIGIL_REFRESH_LINEAGE_MAX")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: -v (warn), -vv (info), -vvv (debug), -vvvv (trace)")
                .action(ArgAction::Count),
        )
}
