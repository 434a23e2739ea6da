use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;

pub struct CliOptions {
    pub log_level: Option<String>,
    pub version: bool,
    pub bind: Option<String>,
    pub usage_file: Option<PathBuf>,
    pub limit: Option<u32>,
    pub print_usage: bool,
}

impl CliOptions {
    pub fn from_matches(m: &ArgMatches) -> Self {
        Self {
            log_level: m.get_one::<String>("log-level").cloned(),
            version: m.get_flag("version"),
            bind: m.get_one::<String>("bind").cloned(),
            usage_file: m.get_one::<PathBuf>("usage-file").cloned(),
            limit: m.get_one::<u32>("limit").copied(),
            print_usage: m.get_flag("print-usage"),
        }
    }
}

pub fn build_cli() -> Command {
    Command::new("search-extract")
        .about("CSV upload front-end: web search + generative extraction with a daily API budget")
        .disable_version_flag(true)
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .num_args(1)
                .help("Override RUST_LOG level (e.g., info, debug)"),
        )
        .arg(
            Arg::new("version")
                .long("version")
                .help("Print version and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("bind")
                .long("bind")
                .num_args(1)
                .help("Listen address (overrides BIND_ADDR)"),
        )
        .arg(
            Arg::new("usage-file")
                .long("usage-file")
                .num_args(1)
                .value_parser(value_parser!(PathBuf))
                .help("Path of the daily usage counter (overrides USAGE_FILE)"),
        )
        .arg(
            Arg::new("limit")
                .long("limit")
                .num_args(1)
                .value_parser(value_parser!(u32))
                .help("Metered calls allowed per day (overrides API_DAILY_LIMIT)"),
        )
        .arg(
            Arg::new("print-usage")
                .long("print-usage")
                .help("Print today's usage as JSON and exit")
                .action(ArgAction::SetTrue),
        )
}

pub fn init_logging(level: Option<&str>) {
    // Respect explicit level, else default to info, allow env override via RUST_LOG
    let env = env_logger::Env::default().default_filter_or("info");
    let mut builder = env_logger::Builder::from_env(env);
    if let Some(lvl) = level {
        builder.parse_filters(lvl);
    }
    builder.init();
}
