use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

pub struct CliOptions {
    pub log_level: Option<String>,
    pub version: bool,
    pub url: Option<String>,
    pub count: usize,
    pub concurrency: usize,
    pub max_retries: Option<u32>,
    pub base_backoff_ms: Option<u64>,
    pub token: Option<String>,
}

impl CliOptions {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            log_level: matches.get_one::<String>("log-level").cloned(),
            version: matches.get_flag("version"),
            url: matches.get_one::<String>("url").cloned(),
            count: matches.get_one::<usize>("count").copied().unwrap_or(1),
            concurrency: matches.get_one::<usize>("concurrency").copied().unwrap_or(1),
            max_retries: matches.get_one::<u32>("max-retries").copied(),
            base_backoff_ms: matches.get_one::<u64>("base-backoff-ms").copied(),
            token: matches.get_one::<String>("token").cloned(),
        }
    }
}

pub fn build_cli() -> Command {
    Command::new("ratelimit-client")
        .about("Send GET requests through an adaptive rate-limited HTTP client")
        .arg(
            Arg::new("url")
                .help("Target URL")
                .required_unless_present("version"),
        )
        .arg(
            Arg::new("count")
                .long("count")
                .short('n')
                .num_args(1)
                .value_parser(value_parser!(usize))
                .default_value("1")
                .help("Number of requests to send"),
        )
        .arg(
            Arg::new("concurrency")
                .long("concurrency")
                .short('c')
                .num_args(1)
                .value_parser(value_parser!(usize))
                .default_value("1")
                .help("Requests in flight at once, all sharing one client"),
        )
        .arg(
            Arg::new("max-retries")
                .long("max-retries")
                .num_args(1)
                .value_parser(value_parser!(u32))
                .help("Override RATELIMIT_MAX_RETRIES"),
        )
        .arg(
            Arg::new("base-backoff-ms")
                .long("base-backoff-ms")
                .num_args(1)
                .value_parser(value_parser!(u64))
                .help("Override RATELIMIT_BASE_BACKOFF_MS"),
        )
        .arg(
            Arg::new("token")
                .long("token")
                .num_args(1)
                .help("Bearer token (overrides RATELIMIT_TOKEN)"),
        )
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
}

pub fn init_logging(level: Option<&str>) {
    // Explicit level wins, else RUST_LOG, else info.
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(lvl) = level {
        builder.parse_filters(lvl);
    }
    let _ = builder.try_init();
}
