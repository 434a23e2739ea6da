use anyhow::Context;
use log::info;
use search_extract::cli::{self, CliOptions};
use search_extract::config::{self, Config};
use search_extract::usage::{Clock, FileUsageStore, SystemClock, UsageGuard, UsageService};
use search_extract::web::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli::build_cli().get_matches();
    let opts = CliOptions::from_matches(&matches);

    cli::init_logging(opts.log_level.as_deref());

    if opts.version {
        println!("search-extract {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    if opts.print_usage {
        let path = opts.usage_file.unwrap_or_else(config::usage_file_from_env);
        let limit = match opts.limit {
            Some(l) => l,
            None => config::daily_limit_from_env().map_err(anyhow::Error::msg)?,
        };
        let guard = UsageGuard::new(FileUsageStore::new(path), limit);
        println!("{}", serde_json::to_string(&guard.snapshot()?)?);
        return Ok(());
    }

    let mut cfg = Config::from_env().map_err(anyhow::Error::msg)?;
    if let Some(bind) = opts.bind {
        cfg.bind_addr = bind;
    }
    if let Some(path) = opts.usage_file {
        cfg.usage_file = path;
    }
    if let Some(limit) = opts.limit {
        cfg.daily_limit = limit;
    }

    let store = FileUsageStore::new(&cfg.usage_file);
    store
        .initialize(SystemClock.today())
        .with_context(|| format!("initializing {}", cfg.usage_file.display()))?;
    info!("usage file {}", store.path().display());
    let usage = UsageService::spawn(UsageGuard::new(store, cfg.daily_limit))?;
    let state = AppState::new(cfg, usage)?;
    web::serve(state).await
}
