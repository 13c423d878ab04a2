use console::style;
use env_logger::{Builder, Env};
use log::{Level, LevelFilter};
use std::io::Write;

fn level_tag(level: Level) -> String {
    match level {
        Level::Error => format!("{}", style("ERROR").red().bold()),
        Level::Warn => format!("{}", style("WARN ").yellow().bold()),
        Level::Info => format!("{}", style("INFO ").green()),
        Level::Debug => format!("{}", style("DEBUG").cyan()),
        Level::Trace => format!("{}", style("TRACE").dim()),
    }
}

/// Initialize logger based on verbose flag
///
/// `RUST_LOG` still wins over the default filter.
pub fn init_logger(verbose: bool) {
    let default = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };
    let env = Env::default().default_filter_or(default.as_str());

    Builder::from_env(env)
        .format(|buf, record| writeln!(buf, "{} {}", level_tag(record.level()), record.args()))
        .try_init()
        .ok();
}
