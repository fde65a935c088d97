//! 🚀 logvex-cli: the front door, the bouncer, the maitre d' of logvex.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 Loads config, sets up logging, then lets the library do the heavy lifting.
//! Like a manager. 🦆

use anyhow::{Context, Result};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// 🚀 main(): the "I pressed F5 and held my breath" moment.
///
/// 1. Init tracing (`RUST_LOG` decides how chatty)
/// 2. First arg is the config file, default `logvex.toml`, optional on disk
/// 3. Load config (env `LOGVEX_*` + TOML)
/// 4. Run until the source ends or something fatal happens
/// 5. On failure: print the whole error chain, exit 1
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let path_arg = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "logvex.toml".to_string());

    // 🔒 a missing file is fine, env vars may carry everything; an unreadable path is not
    let config_file = std::path::Path::new(&path_arg);
    let config_file_that_exists = match config_file.try_exists().with_context(|| {
        format!(
            "💀 Couldn't tell whether the configuration file exists. Maybe a permissions thing, \
             maybe a pwd/cwd thing. Use an absolute path to be absolutely certain. Was checking here: '{}'",
            config_file.display()
        )
    })? {
        true => Some(config_file),
        false => None,
    };

    let app_config = logvex::app_config::load_config(config_file_that_exists).context(
        "💀 In logvex-cli, main, we couldn't load the config. Take a look at the file and the LOGVEX_* env vars.",
    )?;

    if let Err(err) = logvex::run(app_config).await {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion of sadness, one layer at a time
        let mut the_vibes_are_giving_connection_issues = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("error sending request")
                || cause_str.contains("connection refused")
                || cause_str.contains("Connection refused")
                || cause_str.contains("tcp connect error")
                || cause_str.contains("dns error")
            {
                the_vibes_are_giving_connection_issues = true;
            }
        }

        if the_vibes_are_giving_connection_issues {
            error!(
                "🔧 hint: looks like the index store isn't reachable. Check that Elasticsearch \
                 is actually running at the configured url. The journal kept everything that was \
                 buffered; a restart will replay it. ☕"
            );
        }

        // 🗑️ Exit with prejudice.
        std::process::exit(1);
    }

    Ok(())
}
