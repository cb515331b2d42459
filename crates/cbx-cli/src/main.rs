//! 🚀 cbx-cli: the front door of the ReportDataSource controller.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 Loads config, sets up logging, and hands the rest to `cbx::run`.
//! When the lights go out it prints what got done. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// 🧾 Reconciles ReportDataSources into query-engine tables.
#[derive(Debug, Parser)]
#[command(name = "cbx", version, about)]
struct Args {
    /// TOML config file. `CBX_*` environment variables fill in whatever it leaves out.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// 🚀 main(): init tracing, load config, run until Ctrl-C, print the damage.
#[tokio::main]
async fn main() -> Result<()> {
    // 📡 RUST_LOG wins, otherwise info
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let the_args = Args::parse();

    // 🔒 Validate the config file exists before we get too emotionally attached
    if let Some(the_path) = &the_args.config {
        let the_file_is_there = the_path.try_exists().with_context(|| {
            format!(
                "💀 couldn't check whether the config file exists. If it's a relative path, \
                 try an absolute one. Was checking here: '{}'",
                the_path.display()
            )
        })?;
        if !the_file_is_there {
            anyhow::bail!("💀 config file '{}' does not exist", the_path.display());
        }
    }

    let app_config = cbx::app_config::load_config(the_args.config.as_deref())
        .context("💀 In cbx-cli, main, we couldn't load the configuration. Check the file and the CBX_* variables")?;

    match cbx::run(app_config).await {
        Ok(the_stats) => {
            let mut the_table = Table::new();
            the_table
                .load_preset(UTF8_FULL)
                .set_header(vec!["synced", "retried", "dropped"])
                .add_row(vec![
                    the_stats.synced.to_string(),
                    the_stats.retried.to_string(),
                    the_stats.dropped.to_string(),
                ]);
            println!("{the_table}");
            Ok(())
        }
        Err(err) => {
            error!("💀 error: {}", err);
            // -- 🧅 peel the onion of sadness, one layer at a time
            let mut the_vibes_are_giving_connection_issues = false;
            for cause in err.chain().skip(1) {
                error!("⚠️  cause: {}", cause);
                let cause_str = cause.to_string();
                if cause_str.contains("error sending request")
                    || cause_str.contains("onnection refused")
                    || cause_str.contains("tcp connect error")
                    || cause_str.contains("dns error")
                {
                    the_vibes_are_giving_connection_issues = true;
                }
            }
            if the_vibes_are_giving_connection_issues {
                error!(
                    "🔧 hint: something isn't reachable. Check the apiserver (`kubectl get ns`), \
                     the Presto coordinator, and the S3 endpoint. Even servers need a nudge sometimes. ☕"
                );
            }
            std::process::exit(1);
        }
    }
}
