// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;

use anyhow::Context;
use clap::Parser;
use opennebula::OneCli;
use opm::{Action, Reconciler};
use slog::{crit, info, o, warn, Drain, Level, Logger};

fn parse_log_level(s: &str) -> anyhow::Result<Level> {
    match s {
        "critical" => Ok(Level::Critical),
        "error" => Ok(Level::Error),
        "warning" => Ok(Level::Warning),
        "info" => Ok(Level::Info),
        "debug" => Ok(Level::Debug),
        _ => Err(anyhow::anyhow!(
            "Invalid log level (expected critical, error, warning, info or debug)"
        )),
    }
}

fn parse_action(s: &str) -> anyhow::Result<Action> {
    Action::from_str(s).map_err(|_| anyhow::anyhow!("Unknown action {s}"))
}

#[derive(Debug, Parser)]
#[clap(about, version)]
/// Manages the VMs of an OpenNebula platform from JSON definition files
struct Args {
    /// Log level: critical, error, warning, info or debug
    #[clap(
        short,
        long,
        default_value = "warning",
        value_parser = parse_log_level
    )]
    log_level: Level,

    /// status, create-missing, synchronize, delete-unreferenced, delete-all
    /// or parse-only
    #[clap(value_parser = parse_action)]
    action: Action,

    /// Platform definition files, processed in order
    #[clap(required = true, action)]
    jsonfile: Vec<PathBuf>,
}

fn create_logger(level: Level) -> Logger {
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build();
    // Records are flushed before any process::exit.
    let drain = Mutex::new(drain).fuse();
    let drain = slog::LevelFilter(drain, level).fuse();

    if level == Level::Debug {
        Logger::root(
            drain,
            o!("location" => slog::FnValue(|record: &slog::Record| {
                format!("{}:{}", record.module(), record.line())
            })),
        )
    } else {
        Logger::root(drain, o!())
    }
}

fn run(args: &Args, log: &Logger) -> anyhow::Result<()> {
    let control_plane = OneCli::new(log.new(o!("component" => "opennebula")));
    let mut reconciler =
        Reconciler::new(control_plane, std::io::stdout(), log.clone());

    for path in &args.jsonfile {
        info!(log, "Processing definition file";
            "path" => %path.display(), "action" => %args.action);
        let definition = opm_definition::load(path, log).with_context(|| {
            format!("failed to load definition file {}", path.display())
        })?;
        reconciler.run(args.action, definition).with_context(|| {
            format!("failed to {} {}", args.action, path.display())
        })?;
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    let log = create_logger(args.log_level);

    let sigint_log = log.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        warn!(sigint_log, "Caught SIGINT (Ctrl-C), exiting.");
        std::process::exit(1);
    }) {
        warn!(log, "failed to install SIGINT handler"; "error" => %e);
    }

    if let Err(e) = run(&args, &log) {
        crit!(log, "{:#}", e);
        if args.log_level == Level::Debug {
            crit!(log, "{:?}", e);
        }
        std::process::exit(2);
    }
}
