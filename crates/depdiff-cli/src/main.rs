use std::env;
use std::process;
use std::sync::Arc;
use std::thread;

use atty::Stream;
use clap::Parser;
use color_eyre::{eyre::Report, Result};
use depdiff_core::{
    run_diff, CancellationToken, Config, DiffStatus, RunRequest, SharedEffects, SystemEffects,
};
use tracing::warn;

mod cli;
mod output;
mod style;

use cli::DepdiffCli;
use style::Style;

/// Conventional status for a run stopped by SIGINT.
const EXIT_INTERRUPTED: i32 = 130;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = DepdiffCli::parse();
    init_tracing(cli.trace, cli.verbose);

    let config = Config::from_env()?.with_workers(cli.jobs);
    let effects: SharedEffects = Arc::new(SystemEffects::from_config(&config)?);
    let output = if cli.output.is_absolute() {
        cli.output.clone()
    } else {
        env::current_dir()?.join(&cli.output)
    };
    let request = RunRequest {
        repo_path: cli.repo_path.clone(),
        old_ref: cli.ref1.clone(),
        new_ref: cli.ref2.clone(),
        lockfile: cli.lockfile.clone(),
        skip_unchanged: cli.skip_unchanged(),
        output,
    };

    let cancel = CancellationToken::new();
    install_interrupt_handler(cancel.clone());

    let style = Style::new(cli.no_color, atty::is(Stream::Stdout));
    let report = match run_diff(&effects, &config, &request, &cancel) {
        Ok(report) => report,
        Err(err) => {
            if cli.json {
                output::emit_error_json(&err)?;
                process::exit(1);
            }
            return Err(Report::new(err));
        }
    };

    if cli.json {
        output::emit_json(&report)?;
    } else if !cli.quiet {
        output::emit_human(&style, &report);
    }

    if report.cancelled || matches!(report.diff, DiffStatus::Skipped) {
        process::exit(EXIT_INTERRUPTED);
    }
    Ok(())
}

fn init_tracing(trace: bool, verbose: u8) {
    let level = if trace {
        "trace"
    } else {
        match verbose {
            0 => "error",
            1 => "info",
            _ => "debug",
        }
    };

    let filter = format!(
        "depdiff={level},depdiff_cli={level},depdiff_core={level},depdiff_domain={level}"
    );
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Exit without unwinding, taking the half-built working directory along.
fn abort(cancel: &CancellationToken) -> ! {
    if let Err(err) = cancel.remove_scratch() {
        eprintln!("depdiff ▸ could not remove the working directory: {err}");
    }
    process::exit(EXIT_INTERRUPTED);
}

/// First Ctrl-C stops scheduling new fetches; a second one exits immediately.
fn install_interrupt_handler(cancel: CancellationToken) {
    let spawned = thread::Builder::new()
        .name("depdiff-signal".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    warn!("cannot listen for Ctrl-C: {err}");
                    return;
                }
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                eprintln!("depdiff ▸ interrupted; waiting for in-flight packages (Ctrl-C again to abort)");
                cancel.cancel();
                if tokio::signal::ctrl_c().await.is_ok() {
                    abort(&cancel);
                }
            });
        });
    if let Err(err) = spawned {
        warn!("cannot listen for Ctrl-C: {err}");
    }
}
