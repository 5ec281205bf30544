// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![doc = "Runs a stored bytecode image once and prints the result as a JSON line.\n\n\
          Set `RUST_LOG=debug` to see host calls and harness steps on stderr.\n"]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use sandbox_host_runner::config::RunnerConfig;
use sandbox_host_runner::{Runner, StdClock, StdoutConsole};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: sandbox_host_runner <config.json> <location> [payload]";

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let config_path: PathBuf = args.next().map(PathBuf::from).context(USAGE)?;
    let location = args.next().context(USAGE)?;
    let mut payload = args.next().map(String::into_bytes).unwrap_or_default();
    if args.next().is_some() {
        bail!(USAGE);
    }

    let config = RunnerConfig::from_path(&config_path)?;
    let base_dir = config_path.parent().unwrap_or(Path::new("."));
    let mut runner = Runner::from_config(&config, base_dir)
        .with_context(|| format!("load {}", config_path.display()))?;

    let mut console = StdoutConsole;
    let mut clock = StdClock::new();
    let report = runner.run(&mut console, &mut clock, &location, &mut payload);
    println!(
        "{}",
        serde_json::to_string(&report).context("serialize report")?
    );
    Ok(())
}
