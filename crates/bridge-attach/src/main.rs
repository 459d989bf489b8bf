// SPDX-License-Identifier: MIT

//! Standalone TAP-to-bridge helper, invoked by `EmulatorDriver` once per TAP
//! it allocates (ported from `original_source/zhypervisor/tools/ifup.py`).
//! Takes one positional argument, a TAP interface name, and attaches it to
//! host bridge `br0`, bringing it up.

use std::process::{Command, ExitCode};

use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = std::env::args().skip(1);
    let Some(tap_name) = args.next() else {
        eprintln!("usage: zd-bridge-attach <tap-name>");
        return ExitCode::FAILURE;
    };

    tracing::info!(tap = %tap_name, "enabling interface");

    if let Err(e) = run("brctl", &["addif", "br0", &tap_name]) {
        tracing::error!(tap = %tap_name, error = %e, "brctl addif failed");
        return ExitCode::FAILURE;
    }
    if let Err(e) = run("ifconfig", &[&tap_name, "up"]) {
        tracing::error!(tap = %tap_name, error = %e, "ifconfig up failed");
        return ExitCode::FAILURE;
    }

    tracing::info!(tap = %tap_name, "enabled interface");
    ExitCode::SUCCESS
}

fn run(program: &str, args: &[&str]) -> std::io::Result<()> {
    let status = Command::new(program).args(args).status()?;
    if !status.success() {
        return Err(std::io::Error::other(format!("{program} exited with {status}")));
    }
    Ok(())
}
