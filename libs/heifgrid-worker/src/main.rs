// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Decoder worker binary.
//!
//! Spawned by the heifgrid controller with the handshake cookie in the
//! environment. Speaks the framed protocol over stdin/stdout; stdout is the
//! wire, so all logging goes to stderr.

use heifgrid_wire::{COOKIE_ENV, COOKIE_VALUE};
use heifgrid_worker::{serve, WorkerService};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".parse().unwrap()),
        )
        .init();

    match std::env::var(COOKIE_ENV) {
        Ok(value) if value == COOKIE_VALUE => {}
        _ => {
            tracing::error!(
                "{COOKIE_ENV} is missing or wrong; this binary is spawned by the heifgrid \
                 library and is not meant to be run directly"
            );
            std::process::exit(1);
        }
    }

    tracing::info!(
        "heifgrid worker starting (pid {}, protocol v{})",
        std::process::id(),
        heifgrid_wire::PROTOCOL_VERSION
    );

    let service = WorkerService::new();
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    serve(&service, &mut stdin.lock(), &mut stdout.lock())
}
