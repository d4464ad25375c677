// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanlayer — turns scanned PDFs into searchable documents.
//
// Entry point. Initialises logging, resolves configuration, and runs the
// requested command.

mod cli;
mod services;

use std::process::ExitCode;

use clap::Parser;
use cli::{Cli, Command};
use services::AppServices;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Scanlayer starting");
    let svc = match AppServices::init() {
        Ok(svc) => svc,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::Doctor => {
            let statuses = svc.doctor().await;
            let mut all_ok = true;
            for status in &statuses {
                let state = if status.available { "ok" } else { "MISSING" };
                println!("{:<11} {:<8} {}", status.role.label(), state, status.program.display());
                all_ok &= status.available;
            }
            if all_ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
        }
        Command::Ocr(args) => match svc.run_ocr(&args).await {
            Ok(Some(outcome)) if outcome.success => ExitCode::SUCCESS,
            Ok(Some(_)) => ExitCode::FAILURE,
            Ok(None) => ExitCode::from(130),
            Err(e) => {
                tracing::error!(error = %e, "ocr failed");
                ExitCode::FAILURE
            }
        },
    }
}
