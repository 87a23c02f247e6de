//! lex-verify - Protocol verification harness for lex-lsp.
//!
//! Spawns the server executable, performs the initialize handshake, opens
//! a document, and waits for the expected diagnostic to be published.
//! Exits 0 when the expected diagnostic is observed and 1 on unexpected
//! content, timeout, or any other failure.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lex_verify::client::{path_to_uri, ServerHandle};
use lex_verify::harness::{run_session, Outcome, Scenario};

/// Resolve the server executable and optional document from argv/env.
///
/// The server path comes from the first argument, falling back to the
/// `LEX_LSP_PATH` environment variable. A second argument names a file to
/// open instead of the embedded default document.
fn parse_args() -> Result<(PathBuf, Option<PathBuf>)> {
    let mut args = std::env::args_os().skip(1);

    let server = match args.next() {
        Some(path) => PathBuf::from(path),
        None => match std::env::var_os("LEX_LSP_PATH") {
            Some(path) => PathBuf::from(path),
            None => bail!("Usage: lex-verify <path-to-lex-lsp> [document] (or set LEX_LSP_PATH)"),
        },
    };
    let document = args.next().map(PathBuf::from);

    Ok((server, document))
}

fn run() -> Result<Outcome> {
    let (server_path, document) = parse_args()?;

    let scenario = match document {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read document {}", path.display()))?;
            Scenario {
                uri: path_to_uri(&path),
                text,
                ..Scenario::default()
            }
        }
        None => Scenario::default(),
    };

    let mut server = ServerHandle::spawn(&server_path)?;
    let outcome = run_session(&mut server, &scenario);

    // Terminate the subprocess on every path before reporting
    server.shutdown();

    Ok(outcome?)
}

fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "lex_verify=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    info!("Starting lex-verify v{}", env!("CARGO_PKG_VERSION"));

    match run() {
        Ok(outcome) => {
            match &outcome {
                Outcome::ExpectedDiagnostic => info!("SUCCESS: Found expected diagnostic"),
                Outcome::UnexpectedDiagnostic(msg) => {
                    error!("FAILURE: Unexpected diagnostic message: {}", msg)
                }
                Outcome::Timeout => error!("FAILURE: Timed out waiting for diagnostics"),
            }
            ExitCode::from(outcome.exit_code() as u8)
        }
        Err(e) => {
            error!("Harness error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}
