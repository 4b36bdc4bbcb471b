#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Binary entrypoint that wires the cartage pipeline together and runs one
//! selection-to-submission cycle.

use cartage_app::{AppResult, run_app};

/// Bootstraps the cartage application and blocks until the run completes.
#[tokio::main]
async fn main() -> AppResult<()> {
    run_app().await
}
