//! mqstore entry point
//!
//! Installs logging, then hands everything else to [`cli::run`]. Errors are
//! printed to stderr and the process exits non-zero.

use mqstore::{cli, observability};

#[tokio::main]
async fn main() {
    if let Err(e) = observability::init_logging() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
    if let Err(e) = cli::run().await {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
