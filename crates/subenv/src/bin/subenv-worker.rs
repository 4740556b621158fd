//! Worker process serving the script interpreter over stdio.
//!
//! Launched by a parent session (see `CommandSpawner`); not meant to be run by hand.

use std::process;

use subenv::{ScriptInterpreter, WorkerConfig, logging, run_worker};

fn main() {
    logging::init_tracing();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build runtime");
            process::exit(1);
        }
    };

    let mut interpreter = ScriptInterpreter::new();
    if let Err(e) = runtime.block_on(run_worker(&mut interpreter, WorkerConfig::default())) {
        tracing::error!(error = %e, "Worker failed");
        process::exit(1);
    }
}
