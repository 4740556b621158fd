//! subenv-python: PyO3 bindings that serve the subenv protocol from inside a
//! Python interpreter.
//!
//! The parent launches `python -c "import subenv; subenv._run_worker()"`; from
//! then on the process is a dispatcher over a Python dict namespace.

mod convert;
mod interpreter;

use pyo3::exceptions::PyRuntimeError;
use pyo3::prelude::*;
use tracing::info;

use subenv_core::{PROTOCOL_VERSION, WorkerConfig, logging, run_worker};

pub use interpreter::PythonInterpreter;

#[pyfunction]
#[pyo3(signature = ())]
fn _run_worker(py: Python<'_>) -> PyResult<()> {
    logging::init_tracing();

    let mut interpreter = PythonInterpreter::new(py)?;
    info!(target: "subenv::worker", version = py.version(), "Python worker starting");

    py.detach(|| {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;

        rt.block_on(run_worker(&mut interpreter, WorkerConfig::default()))
            .map_err(|e| PyRuntimeError::new_err(format!("Worker error: {e}")))
    })
}

#[pymodule]
fn subenv(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add("PROTOCOL_VERSION", PROTOCOL_VERSION)?;

    m.add_function(wrap_pyfunction!(_run_worker, m)?)?;

    Ok(())
}
