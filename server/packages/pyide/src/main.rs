use pyide::cli::run_pyide;

fn main() {
    if let Err(err) = run_pyide() {
        tracing::error!(error = %err, "pyide failed");
        std::process::exit(1);
    }
}
