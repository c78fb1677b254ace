mod integrator;
mod shell_runner;

pub use integrator::{IntegratorDeps, ProjectIntegrator};
pub use shell_runner::ShellBuildRunner;
