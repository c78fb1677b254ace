pub mod build_runner;

pub use build_runner::{BuildOutput, BuildRunner};
