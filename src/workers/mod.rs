mod status_reporter;

pub use status_reporter::run_status_reporter;
