pub mod events;
pub mod ports;
