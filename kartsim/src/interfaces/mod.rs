pub mod messages;
pub mod probes;
