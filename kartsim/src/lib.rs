pub mod core;
pub mod interfaces;
pub mod post;
pub mod pre;

/// Identity of a vehicle taking part in a race.
pub type VehicleId = u32;
/// Identity of a player occupying a vehicle.
pub type PlayerId = u32;
