pub mod driver;
pub mod effects;
pub mod handle_race;
pub mod progress;
pub mod race;
pub mod roster;
pub mod scheduler;
pub mod track;
pub mod vehicle;
