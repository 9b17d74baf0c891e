pub mod armory;
pub mod change;
pub mod errors;
pub mod persist;
pub mod raid_config;
pub mod strike;
pub mod tactic;
pub mod vessel;
