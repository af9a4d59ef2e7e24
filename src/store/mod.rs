pub mod cooldown;
pub mod postgres;
