pub mod events;
pub mod prescription;
