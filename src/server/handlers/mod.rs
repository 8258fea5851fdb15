pub mod bids;
pub mod config;
pub mod locations;
pub mod merit;
pub mod presence;
pub mod safety;
pub mod scores;
pub mod trips;
pub mod zones;
