pub mod claim;
pub mod downtime;
pub mod emission;
pub mod error;
pub mod math;
pub mod params;
pub mod report;
pub mod settings;
pub mod settlement;
pub mod stats;
pub mod store;
pub mod types;
