pub mod bus;
pub mod distributor;
pub mod eligibility;
pub mod jobs;
pub mod reputation;
pub mod telemetry;
pub mod watchdog;
pub mod workers;
