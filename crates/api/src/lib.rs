//! CIRO Coordinator Facade — the `/v1` HTTP API over job submission,
//! bidding, worker registration, network health, and event queries (§4.8).

pub mod middleware;
pub mod routes;
pub mod state;
