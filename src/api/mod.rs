// HTTP surface for presentation code: session events, status and ad-hoc estimator calls

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use server::ApiServer;
