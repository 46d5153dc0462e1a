pub mod config;
pub mod deployment;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;

pub use deployment::DeploymentImpl;
pub use routes::router as build_router;
