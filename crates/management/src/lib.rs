//! Campaign editor backend: campaigns, variants, targeting rules, component
//! pools and on-demand variant generation.
//!
//! Data stored in DashMap (development); swap to PostgreSQL for production.
//! The store doubles as the decisioning core's snapshot source and
//! generation repository.

pub mod handlers;
pub mod models;
pub mod router;
pub mod store;

pub use handlers::ManagementState;
pub use router::management_router;
pub use store::ManagementStore;
