//! HTTP API of the computation manager
//!
//! # API Endpoints
//!
//! - `POST /api/v1/domains` - provision a pool, a volume and a domain
//! - `POST /api/v1/computations` - submit a computation
//! - `GET /api/v1/computations` - list computations
//! - `GET /api/v1/computations/:id` - look up one computation
//!
//! # Authentication
//!
//! When the manager runs with a secret, every request must carry it:
//! ```text
//! Authorization: Bearer <SECRET>
//! ```

pub mod auth;
pub mod errors;
pub mod handlers;
pub mod server;

pub use errors::ApiError;
pub use errors::HttpError;
pub use server::routes;
pub use server::ApiServer;
