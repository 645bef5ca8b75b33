pub mod registry;
pub mod verification_models;
pub mod verification_service;

pub use registry::*;
pub use verification_models::*;
pub use verification_service::*;
