pub mod build;
pub mod loader;
pub mod models;
pub mod validation;

pub use build::build_tree;
pub use loader::load_config;
pub use models::*;
pub use validation::{ProxyConfigValidator, ValidationError};
