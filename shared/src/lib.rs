pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod types;

pub use config::AppConfig;
pub use error::{Error, ErrorExt, ErrorResponse, Result};
pub use database::{DbPool, DbResult, DbTransaction};

#[cfg(test)]
mod tests {
    #[test]
    fn test_shared_module_compilation() {
        // Basic test to ensure the module compiles
        assert!(true);
    }
}
