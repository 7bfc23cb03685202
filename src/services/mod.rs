pub mod ingest;
pub mod pricing;
pub mod security;

pub use ingest::*;
pub use pricing::*;
pub use security::*;
