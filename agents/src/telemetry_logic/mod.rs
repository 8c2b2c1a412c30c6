pub mod config;
pub mod decode;
pub mod ingest;
pub mod monitor;
pub mod supervisor;
