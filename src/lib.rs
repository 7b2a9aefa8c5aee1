pub mod config;
pub mod gtpv2;
pub mod types;
