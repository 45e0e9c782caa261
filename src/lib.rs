pub mod cache;
pub mod config;
pub mod models;
pub mod registry;
pub mod search;
pub mod utils;
pub mod zim;

#[cfg(test)]
pub(crate) mod testutil;
