pub mod api;
pub mod config;
pub mod daemon;
pub mod db;
pub mod error;
pub mod rpc;
pub mod seed;

#[cfg(test)]
pub mod testutils;
