pub mod config;
pub mod db;
pub mod dexscreener;
pub mod observability;
pub mod solana;
pub mod types;
