pub mod client;

pub use client::{TreasuryClient, TreasuryError};
