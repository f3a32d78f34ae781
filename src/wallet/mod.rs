// Wallet: key pair and spend construction

mod keys;
mod tx_builder;

pub use keys::Wallet;
