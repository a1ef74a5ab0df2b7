pub use super::crypto_market::Entity as CryptoMarket;
