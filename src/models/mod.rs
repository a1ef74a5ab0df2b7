pub mod market;
pub mod analytics;
