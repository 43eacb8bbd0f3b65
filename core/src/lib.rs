pub mod analysis;
pub mod assistant;
pub mod diets;
pub mod error;
pub mod gemini;
pub mod metrics;
pub mod models;
pub mod reference;
pub mod service;
pub mod store;
pub mod weather;
