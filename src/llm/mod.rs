pub mod classifier;
pub mod config;
pub mod models;
pub mod prompt;
pub mod relay_client;

pub use classifier::{BatchProgress, ClassificationResult, Classifier};
pub use config::ClassifierConfig;
pub use relay_client::RelayClient;
