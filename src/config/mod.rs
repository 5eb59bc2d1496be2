pub mod ci;
pub mod environment;

pub use environment::{DeployConfig, EnvironmentProfile};
