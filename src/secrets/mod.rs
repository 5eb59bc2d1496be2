pub mod loader;
pub mod sops;

pub use loader::{SecretsLoader, flatten_env_vars};
pub use sops::SopsClient;
