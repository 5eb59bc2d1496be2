pub mod init;
pub mod secrets;
pub mod synth;

pub use init::InitCommand;
pub use secrets::SecretsCommand;
pub use synth::SynthCommand;
