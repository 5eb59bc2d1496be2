mod commands;
mod config;
mod context;
mod output;
mod secrets;
mod stacks;
mod synth;
mod traits;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{InitCommand, SecretsCommand, SynthCommand};
use context::Context;

#[derive(Parser)]
#[command(name = "groundwork")]
#[command(about = "Groundwork - declare and synthesize AWS container platform infrastructure", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scaffold an environment configuration and secrets skeleton
    Init,

    /// Synthesize CloudFormation templates for an environment
    Synth {
        /// Environment to synthesize (e.g. dev, production)
        #[arg(short, long, env = "ENVIRONMENT")]
        environment: String,

        /// Output directory (defaults to out/<environment>)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Manage SOPS-encrypted secrets files
    Secrets {
        #[command(subcommand)]
        action: SecretsAction,
    },
}

#[derive(Subcommand)]
enum SecretsAction {
    /// Encrypt changed *.dec.yaml files under secrets/
    Encrypt {
        /// Directory to search (defaults to secrets/)
        #[arg(long)]
        base_dir: Option<String>,

        /// Run 'sops updatekeys' after encrypting
        #[arg(long)]
        update_keys: bool,
    },

    /// Decrypt *.enc.yaml files under secrets/
    Decrypt {
        /// Directory to search (defaults to secrets/)
        #[arg(long)]
        base_dir: Option<String>,
    },

    /// Re-encrypt *.enc.yaml files against the current key group
    Updatekeys {
        /// Directory to search (defaults to secrets/)
        #[arg(long)]
        base_dir: Option<String>,
    },

    /// Decrypt one environment's secrets into a .env file for CI
    Export {
        /// Environment whose secrets to export
        #[arg(short, long, env = "ENVIRONMENT")]
        environment: String,

        /// Output file (defaults to .env.<environment>)
        #[arg(short, long)]
        output: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let ctx = Context::new();

    match cli.command {
        Commands::Init => {
            InitCommand::execute(&ctx)?;
        }
        Commands::Synth {
            environment,
            output,
        } => {
            SynthCommand::execute(&ctx, &environment, output.as_deref())?;
        }
        Commands::Secrets { action } => match action {
            SecretsAction::Encrypt {
                base_dir,
                update_keys,
            } => {
                SecretsCommand::execute_encrypt(&ctx, base_dir.as_deref(), update_keys)?;
            }
            SecretsAction::Decrypt { base_dir } => {
                SecretsCommand::execute_decrypt(&ctx, base_dir.as_deref())?;
            }
            SecretsAction::Updatekeys { base_dir } => {
                SecretsCommand::execute_updatekeys(&ctx, base_dir.as_deref())?;
            }
            SecretsAction::Export {
                environment,
                output,
            } => {
                SecretsCommand::execute_export(&ctx, &environment, output.as_deref())?;
            }
        },
    }

    Ok(())
}
