use std::path::PathBuf;

use clap::Parser;

/// Axon agent runner
#[derive(Debug, Parser)]
#[command(name = "axon", about = "Unified LLM streaming proxy and agent runner")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "axon.toml", env = "AXON_CONFIG")]
    pub config: PathBuf,

    /// Registered model to run the interaction against
    #[arg(short, long, env = "AXON_MODEL")]
    pub model: String,

    /// Session identifier recorded in the audit log
    #[arg(long, default_value = "cli")]
    pub session: String,

    /// User identifier recorded in the audit log
    #[arg(long, default_value = "cli")]
    pub user: String,

    /// Question put to the agent
    pub question: String,
}
