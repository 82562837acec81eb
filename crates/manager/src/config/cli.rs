use clap::{Parser, Subcommand};
use utils::version;

use crate::config::create_domain::CreateDomainArgs;
use crate::config::serve::ServeArgs;

#[derive(Parser)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the computation manager daemon
    Serve(Box<ServeArgs>),
    /// Provision one domain and print its name
    #[command(name = "create-domain")]
    CreateDomain(CreateDomainArgs),
}
