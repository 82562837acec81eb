use anyhow::Result;
use clap::Parser;
use manager::cmd;
use manager::config::Cli;
use manager::config::Commands;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(serve_args) => cmd::run_serve(*serve_args).await,
        Commands::CreateDomain(create_domain_args) => {
            cmd::run_create_domain(create_domain_args).await
        }
    }
}
