pub use self::error::{Error, Result};
mod error;

use clap::Parser;
use cli::{Cli, Commands};
use modelatlas_core::error::Redirect;

mod cli;
mod commands;
mod logging;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        if let Error::App(app) = &e
            && app.redirect() == Some(Redirect::Home)
        {
            eprintln!("Run `modelatlas browse` to pick a model from the catalog.");
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    logging::init()?;

    let args = Cli::parse();

    match args.command {
        Commands::Version => {
            println!(
                "{} {} (core {})",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
                modelatlas_core::version()
            );
        }
        command => commands::run(command, args.handoff).await?,
    }

    Ok(())
}
