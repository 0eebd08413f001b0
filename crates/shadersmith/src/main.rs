mod cli;
mod paths;
mod report;
mod run;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Command::Normalize(args) => run::normalize(args),
        Command::Check(args) => {
            let config = paths::load_config(cli.config.as_deref())?;
            run::check(&config, args)
        }
        Command::Geometry(args) => run::geometry(args),
    }
}
