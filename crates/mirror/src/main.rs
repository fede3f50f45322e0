mod cli;
mod run;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Command::Effects => run::list_effects(),
        Command::Shader(args) => run::print_shader(&args.id),
        Command::Run(args) => run::run(args),
    }
}
