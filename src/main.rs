use clap::Parser;
use fixturize::cmd::Cli;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = fixturize::cmd::run(cli) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
