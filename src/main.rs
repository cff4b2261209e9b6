use std::io;

use clap::Parser;
use env_logger::Env;
use log_whisperer::{
    cli::{Args, Commands},
    config::ConfigStore,
    render,
    session::run_chat,
    setup::{run_configure, run_reset, run_status, Prompter},
};

fn main() {
    env_logger::Builder::from_env(Env::default().filter_or("LOG_WHISPERER_LOG", "warn")).init();
    let args = Args::parse();
    let res = ConfigStore::from_override(args.config).and_then(|store| match args.command {
        Commands::Configure { skip_test } => {
            run_configure(&store, &mut Prompter::stdio(), skip_test)
        }
        Commands::Chat {
            log_file,
            save,
            max_chars,
        } => run_chat(&store, &log_file, save, max_chars),
        Commands::Status => run_status(&store, &mut io::stdout(), render::stdout_is_tty()),
        Commands::Reset { yes } => run_reset(&store, &mut Prompter::stdio(), yes),
    });
    res.unwrap_or_else(|e| {
        eprintln!("{}", e);
        std::process::exit(1);
    });
}
