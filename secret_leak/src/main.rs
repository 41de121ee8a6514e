use clap::Parser;
use env_logger::{Builder, Env, Target};
use log::error;
use secret_leak::config::LeakConfig;
use secret_leak::victim::WriterTrigger;
use std::process::ExitCode;

fn main() -> ExitCode {
    let config = LeakConfig::parse();

    // stdout belongs to the victim
    Builder::from_env(Env::default().default_filter_or(config.log_level().as_str()))
        .target(Target::Stderr)
        .init();

    let mut victim = WriterTrigger::stdout();
    match secret_leak::run(&config, &mut victim) {
        Ok(secret) => {
            eprintln!("\nLeaked secret : {}", secret);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
