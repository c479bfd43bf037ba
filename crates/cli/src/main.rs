mod args;
mod op;
mod ops;
mod process;
mod state;
mod version;

use args::Args;
use clap::{Parser, Subcommand};
use op::Op;
use ops::{Blob, Init, Login, Sign, VerifyPassword, Version};
use state::AppState;

command_enum! {
    (Init, Init),
    (Login, Login),
    (VerifyPassword, VerifyPassword),
    (Blob, Blob),
    (Sign, Sign),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Log at the configured level once initialized, warnings only before that
    let guards = match AppState::load(args.config_path.clone()) {
        Ok(state) => process::init_logging(state.log_level(), state.log_dir()),
        Err(_) => process::init_logging(tracing::Level::WARN, None),
    };

    let ctx = match op::OpContext::new(args.vault, args.config_path) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: Failed to create HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    let result = args.command.execute(&ctx).await;
    drop(guards);

    match result {
        Ok(output) => {
            println!("{}", output);
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
