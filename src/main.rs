mod assets;
mod catalog;
mod cli;
mod config;
mod dedupe;
mod error;
mod ids;
mod migrate;
mod rename;
mod reorder;
mod report;
mod sizes;
mod thumbnails;
mod utils;

use cli::Cli;
use log::error;

fn main() {
    if let Err(err) = Cli::handle_command_line() {
        error!("{:?}", err);
        eprintln!("{}", err);
        std::process::exit(err.exit_code());
    }
}
