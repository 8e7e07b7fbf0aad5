use std::path::PathBuf;

use clap::ArgAction;
use clap::Args as Arguments;
use clap::Parser;
use clap::Subcommand;


/// A command line interface for debugging applications on a PS Vita.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
    /// Increase verbosity (can be supplied multiple times).
    #[arg(short = 'v', long = "verbose", global = true, action = ArgAction::Count)]
    pub verbosity: u8,
}


#[derive(Debug, Subcommand)]
pub enum Command {
    /// Symbolize a core dump and render a crash report.
    Report(Report),
    /// (Re)launch a title on the device and tail its logs.
    Launch(Launch),
    /// Tail log messages the device broadcasts over UDP.
    Logs,
}


#[derive(Debug, Arguments)]
pub struct Report {
    /// The path to the application's ELF image.
    #[clap(short, long)]
    pub elf: PathBuf,
    /// Report on all threads and list loaded modules, instead of only
    /// the crashed threads.
    #[clap(long)]
    pub full: bool,
    /// The path to the core dump, plain or gzip compressed.
    pub dump: PathBuf,
}

#[derive(Debug, Arguments)]
pub struct Launch {
    /// The device's IP address or host name.
    #[clap(long)]
    pub host: String,
    /// The ID of the title to launch, e.g., ABCD01234.
    pub title_id: String,
}
