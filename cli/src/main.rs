#![allow(clippy::let_and_return, clippy::let_unit_value)]

mod args;
mod device;
mod render;

use anyhow::Context;
use anyhow::Result;

use clap::Parser as _;

use tracing::subscriber::set_global_default as set_global_subscriber;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::time::SystemTime;
use tracing_subscriber::FmtSubscriber;

use vitacore::resolve::CapstoneDisassembler;
use vitacore::CoreDumpImage;
use vitacore::ElfImage;
use vitacore::ReportBuilder;


/// The handler for the 'report' command.
fn report(report: args::Report) -> Result<()> {
    let args::Report { elf, full, dump } = report;
    let elf = ElfImage::open(&elf)
        .with_context(|| format!("failed to load ELF image {}", elf.display()))?;
    let dump = CoreDumpImage::open(&dump)
        .with_context(|| format!("failed to load core dump {}", dump.display()))?;
    let disasm = CapstoneDisassembler::new().context("failed to set up disassembler")?;

    let report = ReportBuilder::new(&dump, &elf)
        .disassembler(&disasm)
        .build();
    if full {
        let () = render::render_full(&report, elf.entry_point());
    } else {
        let () = render::render_terse(&report);
    }
    Ok(())
}

/// The handler for the 'launch' command.
fn launch(launch: args::Launch) -> Result<()> {
    let args::Launch { host, title_id } = launch;
    let () = device::launch(&host, &title_id)
        .with_context(|| format!("failed to launch {title_id} on {host}"))?;
    device::relay_logs()
}


fn main() -> Result<()> {
    let args = args::Args::parse();
    let level = match args.verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_span_events(FmtSpan::FULL)
        .with_timer(SystemTime)
        .finish();

    let () =
        set_global_subscriber(subscriber).with_context(|| "failed to set tracing subscriber")?;

    match args.command {
        args::Command::Report(args) => self::report(args),
        args::Command::Launch(args) => self::launch(args),
        args::Command::Logs => device::relay_logs(),
    }
}
