//! Rendering of crash reports for terminal consumption.

use vitacore::dump::status_str;
use vitacore::dump::stop_reason_str;
use vitacore::report::CrashReport;
use vitacore::report::StackWord;
use vitacore::report::ThreadReport;
use vitacore::resolve::AddressNotation;
use vitacore::resolve::Resolution;


pub const COLOR_RED: &str = "\x1b[31;1m";
pub const COLOR_BLUE: &str = "\x1b[34;1m";
pub const COLOR_END: &str = "\x1b[0m";

const CRASH_MARKER: &str = "\u{1f4a3}\u{1f4a3}";
const SP_MARKER: &str = "\u{1f6a9}";


fn notation_str(notation: &AddressNotation) -> String {
    let loc = match &notation.resolution {
        Resolution::Unresolved => String::from("unresolved"),
        _ => format!("{notation}"),
    };
    let mut text = format!("{}: {:#010x} ({loc})", notation.label, notation.addr);
    if let Some(disasm) = &notation.disasm {
        let () = text.push_str(&format!(" [{disasm}]"));
    }
    text
}

fn stack_word_line(word: &StackWord) -> String {
    let (prefix, suffix) = if word.is_sp {
        (format!("{COLOR_RED}{SP_MARKER}"), format!("{SP_MARKER}{COLOR_END}"))
    } else {
        (String::from("  "), String::new())
    };
    let loc = match &word.notation.resolution {
        Resolution::Unresolved => String::new(),
        _ => format!(" ({})", word.notation),
    };
    format!(
        "{prefix}{:#010x}: {:#010x}{loc}{suffix}",
        word.addr, word.value
    )
}

fn render_crashed_thread(thread: &ThreadReport) {
    println!(
        "{COLOR_RED}{CRASH_MARKER} Thread {:#x} ({}) crashed due to {:#x} ({}) {CRASH_MARKER}",
        thread.uid,
        thread.name,
        thread.stop_reason,
        stop_reason_str(thread.stop_reason),
    );
    println!("{}{COLOR_END}", notation_str(&thread.pc));
    println!();
    if let Some(lr) = &thread.lr {
        println!("{}", notation_str(lr));
    }
    for word in &thread.stack {
        println!("{}", stack_word_line(word));
    }
}

/// Render only the crashed threads, devtool style.
pub fn render_terse(report: &CrashReport) {
    if report.highlights.is_empty() {
        println!("no crashed threads found in dump");
        return
    }
    for idx in &report.highlights {
        let () = render_crashed_thread(&report.threads[*idx]);
    }
}

/// Render all threads along with the loaded modules.
pub fn render_full(report: &CrashReport, entry_point: vitacore::Addr) {
    println!("entry point: {entry_point:#010x}");
    println!();
    println!("modules:");
    for module in &report.modules {
        println!("  {}", module.name);
        for segment in &module.segments {
            println!(
                "    {:#010x}..{:#010x} {} align {:#x}",
                segment.start,
                u64::from(segment.start) + u64::from(segment.size),
                segment.perms(),
                segment.align,
            );
        }
    }
    println!();

    for thread in &report.threads {
        if thread.crashed {
            let () = render_crashed_thread(thread);
        } else {
            println!(
                "Thread {:#x} ({}) {}",
                thread.uid,
                thread.name,
                status_str(thread.status),
            );
            println!("{}", notation_str(&thread.pc));
        }

        let regs = &thread.regs;
        for (idx, chunk) in regs.gpr.chunks(4).enumerate() {
            let line = chunk
                .iter()
                .enumerate()
                .map(|(reg, value)| format!("r{:<2} {value:#010x}", idx * 4 + reg))
                .collect::<Vec<_>>()
                .join("  ");
            println!("  {line}");
        }
        println!("  cpsr {:#010x}", regs.cpsr);
        println!();
    }
}
