//! Assembly of crash reports from a core dump and an executable image.

use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;

use crate::dump::CoreDumpImage;
use crate::dump::Module;
use crate::dump::RegisterFile;
use crate::elf::ElfImage;
use crate::resolve::AddressNotation;
use crate::resolve::Disassembler;
use crate::resolve::Resolution;
use crate::resolve::Resolver;
use crate::Addr;


/// The fill pattern the target kernel paints unused stack memory with.
/// Stack slots still carrying it are noise and are dropped.
pub const STACK_FILL_PATTERN: u32 = 0xdead_beef;

/// The number of word slots inspected below the stack pointer.
const STACK_SLOTS_BELOW: i32 = 16;
/// The number of word slots inspected at and above the stack pointer.
const STACK_SLOTS_ABOVE: i32 = 24;


/// A single word of a thread's stack window.
#[derive(Clone, Debug)]
pub struct StackWord {
    /// The stack address the word was read from.
    pub addr: Addr,
    /// The word's value.
    pub value: u32,
    /// The value resolved as if it were a code or data address.
    pub notation: AddressNotation,
    /// Whether this word sits exactly at the stack pointer.
    pub is_sp: bool,
}


/// Everything the report has to say about a single thread.
#[derive(Clone, Debug)]
pub struct ThreadReport {
    /// The thread's unique identifier.
    pub uid: u32,
    /// The thread's name.
    pub name: Box<str>,
    /// The thread's scheduling status at dump time.
    pub status: u32,
    /// The reason the thread was stopped.
    pub stop_reason: u32,
    /// Whether this thread is the one that faulted.
    pub crashed: bool,
    /// The thread's register file.
    pub regs: RegisterFile,
    /// The resolved program counter.
    pub pc: AddressNotation,
    /// The resolved link register. Only present when the program
    /// counter could not be located, as the most likely hint at where
    /// execution came from.
    pub lr: Option<AddressNotation>,
    /// The thread's stack window. Empty for threads that did not fault.
    pub stack: Vec<StackWord>,
}


/// A fully assembled crash report.
#[derive(Clone, Debug)]
pub struct CrashReport {
    /// Per-thread findings, in dump order.
    pub threads: Vec<ThreadReport>,
    /// Indexes into [`threads`][Self::threads] of the threads that
    /// faulted, in dump order.
    pub highlights: Vec<usize>,
    /// The modules loaded into the dumped process.
    pub modules: Vec<Module>,
}


/// A builder for [`CrashReport`] objects.
pub struct ReportBuilder<'src> {
    /// The core dump to report on.
    dump: &'src CoreDumpImage,
    /// The executable image to resolve addresses against.
    elf: &'src ElfImage,
    /// An optional hook for annotating the faulting instruction.
    disasm: Option<&'src dyn Disassembler>,
}

impl Debug for ReportBuilder<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ReportBuilder").finish_non_exhaustive()
    }
}

impl<'src> ReportBuilder<'src> {
    /// Create a builder working off the provided dump and image.
    pub fn new(dump: &'src CoreDumpImage, elf: &'src ElfImage) -> Self {
        Self {
            dump,
            elf,
            disasm: None,
        }
    }

    /// Annotate located program counters with instruction text from the
    /// provided disassembler.
    pub fn disassembler(mut self, disasm: &'src dyn Disassembler) -> Self {
        self.disasm = Some(disasm);
        self
    }

    /// Assemble the report.
    ///
    /// Assembly itself cannot fail. Addresses that do not resolve and
    /// memory that was not captured merely degrade the per-datum
    /// output.
    pub fn build(&self) -> CrashReport {
        let resolver = Resolver::new(self.elf);

        let mut threads = Vec::new();
        let mut highlights = Vec::new();
        for (idx, thread) in self.dump.threads().iter().enumerate() {
            let crashed = thread.is_crashed();
            if crashed {
                let () = highlights.push(idx);
            }

            let mut pc = resolver.resolve("PC", thread.regs.pc());
            if pc.is_located() && matches!(pc.resolution, Resolution::Symbol { .. }) {
                let () = self.annotate(&mut pc);
            }

            let lr = (!pc.is_located()).then(|| resolver.resolve("LR", thread.regs.lr()));

            let stack = if crashed {
                self.walk_stack(&resolver, thread.regs.sp())
            } else {
                Vec::new()
            };

            let () = threads.push(ThreadReport {
                uid: thread.uid,
                name: thread.name.clone(),
                status: thread.status,
                stop_reason: thread.stop_reason,
                crashed,
                regs: thread.regs.clone(),
                pc,
                lr,
                stack,
            });
        }

        CrashReport {
            threads,
            highlights,
            modules: self.dump.modules().to_vec(),
        }
    }

    /// Attach instruction text to a located notation, best effort.
    fn annotate(&self, notation: &mut AddressNotation) {
        let Some(disasm) = self.disasm else { return };
        // Thumb state is signaled in the address' lowest bit; the
        // instruction itself resides at the even address.
        let Some(code) = self.dump.read_vaddr(notation.addr & !1, 4) else {
            return
        };
        notation.disasm = disasm
            .disassemble(notation.addr, code)
            .map(String::into_boxed_str);
    }

    /// Walk the fixed window of word slots around the stack pointer.
    fn walk_stack(&self, resolver: &Resolver<'_>, sp: Addr) -> Vec<StackWord> {
        let mut words = Vec::new();
        for slot in -STACK_SLOTS_BELOW..STACK_SLOTS_ABOVE {
            let offset = slot * 4;
            let Ok(addr) = Addr::try_from(i64::from(sp) + i64::from(offset)) else {
                continue
            };
            // Memory that was not captured is skipped without a
            // placeholder.
            let Some(value) = self.dump.read_u32(addr) else {
                continue
            };
            if value == STACK_FILL_PATTERN {
                continue
            }

            let label = format!("{addr:#x}");
            let notation = resolver.resolve(&label, value);
            let () = words.push(StackWord {
                addr,
                value,
                notation,
                is_sp: offset == 0,
            });
        }
        words
    }
}
