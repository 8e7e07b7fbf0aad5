use std::borrow::Cow;

use crate::Addr;


/// The index of the stack pointer in the general purpose register file.
pub const REG_SP: usize = 13;
/// The index of the link register in the general purpose register file.
pub const REG_LR: usize = 14;
/// The index of the program counter in the general purpose register
/// file.
pub const REG_PC: usize = 15;


/// The register file captured for a thread at dump time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterFile {
    /// The general purpose registers r0 through r15.
    pub gpr: [u32; 16],
    /// The current program status register.
    pub cpsr: u32,
}

impl RegisterFile {
    /// The stack pointer (r13).
    #[inline]
    pub fn sp(&self) -> Addr {
        self.gpr[REG_SP]
    }

    /// The link register (r14).
    #[inline]
    pub fn lr(&self) -> Addr {
        self.gpr[REG_LR]
    }

    /// The program counter (r15).
    #[inline]
    pub fn pc(&self) -> Addr {
        self.gpr[REG_PC]
    }
}


/// A memory segment belonging to a loaded module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleSegment {
    /// The segment's start address.
    pub start: Addr,
    /// The segment's size in bytes.
    pub size: u32,
    /// The segment's protection attributes.
    pub attr: u32,
    /// The segment's alignment.
    pub align: u32,
}

impl ModuleSegment {
    /// Render the segment's protection attributes in `rwx` notation.
    pub fn perms(&self) -> String {
        let mut perms = String::with_capacity(3);
        let () = perms.push(if self.attr & 0x4 != 0 { 'r' } else { '-' });
        let () = perms.push(if self.attr & 0x2 != 0 { 'w' } else { '-' });
        let () = perms.push(if self.attr & 0x1 != 0 { 'x' } else { '-' });
        perms
    }
}


/// A module loaded into the crashed process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Module {
    /// The module's name.
    pub name: Box<str>,
    /// The module's memory segments.
    pub segments: Box<[ModuleSegment]>,
}


/// A thread of the crashed process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Thread {
    /// The thread's unique identifier.
    pub uid: u32,
    /// The thread's name.
    pub name: Box<str>,
    /// The thread's scheduling status at dump time.
    pub status: u32,
    /// The reason the thread was stopped. Zero means the thread did
    /// not fault.
    pub stop_reason: u32,
    /// The thread's register file.
    pub regs: RegisterFile,
}

impl Thread {
    /// Check whether this thread is the one that faulted.
    #[inline]
    pub fn is_crashed(&self) -> bool {
        self.stop_reason != 0
    }
}


/// Describe a thread's stop reason in human readable terms.
pub fn stop_reason_str(reason: u32) -> Cow<'static, str> {
    match reason {
        0x0 => Cow::Borrowed("No reason"),
        0x30002 => Cow::Borrowed("Undefined instruction exception"),
        0x30003 => Cow::Borrowed("Prefetch abort exception"),
        0x30004 => Cow::Borrowed("Data abort exception"),
        _ => Cow::Owned(format!("unknown reason ({reason:#x})")),
    }
}

/// Describe a thread's scheduling status in human readable terms.
pub fn status_str(status: u32) -> Cow<'static, str> {
    match status {
        0x1 => Cow::Borrowed("Running"),
        0x8 => Cow::Borrowed("Waiting"),
        0x10 => Cow::Borrowed("Not started"),
        _ => Cow::Owned(format!("unknown status ({status:#x})")),
    }
}
