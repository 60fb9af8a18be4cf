/*
    spectrum-engine: ZX Spectrum execution cycle engine.
    Copyright (C) 2024  spectrum-engine contributors

    For the full copyright notice, see the lib.rs file.
*/
/*
                                  SZYHXPNC A F  B C  D E  H L  A'F' B'C' D'E' H'L'  IX   IY   SP   PC   IR  IFM MPTR
0000 SET  3, (IX+00h), A 00000000 00000000 0000 0000 0000 0000 0000 0000 0000 0000 0000 0000 0000 0000 0000 000 0000
0000>SET  3, (IX+00h), A 00 00 00 00
*/
//! Breakpoints, the debugger stop decision and the register dump formatting.
use core::fmt;
use std::collections::{BTreeMap, HashMap};
use z80emu::{CpuDebug, CpuDebugCode};

#[cfg(feature = "serde")]
use serde::{Serialize, Deserialize};

#[allow(unused_imports)]
use log::{error, warn, info, debug, trace, Level};

use crate::cpu::Registers;
use crate::options::{DebugStepMode, ExecuteCycleOptions};

pub const HEADER: &str = "SZYHXPNC A F  B C  D E  H L  A'F' B'C' D'E' H'L'  IX   IY   SP   PC   IR  IFM MPTR";

/// A breakpoint set at a memory address.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BreakpointInfo {
    /// The source file of a source level breakpoint.
    pub file: Option<String>,
    /// The source line of a source level breakpoint.
    pub line: Option<u32>,
    /// Whether the breakpoint was set directly on an address, e.g. in a disassembly view.
    pub is_cpu_breakpoint: bool,
}

impl BreakpointInfo {
    pub fn cpu() -> Self {
        BreakpointInfo { file: None, line: None, is_cpu_breakpoint: true }
    }
}

/// A breakpoint set on a line of a source file.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SourceBreakpoint {
    pub file: String,
    pub line: u32,
}

/// The source map of the compiled program.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceMap {
    /// The source files, indexed by the file index.
    pub files: Vec<String>,
    /// Maps `(file index, line)` to the address of the code emitted for that line.
    pub addresses: HashMap<(usize, u32), u16>,
}

impl SourceMap {
    /// Return the address of the code of the `line` in the `file`, comparing names case-insensitively.
    pub fn address_of(&self, file: &str, line: u32) -> Option<u16> {
        let index = self.files.iter().position(|f| f.eq_ignore_ascii_case(file))?;
        self.addresses.get(&(index, line)).copied()
    }

    /// Return the file name and the line of the code at `addr`.
    ///
    /// If more lines emit code at the same address the first file and line are returned.
    pub fn source_location(&self, addr: u16) -> Option<(&str, u32)> {
        self.addresses.iter()
            .filter(|(_, &a)| a == addr)
            .map(|(&(index, line), _)| (index, line))
            .min()
            .and_then(|(index, line)| {
                self.files.get(index).map(|file| (file.as_str(), line))
            })
    }
}

/// Breakpoints and the stepping state of the debugger.
#[derive(Clone, Debug, Default)]
pub struct DebugState {
    breakpoints: BTreeMap<u16, BreakpointInfo>,
    imminent_breakpoint: Option<u16>,
    last_breakpoint: Option<u16>,
    source_map: Option<SourceMap>,
}

impl DebugState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn breakpoints(&self) -> &BTreeMap<u16, BreakpointInfo> {
        &self.breakpoints
    }

    pub fn add_cpu_breakpoint(&mut self, addr: u16) {
        self.breakpoints.insert(addr, BreakpointInfo::cpu());
    }

    pub fn remove_breakpoint(&mut self, addr: u16) -> Option<BreakpointInfo> {
        self.breakpoints.remove(&addr)
    }

    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    pub fn should_break_at(&self, addr: u16) -> bool {
        self.breakpoints.contains_key(&addr)
    }

    pub fn imminent_breakpoint(&self) -> Option<u16> {
        self.imminent_breakpoint
    }

    pub fn set_imminent_breakpoint(&mut self, addr: Option<u16>) {
        self.imminent_breakpoint = addr;
    }

    /// Return the address of the breakpoint the debugger has stopped at.
    pub fn last_breakpoint(&self) -> Option<u16> {
        self.last_breakpoint
    }

    /// Forget the breakpoint stopped at, so it can stop the debugger again.
    pub fn clear_last_breakpoint(&mut self) {
        self.last_breakpoint = None;
    }

    pub fn source_map(&self) -> Option<&SourceMap> {
        self.source_map.as_ref()
    }

    pub fn set_source_map(&mut self, source_map: Option<SourceMap>) {
        self.source_map = source_map;
    }

    /// Translate `addr` back to the source file and line, if the source map knows it.
    pub fn source_location(&self, addr: u16) -> Option<(&str, u32)> {
        self.source_map.as_ref()?.source_location(addr)
    }

    /// Replace the source level breakpoints with the given ones, keeping CPU breakpoints.
    ///
    /// Breakpoints on lines without code and in unknown files are ignored.
    pub fn prepare_breakpoints(&mut self, source: &[SourceBreakpoint]) {
        self.breakpoints.retain(|_, bp| bp.is_cpu_breakpoint);
        let source_map = match self.source_map.as_ref() {
            Some(map) => map,
            None => return
        };
        for sbp in source {
            match source_map.address_of(&sbp.file, sbp.line) {
                Some(addr) => {
                    self.breakpoints.entry(addr).or_insert_with(|| BreakpointInfo {
                        file: Some(sbp.file.clone()),
                        line: Some(sbp.line),
                        is_cpu_breakpoint: false
                    });
                }
                None => debug!("no code for a breakpoint at {}:{}", sbp.file, sbp.line)
            }
        }
    }

    /// Decide whether the debugger stops before the next instruction at `pc`.
    ///
    /// `executed` is the number of instructions executed so far in the current
    /// execution cycle and `call_length` returns the length of the instruction
    /// at `pc` if it is call-like, otherwise 0.
    pub fn is_debug_stop<F>(
            &mut self,
            options: &ExecuteCycleOptions,
            executed: u64,
            pc: u16,
            in_interrupt_routine: bool,
            call_length: F
        ) -> bool
        where F: FnOnce() -> u16
    {
        if options.skip_interrupt_routine && in_interrupt_routine {
            return false
        }
        match options.debug_step_mode {
            DebugStepMode::StepInto => executed > 0,
            DebugStepMode::StopAtBreakpoint => {
                if self.should_break_at(pc) && (executed > 0 || self.last_breakpoint != Some(pc)) {
                    self.last_breakpoint = Some(pc);
                    true
                }
                else {
                    false
                }
            }
            DebugStepMode::StepOver => {
                if let Some(imminent) = self.imminent_breakpoint {
                    if imminent != pc {
                        return false
                    }
                    self.imminent_breakpoint = None;
                    if executed > 0 {
                        return true
                    }
                    // already at the return address: step over the instruction at hand
                }
                match call_length() {
                    0 => executed > 0,
                    length => {
                        self.imminent_breakpoint = Some(pc.wrapping_add(length));
                        false
                    }
                }
            }
        }
    }
}

impl fmt::Display for Registers {
    /// Format the registers in a single line below the [`HEADER`].
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                 // "SZYHXPNC A F  B C  D E  H L  A'F' B'C' D'E' H'L'  IX   IY   SP   PC   IR  IFM MPTR"
        write!(f, "{:08b} {:04X} {:04X} {:04X} {:04X} {:04X} {:04X} {:04X} {:04X} {:04X} {:04X} {:04X} {:04X} {:04X} {}{}{} {:04X}",
                    self.af as u8,
                    self.af,
                    self.bc,
                    self.de,
                    self.hl,
                    self.af_alt,
                    self.bc_alt,
                    self.de_alt,
                    self.hl_alt,
                    self.ix,
                    self.iy,
                    self.sp,
                    self.pc,
                    self.ir,
                    self.iff1 as u8, self.iff2 as u8,
                    self.im,
                    self.memptr)
    }
}

/// Displays the column headers of [`Registers`].
pub struct Header;

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(HEADER)
    }
}

/// Displays a disassembled instruction followed by its code.
pub struct Preview<'a>(pub &'a CpuDebug);

impl<'a> fmt::Display for Preview<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let deb = self.0;
        write!(f, "{:04X}>{:4} {:14X} ", deb.pc, deb.mnemonic, deb.args)?;
        format_code(f, &deb.code)
    }
}

fn format_code(f: &mut fmt::Formatter<'_>, code: &CpuDebugCode) -> fmt::Result {
    for b in code.iter() {
        write!(f, "{:02X} ", *b)?;
    }
    for _ in code.len()..4 {
        f.write_str("   ")?;
    }
    Ok(())
}
