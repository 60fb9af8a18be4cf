/*
    spectrum-engine: ZX Spectrum execution cycle engine.
    Copyright (C) 2024  spectrum-engine contributors

    For the full copyright notice, see the lib.rs file.
*/
//! The Z80 CPU of the machine with its clock and signal lines.
use bitflags::bitflags;
use z80emu::{Cpu, CpuDebugFn, BreakCause, Memory, Prefix, StkReg16, Z80NMOS};
use z80emu::opconsts::{
    CALL_OPCODE, CALL_CC_OPBASE, CALL_CC_OPMASK,
    RST_OPBASE, RST_OPMASK, HALT_OPCODE, ED_PREFIX
};

#[cfg(feature = "serde")]
use serde::{Serialize, Deserialize};

#[allow(unused_imports)]
use log::{error, warn, info, debug, trace, Level};

use crate::bus::SpectrumBus;
use crate::clock::{CpuClock, Ts};
use crate::device::interrupt::InterruptLine;

/// The second opcode of the repeating block instructions (`LDIR`, `CPIR`, `INIR`, `OTIR`
/// and their decrementing variants) after the `ED` prefix, masked with [`ED_BLOCK_REPEAT_MASK`].
const ED_BLOCK_REPEAT_BITS: u8 = 0xB0;
const ED_BLOCK_REPEAT_MASK: u8 = 0xF4;

bitflags! {
    /// The input signals of the CPU.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct StateFlags: u8 {
        /// The maskable interrupt line is active.
        const INT = 0b0000_0001;
    }
}

/// A snapshot of the CPU registers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Registers {
    pub af: u16,
    pub bc: u16,
    pub de: u16,
    pub hl: u16,
    pub af_alt: u16,
    pub bc_alt: u16,
    pub de_alt: u16,
    pub hl_alt: u16,
    pub ix: u16,
    pub iy: u16,
    pub sp: u16,
    pub pc: u16,
    pub ir: u16,
    pub iff1: bool,
    pub iff2: bool,
    pub im: u8,
    pub memptr: u16,
}

/// The Z80 CPU with the T-state clock.
pub struct SpectrumCpu {
    z80: Z80NMOS,
    clock: CpuClock,
    state: StateFlags,
    interrupt_entered: bool,
}

impl SpectrumCpu {
    pub fn new(clock: CpuClock) -> Self {
        SpectrumCpu {
            z80: Z80NMOS::default(),
            clock,
            state: StateFlags::empty(),
            interrupt_entered: false
        }
    }

    /// Reset the CPU and its clock.
    pub fn reset(&mut self) {
        self.z80.reset();
        self.clock.reset();
        self.state = StateFlags::empty();
        self.interrupt_entered = false;
    }

    pub fn z80(&self) -> &Z80NMOS {
        &self.z80
    }

    pub fn z80_mut(&mut self) -> &mut Z80NMOS {
        &mut self.z80
    }

    pub fn clock(&self) -> &CpuClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut CpuClock {
        &mut self.clock
    }

    /// Return the number of T-states since the last reset.
    #[inline]
    pub fn tacts(&self) -> Ts {
        self.clock.tacts()
    }

    #[inline]
    pub fn pc(&self) -> u16 {
        self.z80.get_pc()
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.z80.set_pc(pc);
    }

    pub fn state_flags(&self) -> StateFlags {
        self.state
    }

    /// Add `ts` T-states to the clock.
    pub fn delay(&mut self, ts: u32) {
        self.clock.delay(ts);
    }

    /// Return whether the CPU is in the middle of a prefixed instruction.
    #[inline]
    pub fn is_in_op_execution(&self) -> bool {
        self.z80.is_after_prefix()
    }

    pub fn is_halted(&self) -> bool {
        self.z80.is_halt()
    }

    /// Return whether the last cycle accepted a maskable interrupt.
    #[inline]
    pub fn maskable_interrupt_mode_entered(&self) -> bool {
        self.interrupt_entered
    }

    /// Accept a pending maskable interrupt or execute the next instruction or prefix.
    pub fn execute_cpu_cycle(&mut self, bus: &mut SpectrumBus) {
        self.interrupt_entered = false;
        if self.state.contains(StateFlags::INT) && self.z80.is_irq_allowed() {
            if let Some(res) = self.z80.irq(bus, &mut self.clock, None::<CpuDebugFn>) {
                trace!("interrupt accepted: {:04X}", self.z80.get_pc());
                self.state.remove(StateFlags::INT);
                self.interrupt_entered = true;
                match res {
                    Ok(()) | Err(BreakCause::Halt) => {}
                    Err(cause) => panic!("unexpected break request: {}", cause)
                }
                return
            }
        }
        match self.z80.execute_next(bus, &mut self.clock, None::<CpuDebugFn>) {
            Ok(()) | Err(BreakCause::Halt) => {}
            Err(cause) => panic!("unexpected break request: {}", cause)
        }
    }

    /// Return the length of the instruction at PC if it returns control to the next
    /// instruction after doing something else first, otherwise 0.
    ///
    /// These are the conditional and unconditional `CALL`s, `RST`s, `HALT` and the
    /// repeating block instructions.
    pub fn call_instruction_length<M: Memory>(&self, memory: &M) -> u16 {
        let pc = self.z80.get_pc();
        let opcode = memory.read_debug(pc);
        if opcode == CALL_OPCODE || opcode & CALL_CC_OPMASK == CALL_CC_OPBASE {
            3
        }
        else if opcode & RST_OPMASK == RST_OPBASE || opcode == HALT_OPCODE {
            1
        }
        else if opcode == ED_PREFIX
                && memory.read_debug(pc.wrapping_add(1)) & ED_BLOCK_REPEAT_MASK == ED_BLOCK_REPEAT_BITS {
            2
        }
        else {
            0
        }
    }

    /// Return a snapshot of the registers.
    pub fn registers(&self) -> Registers {
        let cpu = &self.z80;
        let (iff1, iff2) = cpu.get_iffs();
        Registers {
            af: cpu.get_reg16(StkReg16::AF),
            bc: cpu.get_reg16(StkReg16::BC),
            de: cpu.get_reg16(StkReg16::DE),
            hl: cpu.get_reg16(StkReg16::HL),
            af_alt: cpu.get_alt_reg16(StkReg16::AF),
            bc_alt: cpu.get_alt_reg16(StkReg16::BC),
            de_alt: cpu.get_alt_reg16(StkReg16::DE),
            hl_alt: cpu.get_alt_reg16(StkReg16::HL),
            ix: cpu.get_index16(Prefix::Xdd),
            iy: cpu.get_index16(Prefix::Yfd),
            sp: cpu.get_sp(),
            pc: cpu.get_pc(),
            ir: cpu.get_ir(),
            iff1,
            iff2,
            im: cpu.get_im().to_mode_number(),
            memptr: cpu.get_memptr()
        }
    }
}

impl InterruptLine for SpectrumCpu {
    fn raise_int(&mut self) {
        self.state.insert(StateFlags::INT);
    }

    fn lower_int(&mut self) {
        self.state.remove(StateFlags::INT);
    }
}
