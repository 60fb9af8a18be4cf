/*
    spectrum-engine: ZX Spectrum execution cycle engine.
    Copyright (C) 2024  spectrum-engine contributors

    For the full copyright notice, see the lib.rs file.
*/
//! The system bus: memory and I/O port decoding for the attached devices.
use core::num::NonZeroU16;
use arrayvec::ArrayVec;
use z80emu::{Io, Memory};

#[allow(unused_imports)]
use log::{error, warn, info, debug, trace, Level};

use crate::clock::Ts;
use crate::device::{
    Device,
    beeper::BeeperDevice,
    interrupt::InterruptDevice,
    keyboard::KeyboardDevice,
    memory::PagedMemory,
    screen::ScreenDevice,
    sound::SoundDevice,
    tape::TapeDevice
};

/// The maximum number of devices attached to the bus.
pub const MAX_DEVICES: usize = 8;

/// The ULA decodes every even port.
const ULA_PORT_MASK: u16 = 0x0001;
/// The 128K paging port `0x7FFD` decodes A15 and A1.
const PAGING_PORT_MASK: u16 = 0x8002;
const PAGING_PORT_BITS: u16 = 0x0000;
/// The sound generator ports `0xFFFD` and `0xBFFD` decode A15, A14 and A1.
const AY_PORT_MASK: u16 = 0xC002;
const AY_SELECT_PORT_BITS: u16 = 0xC000;
const AY_DATA_PORT_BITS: u16 = 0x8000;

const ULA_BORDER_MASK: u8 = 0b0000_0111;
const ULA_MIC_BIT: u8 = 0b0000_1000;
const ULA_EAR_BIT: u8 = 0b0001_0000;
const ULA_EAR_IN_SHIFT: u32 = 6;
const ULA_UNUSED_BITS: u8 = 0b1010_0000;

/// The devices of a machine connected to the CPU.
pub struct SpectrumBus {
    pub(crate) memory: PagedMemory,
    pub(crate) screen: ScreenDevice,
    pub(crate) interrupt: InterruptDevice,
    pub(crate) keyboard: KeyboardDevice,
    pub(crate) beeper: BeeperDevice,
    pub(crate) sound: Option<SoundDevice>,
    pub(crate) tape: TapeDevice,
    frame_start: Ts,
    multiplier: u64,
}

impl SpectrumBus {
    pub fn new(
            memory: PagedMemory,
            screen: ScreenDevice,
            interrupt: InterruptDevice,
            keyboard: KeyboardDevice,
            beeper: BeeperDevice,
            sound: Option<SoundDevice>,
            tape: TapeDevice
        ) -> Self
    {
        SpectrumBus {
            memory, screen, interrupt, keyboard, beeper, sound, tape,
            frame_start: 0,
            multiplier: 1
        }
    }

    /// Return all attached devices.
    pub fn devices_mut(&mut self) -> ArrayVec<&mut dyn Device, MAX_DEVICES> {
        let mut devices: ArrayVec<&mut dyn Device, MAX_DEVICES> = ArrayVec::new();
        devices.push(&mut self.memory);
        devices.push(&mut self.interrupt);
        devices.push(&mut self.keyboard);
        devices.push(&mut self.screen);
        devices.push(&mut self.beeper);
        if let Some(sound) = self.sound.as_mut() {
            devices.push(sound);
        }
        devices.push(&mut self.tape);
        devices
    }

    /// Set the CPU clock origin of the current frame, used to time the border changes.
    pub fn set_frame_origin(&mut self, frame_start: Ts, multiplier: u32) {
        self.frame_start = frame_start;
        self.multiplier = multiplier.into();
    }

    fn frame_tact(&self, ts: Ts) -> u32 {
        u32::try_from(ts.saturating_sub(self.frame_start) / self.multiplier).unwrap_or(u32::MAX)
    }

    pub fn memory(&self) -> &PagedMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut PagedMemory {
        &mut self.memory
    }

    pub fn screen(&self) -> &ScreenDevice {
        &self.screen
    }

    pub fn interrupt(&self) -> &InterruptDevice {
        &self.interrupt
    }

    pub fn keyboard(&self) -> &KeyboardDevice {
        &self.keyboard
    }

    pub fn keyboard_mut(&mut self) -> &mut KeyboardDevice {
        &mut self.keyboard
    }

    pub fn beeper(&self) -> &BeeperDevice {
        &self.beeper
    }

    pub fn sound(&self) -> Option<&SoundDevice> {
        self.sound.as_ref()
    }

    pub fn tape(&self) -> &TapeDevice {
        &self.tape
    }

    pub fn play_sound(&mut self) {
        self.beeper.play_sound();
        if let Some(sound) = self.sound.as_mut() {
            sound.play_sound();
        }
    }

    pub fn pause_sound(&mut self) {
        self.beeper.pause_sound();
        if let Some(sound) = self.sound.as_mut() {
            sound.pause_sound();
        }
    }

    pub fn kill_sound(&mut self) {
        self.beeper.kill_sound();
        if let Some(sound) = self.sound.as_mut() {
            sound.kill_sound();
        }
    }

    /// Read a port at the CPU T-state `ts`. Unattached ports read `0xFF`.
    pub fn read_port(&mut self, port: u16, ts: Ts) -> u8 {
        if port & ULA_PORT_MASK == 0 {
            let keys = self.keyboard.line_status((port >> 8) as u8);
            let ear = match self.tape.ear_bit(ts) {
                Some(ear) => {
                    self.beeper.process_ear_bit(ear, ts);
                    ear
                }
                None => self.beeper.ear_bit()
            };
            return ULA_UNUSED_BITS | keys | (ear as u8) << ULA_EAR_IN_SHIFT
        }
        if let Some(sound) = self.sound.as_ref() {
            if port & AY_PORT_MASK == AY_SELECT_PORT_BITS {
                return sound.read_register()
            }
        }
        u8::MAX
    }

    /// Write a port at the CPU T-state `ts`.
    pub fn write_port(&mut self, port: u16, data: u8, ts: Ts) {
        if port & ULA_PORT_MASK == 0 {
            let border = data & ULA_BORDER_MASK;
            if border != self.screen.border() {
                let tact = self.frame_tact(ts);
                if tact > 0 {
                    self.screen.render_screen(self.screen.next_tact(), tact - 1, &self.memory);
                }
                self.screen.set_border(border);
            }
            self.beeper.process_ear_bit(data & ULA_EAR_BIT != 0, ts);
            self.tape.process_mic_bit(data & ULA_MIC_BIT != 0, ts);
        }
        if port & PAGING_PORT_MASK == PAGING_PORT_BITS {
            self.memory.write_paging_port(data);
        }
        if let Some(sound) = self.sound.as_mut() {
            match port & AY_PORT_MASK {
                AY_SELECT_PORT_BITS => sound.select_register(data),
                AY_DATA_PORT_BITS => sound.write_register(data, ts),
                _ => {}
            }
        }
    }
}

impl Io for SpectrumBus {
    type Timestamp = Ts;
    type WrIoBreak = ();
    type RetiBreak = ();

    #[inline]
    fn write_io(&mut self, port: u16, data: u8, ts: Ts) -> (Option<()>, Option<NonZeroU16>) {
        self.write_port(port, data, ts);
        (None, None)
    }

    #[inline]
    fn read_io(&mut self, port: u16, ts: Ts) -> (u8, Option<NonZeroU16>) {
        (self.read_port(port, ts), None)
    }

    #[inline]
    fn irq_data(&mut self, _pc: u16, _ts: Ts) -> (u8, Option<NonZeroU16>) {
        (u8::MAX, None)
    }
}

impl Memory for SpectrumBus {
    type Timestamp = Ts;

    #[inline]
    fn read_opcode(&mut self, pc: u16, _ir: u16, _ts: Ts) -> u8 {
        self.memory.read(pc)
    }

    #[inline]
    fn read_mem(&self, addr: u16, _ts: Ts) -> u8 {
        self.memory.read(addr)
    }

    #[inline]
    fn read_mem16(&self, addr: u16, _ts: Ts) -> u16 {
        u16::from_le_bytes([self.memory.read(addr), self.memory.read(addr.wrapping_add(1))])
    }

    #[inline]
    fn write_mem(&mut self, addr: u16, data: u8, _ts: Ts) {
        self.memory.write(addr, data);
    }

    #[inline]
    fn read_debug(&self, addr: u16) -> u8 {
        self.memory.read(addr)
    }
}
