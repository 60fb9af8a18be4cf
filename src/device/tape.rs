/*
    spectrum-engine: ZX Spectrum execution cycle engine.
    Copyright (C) 2024  spectrum-engine contributors

    For the full copyright notice, see the lib.rs file.
*/
//! The tape: plays blocks into the EAR input and records blocks saved through MIC.
//!
//! Blocks are encoded with the standard ROM timing. Playback starts when the
//! CPU enters the `LD-BYTES` routine and stops at the end of the tape. Saving
//! is detected from the pilot tone on the MIC output and the block is stored
//! once the MIC line stays silent for a second.
#[allow(unused_imports)]
use log::{error, warn, info, debug, trace, Level};

use crate::clock::Ts;
use crate::providers::{MachineInfo, TapeProvider};
use super::{Device, OperationBound, FrameContext};

/// The entry point of the ROM routine loading a block.
pub const LD_BYTES_ADDRESS: u16 = 0x0556;

pub const PILOT_PULSE: u32 = 2168;
pub const SYNC1_PULSE: u32 = 667;
pub const SYNC2_PULSE: u32 = 735;
pub const BIT0_PULSE: u32 = 855;
pub const BIT1_PULSE: u32 = 1710;
pub const HEADER_PILOT_PULSES: u32 = 8063;
pub const DATA_PILOT_PULSES: u32 = 3223;

/// How many pilot pulses start recognizing a saved block.
const MIN_SAVE_PILOT_PULSES: u32 = 256;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TapeMode {
    #[default]
    Passive,
    Load,
    Save,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PulsePhase {
    Pilot(u32),
    Sync1,
    Sync2,
    Data { index: usize, bit: u8, second: bool },
    Done,
}

/// Generates the pulses of a single block.
#[derive(Clone, Debug)]
struct BlockPlayer {
    data: Vec<u8>,
    phase: PulsePhase,
    multiplier: u64,
    ear: bool,
    next_edge: Ts,
}

impl BlockPlayer {
    fn new(data: Vec<u8>, start: Ts, multiplier: u64) -> Self {
        let pilot = match data.first() {
            Some(flag) if *flag < 0x80 => HEADER_PILOT_PULSES,
            _ => DATA_PILOT_PULSES
        };
        let mut player = BlockPlayer {
            data,
            phase: PulsePhase::Pilot(pilot),
            multiplier,
            ear: false,
            next_edge: start
        };
        player.advance();
        player
    }

    fn next_pulse(&mut self) -> Option<u32> {
        let (pulse, phase) = match self.phase {
            PulsePhase::Pilot(1) => (PILOT_PULSE, PulsePhase::Sync1),
            PulsePhase::Pilot(left) => (PILOT_PULSE, PulsePhase::Pilot(left - 1)),
            PulsePhase::Sync1 => (SYNC1_PULSE, PulsePhase::Sync2),
            PulsePhase::Sync2 => {
                if self.data.is_empty() {
                    (SYNC2_PULSE, PulsePhase::Done)
                }
                else {
                    (SYNC2_PULSE, PulsePhase::Data { index: 0, bit: 0x80, second: false })
                }
            }
            PulsePhase::Data { index, bit, second } => {
                let pulse = if self.data[index] & bit != 0 { BIT1_PULSE } else { BIT0_PULSE };
                let phase = match (second, bit) {
                    (false, _) => PulsePhase::Data { index, bit, second: true },
                    (true, 1) if index + 1 == self.data.len() => PulsePhase::Done,
                    (true, 1) => PulsePhase::Data { index: index + 1, bit: 0x80, second: false },
                    (true, _) => PulsePhase::Data { index, bit: bit >> 1, second: false },
                };
                (pulse, phase)
            }
            PulsePhase::Done => return None
        };
        self.phase = phase;
        Some(pulse)
    }

    fn advance(&mut self) {
        if let Some(pulse) = self.next_pulse() {
            self.ear = !self.ear;
            self.next_edge += u64::from(pulse) * self.multiplier;
        }
        else {
            self.ear = false;
        }
    }

    /// Return the EAR level at `ts` or `None` when the block has been played.
    fn ear_at(&mut self, ts: Ts) -> Option<bool> {
        while ts >= self.next_edge {
            if self.phase == PulsePhase::Done {
                return None
            }
            self.advance();
        }
        Some(self.ear)
    }

    fn end(&self) -> Ts {
        self.next_edge
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DecodeState {
    Idle,
    Pilot,
    Sync,
    Data,
}

/// Recognizes the ROM encoding in the MIC pulses.
#[derive(Clone, Debug)]
struct PulseDecoder {
    state: DecodeState,
    last_edge: Option<Ts>,
    pilot_pulses: u32,
    half: Option<u32>,
    bits: u8,
    bit_count: u8,
    block: Vec<u8>,
    multiplier: u64,
}

fn is_near(pulse: u32, expected: u32) -> bool {
    pulse.abs_diff(expected) <= expected / 5
}

impl PulseDecoder {
    fn new(multiplier: u64) -> Self {
        PulseDecoder {
            state: DecodeState::Idle,
            last_edge: None,
            pilot_pulses: 0,
            half: None,
            bits: 0,
            bit_count: 0,
            block: Vec::new(),
            multiplier
        }
    }

    fn reset(&mut self) {
        *self = PulseDecoder::new(self.multiplier);
    }

    /// Register an edge at `ts`. Return whether a pilot tone has just been recognized.
    fn edge(&mut self, ts: Ts) -> bool {
        let last = match self.last_edge.replace(ts) {
            Some(last) => last,
            None => return false
        };
        let pulse = u32::try_from((ts - last) / self.multiplier).unwrap_or(u32::MAX);
        match self.state {
            DecodeState::Idle | DecodeState::Pilot if is_near(pulse, PILOT_PULSE) => {
                self.pilot_pulses += 1;
                if self.state == DecodeState::Idle && self.pilot_pulses >= MIN_SAVE_PILOT_PULSES {
                    self.state = DecodeState::Pilot;
                    return true
                }
            }
            DecodeState::Pilot if is_near(pulse, SYNC1_PULSE) => {
                self.state = DecodeState::Sync;
            }
            DecodeState::Sync if is_near(pulse, SYNC2_PULSE) => {
                self.state = DecodeState::Data;
                self.block.clear();
                self.half = None;
                self.bits = 0;
                self.bit_count = 0;
            }
            DecodeState::Data => {
                if let Some(first) = self.half.take() {
                    self.push_bit(first + pulse > BIT0_PULSE + BIT1_PULSE);
                }
                else {
                    self.half = Some(pulse);
                }
            }
            _ => {
                self.state = DecodeState::Idle;
                self.pilot_pulses = 0;
            }
        }
        false
    }

    fn push_bit(&mut self, bit: bool) {
        self.bits = (self.bits << 1) | bit as u8;
        self.bit_count += 1;
        if self.bit_count == 8 {
            self.block.push(self.bits);
            self.bits = 0;
            self.bit_count = 0;
        }
    }

    fn take_block(&mut self) -> Option<Vec<u8>> {
        let block = core::mem::take(&mut self.block);
        self.reset();
        if block.is_empty() { None } else { Some(block) }
    }
}

/// The tape deck.
pub struct TapeDevice {
    mode: TapeMode,
    player: Option<BlockPlayer>,
    pause_end: Ts,
    pause_tacts: u64,
    decoder: PulseDecoder,
    mic: bool,
    provider: Option<Box<dyn TapeProvider>>,
}

impl TapeDevice {
    pub fn new(info: &MachineInfo, provider: Option<Box<dyn TapeProvider>>) -> Self {
        let multiplier = u64::from(info.clock_multiplier);
        TapeDevice {
            mode: TapeMode::Passive,
            player: None,
            pause_end: 0,
            pause_tacts: info.cpu_clock_hz(),
            decoder: PulseDecoder::new(multiplier),
            mic: false,
            provider
        }
    }

    pub fn mode(&self) -> TapeMode {
        self.mode
    }

    fn multiplier(&self) -> u64 {
        self.decoder.multiplier
    }

    /// Start playing the next block at `ts`. Return `false` at the end of the tape.
    fn play_next_block(&mut self, ts: Ts) -> bool {
        let block = match self.provider.as_mut().and_then(|tape| tape.next_block()) {
            Some(block) => block,
            None => return false
        };
        debug!("playing a tape block: {} bytes", block.len());
        self.player = Some(BlockPlayer::new(block, ts, self.multiplier()));
        true
    }

    /// Return the EAR input level at `ts` while loading.
    pub fn ear_bit(&mut self, ts: Ts) -> Option<bool> {
        if self.mode != TapeMode::Load {
            return None
        }
        if let Some(player) = self.player.as_mut() {
            match player.ear_at(ts) {
                Some(ear) => return Some(ear),
                None => {
                    self.pause_end = player.end() + self.pause_tacts;
                    self.player = None;
                }
            }
        }
        if ts >= self.pause_end && !self.play_next_block(ts) {
            info!("end of tape");
            self.mode = TapeMode::Passive;
        }
        Some(false)
    }

    /// Register the MIC output level at `ts`.
    pub fn process_mic_bit(&mut self, mic: bool, ts: Ts) {
        if mic == self.mic {
            return
        }
        self.mic = mic;
        if self.mode == TapeMode::Load {
            return
        }
        if self.decoder.edge(ts) && self.mode == TapeMode::Passive {
            debug!("saving a tape block");
            self.mode = TapeMode::Save;
        }
    }

    fn finish_saving(&mut self) {
        self.mode = TapeMode::Passive;
        if let Some(block) = self.decoder.take_block() {
            match self.provider.as_mut() {
                Some(tape) => {
                    debug!("tape block saved: {} bytes", block.len());
                    tape.save_block(&block);
                }
                None => warn!("no tape provider, saved block dropped: {} bytes", block.len())
            }
        }
    }
}

impl Device for TapeDevice {
    fn on_attached_to_vm(&mut self, info: &MachineInfo) {
        if let Some(provider) = self.provider.as_mut() {
            provider.on_attached_to_vm(info);
        }
    }

    fn reset(&mut self) {
        self.mode = TapeMode::Passive;
        self.player = None;
        self.pause_end = 0;
        self.decoder.reset();
        self.mic = false;
        if let Some(provider) = self.provider.as_mut() {
            provider.reset();
            provider.rewind();
        }
    }

    fn as_operation_bound(&mut self) -> Option<&mut dyn OperationBound> {
        Some(self)
    }
}

impl OperationBound for TapeDevice {
    fn on_cpu_operation_completed(&mut self, ctx: &FrameContext) {
        match self.mode {
            TapeMode::Passive if ctx.pc == LD_BYTES_ADDRESS => {
                if self.play_next_block(ctx.tacts) {
                    debug!("tape loading started");
                    self.mode = TapeMode::Load;
                }
            }
            TapeMode::Save => {
                let silent = self.decoder.last_edge.map_or(true, |edge| ctx.tacts - edge > self.pause_tacts);
                if silent {
                    self.finish_saving();
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use crate::config::SpectrumModel;
    use crate::providers::VmComponentProvider;

    #[derive(Default)]
    struct Cassette {
        blocks: Vec<Vec<u8>>,
        saved: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl VmComponentProvider for Cassette {}

    impl TapeProvider for Cassette {
        fn next_block(&mut self) -> Option<Vec<u8>> {
            if self.blocks.is_empty() { None } else { Some(self.blocks.remove(0)) }
        }

        fn save_block(&mut self, block: &[u8]) {
            self.saved.lock().unwrap().push(block.to_vec());
        }
    }

    fn info() -> MachineInfo {
        MachineInfo {
            model: SpectrumModel::Spectrum48,
            base_clock_hz: 3_500_000,
            clock_multiplier: 1,
            frame_tacts: 69888,
            sample_rate: 48000
        }
    }

    fn at(tacts: Ts, pc: u16) -> FrameContext {
        FrameContext { tacts, pc, ..FrameContext::default() }
    }

    #[test]
    fn tape_plays_pilot_when_loading_starts() {
        let cassette = Cassette { blocks: vec![vec![0x00, 0x03]], ..Cassette::default() };
        let mut tape = TapeDevice::new(&info(), Some(Box::new(cassette)));
        assert_eq!(tape.ear_bit(0), None);
        tape.on_cpu_operation_completed(&at(500, 0x1234));
        assert_eq!(tape.mode(), TapeMode::Passive);
        tape.on_cpu_operation_completed(&at(1000, LD_BYTES_ADDRESS));
        assert_eq!(tape.mode(), TapeMode::Load);
        assert_eq!(tape.ear_bit(1000), Some(true));
        assert_eq!(tape.ear_bit(1000 + PILOT_PULSE as u64 - 1), Some(true));
        assert_eq!(tape.ear_bit(1000 + PILOT_PULSE as u64), Some(false));
        assert_eq!(tape.ear_bit(1000 + 2 * PILOT_PULSE as u64), Some(true));
        let pilot_end = 1000 + u64::from(HEADER_PILOT_PULSES * PILOT_PULSE);
        assert_eq!(tape.ear_bit(pilot_end + u64::from(SYNC1_PULSE) - 1), Some(false));
        assert_eq!(tape.ear_bit(pilot_end + u64::from(SYNC1_PULSE)), Some(true));
    }

    #[test]
    fn tape_leaves_load_mode_at_end_of_tape() {
        let cassette = Cassette { blocks: vec![vec![0xFF]], ..Cassette::default() };
        let mut tape = TapeDevice::new(&info(), Some(Box::new(cassette)));
        tape.on_cpu_operation_completed(&at(0, LD_BYTES_ADDRESS));
        let block_end = u64::from(DATA_PILOT_PULSES * PILOT_PULSE + SYNC1_PULSE + SYNC2_PULSE + 16 * BIT1_PULSE);
        assert_eq!(tape.ear_bit(block_end), Some(false));
        assert_eq!(tape.mode(), TapeMode::Load);
        assert_eq!(tape.ear_bit(block_end + 3_500_000), Some(false));
        assert_eq!(tape.mode(), TapeMode::Passive);
        assert_eq!(tape.ear_bit(block_end + 3_600_000), None);
    }

    #[test]
    fn tape_saves_block_from_mic_pulses() {
        let block = vec![0xFF, 0xA5, 0x00, 0x5A];
        // record the signal of a played block and feed it back through MIC
        let mut player = BlockPlayer::new(block.clone(), 100, 1);
        let saved = Arc::new(Mutex::new(Vec::new()));
        let cassette = Cassette { saved: Arc::clone(&saved), ..Cassette::default() };
        let mut tape = TapeDevice::new(&info(), Some(Box::new(cassette)));
        tape.process_mic_bit(true, 100);
        let mut ts = 100;
        while let Some(ear) = player.ear_at(ts) {
            tape.process_mic_bit(ear, ts);
            ts = player.end();
        }
        tape.process_mic_bit(false, ts);
        assert_eq!(tape.mode(), TapeMode::Save);
        tape.on_cpu_operation_completed(&at(ts + 1000, 0));
        assert_eq!(tape.mode(), TapeMode::Save);
        tape.on_cpu_operation_completed(&at(ts + 3_500_001, 0));
        assert_eq!(tape.mode(), TapeMode::Passive);
        assert_eq!(*saved.lock().unwrap(), vec![block]);
    }
}
