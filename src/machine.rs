/*
    spectrum-engine: ZX Spectrum execution cycle engine.
    Copyright (C) 2024  spectrum-engine contributors

    For the full copyright notice, see the lib.rs file.
*/
//! The virtual machine and its execution cycle.
use z80emu::{Cpu, CpuDebug, Memory, Z80NMOS, disasm::disasm_memory};

#[allow(unused_imports)]
use log::{error, warn, info, debug, trace, Level};

use crate::bus::SpectrumBus;
use crate::clock::{ClockMultiplier, CpuClock, Ts};
use crate::config::{MachineConfig, SpectrumModel};
use crate::cpu::SpectrumCpu;
use crate::debug::DebugState;
use crate::device::{
    FrameContext,
    beeper::BeeperDevice,
    interrupt::InterruptDevice,
    keyboard::KeyboardDevice,
    memory::PagedMemory,
    screen::ScreenDevice,
    sound::SoundDevice,
    tape::TapeDevice
};
use crate::error::ConfigError;
use crate::host::{CancelToken, HostClock};
use crate::options::{EmulationMode, DebugStepMode, ExecuteCycleOptions};
use crate::providers::{MachineInfo, Providers, RomProvider};

/// The address of the system variable `FLAGS2` in the Spectrum ROM.
const FLAGS2_ADDRESS: u16 = 0x5C3B;
/// `FLAGS2` bit 3: the ROM editor is ready to run a program.
const FLAGS2_RUN_MODE: u8 = 0b0000_1000;

/// Where the execution cycle is, or why it has returned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ExecutionState {
    /// A new frame begins with the next cycle.
    #[default]
    FrameStart,
    /// Executing instructions of the current frame.
    InFrame,
    /// The last frame has just been completed.
    FrameDone,
    /// Returned because of the cancellation request.
    Cancelled,
    /// Returned because the debugger stopped.
    StoppedForDebug,
    /// Returned at the termination point.
    StoppedForTermination,
    /// Returned because the CPU is halted.
    StoppedForHalt,
}

/// Called with the context of each completed frame.
pub type FrameListener = Box<dyn FnMut(&FrameContext) + Send>;

/// A ZX Spectrum virtual machine.
pub struct Spectrum {
    config: MachineConfig,
    info: MachineInfo,
    cpu: SpectrumCpu,
    bus: SpectrumBus,
    clock: Box<dyn HostClock>,
    rom: Box<dyn RomProvider>,
    debug: DebugState,
    frame_tacts: u32,
    physical_frame_clock_count: f64,
    frame_count: u64,
    overflow: u32,
    frame_completed: bool,
    runs_in_maskable_interrupt: bool,
    state: ExecutionState,
    frame_listener: Option<FrameListener>,
}

impl Spectrum {
    /// Build a machine of the configured model with the given providers.
    ///
    /// The clock and the ROM providers are mandatory.
    pub fn new(config: MachineConfig, providers: Providers) -> Result<Self, ConfigError> {
        config.validate()?;
        let Providers { clock, rom, screen, beeper, sound, keyboard, tape } = providers;
        let clock = clock.ok_or(ConfigError::MissingClock)?;
        let mut rom = rom.ok_or(ConfigError::MissingRom { index: 0 })?;

        let multiplier = ClockMultiplier::normalize(config.cpu.clock_multiplier);
        let frame_tacts = config.screen.frame_tacts();
        let info = MachineInfo {
            model: config.model,
            base_clock_hz: config.cpu.base_clock_hz,
            clock_multiplier: multiplier.get(),
            frame_tacts,
            sample_rate: config.audio.sample_rate
        };

        let mut memory = PagedMemory::new(config.model, &config.memory);
        for index in 0..config.memory.rom_count {
            let bytes = rom.rom_bytes(index).ok_or(ConfigError::MissingRom { index })?;
            memory.load_rom(index, &bytes)?;
        }
        let screen = ScreenDevice::new(&config.screen, screen);
        let cpu = SpectrumCpu::new(CpuClock::new(multiplier, screen.contention_table()));
        let sound = match config.model {
            SpectrumModel::Spectrum48 => None,
            SpectrumModel::Spectrum128 => Some(SoundDevice::new(&info, sound))
        };
        let bus = SpectrumBus::new(
            memory,
            screen,
            InterruptDevice::new(config.screen.interrupt_tact),
            KeyboardDevice::new(keyboard),
            BeeperDevice::new(&info, beeper),
            sound,
            TapeDevice::new(&info, tape)
        );

        let physical_frame_clock_count = clock.frequency() as f64
                                         / f64::from(config.cpu.base_clock_hz)
                                         * f64::from(frame_tacts);
        let mut spectrum = Spectrum {
            config,
            info,
            cpu,
            bus,
            clock,
            rom,
            debug: DebugState::new(),
            frame_tacts,
            physical_frame_clock_count,
            frame_count: 0,
            overflow: 0,
            frame_completed: true,
            runs_in_maskable_interrupt: false,
            state: ExecutionState::FrameStart,
            frame_listener: None
        };
        spectrum.clock.on_attached_to_vm(&info);
        spectrum.rom.on_attached_to_vm(&info);
        for device in spectrum.bus.devices_mut() {
            device.on_attached_to_vm(&info);
        }
        info!("{:?} attached: {} tacts per frame, clock x{}", info.model, frame_tacts, info.clock_multiplier);
        Ok(spectrum)
    }

    /// Reset the CPU, the devices and the frame state. ROMs and breakpoints are kept.
    pub fn reset(&mut self) {
        debug!("reset");
        self.bus.kill_sound();
        self.cpu.reset();
        for device in self.bus.devices_mut() {
            device.reset();
        }
        self.clock.reset();
        self.rom.reset();
        self.debug.set_imminent_breakpoint(None);
        self.debug.clear_last_breakpoint();
        self.frame_count = 0;
        self.overflow = 0;
        self.frame_completed = true;
        self.runs_in_maskable_interrupt = false;
        self.state = ExecutionState::FrameStart;
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn info(&self) -> &MachineInfo {
        &self.info
    }

    pub fn cpu(&self) -> &SpectrumCpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut SpectrumCpu {
        &mut self.cpu
    }

    pub fn bus(&self) -> &SpectrumBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut SpectrumBus {
        &mut self.bus
    }

    pub fn debug_state(&self) -> &DebugState {
        &self.debug
    }

    pub fn debug_state_mut(&mut self) -> &mut DebugState {
        &mut self.debug
    }

    /// Return the number of base clock tacts in a frame.
    pub fn frame_tacts(&self) -> u32 {
        self.frame_tacts
    }

    /// Return the number of frames completed since the last reset.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Return the number of tacts the last completed frame spilled over into the next one.
    pub fn overflow(&self) -> u32 {
        self.overflow
    }

    /// Return whether the last frame has been completed and the next one has not started yet.
    pub fn has_frame_completed(&self) -> bool {
        self.frame_completed
    }

    /// Set the function notified at the end of each frame, returning the previous one.
    pub fn set_frame_listener(&mut self, listener: Option<FrameListener>) -> Option<FrameListener> {
        core::mem::replace(&mut self.frame_listener, listener)
    }

    pub fn execution_state(&self) -> ExecutionState {
        self.state
    }

    /// Return whether the CPU is executing the maskable interrupt routine.
    pub fn runs_in_maskable_interrupt(&self) -> bool {
        self.runs_in_maskable_interrupt
    }

    /// Return the CPU T-state counter value at the start of the current frame.
    pub fn last_frame_start_tacts(&self) -> Ts {
        self.cpu.clock().frame_start()
    }

    /// Return the number of base clock tacts elapsed in the current frame.
    #[inline]
    pub fn current_frame_tact(&self) -> u32 {
        self.cpu.clock().frame_tact()
    }

    /// Return the physical clock ticks of the host clock per emulated frame.
    pub fn physical_frame_clock_count(&self) -> f64 {
        self.physical_frame_clock_count
    }

    #[inline]
    fn sync_contention(&mut self) {
        let slots = self.bus.memory.contended_slots();
        self.cpu.clock_mut().set_contended_slots(slots);
    }

    /// Write a byte to memory as the CPU would, delaying the CPU clock on contention.
    pub fn write_memory(&mut self, addr: u16, value: u8) {
        self.sync_contention();
        self.cpu.clock_mut().contention_wait(addr);
        self.bus.memory.write(addr, value);
    }

    /// Read a byte from memory, delaying the CPU clock on contention unless `no_contention` is set.
    pub fn read_memory(&mut self, addr: u16, no_contention: bool) -> u8 {
        if !no_contention {
            self.sync_contention();
            self.cpu.clock_mut().contention_wait(addr);
        }
        self.bus.memory.read(addr)
    }

    /// Copy `code` into memory at `addr`, ignoring writes into ROM.
    pub fn inject_code(&mut self, addr: u16, code: &[u8]) {
        let mut addr = addr;
        for byte in code {
            self.bus.memory.write(addr, *byte);
            addr = addr.wrapping_add(1);
        }
    }

    /// Continue the execution at `pc`.
    pub fn set_pc(&mut self, pc: u16) {
        self.cpu.set_pc(pc);
    }

    /// Make the ROM editor believe a program is ready to run and leave the interrupt routine.
    pub fn prepare_run_mode(&mut self) {
        self.runs_in_maskable_interrupt = false;
        let flags2 = self.bus.memory.read(FLAGS2_ADDRESS);
        self.bus.memory.write(FLAGS2_ADDRESS, flags2 | FLAGS2_RUN_MODE);
    }

    /// Return a disassembled preview of the instruction to be executed next.
    ///
    /// The instruction shown might not be the one executed if an interrupt is accepted first.
    pub fn debug_preview(&self) -> Option<CpuDebug> {
        let z80 = self.cpu.z80();
        let mut pc = z80.get_pc();
        let mut code = Vec::with_capacity(4);
        if let Some(prefix) = z80.get_prefix() {
            code.push(prefix as u8);
            pc = pc.wrapping_sub(1);
        }
        for n in code.len()..4 {
            code.push(self.bus.read_debug(pc.wrapping_add(n as u16)));
        }
        disasm_memory::<Z80NMOS, _, CpuDebug>(pc, &code, Err).err()
    }

    fn frame_context(&self) -> FrameContext {
        let clock = self.cpu.clock();
        FrameContext {
            tacts: clock.tacts(),
            frame_start: clock.frame_start(),
            frame_tact: clock.frame_tact(),
            frame_count: self.frame_count,
            overflow: self.overflow,
            pc: self.cpu.pc()
        }
    }

    fn start_frame(&mut self) {
        self.cpu.clock_mut().start_frame(self.overflow);
        let clock = self.cpu.clock();
        self.bus.set_frame_origin(clock.frame_start(), clock.multiplier().get());
        let ctx = self.frame_context();
        for device in self.bus.devices_mut() {
            if let Some(device) = device.as_frame_bound() {
                device.on_new_frame(&ctx);
            }
        }
        if self.overflow > 0 {
            self.bus.screen.render_screen(0, self.overflow - 1, &self.bus.memory);
        }
        self.frame_completed = false;
    }

    fn render_to_current_tact(&mut self) {
        let tact = self.current_frame_tact();
        let next = self.bus.screen.next_tact();
        if tact >= next {
            self.bus.screen.render_screen(next, tact, &self.bus.memory);
        }
    }

    fn complete_frame(&mut self) {
        self.frame_count += 1;
        self.overflow = self.current_frame_tact() % self.frame_tacts;
        let ctx = self.frame_context();
        for device in self.bus.devices_mut() {
            if let Some(device) = device.as_frame_bound() {
                device.on_frame_completed(&ctx);
            }
        }
        if let Some(listener) = self.frame_listener.as_mut() {
            listener(&ctx);
        }
    }

    fn cancelled(&mut self) -> bool {
        debug!("execution cycle cancelled at frame: {} tact: {}", self.frame_count, self.current_frame_tact());
        self.bus.pause_sound();
        self.state = ExecutionState::Cancelled;
        false
    }

    /// Run the machine according to the `options` until it stops or the `token` is cancelled.
    ///
    /// Return `true` if the cycle has completed as requested by the `options`
    /// and `false` if it has been cancelled.
    pub fn execute_cycle(&mut self, token: &CancelToken, options: &ExecuteCycleOptions) -> bool {
        let mode = options.emulation_mode;
        if mode != EmulationMode::Debugger || options.debug_step_mode != DebugStepMode::StepOver {
            self.debug.set_imminent_breakpoint(None);
        }
        self.bus.play_sound();
        let cycle_start = self.clock.counter();
        let mut cycle_frame_count: u64 = 0;
        let mut executed: u64 = 0;

        while !token.is_cancelled() {
            if self.frame_completed {
                self.state = ExecutionState::FrameStart;
                self.start_frame();
            }
            self.state = ExecutionState::InFrame;

            while !self.frame_completed {
                let pc = self.cpu.pc();
                if self.runs_in_maskable_interrupt && pc == self.config.isr_return_address {
                    self.runs_in_maskable_interrupt = false;
                }

                if !self.cpu.is_in_op_execution() {
                    if token.is_cancelled() {
                        return self.cancelled()
                    }
                    let executed_before = executed;
                    executed += 1;

                    if mode == EmulationMode::UntilExecutionPoint
                       && executed_before > 0
                       && pc == options.termination_point
                       && self.bus.memory.selected_rom() == options.termination_rom {
                        debug!("termination point reached: {:04X}", pc);
                        self.state = ExecutionState::StoppedForTermination;
                        return true
                    }

                    if self.cpu.maskable_interrupt_mode_entered() {
                        self.runs_in_maskable_interrupt = true;
                        self.bus.interrupt.acknowledge();
                    }

                    if mode == EmulationMode::Debugger {
                        let (cpu, bus) = (&self.cpu, &self.bus);
                        let stop = self.debug.is_debug_stop(options, executed_before, pc,
                                                            self.runs_in_maskable_interrupt,
                                                            || cpu.call_instruction_length(bus));
                        if stop {
                            debug!("debugger stop at: {:04X}", pc);
                            self.render_to_current_tact();
                            self.bus.screen.publish_frame();
                            self.state = ExecutionState::StoppedForDebug;
                            return true
                        }
                    }
                }

                let tact = self.current_frame_tact();
                self.bus.interrupt.check_for_interrupt(tact, &mut self.cpu);
                self.sync_contention();
                self.cpu.execute_cpu_cycle(&mut self.bus);
                self.debug.clear_last_breakpoint();
                self.render_to_current_tact();

                if mode == EmulationMode::UntilHalt && self.cpu.is_halted() {
                    debug!("CPU halted at: {:04X}", self.cpu.pc());
                    self.state = ExecutionState::StoppedForHalt;
                    return true
                }

                let ctx = self.frame_context();
                for device in self.bus.devices_mut() {
                    if let Some(device) = device.as_operation_bound() {
                        device.on_cpu_operation_completed(&ctx);
                    }
                }

                self.frame_completed = !self.cpu.is_in_op_execution()
                                       && self.current_frame_tact() >= self.frame_tacts;
            }

            self.state = ExecutionState::FrameDone;
            cycle_frame_count += 1;
            self.complete_frame();
            if mode == EmulationMode::UntilFrameEnds {
                return true
            }

            let next_frame = cycle_start as f64 + cycle_frame_count as f64 * self.physical_frame_clock_count;
            self.clock.wait_until(next_frame as u64, token);
        }
        self.cancelled()
    }
}
