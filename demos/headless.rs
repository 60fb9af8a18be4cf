/*
    headless: Example program for the spectrum-engine library.
    Copyright (C) 2024  spectrum-engine contributors

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU General Public License as published by
    the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU General Public License for more details.

    You should have received a copy of the GNU General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.

    Author contact information: see Cargo.toml file, section [package.authors].
*/
#[macro_use]
extern crate clap;

use std::str::FromStr;
use std::time::{Duration, Instant};
use std::sync::{Arc, Mutex};
use std::fs;
#[allow(unused_imports)]
use log::{error, warn, info, debug, trace};
use simplelog::*;
use clap::App;
use spectrum_engine::*;
use spectrum_engine::providers::{VmComponentProvider, ScreenFrameProvider};
use spectrum_engine::thread::{VmController, VmEvent};

const DEFAULT_FRAMES: u64 = 250;
const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Keeps a checksum of the last published frame.
#[derive(Clone, Default)]
struct FrameDigest(Arc<Mutex<(u64, u32)>>);

impl VmComponentProvider for FrameDigest {}

impl ScreenFrameProvider for FrameDigest {
    fn display_frame(&mut self, pixels: &[u8], _width: usize, _height: usize) {
        let sum = pixels.iter().fold(0u32, |sum, &p| sum.rotate_left(3) ^ u32::from(p));
        let mut digest = self.0.lock().unwrap();
        digest.0 += 1;
        digest.1 = sum;
    }
}

/// DI; JR $ followed by an empty interrupt routine.
fn idle_rom() -> Vec<u8> {
    let mut rom = vec![0u8; 0x4000];
    rom[0..3].copy_from_slice(&[0xF3, 0x18, 0xFE]);
    rom[0x38] = 0xC9;
    rom
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    SimpleLogger::init(LevelFilter::Info, Config::default())?;

    let matches = App::new("Spectrum headless")
                  .version("1.0")
                  .author(crate_authors!())
                  .about("Runs a ZX Spectrum machine without any user interface.")
                  .arg_from_usage("[rom]...            'Paths to the ROM files, the first one is ROM 0'")
                  .arg_from_usage("-m, --model=[model] 'The machine model: 48 or 128'")
                  .arg_from_usage("-f, --frames=[n]    'How many frames to run'")
                  .arg_from_usage("-x, --multiplier=[n] 'The CPU clock multiplier: 1, 2, 4 or 8'")
                  .arg_from_usage("-b, --break=[addr]  'Stop at a breakpoint at the hexadecimal address'")
                  .get_matches();
    let config = match matches.value_of("model").unwrap_or("48") {
        "48" => MachineConfig::spectrum48(),
        "128" => MachineConfig::spectrum128(),
        model => return Err(format!("unknown model: {}", model).into())
    };
    let multiplier = matches.value_of("multiplier").map(u32::from_str).transpose()?.unwrap_or(1);
    let config = config.with_clock_multiplier(multiplier);
    let frames = matches.value_of("frames").map(u64::from_str).transpose()?.unwrap_or(DEFAULT_FRAMES);
    let breakpoint = matches.value_of("break").map(|addr| u16::from_str_radix(addr, 16)).transpose()?;

    let mut roms: Vec<Vec<u8>> = Vec::new();
    if let Some(paths) = matches.values_of("rom") {
        for path in paths {
            roms.push(fs::read(path)?);
        }
    }
    while roms.len() < config.memory.rom_count {
        warn!("using the idle ROM {}", roms.len());
        roms.push(idle_rom());
    }

    let digest = FrameDigest::default();
    let providers = Providers::new()
                    .with_clock(SystemClock::new())
                    .with_rom(StaticRoms(roms))
                    .with_screen(digest.clone());
    let mut spectrum = Spectrum::new(config, providers)?;
    let options = match breakpoint {
        Some(addr) => {
            spectrum.debug_state_mut().add_cpu_breakpoint(addr);
            ExecuteCycleOptions::debugger(DebugStepMode::StopAtBreakpoint)
        }
        None => ExecuteCycleOptions::continuous()
    };

    let start = Instant::now();
    let mut vm = VmController::spawn(spectrum);
    vm.run(options);
    loop {
        match vm.events().recv_timeout(EVENT_TIMEOUT)? {
            VmEvent::Frame { count } if count >= frames => {
                vm.pause();
            }
            VmEvent::Stopped { completed, state, pc } => {
                info!("stopped: {:?} at {:04X} completed: {}", state, pc, completed);
                break
            }
            _ => {}
        }
    }
    let spectrum = vm.terminate().ok_or("the machine thread has panicked")?;
    let (published, sum) = *digest.0.lock().unwrap();
    println!("{}", debug::Header);
    println!("{}", spectrum.cpu().registers());
    if let Some(deb) = spectrum.debug_preview() {
        println!("{}", debug::Preview(&deb));
    }
    println!("frames: {} published: {} checksum: {:08x} in {:?}",
             spectrum.frame_count(), published, sum, start.elapsed());
    Ok(())
}
