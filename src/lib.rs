/*
    spectrum-engine: ZX Spectrum execution cycle engine.
    Copyright (C) 2024  spectrum-engine contributors

    spectrum-engine is free software: you can redistribute it and/or modify it under
    the terms of the GNU Lesser General Public License (LGPL) as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    spectrum-engine is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Lesser General Public License for more details.

    You should have received a copy of the GNU Lesser General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.

    Author contact information: see Cargo.toml file, section [package.authors].
*/
/*! # Spectrum engine

`spectrum-engine` is a cycle-accurate execution engine of the ZX Spectrum 48K and 128K
home computers, built around the [z80emu] CPU.

```text
  _______                                    _____________
=|       |=  ------ [  CpuClock  ] -------- | Contention  |
=|       |=          T-states                |   table     |
=|  Cpu  |=                                  |_____________|
=|       |=                                        |
=|  Z80  |= ------- [ SpectrumBus ] -------- [ ScreenDevice ]
=|       |=           |    |    |                  |
=|       |=     memory  ports  devices        [ ScreenFrameProvider ]
=|_______|=
      |
 [ InterruptDevice ] <---- frame tact
```

The [Spectrum] machine owns the CPU, its clock, the bus with all the devices and the debugger
state. The host communicates with the machine through the providers given once at construction:

* a [HostClock](host::HostClock) used for pacing the emulation to 50 frames per second,
* a [RomProvider](providers::RomProvider) with the ROM images,
* optional screen, audio, keyboard and tape providers.

A single call to [Spectrum::execute_cycle] runs the machine until the condition selected by
[ExecuteCycleOptions] is met or the [CancelToken] is cancelled:

```no_run
use spectrum_engine::*;
# fn rom() -> Vec<u8> { vec![0xF3, 0x18, 0xFE] }
let providers = Providers::new()
                .with_clock(SystemClock::new())
                .with_rom(StaticRoms(vec![rom()]));
let mut spectrum = Spectrum::new(MachineConfig::spectrum48(), providers).unwrap();
let token = CancelToken::new();
assert!(spectrum.execute_cycle(&token, &ExecuteCycleOptions::until_frame_ends()));
assert_eq!(spectrum.frame_count(), 1);
```

To run the machine on its own thread use [VmController](thread::VmController).
*/
pub mod bus;
pub mod clock;
pub mod config;
pub mod cpu;
pub mod debug;
pub mod device;
pub mod error;
pub mod host;
pub mod machine;
pub mod options;
pub mod providers;
pub mod thread;

pub use z80emu;

pub use bus::SpectrumBus;
pub use clock::{ClockMultiplier, CpuClock, Ts};
pub use config::{MachineConfig, SpectrumModel};
pub use cpu::{Registers, SpectrumCpu};
pub use debug::{BreakpointInfo, DebugState, SourceBreakpoint, SourceMap};
pub use device::keyboard::SpectrumKey;
pub use error::ConfigError;
pub use host::{CancelToken, HostClock, SystemClock};
pub use machine::{ExecutionState, Spectrum};
pub use options::{DebugStepMode, EmulationMode, ExecuteCycleOptions};
pub use providers::{MachineInfo, Providers, StaticRoms};
