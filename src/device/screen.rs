/*
    spectrum-engine: ZX Spectrum execution cycle engine.
    Copyright (C) 2024  spectrum-engine contributors

    For the full copyright notice, see the lib.rs file.
*/
//! The ULA screen: raster timing, contention and rendering.
#[allow(unused_imports)]
use log::{error, warn, info, debug, trace, Level};

use crate::clock::ContentionTable;
use crate::config::ScreenConfig;
use crate::providers::{MachineInfo, ScreenFrameProvider};
use super::memory::ScreenMemory;
use super::{Device, FrameBound, FrameContext};

/// The delays of a contended access in consecutive tacts of the display area.
pub const CONTENTION_PATTERN: [u8;8] = [6, 5, 4, 3, 2, 1, 0, 0];
/// How many frames pass between the toggles of the flashing attributes.
pub const FLASH_FRAMES: u64 = 16;
/// The ARGB colors of the 16 palette indices rendered into the screen buffer.
pub const SPECTRUM_PALETTE: [u32;16] = [
    0xFF000000, 0xFF0000D7, 0xFFD70000, 0xFFD700D7,
    0xFF00D700, 0xFF00D7D7, 0xFFD7D700, 0xFFD7D7D7,
    0xFF000000, 0xFF0000FF, 0xFFFF0000, 0xFFFF00FF,
    0xFF00FF00, 0xFF00FFFF, 0xFFFFFF00, 0xFFFFFFFF,
];

const ATTRIBUTES_OFFSET: u16 = 0x1800;

/// What happens at a single frame tact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TactAction {
    /// Nothing visible.
    None,
    /// Two border pixels at the buffer index.
    Border { pixel: u32 },
    /// Two display pixels at the buffer index.
    Display { pixel: u32, bitmap: u16, attr: u16, shift: u8 },
}

/// Renders the screen memory into a buffer of palette indices, tact by tact.
pub struct ScreenDevice {
    config: ScreenConfig,
    frame_tacts: u32,
    width: usize,
    height: usize,
    actions: Vec<TactAction>,
    contention: ContentionTable,
    pixels: Vec<u8>,
    border: u8,
    flash: bool,
    next_tact: u32,
    tacts_rendered: u32,
    provider: Option<Box<dyn ScreenFrameProvider>>,
}

impl ScreenDevice {
    pub fn new(config: &ScreenConfig, provider: Option<Box<dyn ScreenFrameProvider>>) -> Self {
        let frame_tacts = config.frame_tacts();
        let width = config.screen_width() as usize;
        let height = config.screen_height() as usize;
        ScreenDevice {
            config: *config,
            frame_tacts,
            width,
            height,
            actions: render_actions(config),
            contention: ContentionTable::new(contention_delays(config)),
            pixels: vec![0;width * height],
            border: 7,
            flash: false,
            next_tact: 0,
            tacts_rendered: 0,
            provider
        }
    }

    pub fn config(&self) -> &ScreenConfig {
        &self.config
    }

    pub fn frame_tacts(&self) -> u32 {
        self.frame_tacts
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Return the contention table to be shared with the CPU clock.
    pub fn contention_table(&self) -> ContentionTable {
        self.contention.clone()
    }

    /// Return the contention delay at the given frame tact.
    pub fn contention_value(&self, frame_tact: u32) -> u8 {
        self.contention.value(frame_tact)
    }

    pub fn border(&self) -> u8 {
        self.border
    }

    pub fn set_border(&mut self, color: u8) {
        self.border = color & 7;
    }

    pub fn is_flash_inverted(&self) -> bool {
        self.flash
    }

    /// Return the rendered palette indices.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Return the first tact of the current frame not rendered yet.
    pub fn next_tact(&self) -> u32 {
        self.next_tact
    }

    /// Return the number of tacts rendered in the current frame.
    pub fn tacts_rendered(&self) -> u32 {
        self.tacts_rendered
    }

    /// Render the tacts from `from` to `to` inclusive, clamped to the frame.
    ///
    /// Tacts already rendered in the current frame are skipped, so overlapping
    /// ranges are rendered only once.
    pub fn render_screen(&mut self, from: u32, to: u32, memory: &dyn ScreenMemory) {
        let to = to.min(self.frame_tacts - 1);
        let from = from.max(self.next_tact);
        if from > to {
            return
        }
        for tact in from..=to {
            self.render_tact(tact, memory);
        }
        self.tacts_rendered += to - from + 1;
        self.next_tact = to + 1;
    }

    fn render_tact(&mut self, tact: u32, memory: &dyn ScreenMemory) {
        match self.actions[tact as usize] {
            TactAction::None => {}
            TactAction::Border { pixel } => {
                let pixel = pixel as usize;
                self.pixels[pixel..pixel + 2].fill(self.border);
            }
            TactAction::Display { pixel, bitmap, attr, shift } => {
                let bits = memory.screen_byte(bitmap) << shift;
                let (ink, paper) = attr_colors(memory.screen_byte(attr), self.flash);
                let pixel = pixel as usize;
                self.pixels[pixel] = if bits & 0x80 != 0 { ink } else { paper };
                self.pixels[pixel + 1] = if bits & 0x40 != 0 { ink } else { paper };
            }
        }
    }

    /// Hand the current buffer to the screen provider.
    pub fn publish_frame(&mut self) {
        if let Some(provider) = self.provider.as_mut() {
            provider.display_frame(&self.pixels, self.width, self.height);
        }
    }
}

impl Device for ScreenDevice {
    fn on_attached_to_vm(&mut self, info: &MachineInfo) {
        if let Some(provider) = self.provider.as_mut() {
            provider.on_attached_to_vm(info);
        }
    }

    fn reset(&mut self) {
        self.pixels.fill(0);
        self.border = 7;
        self.flash = false;
        self.next_tact = 0;
        self.tacts_rendered = 0;
        if let Some(provider) = self.provider.as_mut() {
            provider.reset();
        }
    }

    fn as_frame_bound(&mut self) -> Option<&mut dyn FrameBound> {
        Some(self)
    }
}

impl FrameBound for ScreenDevice {
    fn on_new_frame(&mut self, ctx: &FrameContext) {
        self.flash = (ctx.frame_count / FLASH_FRAMES) & 1 == 1;
        self.next_tact = 0;
        self.tacts_rendered = 0;
    }

    fn on_frame_completed(&mut self, _ctx: &FrameContext) {
        self.publish_frame();
    }
}

fn attr_colors(attr: u8, flash: bool) -> (u8, u8) {
    let bright = (attr & 0x40) >> 3;
    let ink = (attr & 0x07) | bright;
    let paper = ((attr >> 3) & 0x07) | bright;
    if flash && attr & 0x80 != 0 {
        (paper, ink)
    }
    else {
        (ink, paper)
    }
}

/// Return the offset of the bitmap byte of the display `line` and `column`.
fn bitmap_offset(line: u32, column: u32) -> u16 {
    (((line & 0xC0) << 5) | ((line & 0x07) << 8) | ((line & 0x38) << 2) | column) as u16
}

fn render_actions(config: &ScreenConfig) -> Vec<TactAction> {
    let line_tacts = config.line_tacts();
    let first_visible_line = config.first_visible_line();
    let first_display_line = config.first_display_line();
    let first_visible_tact = config.first_visible_tact();
    let first_pixel_tact = config.first_pixel_tact();
    let visible_tacts = config.screen_width() / 2;
    let width = config.screen_width();
    (0..config.frame_tacts()).map(|tact| {
        let line = tact / line_tacts;
        let line_tact = tact % line_tacts;
        if line < first_visible_line || line >= first_visible_line + config.screen_height()
           || line_tact < first_visible_tact || line_tact >= first_visible_tact + visible_tacts {
            return TactAction::None
        }
        let pixel = (line - first_visible_line) * width + 2 * (line_tact - first_visible_tact);
        if line >= first_display_line && line < first_display_line + config.display_lines
           && line_tact >= first_pixel_tact && line_tact < first_pixel_tact + config.display_line_time {
            let display_line = line - first_display_line;
            let display_tact = line_tact - first_pixel_tact;
            let column = display_tact / 4;
            TactAction::Display {
                pixel,
                bitmap: bitmap_offset(display_line, column),
                attr: ATTRIBUTES_OFFSET + ((display_line / 8) * 32 + column) as u16,
                shift: ((display_tact % 4) * 2) as u8
            }
        }
        else {
            TactAction::Border { pixel }
        }
    }).collect()
}

fn contention_delays(config: &ScreenConfig) -> Vec<u8> {
    let mut delays = vec![0;config.frame_tacts() as usize];
    let line_tacts = config.line_tacts();
    for line in 0..config.display_lines {
        let start = (config.first_display_line() + line) * line_tacts
                    + config.first_pixel_tact() - config.contention_lead_time;
        for (index, delay) in (0..config.display_line_time).zip(CONTENTION_PATTERN.iter().cycle()) {
            delays[(start + index) as usize] = *delay;
        }
    }
    delays
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MachineConfig;

    struct Vram(Vec<u8>);

    impl ScreenMemory for Vram {
        fn screen_byte(&self, offset: u16) -> u8 {
            self.0[offset as usize]
        }
    }

    #[test]
    fn screen_contention_48k() {
        let screen = ScreenDevice::new(&MachineConfig::spectrum48().screen, None);
        assert_eq!(screen.contention_value(14398), 0);
        assert_eq!(screen.contention_value(14399), 6);
        assert_eq!(screen.contention_value(14400), 5);
        assert_eq!(screen.contention_value(14405), 0);
        assert_eq!(screen.contention_value(14406), 0);
        assert_eq!(screen.contention_value(14407), 6);
        assert_eq!(screen.contention_value(14399 + 127), 0);
        assert_eq!(screen.contention_value(14399 + 128), 0);
        assert_eq!(screen.contention_value(14399 + 224), 6);
        assert_eq!(screen.contention_value(14399 + 191 * 224 + 120), 6);
        assert_eq!(screen.contention_value(14399 + 192 * 224), 0);
    }

    #[test]
    fn screen_contention_128k() {
        let cfg = MachineConfig::spectrum128();
        let screen = ScreenDevice::new(&cfg.screen, None);
        assert_eq!(screen.contention_value(14427), 6);
        assert_eq!(14427 - cfg.screen.interrupt_tact, 14361);
    }

    #[test]
    fn screen_renders_display_and_border() {
        let mut vram = Vram(vec![0;0x1B00]);
        vram.0[0] = 0b1010_0000;
        vram.0[0x1800] = 0b0100_0010; // bright, red ink, black paper
        vram.0[0x1801] = 0b1001_0001; // flash, blue ink, red paper
        let mut screen = ScreenDevice::new(&MachineConfig::spectrum48().screen, None);
        screen.set_border(1);
        let frame_tacts = screen.frame_tacts();
        screen.render_screen(0, frame_tacts + 100, &vram);
        assert_eq!(screen.tacts_rendered(), frame_tacts);
        let width = screen.width();
        let display = 48 * width + 48;
        assert_eq!(&screen.pixels()[display..display + 4], &[10, 8, 10, 8]);
        assert_eq!(&screen.pixels()[display + 8..display + 10], &[2, 2]);
        assert_eq!(screen.pixels()[0], 1);
        assert_eq!(screen.pixels()[display - 1], 1);
        assert_eq!(screen.pixels()[screen.pixels().len() - 1], 1);

        screen.on_new_frame(&FrameContext { frame_count: 16, ..FrameContext::default() });
        assert!(screen.is_flash_inverted());
        screen.render_screen(0, frame_tacts - 1, &vram);
        assert_eq!(&screen.pixels()[display + 8..display + 10], &[1, 1]);
    }

    #[test]
    fn screen_rendering_is_idempotent() {
        let vram = Vram(vec![0;0x1B00]);
        let mut screen = ScreenDevice::new(&MachineConfig::spectrum48().screen, None);
        screen.render_screen(0, 99, &vram);
        screen.render_screen(50, 199, &vram);
        screen.render_screen(120, 150, &vram);
        assert_eq!(screen.tacts_rendered(), 200);
        assert_eq!(screen.next_tact(), 200);
    }
}
