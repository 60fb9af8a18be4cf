/*
    spectrum-engine: ZX Spectrum execution cycle engine.
    Copyright (C) 2024  spectrum-engine contributors

    For the full copyright notice, see the lib.rs file.
*/
//! The 40 key keyboard matrix.
#[cfg(feature = "serde")]
use serde::{Serialize, Deserialize};

use crate::providers::{KeyboardProvider, MachineInfo};
use super::{Device, FrameBound, FrameContext};

/// A key of the Spectrum keyboard.
///
/// The discriminant encodes the position in the matrix: `row * 5 + bit`,
/// where the row is selected by the address line `A8 + row` and the bit is
/// the data line the key pulls low.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum SpectrumKey {
    CapsShift = 0, Z, X, C, V,
    A, S, D, F, G,
    Q, W, E, R, T,
    N1, N2, N3, N4, N5,
    N0, N9, N8, N7, N6,
    P, O, I, U, Y,
    Enter, L, K, J, H,
    Space, SymShift, M, N, B,
}

impl SpectrumKey {
    /// Return the matrix row and the data bit of the key.
    pub const fn matrix(self) -> (usize, u8) {
        let code = self as u8;
        ((code / 5) as usize, code % 5)
    }
}

/// The state of the keyboard matrix.
pub struct KeyboardDevice {
    rows: [u8;8],
    provider: Option<Box<dyn KeyboardProvider>>,
}

impl KeyboardDevice {
    pub fn new(provider: Option<Box<dyn KeyboardProvider>>) -> Self {
        KeyboardDevice { rows: [0;8], provider }
    }

    pub fn set_key_status(&mut self, key: SpectrumKey, down: bool) {
        let (row, bit) = key.matrix();
        if down {
            self.rows[row] |= 1 << bit;
        }
        else {
            self.rows[row] &= !(1 << bit);
        }
    }

    pub fn is_key_down(&self, key: SpectrumKey) -> bool {
        let (row, bit) = key.matrix();
        self.rows[row] & (1 << bit) != 0
    }

    /// Return the key bits 0-4 as read from the ULA port, 0 meaning pressed.
    ///
    /// Each reset bit of the `high` address byte selects a row to scan.
    pub fn line_status(&self, high: u8) -> u8 {
        let pressed = self.rows.iter().enumerate()
                          .filter(|&(row, _)| high & (1 << row) == 0)
                          .fold(0, |acc, (_, keys)| acc | keys);
        !pressed & 0x1F
    }

    /// Apply the key changes reported by the provider.
    pub fn poll_provider(&mut self) {
        if let Some(mut provider) = self.provider.take() {
            provider.poll_keys(&mut |key, down| self.set_key_status(key, down));
            self.provider = Some(provider);
        }
    }
}

impl Device for KeyboardDevice {
    fn on_attached_to_vm(&mut self, info: &MachineInfo) {
        if let Some(provider) = self.provider.as_mut() {
            provider.on_attached_to_vm(info);
        }
    }

    fn reset(&mut self) {
        self.rows = [0;8];
        if let Some(provider) = self.provider.as_mut() {
            provider.reset();
        }
    }

    fn as_frame_bound(&mut self) -> Option<&mut dyn FrameBound> {
        Some(self)
    }
}

impl FrameBound for KeyboardDevice {
    fn on_new_frame(&mut self, _ctx: &FrameContext) {
        self.poll_provider();
    }

    fn on_frame_completed(&mut self, _ctx: &FrameContext) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::VmComponentProvider;

    struct Presses(Vec<(SpectrumKey, bool)>);

    impl VmComponentProvider for Presses {}

    impl KeyboardProvider for Presses {
        fn poll_keys(&mut self, apply: &mut dyn FnMut(SpectrumKey, bool)) {
            for (key, down) in self.0.drain(..) {
                apply(key, down);
            }
        }
    }

    #[test]
    fn keyboard_matrix_lines() {
        assert_eq!(SpectrumKey::CapsShift.matrix(), (0, 0));
        assert_eq!(SpectrumKey::A.matrix(), (1, 0));
        assert_eq!(SpectrumKey::N6.matrix(), (4, 4));
        assert_eq!(SpectrumKey::B.matrix(), (7, 4));
        let mut kbd = KeyboardDevice::new(None);
        assert_eq!(kbd.line_status(0x00), 0x1F);
        kbd.set_key_status(SpectrumKey::A, true);
        kbd.set_key_status(SpectrumKey::Space, true);
        assert_eq!(kbd.line_status(0xFD), 0x1E);
        assert_eq!(kbd.line_status(0x7F), 0x1E);
        assert_eq!(kbd.line_status(0xFE), 0x1F);
        assert_eq!(kbd.line_status(0x7D), 0x1E);
        kbd.set_key_status(SpectrumKey::A, false);
        assert_eq!(kbd.line_status(0xFD), 0x1F);
        assert!(kbd.is_key_down(SpectrumKey::Space));
    }

    #[test]
    fn keyboard_polls_provider_each_frame() {
        let provider = Presses(vec![(SpectrumKey::Enter, true), (SpectrumKey::L, true), (SpectrumKey::L, false)]);
        let mut kbd = KeyboardDevice::new(Some(Box::new(provider)));
        kbd.on_new_frame(&FrameContext::default());
        assert!(kbd.is_key_down(SpectrumKey::Enter));
        assert!(!kbd.is_key_down(SpectrumKey::L));
        assert_eq!(kbd.line_status(0xBF), 0x1E);
    }
}
