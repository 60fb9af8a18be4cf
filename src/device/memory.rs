/*
    spectrum-engine: ZX Spectrum execution cycle engine.
    Copyright (C) 2024  spectrum-engine contributors

    For the full copyright notice, see the lib.rs file.
*/
//! Paged ROM and RAM of the Spectrum models.
use bitflags::bitflags;

#[allow(unused_imports)]
use log::{error, warn, info, debug, trace, Level};

use crate::config::{SpectrumModel, MemoryConfig, BANK_SIZE};
use crate::error::ConfigError;
use super::Device;

const SLOTS: usize = 4;
const SLOT_SHIFT: u32 = 14;
const OFFSET_MASK: u16 = (BANK_SIZE - 1) as u16;

/// The paging port bits of the 128K model.
const PAGING_RAM_MASK: u8 = 0b0000_0111;
const PAGING_SHADOW_SCREEN: u8 = 0b0000_1000;
const PAGING_ROM_SELECT: u8 = 0b0001_0000;
const PAGING_LOCK: u8 = 0b0010_0000;

bitflags! {
    /// The set of 16kb address slots whose accesses are contended.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ContendedSlots: u8 {
        const SLOT0 = 0b0001;
        const SLOT1 = 0b0010;
        const SLOT2 = 0b0100;
        const SLOT3 = 0b1000;
    }
}

impl ContendedSlots {
    /// Return the flag of the slot with the given index.
    pub fn from_slot(slot: usize) -> Self {
        assert!(slot < SLOTS, "invalid memory slot: {}", slot);
        ContendedSlots::from_bits_retain(1 << slot)
    }

    /// Return whether the `addr` lies in one of the slots in this set.
    #[inline]
    pub fn covers(self, addr: u16) -> bool {
        self.bits() & (1 << (addr >> SLOT_SHIFT)) != 0
    }
}

/// What is paged in a 16kb slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Bank {
    Rom(usize),
    Ram(usize),
}

/// Where an address of the CPU address space is stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AddressLocation {
    pub bank: Bank,
    pub offset: u16,
}

/// Read access to the video memory for the screen renderer.
pub trait ScreenMemory {
    /// Return a byte at the `offset` from the start of the active screen bank.
    fn screen_byte(&self, offset: u16) -> u8;
}

/// The memory of the machine: up to 2 ROMs and up to 8 RAM banks paged into 4 slots.
pub struct PagedMemory {
    model: SpectrumModel,
    roms: Vec<Box<[u8]>>,
    ram: Vec<Box<[u8]>>,
    slots: [Bank; SLOTS],
    contended_banks: u8,
    screen_bank: usize,
    paging_locked: bool,
}

impl PagedMemory {
    /// Create the memory of the given model. ROMs are filled with `0xFF` until loaded.
    pub fn new(model: SpectrumModel, config: &MemoryConfig) -> Self {
        let roms = (0..config.rom_count).map(|_| vec![u8::MAX;BANK_SIZE].into_boxed_slice()).collect();
        let ram = (0..config.ram_bank_count).map(|_| vec![0;BANK_SIZE].into_boxed_slice()).collect();
        let mut memory = PagedMemory {
            model,
            roms,
            ram,
            slots: [Bank::Rom(0); SLOTS],
            contended_banks: 0,
            screen_bank: 0,
            paging_locked: false
        };
        memory.reset_paging();
        memory
    }

    fn reset_paging(&mut self) {
        match self.model {
            SpectrumModel::Spectrum48 => {
                self.slots = [Bank::Rom(0), Bank::Ram(0), Bank::Ram(1), Bank::Ram(2)];
                self.contended_banks = 0b0000_0001;
                self.screen_bank = 0;
            }
            SpectrumModel::Spectrum128 => {
                self.slots = [Bank::Rom(0), Bank::Ram(5), Bank::Ram(2), Bank::Ram(0)];
                self.contended_banks = 0b1010_1010;
                self.screen_bank = 5;
            }
        }
        self.paging_locked = false;
    }

    /// Copy a ROM image into the ROM bank with the given `index`.
    pub fn load_rom(&mut self, index: usize, data: &[u8]) -> Result<(), ConfigError> {
        let rom = self.roms.get_mut(index).ok_or(ConfigError::MissingRom { index })?;
        if data.len() > BANK_SIZE {
            return Err(ConfigError::InvalidRomSize { index, size: data.len() })
        }
        rom[..data.len()].copy_from_slice(data);
        debug!("ROM #{} loaded: {} bytes", index, data.len());
        Ok(())
    }

    #[inline]
    fn slot_bank(&self, addr: u16) -> (Bank, usize) {
        (self.slots[(addr >> SLOT_SHIFT) as usize], (addr & OFFSET_MASK) as usize)
    }

    /// Read a byte from the CPU address space.
    #[inline]
    pub fn read(&self, addr: u16) -> u8 {
        match self.slot_bank(addr) {
            (Bank::Rom(index), offset) => self.roms[index][offset],
            (Bank::Ram(index), offset) => self.ram[index][offset],
        }
    }

    /// Write a byte to the CPU address space. Writes to ROM are ignored.
    #[inline]
    pub fn write(&mut self, addr: u16, value: u8) {
        if let (Bank::Ram(index), offset) = self.slot_bank(addr) {
            self.ram[index][offset] = value;
        }
    }

    pub fn model(&self) -> SpectrumModel {
        self.model
    }

    pub fn rom_count(&self) -> usize {
        self.roms.len()
    }

    pub fn ram_bank_count(&self) -> usize {
        self.ram.len()
    }

    /// Page in the ROM with the given `index` into slot 0.
    ///
    /// # Panics
    /// Panics if there is no such ROM.
    pub fn select_rom(&mut self, index: usize) {
        assert!(index < self.roms.len(), "invalid ROM index: {}", index);
        self.slots[0] = Bank::Rom(index);
    }

    /// Return the index of the ROM paged into slot 0.
    pub fn selected_rom(&self) -> usize {
        match self.slots[0] {
            Bank::Rom(index) => index,
            Bank::Ram(..) => 0
        }
    }

    /// Page in the RAM `bank` into one of the slots 1 to 3.
    ///
    /// # Panics
    /// Panics if the slot or the bank index is invalid.
    pub fn page_in(&mut self, slot: usize, bank: usize) {
        assert!((1..SLOTS).contains(&slot), "invalid memory slot: {}", slot);
        assert!(bank < self.ram.len(), "invalid RAM bank: {}", bank);
        self.slots[slot] = Bank::Ram(bank);
    }

    /// Return the index of the RAM bank paged into the given slot.
    pub fn selected_bank(&self, slot: usize) -> Option<usize> {
        match self.slots.get(slot) {
            Some(Bank::Ram(index)) => Some(*index),
            _ => None
        }
    }

    /// Return the address at which the RAM `bank` is currently paged in.
    pub fn is_ram_bank_paged_in(&self, bank: usize) -> Option<u16> {
        self.slots.iter().position(|&b| b == Bank::Ram(bank))
                         .map(|slot| (slot as u16) << SLOT_SHIFT)
    }

    /// Return where the `addr` of the CPU address space is stored.
    pub fn address_location(&self, addr: u16) -> AddressLocation {
        let (bank, offset) = self.slot_bank(addr);
        AddressLocation { bank, offset: offset as u16 }
    }

    /// Return a copy of the 64 KiB the CPU currently sees.
    pub fn clone_memory(&self) -> Vec<u8> {
        (0..=u16::MAX).map(|addr| self.read(addr)).collect()
    }

    pub fn rom(&self, index: usize) -> &[u8] {
        &self.roms[index]
    }

    pub fn ram_bank(&self, index: usize) -> &[u8] {
        &self.ram[index]
    }

    pub fn ram_bank_mut(&mut self, index: usize) -> &mut [u8] {
        &mut self.ram[index]
    }

    /// Return which slots are contended with the current paging.
    pub fn contended_slots(&self) -> ContendedSlots {
        let mut slots = ContendedSlots::empty();
        for (index, bank) in self.slots.iter().enumerate() {
            if let Bank::Ram(bank) = bank {
                if self.contended_banks & (1 << bank) != 0 {
                    slots |= ContendedSlots::from_slot(index);
                }
            }
        }
        slots
    }

    /// Return the RAM bank the ULA displays.
    pub fn screen_bank(&self) -> usize {
        self.screen_bank
    }

    pub fn is_paging_locked(&self) -> bool {
        self.paging_locked
    }

    /// Handle a write to the 128K memory paging port.
    ///
    /// Bits 0-2 select the RAM bank in slot 3, bit 3 selects the shadow screen,
    /// bit 4 the ROM and bit 5 locks the paging until the next reset.
    pub fn write_paging_port(&mut self, value: u8) {
        if self.model != SpectrumModel::Spectrum128 {
            return
        }
        if self.paging_locked {
            trace!("paging locked, ignored: {:02x}", value);
            return
        }
        self.page_in(3, (value & PAGING_RAM_MASK) as usize);
        self.screen_bank = if value & PAGING_SHADOW_SCREEN != 0 { 7 } else { 5 };
        self.select_rom(usize::from(value & PAGING_ROM_SELECT != 0));
        self.paging_locked = value & PAGING_LOCK != 0;
    }
}

impl ScreenMemory for PagedMemory {
    #[inline]
    fn screen_byte(&self, offset: u16) -> u8 {
        self.ram[self.screen_bank][(offset & OFFSET_MASK) as usize]
    }
}

impl Device for PagedMemory {
    /// Clear the RAM and restore the power-on paging. ROMs are kept.
    fn reset(&mut self) {
        for bank in self.ram.iter_mut() {
            bank.fill(0);
        }
        self.reset_paging();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MachineConfig;

    fn memory128() -> PagedMemory {
        let cfg = MachineConfig::spectrum128();
        PagedMemory::new(cfg.model, &cfg.memory)
    }

    #[test]
    fn memory_48k_layout() {
        let cfg = MachineConfig::spectrum48();
        let mut mem = PagedMemory::new(cfg.model, &cfg.memory);
        mem.load_rom(0, &[0xF3, 0xAF]).unwrap();
        assert_eq!(mem.read(0), 0xF3);
        assert_eq!(mem.read(2), 0xFF);
        mem.write(0, 0);
        assert_eq!(mem.read(0), 0xF3);
        mem.write(0x4000, 0x55);
        assert_eq!(mem.ram_bank(0)[0], 0x55);
        assert_eq!(mem.screen_byte(0), 0x55);
        assert_eq!(mem.contended_slots(), ContendedSlots::SLOT1);
        assert_eq!(mem.is_ram_bank_paged_in(2), Some(0xC000));
        assert_eq!(mem.address_location(0x8123), AddressLocation { bank: Bank::Ram(1), offset: 0x0123 });
        let image = mem.clone_memory();
        assert_eq!(image.len(), 0x10000);
        assert_eq!(&image[..2], &[0xF3, 0xAF]);
        assert_eq!(image[0x4000], 0x55);
        assert_eq!(mem.load_rom(0, &[0;BANK_SIZE + 1]), Err(ConfigError::InvalidRomSize { index: 0, size: BANK_SIZE + 1 }));
        assert_eq!(mem.load_rom(1, &[0]), Err(ConfigError::MissingRom { index: 1 }));
    }

    #[test]
    fn memory_128k_paging() {
        let mut mem = memory128();
        assert_eq!(mem.selected_bank(3), Some(0));
        assert_eq!(mem.contended_slots(), ContendedSlots::SLOT1);
        mem.write_paging_port(0x13);
        assert_eq!(mem.selected_bank(3), Some(3));
        assert_eq!(mem.selected_rom(), 1);
        assert_eq!(mem.contended_slots(), ContendedSlots::SLOT1 | ContendedSlots::SLOT3);
        mem.write(0xC000, 0xAA);
        assert_eq!(mem.ram_bank(3)[0], 0xAA);
        mem.write_paging_port(0x2F);
        assert!(mem.is_paging_locked());
        assert_eq!(mem.screen_bank(), 7);
        mem.write_paging_port(0x00);
        assert_eq!(mem.selected_bank(3), Some(7));
        assert_eq!(mem.selected_rom(), 0);
        mem.reset();
        assert!(!mem.is_paging_locked());
        assert_eq!(mem.selected_bank(3), Some(0));
        assert_eq!(mem.ram_bank(3)[0], 0);
    }

    #[test]
    #[should_panic(expected = "invalid RAM bank")]
    fn memory_rejects_invalid_bank() {
        memory128().page_in(3, 8);
    }

    #[test]
    #[should_panic(expected = "invalid memory slot")]
    fn memory_rejects_invalid_slot() {
        memory128().page_in(0, 1);
    }

    #[test]
    fn contended_slots_cover_addresses() {
        let slots = ContendedSlots::SLOT1 | ContendedSlots::SLOT3;
        assert!(!slots.covers(0x3fff));
        assert!(slots.covers(0x4000));
        assert!(slots.covers(0x7fff));
        assert!(!slots.covers(0x8000));
        assert!(slots.covers(0xffff));
    }
}
