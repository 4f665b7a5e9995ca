//! In-memory W25Qxx model driven one byte at a time.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use winbond_w25_tinyflash::{Config, Transport, W25Flash};

pub const W25Q64: [u8; 3] = [0xEF, 0x40, 0x17];
pub const MIB: u32 = 1024 * 1024;

/// Simulated time in nanoseconds, shared by the chip and the delay.
#[derive(Clone, Default)]
pub struct Clock(Rc<Cell<u64>>);

impl Clock {
    pub fn now_ns(&self) -> u64 {
        self.0.get()
    }

    pub fn now_ms(&self) -> u64 {
        self.0.get() / 1_000_000
    }

    pub fn advance(&self, ns: u64) {
        self.0.set(self.0.get() + ns);
    }
}

/// `DelayNs` that only moves the simulated clock forward.
pub struct SimDelay {
    clock: Clock,
}

impl SimDelay {
    pub fn new(clock: Clock) -> Self {
        Self { clock }
    }
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.clock.advance(u64::from(ns));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    AlreadySelected,
    NotSelected,
    Fault,
}

struct ChipState {
    clock: Clock,
    memory: Vec<u8>,
    jedec_id: [u8; 3],
    wel: bool,
    busy_until: u64,
    stuck_busy: bool,
    write_protected: bool,
    program_ns: u64,
    sector_erase_ns: u64,
    chip_erase_ns: u64,
    selected: bool,
    byte_fault: Option<(u8, usize)>,
    deselect_fault: Option<u8>,
    current: Vec<u8>,
    transactions: Vec<Vec<u8>>,
}

impl ChipState {
    fn busy(&self) -> bool {
        self.stuck_busy || self.clock.now_ns() < self.busy_until
    }

    fn status(&self) -> u8 {
        u8::from(self.busy()) | (u8::from(self.wel) << 1)
    }

    fn address(&self) -> usize {
        (usize::from(self.current[1]) << 16)
            | (usize::from(self.current[2]) << 8)
            | usize::from(self.current[3])
    }

    /// MISO byte for the `n`th byte (1-based) of the current instruction.
    fn response(&self, n: usize) -> u8 {
        if n == 1 {
            return 0xFF;
        }
        let opcode = self.current[0];
        if self.busy() && opcode != 0x05 {
            return 0xFF;
        }
        match opcode {
            0x05 => self.status(),
            0x9F => self.jedec_id.get(n - 2).copied().unwrap_or(0xFF),
            0x90 if n >= 5 => [self.jedec_id[0], self.jedec_id[2].wrapping_sub(1)][(n - 5) % 2],
            0x03 if n >= 5 => {
                let len = self.memory.len();
                self.memory[(self.address() + n - 5) % len]
            }
            _ => 0xFF,
        }
    }

    /// Runs the instruction latched by raising chip select.
    fn execute(&mut self, bytes: &[u8]) {
        let Some(&opcode) = bytes.first() else {
            return;
        };
        if self.busy() {
            return;
        }
        let now = self.clock.now_ns();
        match opcode {
            0x06 if bytes.len() == 1 && !self.write_protected => self.wel = true,
            0x04 if bytes.len() == 1 => self.wel = false,
            0x02 if self.wel && bytes.len() > 4 => {
                let addr = self.address();
                let base = addr & !0xFF;
                // Data past the end of the page wraps to its start.
                for (i, byte) in bytes[4..].iter().enumerate() {
                    let offset = ((addr & 0xFF) + i) % 256;
                    let index = (base + offset) % self.memory.len();
                    self.memory[index] &= *byte;
                }
                self.wel = false;
                self.busy_until = now + self.program_ns;
            }
            0x20 if self.wel && bytes.len() == 4 => {
                let base = (self.address() & !0xFFF) % self.memory.len();
                self.memory[base..base + 4096].fill(0xFF);
                self.wel = false;
                self.busy_until = now + self.sector_erase_ns;
            }
            0x60 if self.wel && bytes.len() == 1 => {
                self.memory.fill(0xFF);
                self.wel = false;
                self.busy_until = now + self.chip_erase_ns;
            }
            _ => {}
        }
    }
}

/// Handle to a simulated chip; clones share the same chip.
#[derive(Clone)]
pub struct SimChip {
    state: Rc<RefCell<ChipState>>,
}

impl SimChip {
    pub fn new(jedec_id: [u8; 3], size: usize) -> Self {
        Self {
            state: Rc::new(RefCell::new(ChipState {
                clock: Clock::default(),
                memory: vec![0xFF; size],
                jedec_id,
                wel: false,
                busy_until: 0,
                stuck_busy: false,
                write_protected: false,
                program_ns: 700_000,
                sector_erase_ns: 45_000_000,
                chip_erase_ns: 2_000_000_000,
                selected: false,
                byte_fault: None,
                deselect_fault: None,
                current: Vec::new(),
                transactions: Vec::new(),
            })),
        }
    }

    pub fn w25q64() -> Self {
        Self::new(W25Q64, 8 * MIB as usize)
    }

    pub fn clock(&self) -> Clock {
        self.state.borrow().clock.clone()
    }

    pub fn load(&self, addr: usize, data: &[u8]) {
        self.state.borrow_mut().memory[addr..addr + data.len()].copy_from_slice(data);
    }

    pub fn memory(&self, addr: usize, len: usize) -> Vec<u8> {
        self.state.borrow().memory[addr..addr + len].to_vec()
    }

    pub fn set_stuck_busy(&self, stuck: bool) {
        self.state.borrow_mut().stuck_busy = stuck;
    }

    pub fn set_write_protected(&self, protected: bool) {
        self.state.borrow_mut().write_protected = protected;
    }

    pub fn set_chip_erase_ns(&self, ns: u64) {
        self.state.borrow_mut().chip_erase_ns = ns;
    }

    /// Fails the `n`th byte (1-based) of every `opcode` instruction.
    pub fn set_byte_fault(&self, opcode: u8, n: usize) {
        self.state.borrow_mut().byte_fault = Some((opcode, n));
    }

    /// Fails the deselect ending an `opcode` instruction and leaves chip
    /// select asserted.
    pub fn set_deselect_fault(&self, opcode: Option<u8>) {
        self.state.borrow_mut().deselect_fault = opcode;
    }

    pub fn wel(&self) -> bool {
        self.state.borrow().wel
    }

    pub fn is_selected(&self) -> bool {
        self.state.borrow().selected
    }

    /// Bytes sent in each completed select..deselect window.
    pub fn transactions(&self) -> Vec<Vec<u8>> {
        self.state.borrow().transactions.clone()
    }

    /// Bytes sent so far in the window that is still open.
    pub fn pending(&self) -> Vec<u8> {
        self.state.borrow().current.clone()
    }

    pub fn opcodes(&self) -> Vec<u8> {
        self.transactions().iter().map(|t| t[0]).collect()
    }

    pub fn clear_log(&self) {
        self.state.borrow_mut().transactions.clear();
    }
}

impl Transport for SimChip {
    type Error = SimError;

    fn select(&mut self) -> Result<(), SimError> {
        let mut state = self.state.borrow_mut();
        if state.selected {
            return Err(SimError::AlreadySelected);
        }
        state.selected = true;
        state.current.clear();
        Ok(())
    }

    fn deselect(&mut self) -> Result<(), SimError> {
        let mut state = self.state.borrow_mut();
        if !state.selected {
            return Ok(());
        }
        let opcode = state.current.first().copied();
        if opcode.is_some() && state.deselect_fault == opcode {
            return Err(SimError::Fault);
        }
        state.selected = false;
        let bytes = std::mem::take(&mut state.current);
        state.execute(&bytes);
        state.transactions.push(bytes);
        Ok(())
    }

    fn exchange_byte(&mut self, byte: u8) -> Result<u8, SimError> {
        let mut state = self.state.borrow_mut();
        if !state.selected {
            return Err(SimError::NotSelected);
        }
        state.current.push(byte);
        let n = state.current.len();
        if state.byte_fault == Some((state.current[0], n)) {
            return Err(SimError::Fault);
        }
        Ok(state.response(n))
    }
}

pub type SimFlash = W25Flash<SimChip, SimDelay>;

/// A driver on `chip` with `begin` already run and the log cleared.
pub fn started(chip: &SimChip) -> SimFlash {
    started_with(chip, Config::default())
}

pub fn started_with(chip: &SimChip, config: Config) -> SimFlash {
    let mut flash = W25Flash::with_config(chip.clone(), SimDelay::new(chip.clock()), config);
    flash.begin().unwrap();
    chip.clear_log();
    flash
}
