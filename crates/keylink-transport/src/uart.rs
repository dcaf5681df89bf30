//! Polled UART register access.

use std::collections::VecDeque;

use crate::error::Result;
use crate::traits::ByteChannel;

/// A UART data/status register pair.
pub trait UartRegisters {
    /// Receive status: a byte is waiting in the data register.
    fn rx_ready(&self) -> bool;

    /// Read the receive data register.
    fn read_rx(&mut self) -> u8;

    /// Transmit status: the data register can accept a byte.
    fn tx_ready(&self) -> bool;

    /// Write the transmit data register.
    fn write_tx(&mut self, byte: u8);
}

/// [`ByteChannel`] over a register pair, busy-waiting on the ready flags.
///
/// The spin is bounded by hardware timing only. There is no timeout: a peer
/// that never drives the line hangs the caller until reset.
#[derive(Debug)]
pub struct PolledUart<R> {
    regs: R,
}

impl<R: UartRegisters> PolledUart<R> {
    pub fn new(regs: R) -> Self {
        Self { regs }
    }

    pub fn registers(&self) -> &R {
        &self.regs
    }

    pub fn registers_mut(&mut self) -> &mut R {
        &mut self.regs
    }

    pub fn into_inner(self) -> R {
        self.regs
    }
}

impl<R: UartRegisters> ByteChannel for PolledUart<R> {
    fn read_byte(&mut self) -> Result<u8> {
        while !self.regs.rx_ready() {
            std::hint::spin_loop();
        }
        Ok(self.regs.read_rx())
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        while !self.regs.tx_ready() {
            std::hint::spin_loop();
        }
        self.regs.write_tx(byte);
        Ok(())
    }
}

/// Register model backed by memory, with a configurable transmit latency
/// so the ready-flag spin is exercised.
#[derive(Debug, Default)]
pub struct MemoryUart {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    tx_latency: u32,
    tx_countdown: std::cell::Cell<u32>,
}

impl MemoryUart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report "transmit busy" for `polls` status reads after every write.
    pub fn with_tx_latency(mut self, polls: u32) -> Self {
        self.tx_latency = polls;
        self
    }

    /// Bytes the peer has put on the wire.
    pub fn receive(&mut self, bytes: impl AsRef<[u8]>) {
        self.rx.extend(bytes.as_ref());
    }

    /// Bytes written to the transmit register.
    pub fn transmitted(&self) -> &[u8] {
        &self.tx
    }
}

impl UartRegisters for MemoryUart {
    fn rx_ready(&self) -> bool {
        !self.rx.is_empty()
    }

    fn read_rx(&mut self) -> u8 {
        self.rx.pop_front().unwrap_or(0)
    }

    fn tx_ready(&self) -> bool {
        let left = self.tx_countdown.get();
        if left == 0 {
            return true;
        }
        self.tx_countdown.set(left - 1);
        false
    }

    fn write_tx(&mut self, byte: u8) {
        self.tx.push(byte);
        self.tx_countdown.set(self.tx_latency);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_received_bytes() {
        let mut regs = MemoryUart::new();
        regs.receive([0x40, 0x02]);
        let mut uart = PolledUart::new(regs);

        assert_eq!(uart.read_byte().unwrap(), 0x40);
        assert_eq!(uart.read_byte().unwrap(), 0x02);
        assert!(!uart.registers().rx_ready());
    }

    #[test]
    fn writes_wait_for_transmit_ready() {
        let mut uart = PolledUart::new(MemoryUart::new().with_tx_latency(3));
        uart.write_all(&[1, 2, 3]).unwrap();
        assert_eq!(uart.into_inner().transmitted(), &[1, 2, 3]);
    }

    #[test]
    fn registers_mut_feeds_more_input() {
        let mut uart = PolledUart::new(MemoryUart::new());
        uart.registers_mut().receive([0xAA]);
        assert_eq!(uart.read_byte().unwrap(), 0xAA);
    }
}
