use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};

use crate::error::{Result, TransportError};

const READ_CHUNK_SIZE: usize = 256;

/// A duplex byte transport.
///
/// Reads block until a byte is available. On hardware this is a busy-wait
/// on the receive-ready flag (see [`crate::PolledUart`]); host adapters
/// report [`TransportError::Closed`] once their source is exhausted.
pub trait ByteChannel {
    /// Read exactly one byte.
    fn read_byte(&mut self) -> Result<u8>;

    /// Write exactly one byte.
    fn write_byte(&mut self, byte: u8) -> Result<()>;

    /// Write every byte of `bytes` in order.
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        for &byte in bytes {
            self.write_byte(byte)?;
        }
        Ok(())
    }

    /// Flush any bytes buffered by the channel.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<C: ByteChannel + ?Sized> ByteChannel for &mut C {
    fn read_byte(&mut self) -> Result<u8> {
        (**self).read_byte()
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        (**self).write_byte(byte)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write_all(bytes)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// Adapts any `Read + Write` stream (serial device, file, pipe) into a
/// [`ByteChannel`].
///
/// Reads are buffered internally so single-byte reads do not turn into
/// single-byte syscalls.
pub struct IoChannel<T> {
    inner: T,
    buf: [u8; READ_CHUNK_SIZE],
    pos: usize,
    len: usize,
}

impl<T> IoChannel<T> {
    /// Wrap a stream.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: [0; READ_CHUNK_SIZE],
            pos: 0,
            len: 0,
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the adapter and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read + Write> ByteChannel for IoChannel<T> {
    fn read_byte(&mut self) -> Result<u8> {
        while self.pos == self.len {
            let read = match self.inner.read(&mut self.buf) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    std::hint::spin_loop();
                    continue;
                }
                Err(err) => return Err(TransportError::Io(err)),
            };
            if read == 0 {
                return Err(TransportError::Closed);
            }
            self.pos = 0;
            self.len = read;
        }

        let byte = self.buf[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.write_all(&[byte])
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.inner.write(&bytes[offset..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => std::hint::spin_loop(),
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => std::hint::spin_loop(),
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }
}

impl<T> std::fmt::Debug for IoChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoChannel")
            .field("buffered", &(self.len - self.pos))
            .finish()
    }
}

/// In-memory [`ByteChannel`]: reads drain a queue, writes append to a log.
///
/// Used by the simulator and by tests on both sides of the link.
#[derive(Debug, Default, Clone)]
pub struct MemoryChannel {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
}

impl MemoryChannel {
    /// Create a channel whose reads will return `bytes` in order.
    pub fn with_input(bytes: impl AsRef<[u8]>) -> Self {
        Self {
            rx: bytes.as_ref().iter().copied().collect(),
            tx: Vec::new(),
        }
    }

    /// Queue more bytes for reading.
    pub fn feed(&mut self, bytes: impl AsRef<[u8]>) {
        self.rx.extend(bytes.as_ref());
    }

    /// Bytes not yet read.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Everything written so far.
    pub fn written(&self) -> &[u8] {
        &self.tx
    }

    /// Take everything written so far, leaving the log empty.
    pub fn take_written(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.tx)
    }
}

impl ByteChannel for MemoryChannel {
    fn read_byte(&mut self) -> Result<u8> {
        self.rx.pop_front().ok_or(TransportError::Closed)
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.tx.push(byte);
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.tx.extend_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn io_channel_reads_bytes_in_order() {
        let mut chan = IoChannel::new(Cursor::new(vec![1u8, 2, 3]));
        assert_eq!(chan.read_byte().unwrap(), 1);
        assert_eq!(chan.read_byte().unwrap(), 2);
        assert_eq!(chan.read_byte().unwrap(), 3);
        assert!(matches!(chan.read_byte(), Err(TransportError::Closed)));
    }

    #[test]
    fn io_channel_writes_through() {
        let mut chan = IoChannel::new(Cursor::new(Vec::<u8>::new()));
        chan.write_byte(0x40).unwrap();
        chan.write_all(&[1, 2]).unwrap();
        chan.flush().unwrap();
        assert_eq!(chan.into_inner().into_inner(), vec![0x40, 1, 2]);
    }

    #[test]
    fn io_channel_retries_interrupted_read() {
        let mut chan = IoChannel::new(InterruptedThenData {
            first: Some(ErrorKind::Interrupted),
            bytes: vec![7],
        });
        assert_eq!(chan.read_byte().unwrap(), 7);
    }

    #[test]
    fn io_channel_waits_out_would_block() {
        let mut chan = IoChannel::new(InterruptedThenData {
            first: Some(ErrorKind::WouldBlock),
            bytes: vec![0x40, 0],
        });
        assert_eq!(chan.read_byte().unwrap(), 0x40);
        assert_eq!(chan.read_byte().unwrap(), 0);
    }

    #[test]
    fn io_channel_write_zero_is_closed() {
        let mut chan = IoChannel::new(ZeroWriter);
        assert!(matches!(chan.write_byte(1), Err(TransportError::Closed)));
    }

    #[test]
    fn memory_channel_round_trip() {
        let mut chan = MemoryChannel::with_input([9u8, 8]);
        chan.feed([7u8]);
        assert_eq!(chan.pending(), 3);
        assert_eq!(chan.read_byte().unwrap(), 9);
        chan.write_all(b"ok").unwrap();
        assert_eq!(chan.written(), b"ok");
        assert_eq!(chan.take_written(), b"ok".to_vec());
        assert!(chan.written().is_empty());
    }

    #[test]
    fn mutable_reference_is_a_channel() {
        fn drain(mut chan: impl ByteChannel) -> u8 {
            chan.read_byte().unwrap()
        }
        let mut chan = MemoryChannel::with_input([5u8]);
        assert_eq!(drain(&mut chan), 5);
        assert_eq!(chan.pending(), 0);
    }

    /// Fails the first read with `first`, then serves `bytes`.
    struct InterruptedThenData {
        first: Option<ErrorKind>,
        bytes: Vec<u8>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if let Some(kind) = self.first.take() {
                return Err(std::io::Error::from(kind));
            }
            let n = self.bytes.len().min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[..n]);
            self.bytes.drain(..n);
            Ok(n)
        }
    }

    impl Write for InterruptedThenData {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Read for ZeroWriter {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Ok(0)
        }
    }

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
