//! C5: the byte stream a [`crate::Connection`] reads and writes frames over.
//!
//! `std::io::Read`/`Write` already loop internally for `read_exact`/
//! `write_all`, so there is nothing this trait needs to add beyond naming the
//! bound - it exists so [`crate::Connection`] can be generic over it instead
//! of hard-wired to [`std::net::TcpStream`], and so tests can swap in
//! [`DuplexStream`].

use std::fmt::Debug;
use std::io::{self, Cursor, Read, Write};

/// A blocking, bidirectional byte stream a [`crate::Connection`] can frame
/// messages over.
///
/// Blanket-implemented for anything that is `Read + Write + Debug + Send`, so
/// [`std::net::TcpStream`] and [`DuplexStream`] satisfy it with no adapter
/// code.
pub trait Transport: Read + Write + Debug + Send {}

impl<T: Read + Write + Debug + Send> Transport for T {}

/// An in-memory stand-in for a socket, used by tests that need to exercise
/// [`crate::frame`] and [`crate::Connection`] without a live Rexster server.
///
/// `inbound` is pre-loaded with the bytes a real server would have sent;
/// reads pull from it in order. Writes accumulate in `outbound` so a test can
/// assert on what the connection sent.
#[derive(Debug)]
pub struct DuplexStream {
    inbound: Cursor<Vec<u8>>,
    outbound: Vec<u8>,
}

impl DuplexStream {
    /// Builds a duplex stream that will yield `inbound` to readers.
    pub fn new(inbound: Vec<u8>) -> Self {
        Self {
            inbound: Cursor::new(inbound),
            outbound: Vec::new(),
        }
    }

    /// The bytes written to this stream so far.
    pub fn written(&self) -> &[u8] {
        &self.outbound
    }

    /// Appends more bytes for subsequent reads to yield, e.g. a second
    /// server reply queued up after the first has been consumed.
    pub fn push_inbound(&mut self, bytes: &[u8]) {
        let pos = self.inbound.position();
        let mut buf = self.inbound.get_ref()[pos as usize..].to_vec();
        buf.extend_from_slice(bytes);
        self.inbound = Cursor::new(buf);
    }
}

impl Read for DuplexStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inbound.read(buf)
    }
}

impl Write for DuplexStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.outbound.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
