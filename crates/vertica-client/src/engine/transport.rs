//! Byte transport under the negotiation engine: a TCP socket, optionally
//! wrapped in a rustls session that is fed from the same socket.
//!
//! Every operation works on blocking and non-blocking sockets alike. On a
//! non-blocking socket `ErrorKind::WouldBlock` surfaces to the caller, which
//! turns it into a `Reading` or `Writing` poll result.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};

use bytes::{Buf, BytesMut};
use vertica_tls::ClientConnection;

const READ_CHUNK: usize = 8 * 1024;

/// Outcome of one TLS handshake step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Handshake {
    /// Handshake finished.
    Done,
    /// Blocked on reading.
    WantRead,
    /// Blocked on writing.
    WantWrite,
}

pub(crate) enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsTransport>),
}

pub(crate) struct TlsTransport {
    session: ClientConnection,
    sock: TcpStream,
}

impl Transport {
    pub(crate) fn socket(&self) -> &TcpStream {
        match self {
            Self::Plain(sock) => sock,
            Self::Tls(tls) => &tls.sock,
        }
    }

    /// Wrap the plain socket in a TLS session. A TLS transport is returned
    /// unchanged.
    pub(crate) fn into_tls(self, session: ClientConnection) -> Self {
        match self {
            Self::Plain(sock) => Self::Tls(Box::new(TlsTransport { session, sock })),
            tls @ Self::Tls(_) => tls,
        }
    }

    /// Whether the TLS handshake has completed.
    pub(crate) fn is_encrypted(&self) -> bool {
        match self {
            Self::Plain(_) => false,
            Self::Tls(tls) => !tls.session.is_handshaking(),
        }
    }

    /// Read one byte straight from the socket (the `SslRequest` answer).
    pub(crate) fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        let n = match self {
            Self::Plain(sock) => sock.read(&mut byte)?,
            Self::Tls(tls) => tls.sock.read(&mut byte)?,
        };
        Ok((n == 1).then_some(byte[0]))
    }

    /// Append whatever plaintext is available to `buf`.
    ///
    /// Returns the number of bytes appended; `0` means end of stream.
    pub(crate) fn read_into(&mut self, buf: &mut BytesMut) -> io::Result<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        match self {
            Self::Plain(sock) => {
                let n = sock.read(&mut chunk)?;
                buf.extend_from_slice(&chunk[..n]);
                Ok(n)
            }
            Self::Tls(tls) => loop {
                match tls.session.reader().read(&mut chunk) {
                    Ok(n) => {
                        buf.extend_from_slice(&chunk[..n]);
                        return Ok(n);
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                    Err(e) => return Err(e),
                }

                if tls.sock_read()? == 0 {
                    return Ok(0);
                }
                tls.flush_records()?;
            },
        }
    }

    /// Write as much of `buf` as the socket accepts, consuming what was sent.
    pub(crate) fn write_from(&mut self, buf: &mut BytesMut) -> io::Result<()> {
        match self {
            Self::Plain(sock) => {
                while buf.has_remaining() {
                    match sock.write(&buf[..]) {
                        Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                        Ok(n) => buf.advance(n),
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(e) => return Err(e),
                    }
                }
                Ok(())
            }
            Self::Tls(tls) => {
                if buf.has_remaining() {
                    tls.session.writer().write_all(&buf[..])?;
                    buf.clear();
                }
                tls.flush_records()
            }
        }
    }

    /// Whether bytes are queued below the caller's buffer.
    pub(crate) fn wants_write(&self) -> bool {
        match self {
            Self::Plain(_) => false,
            Self::Tls(tls) => tls.session.wants_write(),
        }
    }

    /// Advance the TLS handshake as far as the socket allows.
    pub(crate) fn handshake(&mut self) -> io::Result<Handshake> {
        let Self::Tls(tls) = self else {
            return Ok(Handshake::Done);
        };

        loop {
            while tls.session.wants_write() {
                match tls.session.write_tls(&mut tls.sock) {
                    Ok(_) => {}
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        return Ok(Handshake::WantWrite);
                    }
                    Err(e) => return Err(e),
                }
            }

            if !tls.session.is_handshaking() {
                return Ok(Handshake::Done);
            }

            match tls.sock_read() {
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(Handshake::WantRead);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Best-effort orderly close: queue `farewell` (already framed), flush it,
    /// then shut the socket down. Errors are ignored.
    pub(crate) fn close(mut self, farewell: Option<&[u8]>) {
        if let Some(bytes) = farewell {
            let mut buf = BytesMut::from(bytes);
            let _ = self.write_from(&mut buf);
        }
        if let Self::Tls(tls) = &mut self {
            tls.session.send_close_notify();
            let _ = tls.flush_records();
        }
        let _ = self.socket().shutdown(Shutdown::Both);
    }
}

impl TlsTransport {
    /// Pull TLS records off the socket and decrypt them.
    fn sock_read(&mut self) -> io::Result<usize> {
        let n = self.session.read_tls(&mut self.sock)?;
        if n > 0 {
            self.session
                .process_new_packets()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        }
        Ok(n)
    }

    fn flush_records(&mut self) -> io::Result<()> {
        while self.session.wants_write() {
            self.session.write_tls(&mut self.sock)?;
        }
        Ok(())
    }
}
