//! TL1 client.
//!
//! Sends one command at a time and blocks on the matching response block.
//! A response is complete once a line consisting solely of `;` arrives.

use crate::protocol::is_terminator;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, info};

/// Read lines until the terminator line and return them as one block.
///
/// Each line is returned with a `\n` ending, the terminator line included.
/// There is no deadline: a server that never sends `;` blocks this call.
/// End-of-stream before the terminator is reported as
/// [`io::ErrorKind::UnexpectedEof`].
pub async fn read_response<R>(reader: &mut R) -> io::Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut response = String::new();
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before end of response",
            ));
        }

        let line = line.trim_end_matches(['\r', '\n']);
        response.push_str(line);
        response.push('\n');

        if is_terminator(line) {
            return Ok(response);
        }
    }
}

/// Connected TL1 client
pub struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    banner: String,
}

impl Client {
    /// Connect and consume the server's welcome line.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> io::Result<Client> {
        let stream = TcpStream::connect(addr).await?;
        let peer = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let mut banner = String::new();
        if reader.read_line(&mut banner).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before welcome message",
            ));
        }
        let banner = banner.trim_end().to_string();

        info!(%peer, "Connected to TL1 server");
        Ok(Client {
            reader,
            writer,
            banner,
        })
    }

    /// The welcome line sent by the server.
    pub fn banner(&self) -> &str {
        &self.banner
    }

    pub async fn send_command(&mut self, command: &str) -> io::Result<()> {
        self.writer.write_all(command.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        debug!(command, "Sent");
        Ok(())
    }

    pub async fn read_response(&mut self) -> io::Result<String> {
        read_response(&mut self.reader).await
    }

    /// Send a command and wait for its response.
    pub async fn request(&mut self, command: &str) -> io::Result<String> {
        self.send_command(command).await?;
        self.read_response().await
    }

    pub async fn disconnect(mut self) -> io::Result<()> {
        self.writer.shutdown().await?;
        info!("Disconnected from TL1 server");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_read_response_block() {
        let mock = Builder::new()
            .read(b"\n\n   TID001 24-03-07 09:05:01\n")
            .read(b"M  001 COMPLD\n   \"ok\"\n")
            .read(b";\n")
            .build();
        let mut reader = BufReader::new(mock);

        let resp = read_response(&mut reader).await.unwrap();
        assert_eq!(
            resp,
            "\n\n   TID001 24-03-07 09:05:01\nM  001 COMPLD\n   \"ok\"\n;\n"
        );
    }

    #[tokio::test]
    async fn test_read_response_stops_at_terminator() {
        let mock = Builder::new()
            .read(b"M  1 COMPLD\n;\nM  2 DENY\n ; \r\n")
            .build();
        let mut reader = BufReader::new(mock);

        assert_eq!(read_response(&mut reader).await.unwrap(), "M  1 COMPLD\n;\n");
        assert_eq!(read_response(&mut reader).await.unwrap(), "M  2 DENY\n ; \n");
    }

    #[tokio::test]
    async fn test_semicolon_inside_line_is_not_terminator() {
        let mock = Builder::new()
            .read(b"   \"a;b\"\n;;\n;\n")
            .build();
        let mut reader = BufReader::new(mock);

        assert_eq!(
            read_response(&mut reader).await.unwrap(),
            "   \"a;b\"\n;;\n;\n"
        );
    }

    #[tokio::test]
    async fn test_eof_before_terminator() {
        let mock = Builder::new().read(b"M  1 COMPLD\n").build();
        let mut reader = BufReader::new(mock);

        let err = read_response(&mut reader).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
