//! Line Protocol Client
//!
//! [`KvClient`] sends one command per line and reads replies up to the
//! `END` marker. It drives the integration tests and backs the
//! interactive `linekv client` mode.

use crate::protocol::{END_MARKER, ERROR_PREFIX};
use anyhow::{bail, Context};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};

/// A connected client.
pub struct KvClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl KvClient {
    pub async fn connect(addr: impl ToSocketAddrs) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .context("failed to connect to server")?;
        let (read, write) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read),
            writer: write,
        })
    }

    /// Sends one command line.
    pub async fn send(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Reads one framed reply, without the `END` line.
    ///
    /// Pub/sub pushes are framed the same way, so on a subscribed
    /// connection this may return a `[MESSAGE ...]` line.
    pub async fn read_response(&mut self) -> anyhow::Result<Vec<String>> {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line).await? == 0 {
                bail!("connection closed by server");
            }
            let line = line.trim_end_matches(['\r', '\n']);
            if line == END_MARKER {
                return Ok(lines);
            }
            lines.push(line.to_string());
        }
    }

    /// Sends `line` and waits for its reply.
    pub async fn command(&mut self, line: &str) -> anyhow::Result<Vec<String>> {
        self.send(line).await?;
        self.read_response().await
    }

    /// Sends `line` and expects a single-line, non-error reply.
    pub async fn command_line(&mut self, line: &str) -> anyhow::Result<String> {
        let reply = self.command(line).await?;
        match reply.as_slice() {
            [single] if !single.starts_with(ERROR_PREFIX) => Ok(single.clone()),
            _ => bail!("unexpected reply to {:?}: {:?}", line, reply),
        }
    }
}

/// Reads commands from stdin and prints every reply until `quit`, `exit`
/// or end of input.
pub async fn run_interactive(addr: &str) -> anyhow::Result<()> {
    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;
    let (read, mut write) = stream.into_split();
    println!("Connected to {}. Type HELP for commands, quit to leave.", addr);

    // Replies and pub/sub pushes both arrive here, in order.
    let printer = tokio::spawn(async move {
        let mut lines = BufReader::new(read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line != END_MARKER {
                println!("{}", line);
            }
        }
        println!("Connection closed by server");
    });

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = input.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            break;
        }
        if printer.is_finished() {
            break;
        }
        write.write_all(line.as_bytes()).await?;
        write.write_all(b"\n").await?;
    }

    printer.abort();
    Ok(())
}
