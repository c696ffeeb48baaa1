// rrdcached line-protocol client.
//
// Every command is a single line; every reply starts with a status line
// `<n> <message>`. A negative `n` is an error, otherwise `n` more lines of
// detail follow and have to be drained before the next command.

use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::PfstatsError;

use super::SeriesSink;

struct Connection {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
}

/// Blocking client for the rrdcached daemon on a Unix socket.
///
/// The connection is opened lazily and dropped on I/O errors or malformed
/// replies, so the next command reconnects. Rejected commands keep it open.
pub struct RrdcachedClient {
    socket: PathBuf,
    timeout: Duration,
    conn: Option<Connection>,
}

impl RrdcachedClient {
    pub fn new(socket: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            socket: socket.into(),
            timeout,
            conn: None,
        }
    }

    /// Connect now instead of on first use.
    pub fn connect(socket: impl Into<PathBuf>, timeout: Duration) -> Result<Self, PfstatsError> {
        let mut client = Self::new(socket, timeout);
        client.ensure_connected()?;
        Ok(client)
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn ensure_connected(&mut self) -> Result<&mut Connection, PfstatsError> {
        if self.conn.is_none() {
            let stream = UnixStream::connect(&self.socket).map_err(|e| {
                PfstatsError::Rrdcached(format!("connect {}: {e}", self.socket.display()))
            })?;
            stream
                .set_read_timeout(Some(self.timeout))
                .map_err(PfstatsError::SinkIo)?;
            stream
                .set_write_timeout(Some(self.timeout))
                .map_err(PfstatsError::SinkIo)?;
            let writer = stream.try_clone().map_err(PfstatsError::SinkIo)?;
            log::debug!("connected to rrdcached at {}", self.socket.display());
            self.conn = Some(Connection {
                reader: BufReader::new(stream),
                writer,
            });
        }
        self.conn
            .as_mut()
            .ok_or_else(|| PfstatsError::Fatal("rrdcached connection missing".to_string()))
    }

    /// Send one command line and return the status message.
    pub fn command(&mut self, line: &str) -> Result<String, PfstatsError> {
        let conn = self.ensure_connected()?;
        match exchange(conn, line) {
            Ok((code, message)) if code < 0 => Err(PfstatsError::Rrdcached(format!(
                "rejected `{line}`: {message}"
            ))),
            Ok((_, message)) => Ok(message),
            Err(e) => {
                self.conn = None;
                Err(e)
            }
        }
    }
}

/// Write `line`, read the status line and drain any detail lines.
fn exchange(conn: &mut Connection, line: &str) -> Result<(i64, String), PfstatsError> {
    conn.writer
        .write_all(format!("{line}\n").as_bytes())
        .map_err(PfstatsError::SinkIo)?;
    conn.writer.flush().map_err(PfstatsError::SinkIo)?;

    let status = read_line(&mut conn.reader)?;
    let (code, message) = parse_status(&status)?;
    for _ in 0..code.max(0) {
        read_line(&mut conn.reader)?;
    }
    Ok((code, message.to_string()))
}

fn read_line(reader: &mut impl BufRead) -> Result<String, PfstatsError> {
    let mut buf = String::new();
    match reader.read_line(&mut buf) {
        Ok(0) => Err(PfstatsError::SinkIo(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "rrdcached closed the connection",
        ))),
        Ok(_) => Ok(buf.trim_end_matches(['\r', '\n']).to_string()),
        Err(e) => Err(PfstatsError::SinkIo(e)),
    }
}

/// Split a status line into its numeric code and message.
pub fn parse_status(line: &str) -> Result<(i64, &str), PfstatsError> {
    let (code, message) = match line.split_once(' ') {
        Some((code, message)) => (code, message),
        None => (line, ""),
    };
    let code = code
        .parse::<i64>()
        .map_err(|_| PfstatsError::Rrdcached(format!("malformed status line `{line}`")))?;
    Ok((code, message))
}

impl SeriesSink for RrdcachedClient {
    fn update(&mut self, series: &str, _timestamp: u64, encoded: &str) -> Result<(), PfstatsError> {
        log::debug!("UPDATE {series} {encoded}");
        self.command(&format!("UPDATE {series} {encoded}")).map(drop)
    }

    fn flush(&mut self, series: &str) -> Result<(), PfstatsError> {
        self.command(&format!("FLUSH {series}")).map(drop)
    }
}
