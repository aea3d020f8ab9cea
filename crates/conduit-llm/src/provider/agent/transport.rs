//! Agent subprocess plumbing
//!
//! The child's output is moved by a reader task through a bounded channel
//! into a [`LineReader`]; the channel applies backpressure when the consumer
//! falls behind. The child is killed when the process handle is dropped.

use std::io;
use std::process::Stdio;

use conduit_config::{AgentConfig, AgentTransport};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Chunks buffered between the reader task and the line reader
const CHANNEL_CAPACITY: usize = 256;
const READ_BUFFER_SIZE: usize = 8192;

/// Running agent with its byte streams
pub(super) struct AgentProcess {
    child: Child,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    lines: LineReader,
    reader_task: JoinHandle<()>,
}

impl AgentProcess {
    pub(super) fn spawn(config: &AgentConfig) -> io::Result<Self> {
        let mut command = Command::new(&config.command);
        command.args(&config.args).stderr(Stdio::null()).kill_on_drop(true);

        match config.transport {
            AgentTransport::Pipe => spawn_piped(command),
            #[cfg(unix)]
            AgentTransport::Pty => pty::spawn(command),
            #[cfg(not(unix))]
            AgentTransport::Pty => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "pty transport requires a unix host",
            )),
        }
    }

    pub(super) fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Write one newline-terminated frame
    pub(super) async fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        self.writer.write_all(line).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    pub(super) async fn next_line(&mut self) -> Option<Vec<u8>> {
        self.lines.next_line().await
    }

    /// Terminate and reap the child
    pub(super) async fn shutdown(&mut self) {
        self.reader_task.abort();

        if let Err(e) = self.child.start_kill() {
            tracing::trace!(error = %e, "agent already exited");
        }

        match self.child.wait().await {
            Ok(status) => tracing::debug!(%status, "agent process reaped"),
            Err(e) => tracing::warn!(error = %e, "failed to reap agent process"),
        }
    }
}

impl Drop for AgentProcess {
    fn drop(&mut self) {
        self.reader_task.abort();
        let _ = self.child.start_kill();
    }
}

fn spawn_piped(mut command: Command) -> io::Result<AgentProcess> {
    let mut child = command.stdin(Stdio::piped()).stdout(Stdio::piped()).spawn()?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| io::Error::other("agent stdin not captured"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("agent stdout not captured"))?;

    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    Ok(AgentProcess {
        child,
        writer: Box::new(stdin),
        lines: LineReader::new(rx),
        reader_task: spawn_reader(stdout, tx),
    })
}

#[cfg(unix)]
mod pty {
    use std::io;
    use std::os::fd::OwnedFd;
    use std::process::Stdio;

    use nix::pty::openpty;
    use nix::sys::termios::{SetArg, cfmakeraw, tcgetattr, tcsetattr};
    use tokio::process::Command;
    use tokio::sync::mpsc;

    use super::{AgentProcess, CHANNEL_CAPACITY, LineReader, spawn_reader};

    /// Spawn on a pseudo-terminal in raw mode, so frames are neither echoed
    /// nor line-edited
    pub(super) fn spawn(mut command: Command) -> io::Result<AgentProcess> {
        let pty = openpty(None, None).map_err(io::Error::from)?;

        let mut termios = tcgetattr(&pty.slave).map_err(io::Error::from)?;
        cfmakeraw(&mut termios);
        tcsetattr(&pty.slave, SetArg::TCSANOW, &termios).map_err(io::Error::from)?;

        let child = command
            .stdin(Stdio::from(pty.slave.try_clone()?))
            .stdout(Stdio::from(pty.slave.try_clone()?))
            .spawn()?;

        // Only the child may hold the slave, or the master never sees EOF
        drop(pty.slave);

        let master: OwnedFd = pty.master;
        let reader = std::fs::File::from(master);
        let writer = reader.try_clone()?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        Ok(AgentProcess {
            child,
            writer: Box::new(tokio::fs::File::from_std(writer)),
            lines: LineReader::new(rx),
            reader_task: spawn_reader(tokio::fs::File::from_std(reader), tx),
        })
    }
}

fn spawn_reader<R>(mut source: R, tx: mpsc::Sender<Vec<u8>>) -> JoinHandle<()>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut buffer = vec![0_u8; READ_BUFFER_SIZE];

        loop {
            match source.read(&mut buffer).await {
                Ok(0) => break,
                Ok(read) => {
                    if tx.send(buffer[..read].to_vec()).await.is_err() {
                        break;
                    }
                }
                Err(e) if is_hangup(&e) => break,
                Err(e) => {
                    tracing::debug!(error = %e, "agent output read failed");
                    break;
                }
            }
        }
    })
}

/// A pty master reports the child's exit as `EIO`
fn is_hangup(error: &io::Error) -> bool {
    #[cfg(unix)]
    {
        error.raw_os_error() == Some(nix::libc::EIO)
    }
    #[cfg(not(unix))]
    {
        let _ = error;
        false
    }
}

/// Splits channel chunks into lines
pub(super) struct LineReader {
    rx: mpsc::Receiver<Vec<u8>>,
    buffer: Vec<u8>,
}

impl LineReader {
    pub(super) const fn new(rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self { rx, buffer: Vec::new() }
    }

    /// Next line without its terminator; `None` once the source is exhausted
    pub(super) async fn next_line(&mut self) -> Option<Vec<u8>> {
        loop {
            if let Some(newline) = self.buffer.iter().position(|&byte| byte == b'\n') {
                let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Some(line);
            }

            match self.rx.recv().await {
                Some(chunk) => self.buffer.extend_from_slice(&chunk),
                None if self.buffer.is_empty() => return None,
                None => return Some(std::mem::take(&mut self.buffer)),
            }
        }
    }
}
