//! TCP server for Pixelflut connections.
//!
//! Accepts incoming connections, splits each byte stream into command
//! lines, and executes them against the shared canvas: reads are answered
//! from the presented frame, writes go onto the pixel update queue.

use crate::buffer::{LineBuffer, LineTooLong};
use crate::canvas::{PresentedFrame, Size};
use crate::config::Config;
use crate::protocol::{Command, Parser, Response};
use crate::queue::{PixelUpdate, QueueClosed, UpdateSender};
use bytes::BytesMut;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, trace, warn};

/// Listen backlog for the server socket
const LISTEN_BACKLOG: i32 = 1024;

/// Pause after a failed accept before trying again
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Fatal server errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid listen address '{addr}': {source}")]
    InvalidAddress {
        addr: String,
        source: std::net::AddrParseError,
    },
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },
}

/// Errors that end a single connection
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    LineTooLong(#[from] LineTooLong),
    #[error(transparent)]
    QueueClosed(#[from] QueueClosed),
}

/// What a connection handler needs to reach the canvas.
#[derive(Debug, Clone)]
pub struct CanvasHandle {
    pub size: Size,
    pub presented: Arc<PresentedFrame>,
    pub updates: UpdateSender,
}

impl CanvasHandle {
    pub fn new(presented: Arc<PresentedFrame>, updates: UpdateSender) -> Self {
        let size = presented.load().size();
        Self {
            size,
            presented,
            updates,
        }
    }
}

/// Server instance
pub struct Server {
    listener: TcpListener,
    canvas: CanvasHandle,
    connection_limit: Arc<Semaphore>,
    max_line_length: usize,
}

impl Server {
    /// Bind the listening socket. Failure here is fatal for the process.
    pub async fn bind(config: &Config, canvas: CanvasHandle) -> Result<Self, ServerError> {
        let listen = config.listen_addr();
        let addr: SocketAddr = listen
            .parse()
            .map_err(|source| ServerError::InvalidAddress {
                addr: listen.clone(),
                source,
            })?;

        let listener = create_listener(addr)
            .and_then(TcpListener::from_std)
            .map_err(|source| ServerError::Bind { addr, source })?;

        info!(address = %addr, "Server listening");

        Ok(Server {
            listener,
            canvas,
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
            max_line_length: config.max_line_length,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the process exits.
    pub async fn run(&self) {
        loop {
            // Wait for a connection slot; the semaphore is never closed
            let Ok(permit) = Arc::clone(&self.connection_limit).acquire_owned().await else {
                return;
            };

            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(peer = %addr, "New connection");

                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(peer = %addr, error = %e, "Failed to set TCP_NODELAY");
                    }

                    let canvas = self.canvas.clone();
                    let max_line_length = self.max_line_length;

                    tokio::spawn(async move {
                        match handle_connection(stream, &canvas, max_line_length).await {
                            Ok(()) => debug!(peer = %addr, "Connection closed"),
                            Err(ConnectionError::LineTooLong(e)) => {
                                warn!(peer = %addr, limit = e.limit, "Closing connection: line too long");
                            }
                            Err(e) => debug!(peer = %addr, error = %e, "Connection error"),
                        }
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }
    }
}

fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(socket.into())
}

/// Handle a single client connection.
///
/// Lines are executed strictly in arrival order. Replies to the lines of one
/// read are written together before the next read. A line longer than
/// `max_line_length` closes the connection after the replies to the lines
/// before it were written.
pub async fn handle_connection<S>(
    mut stream: S,
    canvas: &CanvasHandle,
    max_line_length: usize,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut lines = LineBuffer::new(max_line_length);
    let mut output = BytesMut::new();

    loop {
        let n = lines.read_from(&mut stream).await?;
        if n == 0 {
            trace!(discarded = lines.pending(), "Connection closed by client");
            return Ok(());
        }

        let overflow = loop {
            let line = match lines.next_line() {
                Ok(Some(line)) => line,
                Ok(None) => break None,
                Err(e) => break Some(e),
            };
            match Parser::parse(&line) {
                Ok(command) => {
                    trace!(?command, "Processing command");
                    execute_command(command, canvas, &mut output).await?;
                }
                Err(e) => trace!(error = %e, "Ignoring line"),
            }
        };

        if !output.is_empty() {
            stream.write_all(&output).await?;
            output.clear();
        }

        if let Some(e) = overflow {
            return Err(e.into());
        }
    }
}

/// Execute one command, appending any reply to `output`.
///
/// Out-of-range coordinates are ignored without a reply.
pub async fn execute_command(
    command: Command,
    canvas: &CanvasHandle,
    output: &mut BytesMut,
) -> Result<(), QueueClosed> {
    match command {
        Command::Size => {
            output.extend_from_slice(&Response::size(canvas.size.width, canvas.size.height));
        }

        Command::Help => output.extend_from_slice(Response::help()),

        Command::GetPixel { x, y } => {
            if let Some(pixel) = canvas.presented.get(x, y) {
                output.extend_from_slice(&Response::pixel(x, y, pixel));
            }
        }

        Command::SetPixel { x, y, color } => {
            if canvas.size.contains(x, y) {
                canvas
                    .updates
                    .enqueue(PixelUpdate {
                        x,
                        y,
                        pixel: color.to_pixel(),
                    })
                    .await?;
            }
        }
    }

    Ok(())
}
