//! Connection Manager (spec.md §4.2, C2): owns the single WebSocket
//! session to the trade-data provider.
//!
//! Uses the synchronous `tungstenite` client rather than the teacher
//! repo's `tokio-tungstenite` — the pipeline here is three blocking OS
//! threads coordinated with `Mutex`/`Condvar` (spec.md §5), not async
//! tasks, so the WebSocket session is serviced the same way the original
//! `lws_service(context, 1000)` call did: a bounded blocking read.

use std::net::TcpStream;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use crate::model::ConnectionState;
use crate::state::AppState;

/// How long a single `service` call may block waiting for a frame,
/// mirroring the original's `lws_service(context, 1000)`.
pub const SERVICE_TIMEOUT: Duration = Duration::from_secs(1);

/// One serviced outcome of polling the transport for up to
/// [`SERVICE_TIMEOUT`].
pub enum Serviced {
    /// A text frame arrived; the caller should parse it.
    Frame(String),
    /// No frame arrived within the timeout; the socket is still healthy.
    Idle,
    /// The peer sent a close frame (or the socket was already torn down).
    /// Spec.md §4.5's `Established -> on close event -> Closed` transition.
    Closed,
    /// A genuine transport error (not a clean close, not a read timeout).
    /// Spec.md §4.5's `Established -> on transport error -> ClientError`
    /// transition, distinct from `Closed` so the §7 error-kind-2 500ms
    /// pre-reopen delay actually fires for in-session errors.
    Error,
}

/// Sets a bounded read timeout on the underlying TCP stream regardless
/// of whether TLS is in use, so `WebSocket::read` never blocks past
/// [`SERVICE_TIMEOUT`].
fn set_read_timeout(stream: &MaybeTlsStream<TcpStream>, timeout: Option<Duration>) -> Result<()> {
    match stream {
        MaybeTlsStream::Plain(s) => s.set_read_timeout(timeout)?,
        MaybeTlsStream::Rustls(s) => s.sock.set_read_timeout(timeout)?,
        _ => return Err(anyhow!("unsupported stream variant for read timeout")),
    }
    Ok(())
}

pub struct ConnectionManager {
    url: String,
    symbols: Vec<String>,
    socket: Option<WebSocket<MaybeTlsStream<TcpStream>>>,
}

impl ConnectionManager {
    pub fn new(provider_url: &str, provider_token: &str, symbols: Vec<String>) -> Self {
        let url = format!("{provider_url}?token={provider_token}");
        Self {
            url,
            symbols,
            socket: None,
        }
    }

    /// Opens a fresh session, transitions state to `Established` on
    /// success (or `ClientError` on failure), and — per spec.md §4.2 —
    /// immediately sends one subscribe frame per symbol in table order.
    pub fn connect(&mut self, state: &AppState) -> Result<()> {
        state.set_connection_state(ConnectionState::Connecting);

        let (mut socket, _response) = match tungstenite::connect(&self.url) {
            Ok(pair) => pair,
            Err(e) => {
                state.set_connection_state(ConnectionState::ClientError);
                return Err(anyhow::Error::new(e)).context("connecting to provider");
            }
        };

        if let Err(e) = set_read_timeout(socket.get_ref(), Some(SERVICE_TIMEOUT)) {
            state.set_connection_state(ConnectionState::ClientError);
            return Err(e);
        }

        for symbol in &self.symbols {
            let msg = format!(r#"{{"type":"subscribe","symbol":"{symbol}"}}"#);
            if socket.send(Message::Text(msg.into())).is_err() {
                state.set_connection_state(ConnectionState::ClientError);
                return Err(anyhow!("failed to send subscribe frame for {symbol}"));
            }
        }

        self.socket = Some(socket);
        state.set_connection_state(ConnectionState::Established);
        Ok(())
    }

    /// Services the transport for up to [`SERVICE_TIMEOUT`]. Only text
    /// frames are surfaced to the caller; ping/pong/binary frames are
    /// handled transparently by `tungstenite` or ignored. A clean close
    /// frame and a genuine transport error are reported as distinct
    /// outcomes (`Closed` vs `Error`) so the caller can drive the two
    /// separate state transitions spec.md §4.5 specifies.
    pub fn service(&mut self) -> Serviced {
        let Some(socket) = self.socket.as_mut() else {
            return Serviced::Closed;
        };

        match socket.read() {
            Ok(Message::Text(text)) => Serviced::Frame(text.to_string()),
            Ok(Message::Close(_)) => Serviced::Closed,
            Ok(_) => Serviced::Idle,
            Err(tungstenite::Error::Io(e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                Serviced::Idle
            }
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                Serviced::Closed
            }
            Err(_) => Serviced::Error,
        }
    }

    /// Tears down the current session object so a new one can be
    /// constructed on the next `connect` (spec.md §4.2, §4.3 step 2).
    pub fn teardown(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None);
        }
    }

    /// Forces the connection state to `Closed` regardless of its current
    /// value; called by the Minute Aggregator on starvation (spec.md
    /// §4.2, §4.5).
    pub fn force_reset(state: &AppState) {
        state.set_connection_state(ConnectionState::Closed);
    }
}
