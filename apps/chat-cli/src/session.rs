//! Chat session - the two message loops
//!
//! After the handshake the stream is split: the inbound task owns the
//! reading half and the opener, the outbound task owns the writing half
//! and the sealer. Whichever task finishes first ends the session.

use std::io;
use std::sync::Arc;

use crypto_session::{
    CryptoError, Handshake, HandshakeError, NONCE_SIZE, Opener, Sealer, TAG_SIZE,
};
use parking_lot::RwLock;
use shared_protocol::{
    FrameReader, FrameWriter, LineChannel, MAX_FRAME_PAYLOAD, ProtocolError, SessionState,
    TERMINATION_KEYWORD, TerminationReason, is_termination,
};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Shown before each line of local input
pub const PROMPT: &str = "> ";

const PEER_COLOR: &str = "\x1b[32m";
const RESET_COLOR: &str = "\x1b[0m";

/// Longest local line that still fits one frame once sealed
pub const MAX_LINE_LEN: usize = MAX_FRAME_PAYLOAD - NONCE_SIZE - TAG_SIZE;

/// Session error
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Console I/O error: {0}")]
    Console(#[source] io::Error),

    #[error("Session task failed: {0}")]
    Task(String),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// An active chat over one encrypted line channel
pub struct ChatSession<R, W> {
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
    sealer: Sealer,
    opener: Opener,
    state: Arc<RwLock<SessionState>>,
}

impl<R, W> ChatSession<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Run the key exchange on `channel` and enter the active state
    pub async fn establish(
        mut channel: LineChannel<R, W>,
        handshake: Handshake,
    ) -> SessionResult<Self> {
        let state = SessionState::Handshaking;

        let outcome = handshake.exchange(&mut channel).await?;
        let (sealer, opener) = outcome.into_cipher()?.split();
        let (reader, writer) = channel.into_split();

        let state = state.transition(SessionState::Active)?;
        info!("Session active");

        Ok(Self {
            reader,
            writer,
            sealer,
            opener,
            state: Arc::new(RwLock::new(state)),
        })
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Shared view of the state that outlives [`ChatSession::run`]
    pub fn state_handle(&self) -> Arc<RwLock<SessionState>> {
        Arc::clone(&self.state)
    }

    /// Chat until either side leaves or an error ends the session
    ///
    /// Lines are read from `input`, peer lines are written to `display`
    /// and the prompt to `prompt`.
    pub async fn run<I, D, P>(
        self,
        mut input: I,
        mut display: D,
        mut prompt: P,
    ) -> SessionResult<TerminationReason>
    where
        I: AsyncBufRead + Unpin + Send + 'static,
        D: AsyncWrite + Unpin + Send + 'static,
        P: AsyncWrite + Unpin + Send + 'static,
    {
        let Self {
            mut reader,
            mut writer,
            sealer,
            opener,
            state,
        } = self;

        let mut inbound =
            tokio::spawn(async move { inbound_loop(&mut reader, &opener, &mut display).await });
        let mut outbound = tokio::spawn(async move {
            outbound_loop(&mut input, &sealer, &mut writer, &mut prompt).await
        });

        // Prefer the local outcome when both finish together
        let joined = tokio::select! {
            biased;
            result = &mut outbound => {
                inbound.abort();
                result
            }
            result = &mut inbound => {
                outbound.abort();
                result
            }
        };

        let current = *state.read();
        *state.write() = current.transition(SessionState::Terminated)?;

        let outcome = joined.map_err(|e| SessionError::Task(e.to_string()))?;
        match &outcome {
            Ok(reason) => info!("Session terminated: {}", reason),
            Err(e) => warn!("Session failed: {}", e),
        }
        outcome
    }
}

/// Receive, open and display peer lines until the peer leaves
pub(crate) async fn inbound_loop<R, D>(
    reader: &mut FrameReader<R>,
    opener: &Opener,
    display: &mut D,
) -> SessionResult<TerminationReason>
where
    R: AsyncRead + Unpin,
    D: AsyncWrite + Unpin,
{
    loop {
        let frame = reader.receive_frame().await?;
        let plaintext = opener.open(&frame)?;
        let text = String::from_utf8_lossy(&plaintext);

        if is_termination(&text) {
            info!("Peer sent termination keyword");
            return Ok(TerminationReason::PeerExited);
        }

        if text.trim().is_empty() {
            debug!("Skipping blank peer line");
            continue;
        }

        let rendered = format!(
            "{}{}{}\n{}",
            PEER_COLOR,
            printable(&text),
            RESET_COLOR,
            PROMPT
        );
        display
            .write_all(rendered.as_bytes())
            .await
            .map_err(SessionError::Console)?;
        display.flush().await.map_err(SessionError::Console)?;
    }
}

/// Read, seal and send local lines until the user leaves
///
/// Stops reading input as soon as the termination keyword has been sent.
pub(crate) async fn outbound_loop<I, W, P>(
    input: &mut I,
    sealer: &Sealer,
    writer: &mut FrameWriter<W>,
    prompt: &mut P,
) -> SessionResult<TerminationReason>
where
    I: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    P: AsyncWrite + Unpin,
{
    let mut line = String::new();

    loop {
        prompt
            .write_all(PROMPT.as_bytes())
            .await
            .map_err(SessionError::Console)?;
        prompt.flush().await.map_err(SessionError::Console)?;

        line.clear();
        let read = input
            .read_line(&mut line)
            .await
            .map_err(SessionError::Console)?;

        if read == 0 {
            debug!("Local input closed, leaving chat");
            send_line(sealer, writer, TERMINATION_KEYWORD).await?;
            writer.close().await?;
            return Ok(TerminationReason::InputClosed);
        }

        let text = strip_line_ending(&line);
        if text.len() > MAX_LINE_LEN {
            warn!("Dropping {} byte line, limit is {}", text.len(), MAX_LINE_LEN);
            let notice = format!(
                "Line too long ({} bytes, max {}), not sent\n",
                text.len(),
                MAX_LINE_LEN
            );
            prompt
                .write_all(notice.as_bytes())
                .await
                .map_err(SessionError::Console)?;
            continue;
        }

        send_line(sealer, writer, text).await?;

        if is_termination(text) {
            writer.close().await?;
            return Ok(TerminationReason::LocalExit);
        }
    }
}

async fn send_line<W>(
    sealer: &Sealer,
    writer: &mut FrameWriter<W>,
    text: &str,
) -> SessionResult<()>
where
    W: AsyncWrite + Unpin,
{
    let sealed = sealer.seal(text.as_bytes())?;
    writer.send_frame(&sealed.to_bytes()).await?;
    Ok(())
}

fn strip_line_ending(line: &str) -> &str {
    line.strip_suffix('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .unwrap_or(line)
}

/// Drop control characters so peer text cannot drive the terminal
fn printable(text: &str) -> String {
    text.chars()
        .filter(|c| *c == '\t' || !c.is_control())
        .collect()
}
