//! Flashing session
//!
//! Drives a board from reset through stub upload, flash initialisation and
//! firmware write to a final reboot. Every phase is one request/response
//! exchange; a phase either advances, asks to be retried, or fails the whole
//! session. Attempt counting and escalation happen in one place, `Session::flash`.

use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use tokio_util::codec::Decoder;
use tokio_util::sync::CancellationToken;

use super::{
    greeting, slip, Attempts, ChunkPlan, Escalation, FlashError, FlashErrorKind, FlashOperation,
    IspOperation, Packet, ProtocolError, ResetSequence, Response, ReturnCode, SlipCodec,
    Transport,
};
use crate::config::SessionConfig;
use crate::progress::{NoProgress, Progress, Stage};
use crate::stub::StubImage;

/// Where a session currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    /// Nothing sent yet
    Idle,
    /// Waiting for the bootrom to answer an ISP greeting
    Greeting,
    /// Writing the stub into SRAM
    StubUpload { offset: usize },
    /// Jumping into the stub
    Boot,
    /// Waiting for the stub to answer a greeting
    FlashGreeting,
    /// Switching the link to the target baud rate
    BaudrateChange,
    /// Selecting the flash chip
    FlashInit,
    /// Writing firmware frames
    FlashWrite { offset: usize },
    /// Resetting into the new firmware
    Reboot,
    /// Firmware written and board rebooted
    Done,
    /// The session gave up
    Failed,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "idle"),
            SessionPhase::Greeting => write!(f, "greeting"),
            SessionPhase::StubUpload { offset } => write!(f, "stub upload (offset {offset:#x})"),
            SessionPhase::Boot => write!(f, "boot"),
            SessionPhase::FlashGreeting => write!(f, "flash greeting"),
            SessionPhase::BaudrateChange => write!(f, "baud rate change"),
            SessionPhase::FlashInit => write!(f, "flash init"),
            SessionPhase::FlashWrite { offset } => write!(f, "flash write (offset {offset:#x})"),
            SessionPhase::Reboot => write!(f, "reboot"),
            SessionPhase::Done => write!(f, "done"),
            SessionPhase::Failed => write!(f, "failed"),
        }
    }
}

/// Result of running one phase
#[derive(Debug)]
enum Transition {
    Advance(SessionPhase),
    Retry(ProtocolError),
}

/// Convert an exchange error into a retry, or pass it through when it is fatal
fn retry_on(err: ProtocolError) -> Result<Transition, ProtocolError> {
    if err.is_retryable() {
        Ok(Transition::Retry(err))
    } else {
        Err(err)
    }
}

/// A single flashing run against one transport
pub struct Session<T: Transport> {
    /// Link to the board
    transport: T,
    /// Addresses, baud rates and retry policy
    config: SessionConfig,
    /// Inflated stub loader
    stub: StubImage,
    /// Incremental SLIP decoder for the receive path
    codec: SlipCodec,
    /// Bytes read but not yet decoded
    rx: BytesMut,
    /// Current phase
    phase: SessionPhase,
    /// Failed attempts of the current phase
    attempts: Attempts,
    /// Checked between transitions
    cancel: CancellationToken,
    /// Upload progress sink
    progress: Box<dyn Progress>,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, stub: StubImage, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            stub,
            codec: SlipCodec::new(),
            rx: BytesMut::new(),
            phase: SessionPhase::Idle,
            attempts: Attempts::default(),
            cancel: CancellationToken::new(),
            progress: Box::new(NoProgress),
        }
    }

    /// Stop the session at the next transition once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_progress(mut self, progress: impl Progress + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Give the transport back, still open at whatever baud rate it ended on
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Write `firmware` to flash and reboot the board into it
    pub async fn flash(&mut self, firmware: &[u8]) -> Result<(), FlashError> {
        self.phase = SessionPhase::Idle;
        self.attempts.reset();
        tracing::info!(
            stub = self.stub.len(),
            firmware = firmware.len(),
            flash_address = format_args!("{:#010x}", self.config.flash_address),
            "starting flash session"
        );

        loop {
            if self.phase == SessionPhase::Done {
                tracing::info!("flash session complete");
                return Ok(());
            }
            if self.cancel.is_cancelled() {
                return Err(self.fail(FlashErrorKind::Cancelled));
            }

            let phase = self.phase;
            match self.step(phase, firmware).await {
                Ok(Transition::Advance(next)) => self.enter(next),
                Ok(Transition::Retry(reason)) => {
                    let attempt = self.attempts.current();
                    let limit = self.config.retry.attempt_limit(&phase);
                    match self.attempts.fail(limit) {
                        Escalation::Retry => {
                            tracing::warn!(%phase, attempt, error = %reason, "retrying");
                            let delay = self.config.retry.retry_delay(&phase);
                            if !delay.is_zero() {
                                tokio::time::sleep(delay).await;
                            }
                        }
                        Escalation::Exhausted(attempts) => {
                            tracing::error!(%phase, attempts, error = %reason, "giving up");
                            let kind = self.exhausted(phase, attempts, reason);
                            return Err(self.fail(kind));
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(%phase, error = %e, "fatal transport error");
                    return Err(self.fail(FlashErrorKind::Transport(e)));
                }
            }
        }
    }

    fn enter(&mut self, next: SessionPhase) {
        tracing::debug!(from = %self.phase, to = %next, "phase transition");

        match (self.phase, next) {
            (SessionPhase::Greeting, SessionPhase::StubUpload { .. }) => {
                self.progress.start(Stage::StubUpload, self.stub.len());
            }
            (SessionPhase::StubUpload { .. }, SessionPhase::Boot) => {
                self.progress.finish(Stage::StubUpload);
            }
            (SessionPhase::FlashWrite { .. }, SessionPhase::Reboot) => {
                self.progress.finish(Stage::FlashWrite);
            }
            _ => {}
        }

        self.phase = next;
        self.attempts.reset();
    }

    fn fail(&mut self, kind: FlashErrorKind) -> FlashError {
        let phase = self.phase;
        self.phase = SessionPhase::Failed;
        FlashError::new(phase, kind)
    }

    fn exhausted(&self, phase: SessionPhase, attempts: u32, reason: ProtocolError) -> FlashErrorKind {
        match phase {
            SessionPhase::Greeting => FlashErrorKind::NoDeviceFound { attempts },
            SessionPhase::FlashGreeting => FlashErrorKind::StubHandshake { attempts },
            SessionPhase::FlashInit => FlashErrorKind::FlashInit { attempts },
            SessionPhase::StubUpload { offset } => FlashErrorKind::ChunkRetriesExhausted {
                address: self.config.load_address.wrapping_add(offset as u32),
                attempts,
            },
            SessionPhase::FlashWrite { offset } => FlashErrorKind::ChunkRetriesExhausted {
                address: self.config.flash_address.wrapping_add(offset as u32),
                attempts,
            },
            _ => FlashErrorKind::Transport(reason),
        }
    }

    async fn step(
        &mut self,
        phase: SessionPhase,
        firmware: &[u8],
    ) -> Result<Transition, ProtocolError> {
        match phase {
            SessionPhase::Idle => {
                ResetSequence::EnterIsp
                    .run(&mut self.transport, self.config.retry.settle_delay())
                    .await?;
                Ok(Transition::Advance(SessionPhase::Greeting))
            }
            SessionPhase::Greeting => self.isp_greeting().await,
            SessionPhase::StubUpload { offset } => self.upload_stub_chunk(offset).await,
            SessionPhase::Boot => {
                let packet = Packet::memory_boot(self.config.load_address);
                self.send(&packet.to_bytes()).await?;
                tracing::info!(
                    address = format_args!("{:#010x}", self.config.load_address),
                    "booting stub"
                );
                tokio::time::sleep(self.config.retry.boot_delay()).await;
                Ok(Transition::Advance(SessionPhase::FlashGreeting))
            }
            SessionPhase::FlashGreeting => self.flash_greeting().await,
            SessionPhase::BaudrateChange => {
                let target = self.config.target_baud;
                let packet = Packet::baudrate_set(target);
                self.send(&packet.to_bytes()).await?;
                tokio::time::sleep(self.config.retry.baud_switch_delay()).await;
                self.transport.reopen(target).await?;
                self.codec.reset();
                self.rx.clear();
                tracing::info!(baud_rate = target, "switched baud rate");
                Ok(Transition::Advance(SessionPhase::FlashGreeting))
            }
            SessionPhase::FlashInit => self.flash_init().await,
            SessionPhase::FlashWrite { offset } => self.write_firmware_frame(firmware, offset).await,
            SessionPhase::Reboot => {
                ResetSequence::RunFirmware
                    .run(&mut self.transport, self.config.retry.settle_delay())
                    .await?;
                tracing::info!("board rebooted into firmware");
                Ok(Transition::Advance(SessionPhase::Done))
            }
            SessionPhase::Done | SessionPhase::Failed => Ok(Transition::Advance(phase)),
        }
    }

    async fn isp_greeting(&mut self) -> Result<Transition, ProtocolError> {
        // The first reset already happened in Idle
        if self.attempts.is_retry() {
            ResetSequence::EnterIsp
                .run(&mut self.transport, self.config.retry.settle_delay())
                .await?;
        }

        let response = match self.request(&greeting(IspOperation::Nop)).await {
            Ok(response) => response,
            Err(e) => return retry_on(e),
        };

        if response.is_ack() {
            tracing::info!(op = format_args!("{:#04x}", response.op), "bootrom answered");
            Ok(Transition::Advance(SessionPhase::StubUpload { offset: 0 }))
        } else {
            Ok(Transition::Retry(ProtocolError::UnexpectedResponse {
                op: response.op,
                reason: response.reason,
            }))
        }
    }

    async fn flash_greeting(&mut self) -> Result<Transition, ProtocolError> {
        let response = match self.request(&greeting(FlashOperation::Nop)).await {
            Ok(response) => response,
            Err(e) => return retry_on(e),
        };

        if !response.is(FlashOperation::Nop, ReturnCode::Ok) {
            return Ok(Transition::Retry(ProtocolError::UnexpectedResponse {
                op: response.op,
                reason: response.reason,
            }));
        }

        let next = if self.transport.baud_rate() != self.config.target_baud {
            SessionPhase::BaudrateChange
        } else {
            SessionPhase::FlashInit
        };
        Ok(Transition::Advance(next))
    }

    async fn flash_init(&mut self) -> Result<Transition, ProtocolError> {
        let packet = Packet::flash_init(self.config.chip_type);
        let response = match self.request(&packet.to_bytes()).await {
            Ok(response) => response,
            Err(e) => return retry_on(e),
        };

        if response.is(FlashOperation::FlashInit, ReturnCode::Ok) {
            tracing::info!(chip_type = self.config.chip_type, "flash initialised");
            Ok(Transition::Advance(SessionPhase::FlashWrite { offset: 0 }))
        } else {
            Ok(Transition::Retry(ProtocolError::UnexpectedResponse {
                op: response.op,
                reason: response.reason,
            }))
        }
    }

    async fn upload_stub_chunk(&mut self, offset: usize) -> Result<Transition, ProtocolError> {
        let plan = ChunkPlan::stub(self.config.load_address);
        let Some((packet, address, len)) = plan
            .chunk_at(self.stub.as_bytes(), offset)
            .map(|chunk| {
                let packet = Packet::memory_write(chunk.address, &chunk.data);
                (packet, chunk.address, chunk.data.len())
            })
        else {
            return Ok(Transition::Advance(SessionPhase::Boot));
        };

        if let Err(e) = self.acknowledged(&packet).await {
            return retry_on(e);
        }
        tracing::trace!(address = format_args!("{address:#010x}"), len, "stub chunk written");
        self.progress.advance(Stage::StubUpload, len);

        let next = offset + plan.chunk_size;
        if next >= self.stub.len() {
            Ok(Transition::Advance(SessionPhase::Boot))
        } else {
            Ok(Transition::Advance(SessionPhase::StubUpload { offset: next }))
        }
    }

    async fn write_firmware_frame(
        &mut self,
        firmware: &[u8],
        offset: usize,
    ) -> Result<Transition, ProtocolError> {
        let plan = ChunkPlan::firmware(self.config.flash_address);
        let Some(chunk) = plan.chunk_at(firmware, offset) else {
            return Ok(Transition::Advance(SessionPhase::Reboot));
        };
        if offset == 0 && !self.attempts.is_retry() {
            self.progress
                .start(Stage::FlashWrite, plan.transfer_size(firmware.len()));
        }
        let len = chunk.data.len();
        let address = chunk.address;
        let packet = Packet::flash_write(address, &chunk.data);

        if let Err(e) = self.acknowledged(&packet).await {
            return retry_on(e);
        }
        tracing::debug!(address = format_args!("{address:#010x}"), len, "flash frame written");
        self.progress.advance(Stage::FlashWrite, len);

        let next = offset + plan.chunk_size;
        if next >= firmware.len() {
            Ok(Transition::Advance(SessionPhase::Reboot))
        } else {
            Ok(Transition::Advance(SessionPhase::FlashWrite { offset: next }))
        }
    }

    /// Send a packet and require an OK (or DEFAULT) answer
    async fn acknowledged(&mut self, packet: &Packet) -> Result<Response, ProtocolError> {
        let response = self.request(&packet.to_bytes()).await?.into_ack()?;
        if let Some(text) = &response.text {
            tracing::info!(target: "kflash::device", "{}", text);
        }
        Ok(response)
    }

    async fn request(&mut self, raw: &[u8]) -> Result<Response, ProtocolError> {
        self.send(raw).await?;
        self.recv().await
    }

    /// Frame and write one request, discarding anything left from earlier exchanges
    async fn send(&mut self, raw: &[u8]) -> Result<(), ProtocolError> {
        self.rx.clear();
        self.codec.reset();
        self.transport.write(&slip::encode(raw)).await
    }

    /// Read until one full frame has arrived or the frame timeout passes
    async fn recv(&mut self) -> Result<Response, ProtocolError> {
        let deadline = tokio::time::Instant::now() + self.config.retry.frame_timeout();
        loop {
            if let Some(frame) = self.codec.decode(&mut self.rx)? {
                let response = Response::parse(&frame)?;
                tracing::trace!(
                    op = format_args!("{:#04x}", response.op),
                    reason = format_args!("{:#04x}", response.reason),
                    "response"
                );
                return Ok(response);
            }

            let bytes = tokio::time::timeout_at(deadline, self.transport.read())
                .await
                .map_err(|_| ProtocolError::Timeout)??;
            self.rx.extend_from_slice(&bytes);
        }
    }
}
