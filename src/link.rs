//! The drone link facade

use futures::Stream;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::{EventBus, SubscriptionId};
use crate::channels::{CommandChannel, TelemetryChannel, VideoChannel};
use crate::config::LinkConfig;
use crate::error::ChannelKind;
use crate::types::{
    Command, CommandOutcome, EventKind, LinkEvent, TelemetryFrame, UpdateRate, VideoFrame,
};
use crate::{LinkError, Result};

/// Anything [`DroneLink::send`] accepts as a command.
pub trait IntoCommand {
    fn into_command(self) -> Result<Command>;
}

impl IntoCommand for Command {
    fn into_command(self) -> Result<Command> {
        Ok(self)
    }
}

impl IntoCommand for &str {
    fn into_command(self) -> Result<Command> {
        Command::new(self)
    }
}

impl IntoCommand for String {
    fn into_command(self) -> Result<Command> {
        Command::new(self)
    }
}

/// Resources owned by one successful `start()`.
struct RunningLink {
    command: CommandChannel,
    cancel: CancellationToken,
    receivers: Vec<JoinHandle<()>>,
    telemetry_addr: SocketAddr,
    video_addr: SocketAddr,
}

/// Owns the command, telemetry and video channels of one drone.
///
/// All methods take `&self`, so a link can be shared behind an `Arc` between
/// the task serving operator commands and the tasks relaying events.
///
/// ```rust,no_run
/// use goose_link::{Command, DroneLink, LinkConfig};
///
/// # #[tokio::main]
/// # async fn main() -> goose_link::Result<()> {
/// let link = DroneLink::new(LinkConfig::default());
/// link.on_telemetry(|frame| println!("battery: {:?}", frame.battery()));
/// link.start().await?;
///
/// let reply = link.send(Command::takeoff()).await?;
/// println!("takeoff: {reply}");
///
/// link.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct DroneLink {
    config: LinkConfig,
    bus: Arc<EventBus>,
    running: Mutex<Option<RunningLink>>,
    /// Token of the start attempt in progress or the current run
    run_token: Mutex<Option<CancellationToken>>,
    /// Serializes start and stop
    lifecycle: tokio::sync::Mutex<()>,
}

impl DroneLink {
    pub fn new(config: LinkConfig) -> Self {
        Self {
            config,
            bus: Arc::new(EventBus::default()),
            running: Mutex::new(None),
            run_token: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Create a link and start it.
    pub async fn connect(config: LinkConfig) -> Result<Self> {
        let link = Self::new(config);
        link.start().await?;
        Ok(link)
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    fn running(&self) -> MutexGuard<'_, Option<RunningLink>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_token(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.run_token.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind all channels, enter SDK mode, enable video, then begin
    /// dispatching telemetry and video events.
    ///
    /// Both startup commands must be acknowledged with `ok`; otherwise
    /// everything bound so far is released and [`LinkError::Handshake`] is
    /// returned. Starting a running link is a no-op.
    pub async fn start(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.is_running() {
            debug!("Link already running");
            return Ok(());
        }

        self.config.validate()?;
        let cancel = CancellationToken::new();
        *self.run_token() = Some(cancel.clone());
        info!(drone = %self.config.command_target(), "Starting drone link");

        match self.bring_up(&cancel).await {
            Ok(running) => {
                info!(
                    telemetry = %running.telemetry_addr,
                    video = %running.video_addr,
                    "Drone link running"
                );
                *self.running() = Some(running);
                Ok(())
            }
            Err(e) => {
                error!("Drone link startup failed: {}", e);
                cancel.cancel();
                self.run_token().take();
                Err(e)
            }
        }
    }

    async fn bring_up(&self, cancel: &CancellationToken) -> Result<RunningLink> {
        let command = CommandChannel::bind(&self.config, cancel.child_token()).await?;

        let channels = async {
            let telemetry = TelemetryChannel::bind(&self.config.telemetry).await?;
            let video = VideoChannel::bind(&self.config.video).await?;
            handshake(&command, Command::sdk_mode()).await?;
            handshake(&command, Command::stream_on()).await?;
            Ok::<_, LinkError>((telemetry, video))
        };

        let (telemetry, video) = match channels.await {
            Ok(channels) => channels,
            Err(e) => {
                command.close().await;
                return Err(e);
            }
        };

        let telemetry_addr = telemetry.local_addr()?;
        let video_addr = video.local_addr()?;
        let receivers = vec![
            telemetry.spawn(Arc::clone(&self.bus), cancel.child_token()),
            video.spawn(Arc::clone(&self.bus), cancel.child_token()),
        ];

        Ok(RunningLink { command, cancel: cancel.clone(), receivers, telemetry_addr, video_addr })
    }

    /// Unregister every handler, stop the receive loops and release all
    /// sockets. Safe to call repeatedly, before `start()`, or while a start
    /// is still in progress (which then fails with a closed channel).
    pub async fn stop(&self) {
        if let Some(token) = self.run_token().take() {
            token.cancel();
        }

        let _lifecycle = self.lifecycle.lock().await;
        let removed = self.bus.clear();
        let running = self.running().take();

        let Some(running) = running else {
            debug!(removed, "Stop requested on idle link");
            return;
        };

        running.cancel.cancel();
        running.command.close().await;
        for receiver in running.receivers {
            if let Err(e) = receiver.await {
                warn!("Receive loop ended abnormally: {}", e);
            }
        }
        info!(removed, "Drone link stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running().is_some()
    }

    /// Send one command and wait for its reply.
    ///
    /// Commands from concurrent callers are queued and sent one at a time, so
    /// a reply can never be matched to the wrong command.
    pub async fn send(&self, command: impl IntoCommand) -> CommandOutcome {
        let command = command.into_command()?;
        self.command_channel()?.send(command).await
    }

    /// Send one command, failing with [`LinkError::Busy`] if another command
    /// is still waiting for its reply.
    pub async fn try_send(&self, command: impl IntoCommand) -> CommandOutcome {
        let command = command.into_command()?;
        self.command_channel()?.try_send(command).await
    }

    fn command_channel(&self) -> Result<CommandChannel> {
        self.running().as_ref().map(|running| running.command.clone()).ok_or(LinkError::NotStarted)
    }

    /// Local address a channel is bound to, while running.
    pub fn local_addr(&self, channel: ChannelKind) -> Option<SocketAddr> {
        let running = self.running();
        let running = running.as_ref()?;
        match channel {
            ChannelKind::Command => running.command.local_addr().ok(),
            ChannelKind::Telemetry => Some(running.telemetry_addr),
            ChannelKind::Video => Some(running.video_addr),
        }
    }

    /// Register a handler for one event kind.
    ///
    /// Handlers survive restarts but not [`stop`](Self::stop).
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&LinkEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(kind, handler)
    }

    pub fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(kind, id)
    }

    /// Register a telemetry handler.
    pub fn on_telemetry<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&TelemetryFrame) + Send + Sync + 'static,
    {
        self.bus.subscribe(EventKind::Telemetry, move |event| {
            if let Some(frame) = event.as_telemetry() {
                handler(frame);
            }
        })
    }

    /// Register a video handler.
    pub fn on_video<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&VideoFrame) + Send + Sync + 'static,
    {
        self.bus.subscribe(EventKind::Video, move |event| {
            if let Some(frame) = event.as_video() {
                handler(frame);
            }
        })
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.bus.handler_count(kind)
    }

    /// Telemetry frames as a stream. See [`EventBus::telemetry_stream`].
    pub fn telemetry_stream(
        &self,
        rate: UpdateRate,
    ) -> impl Stream<Item = Arc<TelemetryFrame>> + Send + 'static {
        self.bus.telemetry_stream(rate)
    }

    /// Reassembled video frames as a stream.
    pub fn video_stream(&self) -> impl Stream<Item = Arc<VideoFrame>> + Send + 'static {
        self.bus.video_stream()
    }
}

impl Drop for DroneLink {
    fn drop(&mut self) {
        debug!("Dropping drone link");
        if let Some(token) = self.run_token().take() {
            token.cancel();
        }
    }
}

/// Send a startup command that must be acknowledged with `ok`.
async fn handshake(channel: &CommandChannel, command: Command) -> Result<()> {
    let step = command.to_string();
    let reply = channel.send(command).await.map_err(|e| LinkError::handshake(&step, e))?;
    if !reply.is_ok() {
        let rejected = LinkError::Rejected { command: step.clone(), reply: reply.to_string() };
        return Err(LinkError::handshake(step, rejected));
    }
    debug!(%step, "Startup command acknowledged");
    Ok(())
}
