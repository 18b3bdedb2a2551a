//! Bridge controller and polling loop
//!
//! [`Controller`] owns every piece of bridge state: the flow controller
//! (and through it the serial link), the job state machine, the interactive
//! router, status and console. [`Controller::tick`] is one cooperative loop
//! iteration:
//!
//! 1. control requests and peer transport events
//! 2. controller output: framing, classification, completion routing
//! 3. job tick
//! 4. status publish
//! 5. maintenance: link activity flag, orphaned final homing command
//!
//! Other threads reach the controller through a [`ControlHandle`].

use super::console::{ConsoleLevel, ConsoleLog, ConsolePolicy};
use super::interactive::InteractiveRouter;
use super::status::{snapshot_json, SharedStatus, StatusPublisher};
use super::transport::{PeerEvent, PeerTransport};
use gcodelink_communication::{
    CommandSource, ControllerResponse, FlowController, GrblResponseParser, LinkFramer, SerialLink,
    HOMING_COMMAND,
};
use gcodelink_core::{
    BridgeEvent, EventBus, InteractiveEvent, JobEvent, JobState, LinkEvent, Result,
    StatusSnapshot, TransportError,
};
use gcodelink_job::{JobConfig, JobStateMachine, JobTimeouts, ProgramSource};
use gcodelink_settings::{Config, EchoPolicy};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Request from outside the polling loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    /// Start a job for the named program
    Start(String),
    /// Feed hold the running job
    Pause,
    /// Resume a paused job
    Resume,
    /// Abandon the job and reset the controller
    Stop,
    /// Leave the polling loop
    Shutdown,
}

/// Cloneable handle for collaborators outside the loop thread
#[derive(Clone)]
pub struct ControlHandle {
    requests: mpsc::UnboundedSender<ControlRequest>,
    status: SharedStatus,
    bus: Arc<EventBus>,
}

impl ControlHandle {
    fn send(&self, request: ControlRequest) -> std::result::Result<(), TransportError> {
        self.requests
            .send(request)
            .map_err(|_| TransportError::ChannelClosed)
    }

    pub fn start(&self, identifier: impl Into<String>) -> std::result::Result<(), TransportError> {
        self.send(ControlRequest::Start(identifier.into()))
    }

    pub fn pause(&self) -> std::result::Result<(), TransportError> {
        self.send(ControlRequest::Pause)
    }

    pub fn resume(&self) -> std::result::Result<(), TransportError> {
        self.send(ControlRequest::Resume)
    }

    pub fn stop(&self) -> std::result::Result<(), TransportError> {
        self.send(ControlRequest::Stop)
    }

    /// Ask the polling loop to exit
    pub fn shutdown(&self) -> std::result::Result<(), TransportError> {
        self.send(ControlRequest::Shutdown)
    }

    /// Latest published status
    pub fn snapshot(&self) -> StatusSnapshot {
        self.status.read().clone()
    }

    /// Latest status as JSON
    pub fn snapshot_json(&self) -> serde_json::Result<String> {
        snapshot_json(&self.snapshot())
    }

    /// Event bus shared with the controller
    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }
}

/// Controller behaviour, usually derived from [`Config`]
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub job: JobConfig,
    pub echo: EchoPolicy,
    pub busy_feedback: bool,
    pub reset_on_connect: bool,
    pub peer_max_line_length: usize,
    pub link_max_line_length: usize,
    pub reset_pause: Duration,
    pub activity_window: Duration,
    pub console: ConsolePolicy,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ControllerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            job: JobConfig {
                timeouts: JobTimeouts {
                    homing: config.job.homing_timeout(),
                    command: config.job.command_timeout(),
                },
                progress_interval: config.job.progress_interval,
            },
            echo: config.interactive.echo,
            busy_feedback: config.interactive.busy_feedback,
            reset_on_connect: config.interactive.reset_on_connect,
            peer_max_line_length: config.interactive.max_line_length,
            link_max_line_length: config.link.max_line_length,
            reset_pause: config.link.reset_pause(),
            activity_window: config.link.activity_window(),
            console: ConsolePolicy {
                capacity: config.console.capacity,
                suppress_while_running: config.console.suppress_while_running,
                suppress_while_connected: config.console.suppress_while_connected,
            },
        }
    }
}

/// The bridge aggregate
pub struct Controller {
    flow: FlowController,
    job: JobStateMachine,
    router: InteractiveRouter,
    parser: GrblResponseParser,
    status: StatusPublisher,
    console: ConsoleLog,
    bus: Arc<EventBus>,
    options: ControllerOptions,
    requests_tx: mpsc::UnboundedSender<ControlRequest>,
    requests: mpsc::UnboundedReceiver<ControlRequest>,
    peer_connected: bool,
    link_active: bool,
    shutdown: bool,
}

impl Controller {
    pub fn new(
        link: Box<dyn SerialLink>,
        source: Box<dyn ProgramSource>,
        options: ControllerOptions,
        bus: Arc<EventBus>,
    ) -> Self {
        let framer = LinkFramer::new(link).with_max_line_length(options.link_max_line_length);
        let flow = FlowController::new(framer).with_reset_pause(options.reset_pause);
        let (requests_tx, requests) = mpsc::unbounded_channel();

        Self {
            flow,
            job: JobStateMachine::new(source, options.job),
            router: InteractiveRouter::new(options.peer_max_line_length, options.reset_on_connect),
            parser: GrblResponseParser::new(),
            status: StatusPublisher::new(Arc::clone(&bus)),
            console: ConsoleLog::new(options.console),
            bus,
            options,
            requests_tx,
            requests,
            peer_connected: false,
            link_active: false,
            shutdown: false,
        }
    }

    /// Handle for other threads
    pub fn handle(&self) -> ControlHandle {
        ControlHandle {
            requests: self.requests_tx.clone(),
            status: self.status.shared(),
            bus: Arc::clone(&self.bus),
        }
    }

    /// Start a job for `identifier`
    pub fn start_job(&mut self, identifier: &str, now: Instant) -> Result<()> {
        let result = self.job.start(identifier, &mut self.flow, now);
        self.publish_job_events();
        result
    }

    pub fn pause_job(&mut self) -> Result<()> {
        let result = self.job.pause(&mut self.flow);
        self.publish_job_events();
        result
    }

    pub fn resume_job(&mut self, now: Instant) -> Result<()> {
        let result = self.job.resume(&mut self.flow, now);
        self.publish_job_events();
        result
    }

    /// Stop any job and hard reset the controller
    pub fn stop_job(&mut self) -> Result<()> {
        let result = self.job.stop(&mut self.flow);
        self.publish_job_events();
        self.publish(BridgeEvent::Link(LinkEvent::HardReset));
        result
    }

    /// Run one loop iteration
    ///
    /// Returns an error only when the serial link can no longer be read.
    pub fn tick(&mut self, transport: &mut dyn PeerTransport, now: Instant) -> Result<()> {
        self.process_requests(now);
        self.process_peer(transport, now);
        self.process_link(transport, now)?;

        self.job.tick(&mut self.flow, now);
        let progressed = self.publish_job_events();

        let snapshot = self.snapshot();
        self.status.update(snapshot, progressed);

        self.maintain(now);
        Ok(())
    }

    fn process_requests(&mut self, now: Instant) {
        while let Ok(request) = self.requests.try_recv() {
            tracing::debug!("Control request: {:?}", request);
            let result = match request {
                ControlRequest::Start(identifier) => self.start_job(&identifier, now),
                ControlRequest::Pause => self.pause_job(),
                ControlRequest::Resume => self.resume_job(now),
                ControlRequest::Stop => self.stop_job(),
                ControlRequest::Shutdown => {
                    self.shutdown = true;
                    Ok(())
                }
            };
            if let Err(e) = result {
                tracing::warn!("Control request failed: {}", e);
            }
        }
    }

    fn process_peer(&mut self, transport: &mut dyn PeerTransport, now: Instant) {
        while let Some(event) = transport.poll_event() {
            match event {
                PeerEvent::Connected { peer } => {
                    self.peer_connected = true;
                    if let Err(e) = self.router.on_connect(&mut self.flow) {
                        tracing::warn!("Reset on connect failed: {}", e);
                    }
                    self.publish(BridgeEvent::Interactive(InteractiveEvent::Connected { peer }));
                }
                PeerEvent::Disconnected => {
                    self.peer_connected = false;
                    self.router.on_disconnect();
                    self.publish(BridgeEvent::Interactive(InteractiveEvent::Disconnected));
                }
                PeerEvent::Data(bytes) => {
                    let outcome = match self.router.on_data(&bytes, &mut self.flow, now) {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            tracing::error!("Peer data not forwarded: {}", e);
                            continue;
                        }
                    };
                    if let Some(bytes) = outcome.overflow_flushed {
                        self.publish(BridgeEvent::Interactive(InteractiveEvent::OverflowFlushed {
                            bytes,
                        }));
                    }
                    for line in outcome.rejected {
                        if self.options.busy_feedback {
                            transport.broadcast(busy_message(&line).as_bytes());
                        }
                        self.publish(BridgeEvent::Interactive(InteractiveEvent::CommandRejected {
                            line,
                        }));
                    }
                }
            }
        }
    }

    fn process_link(&mut self, transport: &mut dyn PeerTransport, now: Instant) -> Result<()> {
        let batch = self.flow.poll(now)?;
        if batch.is_empty() {
            return Ok(());
        }

        if self.options.echo == EchoPolicy::Transparent {
            transport.broadcast(&batch.raw);
        }

        for line in &batch.lines {
            tracing::debug!("<< {}", line);
            if self.options.echo == EchoPolicy::Lines {
                transport.broadcast(format!("{}\n", line).as_bytes());
            }
            if let Some(response) = self.parser.parse(line) {
                self.handle_response(response);
            }
        }
        self.publish_job_events();
        Ok(())
    }

    fn handle_response(&mut self, response: ControllerResponse) {
        let job_active = self.job.state().is_active();
        match response {
            ControllerResponse::Ack => self.complete_command(),
            ControllerResponse::Error(code) => {
                let description = ControllerResponse::Error(code.clone())
                    .description()
                    .unwrap_or_default();
                match self.flow.pending() {
                    Some(cmd) => tracing::warn!(
                        "Controller rejected '{}': error:{} ({})",
                        cmd.text,
                        code,
                        description
                    ),
                    None => tracing::warn!("error:{} ({})", code, description),
                }
                self.console.record(
                    ConsoleLevel::Error,
                    &format!("error:{}", code),
                    job_active,
                    self.peer_connected,
                );
                self.publish(BridgeEvent::Link(LinkEvent::ResponseError { code, description }));
                self.complete_command();
            }
            ControllerResponse::Alarm(code) => {
                let description = ControllerResponse::Alarm(code.clone())
                    .description()
                    .unwrap_or_default();
                tracing::error!("ALARM:{} ({})", code, description);
                self.console.record(
                    ConsoleLevel::Alarm,
                    &format!("ALARM:{}", code),
                    job_active,
                    self.peer_connected,
                );
                if let Some(cmd) = self.flow.release("alarm") {
                    self.publish(BridgeEvent::Link(LinkEvent::SlotReleased {
                        command: cmd.text,
                        reason: "alarm".to_string(),
                    }));
                }
                self.job.on_alarm(&code);
                self.publish(BridgeEvent::Link(LinkEvent::Alarm { code, description }));
            }
            ControllerResponse::Banner(text) => {
                tracing::info!("Controller: {}", text);
                self.console
                    .record(ConsoleLevel::Banner, &text, job_active, self.peer_connected);
                if let Some(cmd) = self.flow.release("controller reset") {
                    self.publish(BridgeEvent::Link(LinkEvent::SlotReleased {
                        command: cmd.text,
                        reason: "controller reset".to_string(),
                    }));
                }
                self.publish(BridgeEvent::Link(LinkEvent::Banner { text }));
            }
            ControllerResponse::Info(_) => {}
        }
    }

    fn complete_command(&mut self) {
        if let Some(done) = self.flow.on_ack() {
            if done.source == CommandSource::Job {
                self.job.on_command_complete();
            }
        }
    }

    fn maintain(&mut self, now: Instant) {
        let active = self
            .flow
            .framer()
            .is_active(now, self.options.activity_window);
        if active != self.link_active {
            self.link_active = active;
            self.publish(BridgeEvent::Link(LinkEvent::ActivityChanged { active }));
        }

        // A completed job may leave its final `$H` unacknowledged. Any other
        // pending command waits for a response or a hard reset.
        if self.job.state() != JobState::Complete {
            return;
        }
        let homing = self.options.job.timeouts.homing;
        let orphaned = self.flow.pending().is_some_and(|cmd| {
            cmd.source == CommandSource::Job
                && cmd.text == HOMING_COMMAND
                && cmd.elapsed(now) >= homing
        });
        if orphaned {
            if let Some(cmd) = self.flow.release("final homing unacknowledged") {
                self.publish(BridgeEvent::Link(LinkEvent::SlotReleased {
                    command: cmd.text,
                    reason: "final homing unacknowledged".to_string(),
                }));
            }
        }
    }

    /// Publish queued job events; returns whether progress was reported
    fn publish_job_events(&mut self) -> bool {
        let mut progressed = false;
        for event in self.job.drain_events() {
            match &event {
                JobEvent::Progress { .. } => progressed = true,
                JobEvent::Faulted { identifier, fault } => {
                    tracing::error!("Job {} faulted: {}", identifier, fault)
                }
                JobEvent::Completed {
                    identifier,
                    lines_sent,
                } => tracing::info!("Job {} complete, {} lines sent", identifier, lines_sent),
                JobEvent::StateChanged { .. } => {}
            }
            self.publish(BridgeEvent::Job(event));
        }
        progressed
    }

    fn publish(&self, event: BridgeEvent) {
        let _ = self.bus.publish(event);
    }

    /// Current status
    pub fn snapshot(&self) -> StatusSnapshot {
        self.job.snapshot(self.link_active, self.peer_connected)
    }

    /// Whether a shutdown was requested
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown
    }

    pub fn job(&self) -> &JobStateMachine {
        &self.job
    }

    pub fn flow(&self) -> &FlowController {
        &self.flow
    }

    pub fn console(&self) -> &ConsoleLog {
        &self.console
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    /// Release the serial link
    pub fn close(&mut self) {
        tracing::info!("Closing {}", self.flow.framer().link_name());
        if let Err(e) = self.flow.framer_mut().close() {
            tracing::warn!("Closing link failed: {}", e);
        }
    }
}

fn busy_message(line: &str) -> String {
    format!("[MSG:Busy, dropped: {}]\r\n", line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_message() {
        assert_eq!(busy_message("G0 X1"), "[MSG:Busy, dropped: G0 X1]\r\n");
    }

    #[test]
    fn test_options_from_config() {
        let mut config = Config::default();
        config.job.command_timeout_secs = 7;
        config.interactive.echo = EchoPolicy::Lines;
        let options = ControllerOptions::from_config(&config);
        assert_eq!(options.job.timeouts.command, Duration::from_secs(7));
        assert_eq!(options.echo, EchoPolicy::Lines);
        assert_eq!(options.console.capacity, 50);
    }
}
