// Command dispatch loop
// Zenoh delivers velocity commands into a single-slot channel (latest wins),
// one consumer converts them and pushes set-points to the board.

use tokio::sync::watch;
use tracing::{error, info, warn};

// local imports
use crate::config::{cmd_topic, wheels_topic, Cli, DriveConfig};
use crate::messages::VelocityCommand;
use crate::motor::{
    find_port, ControllerSession, DifferentialDrive, SessionError, WheelCommandPair, WheelSink,
};

/// Producer half of the command slot. Publishing overwrites any command
/// the consumer has not picked up yet.
#[derive(Clone)]
pub struct CommandTx(watch::Sender<Option<VelocityCommand>>);

/// Consumer half of the command slot
pub struct CommandRx(watch::Receiver<Option<VelocityCommand>>);

/// Depth-one channel between the bus and the dispatcher
pub fn command_slot() -> (CommandTx, CommandRx) {
    let (tx, rx) = watch::channel(None);
    (CommandTx(tx), CommandRx(rx))
}

impl CommandTx {
    pub fn publish(&self, cmd: VelocityCommand) {
        self.0.send_replace(Some(cmd));
    }
}

impl CommandRx {
    /// Wait for the newest undelivered command. `None` once every producer is gone.
    pub async fn next(&mut self) -> Option<VelocityCommand> {
        loop {
            self.0.changed().await.ok()?;
            if let Some(cmd) = *self.0.borrow_and_update() {
                return Some(cmd);
            }
        }
    }
}

/// Transform plus a board that has passed its readiness check
pub struct Messenger<S> {
    drive: DifferentialDrive,
    sink: S,
}

impl<S: WheelSink> Messenger<S> {
    /// Probe the board once. Nothing is sent if it does not answer.
    pub fn start(drive: DifferentialDrive, mut sink: S) -> Result<Self, SessionError> {
        if !sink.is_ready() {
            return Err(SessionError::ReadinessFailure { id: sink.identity() });
        }
        info!("The board is ready");
        Ok(Self { drive, sink })
    }

    /// Convert and push one command. Failures are logged, never retried.
    pub fn dispatch(&mut self, cmd: VelocityCommand) -> Option<WheelCommandPair> {
        if !cmd.is_valid() {
            warn!("Dropping non-finite command: {:?}", cmd);
            return None;
        }

        let pair = self.drive.wheel_commands(cmd.linear, cmd.angular);
        info!("Sending R: {} L: {}", pair.right, pair.left);
        match self.sink.send(pair) {
            Ok(()) => Some(pair),
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    /// Bring the wheels to neutral
    pub fn stop(&mut self) -> Result<(), SessionError> {
        let neutral = self.drive.neutral();
        info!("Stopping wheels (R: {} L: {})", neutral.right, neutral.left);
        self.sink.send(neutral)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

/// Dispatch on a multi-thread runtime. The serial write blocks for up to the
/// port timeout, so the worker hands its other tasks off while it runs.
pub fn dispatch_blocking<S: WheelSink>(
    messenger: &mut Messenger<S>,
    cmd: VelocityCommand,
) -> Option<WheelCommandPair> {
    tokio::task::block_in_place(|| messenger.dispatch(cmd))
}

pub async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let drive_config = match &cli.config {
        Some(path) => DriveConfig::load(path)?,
        None => DriveConfig::default(),
    };
    let drive = drive_config.build()?;
    info!("Drive config: {:?}", drive_config);

    let port = match cli.port {
        Some(port) => port,
        None => find_port(&cli.port_prefix)?,
    };
    let session = ControllerSession::open(&port, cli.baud, cli.robot_id)?;
    let mut messenger = Messenger::start(drive, session)?;

    info!("Opening Zenoh session...");
    let zenoh_session = zenoh::open(zenoh::Config::default()).await?;
    let cmd_key = cmd_topic(cli.robot_id);
    let wheels_key = wheels_topic(cli.robot_id);
    let subscriber = zenoh_session.declare_subscriber(cmd_key.as_str()).await?;
    let pub_wheels = zenoh_session.declare_publisher(wheels_key.as_str()).await?;
    info!("Subscribed to: {}", cmd_key);
    info!("Publishing to: {}", wheels_key);

    let (tx, mut rx) = command_slot();

    // Bus -> slot
    let producer = tokio::spawn(async move {
        while let Ok(sample) = subscriber.recv_async().await {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<VelocityCommand>(&payload) {
                Ok(cmd) => tx.publish(cmd),
                Err(e) => warn!("Failed to parse command: {}", e),
            }
        }
        warn!("Command subscriber closed");
    });

    // Slot -> board
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
            next = rx.next() => {
                let Some(cmd) = next else { break };
                if let Some(pair) = dispatch_blocking(&mut messenger, cmd) {
                    let json = serde_json::to_string(&pair)?;
                    if let Err(e) = pub_wheels.put(json).await {
                        warn!("Failed to publish wheel set-points: {}", e);
                    }
                }
            }
        }
    }

    producer.abort();
    if let Err(e) = messenger.stop() {
        error!("Failed to stop wheels: {}", e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::ProtocolError;

    /// Records every call made by the messenger
    #[derive(Default)]
    struct RecordingSink {
        answers_ready: bool,
        fail_sends: bool,
        calls: Vec<&'static str>,
        sent: Vec<WheelCommandPair>,
    }

    impl WheelSink for RecordingSink {
        fn identity(&self) -> u8 {
            9
        }

        fn is_ready(&mut self) -> bool {
            self.calls.push("ready");
            self.answers_ready
        }

        fn send(&mut self, pair: WheelCommandPair) -> Result<(), SessionError> {
            self.calls.push("send");
            if self.fail_sends {
                return Err(SessionError::TransmitFailure {
                    id: 9,
                    source: ProtocolError::Io(std::io::Error::new(
                        std::io::ErrorKind::BrokenPipe,
                        "unplugged",
                    )),
                });
            }
            self.sent.push(pair);
            Ok(())
        }
    }

    fn ready_sink() -> RecordingSink {
        RecordingSink {
            answers_ready: true,
            ..RecordingSink::default()
        }
    }

    #[test]
    fn test_unready_board_fails_start() {
        let result = Messenger::start(DifferentialDrive::default(), RecordingSink::default());
        assert!(matches!(result, Err(SessionError::ReadinessFailure { id: 9 })));
    }

    #[test]
    fn test_readiness_checked_once_before_first_send() {
        let mut messenger = Messenger::start(DifferentialDrive::default(), ready_sink()).unwrap();
        messenger.dispatch(VelocityCommand::new(0.1, 0.0));
        messenger.dispatch(VelocityCommand::new(0.2, 0.0));
        assert_eq!(messenger.sink().calls, vec!["ready", "send", "send"]);
    }

    #[test]
    fn test_dispatch_end_to_end() {
        let mut messenger = Messenger::start(DifferentialDrive::default(), ready_sink()).unwrap();
        assert_eq!(
            messenger.dispatch(VelocityCommand::new(0.3, 0.0)),
            Some(WheelCommandPair::new(165, 165))
        );
        assert_eq!(
            messenger.dispatch(VelocityCommand::new(-0.3, 0.0)),
            Some(WheelCommandPair::new(89, 89))
        );
        assert_eq!(messenger.sink().sent.len(), 2);
    }

    #[test]
    fn test_transmit_failure_does_not_stop_dispatch() {
        let sink = RecordingSink {
            answers_ready: true,
            fail_sends: true,
            ..RecordingSink::default()
        };
        let mut messenger = Messenger::start(DifferentialDrive::default(), sink).unwrap();
        assert_eq!(messenger.dispatch(VelocityCommand::new(0.1, 0.0)), None);
        assert_eq!(messenger.dispatch(VelocityCommand::new(0.1, 0.0)), None);
        assert_eq!(messenger.sink().calls, vec!["ready", "send", "send"]);
    }

    #[test]
    fn test_non_finite_command_is_dropped() {
        let mut messenger = Messenger::start(DifferentialDrive::default(), ready_sink()).unwrap();
        assert_eq!(messenger.dispatch(VelocityCommand::new(f64::NAN, 0.0)), None);
        assert!(messenger.sink().sent.is_empty());
    }

    #[test]
    fn test_stop_sends_neutral() {
        let mut messenger = Messenger::start(DifferentialDrive::default(), ready_sink()).unwrap();
        messenger.stop().unwrap();
        assert_eq!(messenger.sink().sent, vec![WheelCommandPair::new(127, 127)]);
    }

    /// Board whose write only completes once another task has run
    struct StallingSink {
        unblock: std::sync::mpsc::Receiver<()>,
    }

    impl WheelSink for StallingSink {
        fn identity(&self) -> u8 {
            9
        }

        fn is_ready(&mut self) -> bool {
            true
        }

        fn send(&mut self, _pair: WheelCommandPair) -> Result<(), SessionError> {
            self.unblock
                .recv_timeout(std::time::Duration::from_secs(2))
                .map_err(|_| SessionError::TransmitFailure {
                    id: 9,
                    source: ProtocolError::Timeout { id: 9 },
                })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_blocking_dispatch_lets_other_tasks_run() {
        let (unblock_tx, unblock) = std::sync::mpsc::channel();
        let mut messenger =
            Messenger::start(DifferentialDrive::default(), StallingSink { unblock }).unwrap();

        let dispatcher = tokio::spawn(async move {
            // Queued on the same single worker; it only runs if dispatch yields the worker
            tokio::spawn(async move {
                let _ = unblock_tx.send(());
            });
            dispatch_blocking(&mut messenger, VelocityCommand::new(0.3, 0.0))
        });

        assert_eq!(dispatcher.await.unwrap(), Some(WheelCommandPair::new(165, 165)));
    }

    #[tokio::test]
    async fn test_slot_keeps_only_latest() {
        let (tx, mut rx) = command_slot();
        tx.publish(VelocityCommand::new(0.1, 0.0));
        tx.publish(VelocityCommand::new(0.2, 0.0));
        tx.publish(VelocityCommand::new(0.3, 0.5));

        assert_eq!(rx.next().await, Some(VelocityCommand::new(0.3, 0.5)));

        tx.publish(VelocityCommand::new(-0.1, 0.0));
        assert_eq!(rx.next().await, Some(VelocityCommand::new(-0.1, 0.0)));
    }

    #[tokio::test]
    async fn test_slot_closes_with_producer() {
        let (tx, mut rx) = command_slot();
        tx.publish(VelocityCommand::new(0.1, 0.0));
        drop(tx);

        // The pending command is still delivered, then the slot reports closed
        assert_eq!(rx.next().await, Some(VelocityCommand::new(0.1, 0.0)));
        assert_eq!(rx.next().await, None);
    }
}
