//! Async host for a [`MobileDevice`].
//!
//! The server task owns the state machine and the transport. Requests,
//! transport events and timer expiries all arrive through its inbox and are
//! applied one at a time.

use std::collections::VecDeque;

use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::common::apis::ObserverApi;
use crate::common::config::ObserverConfig;
use crate::common::error::{AncsError, Result};
use crate::common::external_apis::{Characteristic, GattTransport, PeerId, TransportEvent};
use crate::observer::ancs::parsers::Uid;
use crate::observer::device::{ConnectionState, DeviceCommand, DeviceInput, MobileDevice};
use crate::observer::reconnect::ReconnectTimer;
use crate::observer::registry::NotificationRecord;

#[derive(Debug)]
pub enum ObserverInput {
    Device(DeviceInput),
    Query {
        uid: Uid,
        reply: oneshot::Sender<Option<NotificationRecord>>,
    },
    State {
        reply: oneshot::Sender<ConnectionState>,
    },
    Shutdown,
}

/// Cloneable entry point into a running [`ObserverServer`].
#[derive(Debug, Clone)]
pub struct ObserverHandle {
    tx: mpsc::UnboundedSender<ObserverInput>,
}

impl ObserverHandle {
    fn send(&self, input: ObserverInput) -> Result<()> {
        self.tx.send(input).map_err(|_| AncsError::ServerStopped)
    }

    fn device(&self, input: DeviceInput) -> Result<()> {
        self.send(ObserverInput::Device(input))
    }

    pub fn request_connect(&self, peer: PeerId) -> Result<()> {
        self.device(DeviceInput::Connect(peer))
    }

    pub fn request_disconnect(&self) -> Result<()> {
        self.device(DeviceInput::Disconnect)
    }

    /// The outcome is reported through [`ObserverApi::on_action_result`].
    pub fn perform_action(&self, uid: Uid, is_positive: bool) -> Result<()> {
        self.device(DeviceInput::PerformAction { uid, is_positive })
    }

    /// Entry point for the BLE adapter's callbacks.
    pub fn transport_event(&self, event: TransportEvent) -> Result<()> {
        self.device(DeviceInput::Transport(event))
    }

    /// For adapters that report notifications by characteristic UUID. Values
    /// from characteristics outside ANCS are ignored.
    pub fn characteristic_value(&self, uuid: &str, value: Vec<u8>) -> Result<()> {
        match Characteristic::from_uuid(uuid) {
            Some(characteristic) => self.transport_event(TransportEvent::CharacteristicChanged {
                characteristic,
                value,
            }),
            None => {
                debug!("Ignoring value of characteristic {}", uuid);
                Ok(())
            }
        }
    }

    pub async fn notification(&self, uid: Uid) -> Result<Option<NotificationRecord>> {
        let (reply, rx) = oneshot::channel();
        self.send(ObserverInput::Query { uid, reply })?;
        rx.await.map_err(|_| AncsError::ServerStopped)
    }

    pub async fn connection_state(&self) -> Result<ConnectionState> {
        let (reply, rx) = oneshot::channel();
        self.send(ObserverInput::State { reply })?;
        rx.await.map_err(|_| AncsError::ServerStopped)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(ObserverInput::Shutdown)
    }
}

pub struct ObserverServer<T, O> {
    device: MobileDevice,
    transport: T,
    observer: O,
    inbox: mpsc::UnboundedReceiver<ObserverInput>,
    timer_tx: mpsc::UnboundedSender<u64>,
    timer_rx: mpsc::UnboundedReceiver<u64>,
    reconnect_task: Option<JoinHandle<()>>,
}

impl<T, O> ObserverServer<T, O>
where
    T: GattTransport,
    O: ObserverApi,
{
    pub fn new(config: &ObserverConfig, transport: T, observer: O) -> (Self, ObserverHandle) {
        let (tx, inbox) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let server = Self {
            device: MobileDevice::new(config),
            transport,
            observer,
            inbox,
            timer_tx,
            timer_rx,
            reconnect_task: None,
        };
        (server, ObserverHandle { tx })
    }

    /// Runs until [`ObserverHandle::shutdown`] or until every handle is gone.
    pub async fn run(mut self) {
        info!("Observing ANCS sessions...");
        loop {
            let input = tokio::select! {
                input = self.inbox.recv() => match input {
                    Some(input) => input,
                    None => break,
                },
                Some(epoch) = self.timer_rx.recv() => {
                    ObserverInput::Device(DeviceInput::ReconnectTimerFired(epoch))
                }
            };
            match input {
                ObserverInput::Device(input) => self.apply(input).await,
                ObserverInput::Query { uid, reply } => {
                    let _ = reply.send(self.device.registry().get(uid).cloned());
                }
                ObserverInput::State { reply } => {
                    let _ = reply.send(self.device.state());
                }
                ObserverInput::Shutdown => break,
            }
        }

        self.cancel_reconnect();
        if !matches!(
            self.device.state(),
            ConnectionState::Idle | ConnectionState::Disconnected
        ) {
            if let Err(e) = self.transport.close().await {
                warn!("Failed to close session on shutdown: {}", e);
            }
        }
        info!("Observer stopped");
    }

    async fn apply(&mut self, input: DeviceInput) {
        let mut inputs = VecDeque::new();
        inputs.push_back(input);
        while let Some(input) = inputs.pop_front() {
            for command in self.device.handle(input) {
                if let Some(feedback) = self.execute(command).await {
                    inputs.push_back(DeviceInput::Transport(feedback));
                }
            }
        }
    }

    /// Carries out one command. A submission the adapter refuses comes back
    /// as the transport event the device would otherwise have seen later.
    async fn execute(&mut self, command: DeviceCommand) -> Option<TransportEvent> {
        debug!("Executing {:?}", command);
        let submitted = match command {
            DeviceCommand::Connect(peer) => {
                return self
                    .transport
                    .connect(&peer)
                    .await
                    .err()
                    .map(|e| TransportEvent::ConnectFailed(e.to_string()));
            }
            DeviceCommand::DiscoverServices => self.transport.discover_services().await,
            DeviceCommand::EnableNotifications(characteristic) => {
                self.transport.enable_notifications(characteristic).await
            }
            DeviceCommand::WriteControlPoint(value) => {
                self.transport.write_control_point(&value).await
            }
            DeviceCommand::Close => {
                if let Err(e) = self.transport.close().await {
                    warn!("Failed to close session: {}", e);
                }
                Ok(())
            }
            DeviceCommand::ArmReconnect(timer) => {
                self.arm_reconnect(timer);
                Ok(())
            }
            DeviceCommand::CancelReconnect => {
                self.cancel_reconnect();
                Ok(())
            }
            DeviceCommand::Emit(event) => {
                self.observer.dispatch(&event);
                Ok(())
            }
        };
        submitted.err().map(|e| {
            if !e.is_recoverable() {
                self.observer.on_error(&e);
            }
            TransportEvent::OperationFailed(e.to_string())
        })
    }

    fn arm_reconnect(&mut self, timer: ReconnectTimer) {
        self.cancel_reconnect();
        let tx = self.timer_tx.clone();
        self.reconnect_task = Some(tokio::spawn(async move {
            sleep(timer.delay).await;
            let _ = tx.send(timer.epoch);
        }));
    }

    fn cancel_reconnect(&mut self) {
        if let Some(task) = self.reconnect_task.take() {
            task.abort();
        }
    }
}

/// Starts a server on the current runtime.
pub fn spawn<T, O>(
    config: &ObserverConfig,
    transport: T,
    observer: O,
) -> (ObserverHandle, JoinHandle<()>)
where
    T: GattTransport + 'static,
    O: ObserverApi,
{
    let (server, handle) = ObserverServer::new(config, transport, observer);
    (handle, tokio::spawn(server.run()))
}
