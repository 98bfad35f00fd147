//! GATT session lifecycle for one peer.
//!
//! [`MobileDevice`] performs no I/O. Each [`DeviceInput`] is applied to the
//! owned state and answered with the [`DeviceCommand`]s the caller must carry
//! out, in order. Only one subscription or Control Point write is in flight
//! at a time; everything else waits in the communicator's queue.

use std::collections::VecDeque;

use log::{debug, error, info, warn};

use crate::common::apis::ObserverEvent;
use crate::common::config::ObserverConfig;
use crate::common::error::AncsError;
use crate::common::external_apis::{is_ancs_service, Characteristic, PeerId, TransportEvent};
use crate::observer::ancs::parsers::Uid;
use crate::observer::device_comm::{control_point_error, ControlPointRequest, DeviceCommunicator};
use crate::observer::reconnect::{ReconnectScheduler, ReconnectTimer};
use crate::observer::registry::NotificationRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    DiscoveringServices,
    EnablingDataSourceNotify,
    EnablingNotificationSourceNotify,
    Ready,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceInput {
    Connect(PeerId),
    Disconnect,
    PerformAction { uid: Uid, is_positive: bool },
    Transport(TransportEvent),
    ReconnectTimerFired(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    Connect(PeerId),
    DiscoverServices,
    EnableNotifications(Characteristic),
    WriteControlPoint(Vec<u8>),
    Close,
    ArmReconnect(ReconnectTimer),
    CancelReconnect,
    Emit(ObserverEvent),
}

#[derive(Debug)]
enum Operation {
    Subscribe(Characteristic),
    ControlPoint(ControlPointRequest),
}

impl Operation {
    fn characteristic(&self) -> Characteristic {
        match self {
            Operation::Subscribe(characteristic) => *characteristic,
            Operation::ControlPoint(_) => Characteristic::ControlPoint,
        }
    }
}

#[derive(Debug)]
pub struct MobileDevice {
    state: ConnectionState,
    peer: Option<PeerId>,
    reconnect_enabled: bool,
    /// Cleared by an explicit disconnect or a peer without ANCS.
    reconnect_active: bool,
    in_flight: Option<Operation>,
    early_notifications: VecDeque<Vec<u8>>,
    communicator: DeviceCommunicator,
    restarter: ReconnectScheduler,
}

impl MobileDevice {
    pub fn new(config: &ObserverConfig) -> Self {
        Self {
            state: ConnectionState::Idle,
            peer: None,
            reconnect_enabled: config.reconnect_enabled,
            reconnect_active: false,
            in_flight: None,
            early_notifications: VecDeque::new(),
            communicator: DeviceCommunicator::new(config),
            restarter: ReconnectScheduler::new(
                config.reconnect_interval(),
                config.max_reconnect_attempts,
            ),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn peer(&self) -> Option<&PeerId> {
        self.peer.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    pub fn registry(&self) -> &NotificationRegistry {
        self.communicator.registry()
    }

    pub fn handle(&mut self, input: DeviceInput) -> Vec<DeviceCommand> {
        let mut commands = Vec::new();
        match input {
            DeviceInput::Connect(peer) => self.request_connect(peer, &mut commands),
            DeviceInput::Disconnect => self.request_disconnect(&mut commands),
            DeviceInput::PerformAction { uid, is_positive } => {
                self.perform_action(uid, is_positive, &mut commands)
            }
            DeviceInput::Transport(event) => self.on_transport_event(event, &mut commands),
            DeviceInput::ReconnectTimerFired(epoch) => {
                self.on_reconnect_timer(epoch, &mut commands)
            }
        }
        commands
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            info!("ANCS session: {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn request_connect(&mut self, peer: PeerId, commands: &mut Vec<DeviceCommand>) {
        match self.state {
            ConnectionState::Idle | ConnectionState::Disconnected => {
                info!("Connecting to {}...", peer);
                self.peer = Some(peer.clone());
                self.reconnect_active = self.reconnect_enabled;
                self.restarter.reset();
                self.set_state(ConnectionState::Connecting);
                commands.push(DeviceCommand::Connect(peer));
            }
            state => warn!("Ignoring connect request to {} while {:?}", peer, state),
        }
    }

    fn request_disconnect(&mut self, commands: &mut Vec<DeviceCommand>) {
        info!("Disconnect requested");
        self.reconnect_active = false;
        self.peer = None;
        if self.restarter.cancel() {
            commands.push(DeviceCommand::CancelReconnect);
        }
        if !matches!(
            self.state,
            ConnectionState::Idle | ConnectionState::Disconnected
        ) {
            self.close_session(commands);
        }
    }

    fn perform_action(&mut self, uid: Uid, is_positive: bool, commands: &mut Vec<DeviceCommand>) {
        let result = if self.is_ready() {
            self.communicator.ask_for_action(uid, is_positive)
        } else {
            Err(AncsError::NotReady)
        };
        match result {
            Ok(()) => self.pump(commands),
            Err(e) => {
                warn!("{}: cannot perform action: {}", uid, e);
                commands.push(DeviceCommand::Emit(ObserverEvent::ActionResult {
                    uid,
                    is_positive,
                    result: Err(e),
                }));
            }
        }
    }

    fn on_reconnect_timer(&mut self, epoch: u64, commands: &mut Vec<DeviceCommand>) {
        if !self.restarter.fire(epoch) {
            return;
        }
        if self.state != ConnectionState::Disconnected || !self.reconnect_active {
            debug!("Reconnect timer fired while {:?}, nothing to do", self.state);
            return;
        }
        let peer = match self.peer.clone() {
            Some(peer) => peer,
            None => return,
        };
        info!("Attempting to reconnect to {}", peer);
        self.set_state(ConnectionState::Connecting);
        commands.push(DeviceCommand::Connect(peer));
        self.schedule_reconnect(commands);
    }

    fn on_transport_event(&mut self, event: TransportEvent, commands: &mut Vec<DeviceCommand>) {
        match event {
            TransportEvent::Connected => {
                if self.state == ConnectionState::Connecting {
                    self.set_state(ConnectionState::DiscoveringServices);
                    commands.push(DeviceCommand::DiscoverServices);
                } else {
                    warn!("Unexpected connection while {:?}", self.state);
                }
            }
            TransportEvent::ConnectFailed(reason) => {
                if self.state == ConnectionState::Connecting {
                    warn!("{}", AncsError::TransportFailure(reason));
                    self.lose_session(commands);
                } else {
                    debug!("Stale connection failure: {}", reason);
                }
            }
            TransportEvent::Disconnected => match self.state {
                ConnectionState::Idle | ConnectionState::Disconnected => {
                    debug!("Disconnect of a closed session")
                }
                _ => {
                    info!("Peer disconnected");
                    self.lose_session(commands);
                }
            },
            TransportEvent::OperationFailed(reason) => match self.state {
                ConnectionState::Idle | ConnectionState::Disconnected => {
                    debug!("Stale transport failure: {}", reason)
                }
                _ => {
                    error!("{}", AncsError::TransportFailure(reason));
                    self.lose_session(commands);
                }
            },
            TransportEvent::ServicesDiscovered(services) => {
                self.on_services_discovered(&services, commands)
            }
            TransportEvent::CharacteristicChanged {
                characteristic,
                value,
            } => self.on_characteristic_changed(characteristic, value, commands),
            TransportEvent::WriteComplete {
                characteristic,
                status,
            } => self.on_write_complete(characteristic, status, commands),
        }
    }

    fn on_services_discovered(&mut self, services: &[String], commands: &mut Vec<DeviceCommand>) {
        if self.state != ConnectionState::DiscoveringServices {
            warn!("Unexpected service discovery while {:?}", self.state);
            return;
        }
        if services.iter().any(|uuid| is_ancs_service(uuid)) {
            info!("ANCS service found");
            self.set_state(ConnectionState::EnablingDataSourceNotify);
            self.start_operation(Operation::Subscribe(Characteristic::DataSource), commands);
            return;
        }

        error!("{}", AncsError::ServiceNotFound);
        self.reconnect_active = false;
        if self.restarter.cancel() {
            commands.push(DeviceCommand::CancelReconnect);
        }
        self.close_session(commands);
        commands.push(DeviceCommand::Emit(ObserverEvent::Error(
            AncsError::ServiceNotFound,
        )));
    }

    fn on_characteristic_changed(
        &mut self,
        characteristic: Characteristic,
        value: Vec<u8>,
        commands: &mut Vec<DeviceCommand>,
    ) {
        match (characteristic, self.state) {
            (Characteristic::NotificationSource, ConnectionState::Ready) => {
                let events = self.communicator.on_notification_source(&value);
                Self::emit(events, commands);
                self.pump(commands);
            }
            (Characteristic::NotificationSource, ConnectionState::EnablingNotificationSourceNotify) => {
                debug!("Holding notification until the subscription is confirmed");
                self.early_notifications.push_back(value);
            }
            (
                Characteristic::DataSource,
                ConnectionState::Ready | ConnectionState::EnablingNotificationSourceNotify,
            ) => {
                let events = self.communicator.on_data_source(&value);
                Self::emit(events, commands);
            }
            (characteristic, state) => {
                debug!("Dropping {:?} value while {:?}", characteristic, state)
            }
        }
    }

    fn on_write_complete(
        &mut self,
        characteristic: Characteristic,
        status: Result<(), u8>,
        commands: &mut Vec<DeviceCommand>,
    ) {
        let operation = match self.in_flight.take() {
            Some(operation) if operation.characteristic() == characteristic => operation,
            other => {
                warn!("Unexpected write completion on {:?}", characteristic);
                self.in_flight = other;
                return;
            }
        };

        match operation {
            Operation::Subscribe(Characteristic::DataSource) => match status {
                Ok(()) => {
                    self.set_state(ConnectionState::EnablingNotificationSourceNotify);
                    self.start_operation(
                        Operation::Subscribe(Characteristic::NotificationSource),
                        commands,
                    );
                }
                Err(status) => {
                    warn!(
                        "Failed to subscribe to data source (is phone paired?): ATT {:#04x}",
                        status
                    );
                    self.lose_session(commands);
                }
            },
            Operation::Subscribe(Characteristic::NotificationSource) => match status {
                Ok(()) => self.enter_ready(commands),
                Err(status) => {
                    warn!(
                        "Failed to subscribe to notification source (is phone paired?): ATT {:#04x}",
                        status
                    );
                    self.lose_session(commands);
                }
            },
            Operation::Subscribe(Characteristic::ControlPoint) => {
                debug!("Control point subscriptions are never requested")
            }
            Operation::ControlPoint(request) => {
                let events = match status {
                    Ok(()) => self.communicator.on_request_written(&request),
                    Err(status) => self
                        .communicator
                        .on_request_failed(&request, control_point_error(status)),
                };
                Self::emit(events, commands);
                self.pump(commands);
            }
        }
    }

    fn enter_ready(&mut self, commands: &mut Vec<DeviceCommand>) {
        info!("Asking for notifications: success.");
        self.set_state(ConnectionState::Ready);
        if self.restarter.succeeded() {
            commands.push(DeviceCommand::CancelReconnect);
        }
        commands.push(DeviceCommand::Emit(ObserverEvent::ConnectionStateChanged(
            true,
        )));
        while let Some(value) = self.early_notifications.pop_front() {
            let events = self.communicator.on_notification_source(&value);
            Self::emit(events, commands);
        }
        self.pump(commands);
    }

    fn start_operation(&mut self, operation: Operation, commands: &mut Vec<DeviceCommand>) {
        debug_assert!(self.in_flight.is_none());
        commands.push(match &operation {
            Operation::Subscribe(characteristic) => {
                DeviceCommand::EnableNotifications(*characteristic)
            }
            Operation::ControlPoint(request) => DeviceCommand::WriteControlPoint(request.to_vec()),
        });
        self.in_flight = Some(operation);
    }

    fn pump(&mut self, commands: &mut Vec<DeviceCommand>) {
        if self.in_flight.is_some() || !self.is_ready() {
            return;
        }
        if let Some(request) = self.communicator.next_request() {
            self.start_operation(Operation::ControlPoint(request), commands);
        }
    }

    fn close_session(&mut self, commands: &mut Vec<DeviceCommand>) {
        let was_ready = self.is_ready();
        self.set_state(ConnectionState::Disconnected);
        self.in_flight = None;
        self.early_notifications.clear();
        self.communicator.reset_session();
        commands.push(DeviceCommand::Close);
        if was_ready {
            commands.push(DeviceCommand::Emit(ObserverEvent::ConnectionStateChanged(
                false,
            )));
        }
    }

    fn lose_session(&mut self, commands: &mut Vec<DeviceCommand>) {
        self.close_session(commands);
        self.schedule_reconnect(commands);
    }

    fn schedule_reconnect(&mut self, commands: &mut Vec<DeviceCommand>) {
        if !self.reconnect_active || self.peer.is_none() {
            return;
        }
        match self.restarter.arm() {
            Some(timer) => {
                debug!("Reconnect armed in {:?} (epoch {})", timer.delay, timer.epoch);
                commands.push(DeviceCommand::ArmReconnect(timer));
            }
            None => {
                error!("Failed to reconnect after {} attempts", self.restarter.attempts());
                self.reconnect_active = false;
                commands.push(DeviceCommand::CancelReconnect);
            }
        }
    }

    fn emit(events: Vec<ObserverEvent>, commands: &mut Vec<DeviceCommand>) {
        commands.extend(events.into_iter().map(DeviceCommand::Emit));
    }
}
