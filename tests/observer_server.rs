//! Drives the observer server over a scripted in-memory transport.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use ancs_bridge::observer::ancs::constants::{ANCS_SERVICE, NOTIFICATION_SOURCE_CHAR};
use ancs_bridge::{
    spawn, AncsError, Characteristic, ConnectionState, GattTransport, ObserverConfig,
    ObserverEvent, ObserverHandle, PeerId, Result, TransportEvent, Uid,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Connect(PeerId),
    DiscoverServices,
    EnableNotifications(Characteristic),
    WriteControlPoint(Vec<u8>),
    Close,
}

#[derive(Clone, Default)]
struct FakeTransport {
    calls: Arc<Mutex<Vec<Call>>>,
    refuse_connect: bool,
}

impl FakeTransport {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn connects(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Connect(_)))
            .count()
    }
}

#[async_trait]
impl GattTransport for FakeTransport {
    async fn connect(&mut self, peer: &PeerId) -> Result<()> {
        self.record(Call::Connect(peer.clone()));
        if self.refuse_connect {
            return Err(AncsError::TransportFailure("adapter is powered off".to_string()));
        }
        Ok(())
    }

    async fn discover_services(&mut self) -> Result<()> {
        self.record(Call::DiscoverServices);
        Ok(())
    }

    async fn enable_notifications(&mut self, characteristic: Characteristic) -> Result<()> {
        self.record(Call::EnableNotifications(characteristic));
        Ok(())
    }

    async fn write_control_point(&mut self, value: &[u8]) -> Result<()> {
        self.record(Call::WriteControlPoint(value.to_vec()));
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.record(Call::Close);
        Ok(())
    }
}

const UID: Uid = Uid::from_bytes([0x01, 0x02, 0x03, 0x04]);

fn peer() -> PeerId {
    PeerId::from("AA:BB:CC:DD:EE:FF")
}

fn config() -> ObserverConfig {
    ObserverConfig {
        request_action_labels: false,
        ..ObserverConfig::default()
    }
}

fn subscribed(characteristic: Characteristic) -> TransportEvent {
    TransportEvent::WriteComplete {
        characteristic,
        status: Ok(()),
    }
}

async fn establish(handle: &ObserverHandle) {
    handle.request_connect(peer()).unwrap();
    handle.transport_event(TransportEvent::Connected).unwrap();
    handle
        .transport_event(TransportEvent::ServicesDiscovered(vec![
            ANCS_SERVICE.to_string()
        ]))
        .unwrap();
    handle
        .transport_event(subscribed(Characteristic::DataSource))
        .unwrap();
    handle
        .transport_event(subscribed(Characteristic::NotificationSource))
        .unwrap();
    assert_eq!(
        handle.connection_state().await.unwrap(),
        ConnectionState::Ready
    );
}

#[tokio::test(start_paused = true)]
async fn notification_is_fetched_and_reported() {
    let transport = FakeTransport::default();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (handle, task) = spawn(&config(), transport.clone(), tx);

    establish(&handle).await;
    assert_eq!(
        rx.recv().await,
        Some(ObserverEvent::ConnectionStateChanged(true))
    );

    handle
        .characteristic_value("00002A19-0000-1000-8000-00805F9B34FB", vec![0x64])
        .unwrap();
    handle
        .characteristic_value(
            &NOTIFICATION_SOURCE_CHAR.to_uppercase(),
            vec![0x00, 0x00, 0x04, 0x01, 0x01, 0x02, 0x03, 0x04],
        )
        .unwrap();
    handle
        .transport_event(subscribed(Characteristic::ControlPoint))
        .unwrap();
    handle
        .transport_event(TransportEvent::CharacteristicChanged {
            characteristic: Characteristic::DataSource,
            value: vec![
                0x00, 0x01, 0x02, 0x03, 0x04, 0x00, 0x00, 0x00, 0x01, 0x03, 0x00, b'B', b'o',
                b'b', 0x03, 0x02, 0x00, b'H', b'i',
            ],
        })
        .unwrap();

    match rx.recv().await {
        Some(ObserverEvent::RecordUpdated(record)) => {
            assert_eq!(record.uid, UID);
            assert_eq!(record.title.as_deref(), Some("Bob"));
            assert_eq!(record.message.as_deref(), Some("Hi"));
        }
        other => panic!("unexpected event {:?}", other),
    }
    let record = handle.notification(UID).await.unwrap().unwrap();
    assert!(!record.awaiting_attributes);

    assert_eq!(
        transport.calls(),
        vec![
            Call::Connect(peer()),
            Call::DiscoverServices,
            Call::EnableNotifications(Characteristic::DataSource),
            Call::EnableNotifications(Characteristic::NotificationSource),
            Call::WriteControlPoint(vec![
                0x00, 0x01, 0x02, 0x03, 0x04, 0x00, 0x01, 0xFF, 0xFF, 0x03, 0xFF, 0xFF
            ]),
        ]
    );

    handle.shutdown().unwrap();
    task.await.unwrap();
    assert_eq!(transport.calls().last(), Some(&Call::Close));
}

#[tokio::test(start_paused = true)]
async fn reconnects_once_after_the_interval() {
    let transport = FakeTransport::default();
    let (tx, _rx) = mpsc::unbounded_channel();
    let (handle, _task) = spawn(&config(), transport.clone(), tx);

    establish(&handle).await;
    handle.transport_event(TransportEvent::Disconnected).unwrap();
    assert_eq!(
        handle.connection_state().await.unwrap(),
        ConnectionState::Disconnected
    );
    assert_eq!(transport.connects(), 1);

    tokio::time::sleep(Duration::from_secs(179)).await;
    handle.connection_state().await.unwrap();
    assert_eq!(transport.connects(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(
        handle.connection_state().await.unwrap(),
        ConnectionState::Connecting
    );
    assert_eq!(transport.connects(), 2);
}

#[tokio::test(start_paused = true)]
async fn ready_session_cancels_the_reconnect() {
    let transport = FakeTransport::default();
    let (tx, _rx) = mpsc::unbounded_channel();
    let (handle, _task) = spawn(&config(), transport.clone(), tx);

    establish(&handle).await;
    handle.transport_event(TransportEvent::Disconnected).unwrap();
    establish(&handle).await;
    assert_eq!(transport.connects(), 2);

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(
        handle.connection_state().await.unwrap(),
        ConnectionState::Ready
    );
    assert_eq!(transport.connects(), 2);
}

#[tokio::test(start_paused = true)]
async fn refused_connect_is_retried_later() {
    let transport = FakeTransport {
        refuse_connect: true,
        ..FakeTransport::default()
    };
    let (tx, _rx) = mpsc::unbounded_channel();
    let (handle, _task) = spawn(&config(), transport.clone(), tx);

    handle.request_connect(peer()).unwrap();
    assert_eq!(
        handle.connection_state().await.unwrap(),
        ConnectionState::Disconnected
    );
    assert_eq!(transport.calls(), vec![Call::Connect(peer()), Call::Close]);

    tokio::time::sleep(Duration::from_secs(181)).await;
    handle.connection_state().await.unwrap();
    assert_eq!(transport.connects(), 2);
}

#[tokio::test(start_paused = true)]
async fn actions_before_ready_fail_fast() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (handle, _task) = spawn(&config(), FakeTransport::default(), tx);

    handle.perform_action(UID, true).unwrap();
    assert_eq!(
        rx.recv().await,
        Some(ObserverEvent::ActionResult {
            uid: UID,
            is_positive: true,
            result: Err(AncsError::NotReady),
        })
    );
}

#[tokio::test]
async fn stopped_server_rejects_requests() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let (handle, task) = spawn(&config(), FakeTransport::default(), tx);
    handle.shutdown().unwrap();
    task.await.unwrap();

    assert_eq!(
        handle.request_connect(peer()),
        Err(AncsError::ServerStopped)
    );
    assert_eq!(
        handle.connection_state().await,
        Err(AncsError::ServerStopped)
    );
}
