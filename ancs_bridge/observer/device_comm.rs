use std::collections::{HashSet, VecDeque};
use std::convert::TryFrom;

use log::{debug, info, warn};

use crate::common::apis::ObserverEvent;
use crate::common::config::ObserverConfig;
use crate::common::error::AncsError;
use crate::observer::ancs::builders::{GetNotificationAttributes, PerformNotificationAction};
use crate::observer::ancs::constants::{ErrorCode, EventID};
use crate::observer::ancs::parsers::{Notification, Uid};
use crate::observer::reassembler::{AttributeReassembler, ReassemblyEvent};
use crate::observer::registry::{NotificationRegistry, RegistryChange};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlPointRequest {
    FetchAttributes(GetNotificationAttributes),
    PerformAction(PerformNotificationAction),
}

impl ControlPointRequest {
    pub fn uid(&self) -> Uid {
        match self {
            ControlPointRequest::FetchAttributes(request) => request.uid,
            ControlPointRequest::PerformAction(action) => action.uid,
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        match self {
            ControlPointRequest::FetchAttributes(request) => request.to_vec(),
            ControlPointRequest::PerformAction(action) => action.to_vec(),
        }
    }

    fn is_fetch_for(&self, uid: Uid) -> bool {
        matches!(self, ControlPointRequest::FetchAttributes(r) if r.uid == uid)
    }
}

/// Maps an ATT status byte from a Control Point write to an error.
pub fn control_point_error(status: u8) -> AncsError {
    match ErrorCode::try_from(status) {
        Ok(code) => AncsError::Peer(code),
        Err(status) => AncsError::TransportFailure(format!("ATT error {:#04x}", status)),
    }
}

/// Notification traffic of an established session: Notification Source
/// events drive attribute fetches, Data Source bytes fill in the records.
/// Control Point requests wait here until the device lets one go out.
#[derive(Debug)]
pub struct DeviceCommunicator {
    registry: NotificationRegistry,
    reassembler: AttributeReassembler,
    queue: VecDeque<ControlPointRequest>,
    /// Removed while attribute responses were still on their way. Kept until
    /// the uid shows up again on the Notification Source.
    dismissed: HashSet<Uid>,
    fetch_preexisting: bool,
    request_action_labels: bool,
    max_title_length: u16,
    max_message_length: u16,
}

impl DeviceCommunicator {
    pub fn new(config: &ObserverConfig) -> Self {
        Self {
            registry: NotificationRegistry::new(),
            reassembler: AttributeReassembler::new(),
            queue: VecDeque::new(),
            dismissed: HashSet::new(),
            fetch_preexisting: config.fetch_preexisting,
            request_action_labels: config.request_action_labels,
            max_title_length: config.max_title_length,
            max_message_length: config.max_message_length,
        }
    }

    pub fn registry(&self) -> &NotificationRegistry {
        &self.registry
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Hands out the next Control Point write. A fetch starts expecting its
    /// response here, so expectations follow write order.
    pub fn next_request(&mut self) -> Option<ControlPointRequest> {
        let request = self.queue.pop_front()?;
        if let ControlPointRequest::FetchAttributes(fetch) = &request {
            self.reassembler.expect(fetch);
        }
        Some(request)
    }

    /// Forgets everything tied to the transport session. Records survive.
    pub fn reset_session(&mut self) {
        self.reassembler.reset();
        self.queue.clear();
        self.dismissed.clear();
    }

    pub fn on_notification_source(&mut self, data: &[u8]) -> Vec<ObserverEvent> {
        let notification = match Notification::parse(data) {
            Ok(notification) => notification,
            Err(e) => {
                warn!("Dropping notification source message: {}", e);
                return Vec::new();
            }
        };
        debug!(
            "{}: {:?} {:?} flags {:?}",
            notification.uid, notification.event_id, notification.category, notification.event_flags
        );

        match self.registry.apply_event(&notification) {
            RegistryChange::Removed(record) => {
                self.forget_request(record.uid);
                vec![ObserverEvent::RecordRemoved(record.uid)]
            }
            RegistryChange::Unchanged => Vec::new(),
            RegistryChange::Upserted { uid, created } => {
                if !created {
                    debug!("{}: refreshing modified notification", uid);
                }
                if notification.event_id == EventID::NotificationAdded
                    && notification.is_preexisting()
                    && !self.fetch_preexisting
                {
                    debug!("{}: not fetching pre-existing notification", uid);
                    self.registry.complete(uid);
                } else {
                    self.ask_for_notification_details(&notification);
                }
                Vec::new()
            }
        }
    }

    fn ask_for_notification_details(&mut self, notification: &Notification) {
        let mut request = GetNotificationAttributes::with_limits(
            notification.uid,
            self.max_title_length,
            self.max_message_length,
        );
        if self.request_action_labels {
            request = request.with_action_labels(notification);
        }
        self.dismissed.remove(&notification.uid);

        let uid = notification.uid;
        match self.queue.iter_mut().find(|queued| queued.is_fetch_for(uid)) {
            Some(queued) => *queued = ControlPointRequest::FetchAttributes(request),
            None => self
                .queue
                .push_back(ControlPointRequest::FetchAttributes(request)),
        }
    }

    fn forget_request(&mut self, uid: Uid) {
        self.queue.retain(|request| !request.is_fetch_for(uid));
        if self.reassembler.is_pending(uid) {
            self.dismissed.insert(uid);
        }
    }

    pub fn on_data_source(&mut self, data: &[u8]) -> Vec<ObserverEvent> {
        let mut events = Vec::new();
        for event in self.reassembler.feed(data) {
            match event {
                ReassemblyEvent::Attribute {
                    uid,
                    attribute_id,
                    value,
                } => {
                    if !self.dismissed.contains(&uid) {
                        self.registry.apply_attribute(uid, attribute_id, value);
                    }
                }
                ReassemblyEvent::Completed(uid) => {
                    if self.dismissed.contains(&uid) {
                        debug!("{}: attributes arrived after removal", uid);
                        continue;
                    }
                    match self.registry.complete(uid) {
                        Some(record) if record.is_presentable() => {
                            info!("{}: notification ready", uid);
                            events.push(ObserverEvent::RecordUpdated(record.clone()));
                        }
                        Some(_) => debug!("{}: suppressing notification without text", uid),
                        None => {}
                    }
                }
                ReassemblyEvent::Discarded { uid: Some(uid), .. } => {
                    if !self.dismissed.contains(&uid) {
                        self.registry.complete(uid);
                    }
                }
                ReassemblyEvent::Discarded { uid: None, .. } => {}
            }
        }
        events
    }

    pub fn ask_for_action(&mut self, uid: Uid, is_positive: bool) -> Result<(), AncsError> {
        if let Some(record) = self.registry.get(uid) {
            let offered = if is_positive {
                record.has_positive_action()
            } else {
                record.has_negative_action()
            };
            if !offered {
                return Err(AncsError::ActionUnavailable(uid));
            }
        }
        self.queue
            .push_back(ControlPointRequest::PerformAction(PerformNotificationAction {
                uid,
                is_positive,
            }));
        Ok(())
    }

    pub fn on_request_written(&mut self, request: &ControlPointRequest) -> Vec<ObserverEvent> {
        match request {
            ControlPointRequest::FetchAttributes(_) => Vec::new(),
            ControlPointRequest::PerformAction(action) => vec![ObserverEvent::ActionResult {
                uid: action.uid,
                is_positive: action.is_positive,
                result: Ok(()),
            }],
        }
    }

    pub fn on_request_failed(
        &mut self,
        request: &ControlPointRequest,
        error: AncsError,
    ) -> Vec<ObserverEvent> {
        warn!("{}: control point request failed: {}", request.uid(), error);
        match request {
            ControlPointRequest::FetchAttributes(fetch) => {
                self.reassembler.cancel(fetch.uid);
                if !self.reassembler.is_pending(fetch.uid) {
                    self.registry.complete(fetch.uid);
                }
                Vec::new()
            }
            ControlPointRequest::PerformAction(action) => vec![ObserverEvent::ActionResult {
                uid: action.uid,
                is_positive: action.is_positive,
                result: Err(error),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::ancs::constants::{CategoryID, EventFlag};
    use crate::observer::registry::NotificationRecord;

    const UID: Uid = Uid::from_bytes([0x01, 0x02, 0x03, 0x04]);

    fn source(event_id: EventID, event_flags: EventFlag) -> Vec<u8> {
        Notification {
            uid: UID,
            event_id,
            event_flags,
            category: CategoryID::Social,
            category_count: 1,
        }
        .to_vec()
    }

    fn response(title: &str, message: &str) -> Vec<u8> {
        let mut data = vec![0x00, 0x01, 0x02, 0x03, 0x04, 0x00, 0x03, 0x00];
        data.extend_from_slice(b"app");
        for (id, text) in [(0x01u8, title), (0x03u8, message)] {
            data.push(id);
            data.extend_from_slice(&(text.len() as u16).to_le_bytes());
            data.extend_from_slice(text.as_bytes());
        }
        data
    }

    fn communicator() -> DeviceCommunicator {
        let config = ObserverConfig {
            request_action_labels: false,
            ..ObserverConfig::default()
        };
        DeviceCommunicator::new(&config)
    }

    #[test]
    fn added_notification_queues_a_fetch_and_emits_on_completion() {
        let mut comm = communicator();
        assert!(comm
            .on_notification_source(&source(EventID::NotificationAdded, EventFlag::empty()))
            .is_empty());
        let request = comm.next_request().unwrap();
        assert_eq!(
            request.to_vec(),
            GetNotificationAttributes::canonical(UID).to_vec()
        );

        let events = comm.on_data_source(&response("Bob", "Hi"));
        match events.as_slice() {
            [ObserverEvent::RecordUpdated(record)] => {
                assert_eq!(record.title.as_deref(), Some("Bob"));
                assert_eq!(record.message.as_deref(), Some("Hi"));
                assert_eq!(record.app_id.as_deref(), Some("app"));
                assert!(!record.awaiting_attributes);
            }
            other => panic!("unexpected events {:?}", other),
        }
    }

    #[test]
    fn textless_records_are_not_emitted() {
        let mut comm = communicator();
        comm.on_notification_source(&source(EventID::NotificationAdded, EventFlag::empty()));
        comm.next_request();
        assert!(comm.on_data_source(&response("", "")).is_empty());
        assert!(comm.registry().get(UID).is_some());
    }

    #[test]
    fn repeated_events_share_one_queued_fetch() {
        let mut comm = communicator();
        comm.on_notification_source(&source(EventID::NotificationAdded, EventFlag::empty()));
        comm.on_notification_source(&source(EventID::NotificationModified, EventFlag::empty()));
        assert_eq!(comm.queued(), 1);
    }

    #[test]
    fn removal_before_fetch_drops_the_request() {
        let mut comm = communicator();
        comm.on_notification_source(&source(EventID::NotificationAdded, EventFlag::empty()));
        let events =
            comm.on_notification_source(&source(EventID::NotificationRemoved, EventFlag::empty()));
        assert_eq!(events, vec![ObserverEvent::RecordRemoved(UID)]);
        assert_eq!(comm.queued(), 0);
    }

    #[test]
    fn removal_during_fetch_discards_the_late_response() {
        let mut comm = communicator();
        comm.on_notification_source(&source(EventID::NotificationAdded, EventFlag::empty()));
        comm.next_request();
        comm.on_notification_source(&source(EventID::NotificationRemoved, EventFlag::empty()));
        assert!(comm.on_data_source(&response("Bob", "Hi")).is_empty());
        assert!(comm.registry().get(UID).is_none());
    }

    #[test]
    fn removal_of_unknown_uid_is_silent() {
        let mut comm = communicator();
        assert!(comm
            .on_notification_source(&source(EventID::NotificationRemoved, EventFlag::empty()))
            .is_empty());
        assert!(comm.registry().is_empty());
    }

    #[test]
    fn preexisting_notifications_can_skip_the_fetch() {
        let config = ObserverConfig {
            fetch_preexisting: false,
            ..ObserverConfig::default()
        };
        let mut comm = DeviceCommunicator::new(&config);
        comm.on_notification_source(&source(EventID::NotificationAdded, EventFlag::PRE_EXISTING));
        assert_eq!(comm.queued(), 0);
        assert!(!comm.registry().get(UID).unwrap().awaiting_attributes);
    }

    #[test]
    fn malformed_source_is_dropped() {
        let mut comm = communicator();
        assert!(comm.on_notification_source(&[0x00, 0x01]).is_empty());
        assert!(comm.on_notification_source(&[0x09; 8]).is_empty());
        assert!(comm.registry().is_empty());
    }

    #[test]
    fn actions_require_the_announced_flag() {
        let mut comm = communicator();
        comm.on_notification_source(&source(
            EventID::NotificationAdded,
            EventFlag::NEGATIVE_ACTION,
        ));
        comm.next_request();
        assert_eq!(
            comm.ask_for_action(UID, true),
            Err(AncsError::ActionUnavailable(UID))
        );
        assert_eq!(comm.ask_for_action(UID, false), Ok(()));
        assert_eq!(
            comm.next_request().map(|r| r.to_vec()),
            Some(vec![0x02, 0x01, 0x02, 0x03, 0x04, 0x01])
        );
    }

    #[test]
    fn rejected_action_is_reported() {
        let mut comm = communicator();
        let request = ControlPointRequest::PerformAction(PerformNotificationAction {
            uid: UID,
            is_positive: true,
        });
        let events = comm.on_request_failed(&request, control_point_error(0xA3));
        assert_eq!(
            events,
            vec![ObserverEvent::ActionResult {
                uid: UID,
                is_positive: true,
                result: Err(AncsError::Peer(ErrorCode::ActionFailed)),
            }]
        );
    }

    #[test]
    fn unknown_att_status_is_a_transport_failure() {
        assert!(matches!(
            control_point_error(0x05),
            AncsError::TransportFailure(_)
        ));
    }

    fn source_for(uid: Uid, event_id: EventID, event_flags: EventFlag) -> Vec<u8> {
        Notification {
            uid,
            event_id,
            event_flags,
            category: CategoryID::Email,
            category_count: 1,
        }
        .to_vec()
    }

    fn response_for(uid: Uid, attributes: &[(u8, &str)]) -> Vec<u8> {
        let mut data = vec![0x00];
        data.extend_from_slice(&uid.to_bytes());
        for (id, text) in attributes {
            data.push(*id);
            data.extend_from_slice(&(text.len() as u16).to_le_bytes());
            data.extend_from_slice(text.as_bytes());
        }
        data
    }

    fn updated(events: &[ObserverEvent]) -> &NotificationRecord {
        match events {
            [ObserverEvent::RecordUpdated(record)] => record,
            other => panic!("unexpected events {:?}", other),
        }
    }

    #[test]
    fn refetch_with_new_flags_keeps_responses_in_write_order() {
        let other = Uid::from_bytes([0x0A, 0x0B, 0x0C, 0x0D]);
        let mut comm = DeviceCommunicator::new(&ObserverConfig::default());

        comm.on_notification_source(&source_for(UID, EventID::NotificationAdded, EventFlag::empty()));
        comm.next_request();
        comm.on_notification_source(&source_for(
            UID,
            EventID::NotificationModified,
            EventFlag::POSITIVE_ACTION,
        ));
        let labelled = comm.next_request().unwrap();
        assert_eq!(labelled.to_vec().last(), Some(&0x06));
        comm.on_notification_source(&source_for(other, EventID::NotificationAdded, EventFlag::empty()));
        comm.next_request();

        let first = comm.on_data_source(&response_for(UID, &[(0x00, "app"), (0x01, "Bob"), (0x03, "Hi")]));
        assert_eq!(updated(&first).positive_action_label, None);

        let second = comm.on_data_source(&response_for(
            UID,
            &[(0x00, "app"), (0x01, "Bob"), (0x03, "Hi"), (0x06, "Reply")],
        ));
        assert_eq!(updated(&second).positive_action_label.as_deref(), Some("Reply"));

        let third = comm.on_data_source(&response_for(
            other,
            &[(0x00, "mail"), (0x01, "Alice"), (0x03, "Lunch?")],
        ));
        assert_eq!(updated(&third).title.as_deref(), Some("Alice"));
        assert!(!comm.registry().get(other).unwrap().awaiting_attributes);
    }

    #[test]
    fn second_response_for_a_uid_survives_any_split() {
        let update = response("Bob", "Hi again");
        for split in 0..=update.len() {
            let mut comm = communicator();
            comm.on_notification_source(&source(EventID::NotificationAdded, EventFlag::empty()));
            comm.next_request();
            comm.on_notification_source(&source(EventID::NotificationModified, EventFlag::empty()));
            comm.next_request();
            assert_eq!(comm.on_data_source(&response("Bob", "Hi")).len(), 1);

            let mut events = comm.on_data_source(&update[..split]);
            events.extend(comm.on_data_source(&update[split..]));
            assert_eq!(
                updated(&events).message.as_deref(),
                Some("Hi again"),
                "split at {}",
                split
            );
            assert_eq!(
                comm.registry().get(UID).unwrap().message.as_deref(),
                Some("Hi again")
            );
        }
    }

    #[test]
    fn removal_drops_every_outstanding_response() {
        let mut comm = communicator();
        comm.on_notification_source(&source(EventID::NotificationAdded, EventFlag::empty()));
        comm.next_request();
        comm.on_notification_source(&source(EventID::NotificationModified, EventFlag::empty()));
        comm.next_request();
        comm.on_notification_source(&source(EventID::NotificationRemoved, EventFlag::empty()));

        let mut data = response("Bob", "Hi");
        data.extend(response("Bob", "Hi again"));
        assert!(comm.on_data_source(&data).is_empty());
        assert!(comm.registry().get(UID).is_none());
    }
}
