//! Buffers fragmented Data Source responses until attribute tuples are whole.
//!
//! The peer streams a response as an arbitrary number of notifications with
//! no end marker. The first bytes carry the command id and uid; every
//! continuation belongs to whichever response is currently streaming.
//! Completeness is derived from the declared attribute lengths alone.
//!
//! Responses come back in the order the requests were written, so each uid
//! keeps a queue of outstanding requests and every response header takes the
//! oldest one.

use std::collections::{HashMap, HashSet, VecDeque};
use std::convert::TryFrom;

use log::{debug, warn};

use crate::common::error::AncsError;
use crate::observer::ancs::builders::GetNotificationAttributes;
use crate::observer::ancs::constants::{NotificationAttributeID, DATA_SOURCE_HEADER_LEN};
use crate::observer::ancs::parsers::{decode_attribute_chunk, DataSourceHeader, Decoded, Uid};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReassemblyEvent {
    Attribute {
        uid: Uid,
        attribute_id: NotificationAttributeID,
        value: String,
    },
    Completed(Uid),
    Discarded {
        uid: Option<Uid>,
        error: AncsError,
    },
}

#[derive(Debug)]
struct PendingAttributeRequest {
    uid: Uid,
    /// Empty when the response was never asked for on this session.
    requested: Vec<NotificationAttributeID>,
    observed: HashSet<u8>,
    buffer: Vec<u8>,
    cursor: usize,
}

impl PendingAttributeRequest {
    fn new(uid: Uid, requested: Vec<NotificationAttributeID>) -> Self {
        Self {
            uid,
            requested,
            observed: HashSet::new(),
            buffer: Vec::new(),
            cursor: 0,
        }
    }

    fn is_satisfied(&self) -> bool {
        if self.requested.is_empty() {
            return !self.observed.is_empty() && self.cursor == self.buffer.len();
        }
        self.requested
            .iter()
            .all(|id| self.observed.contains(&(*id as u8)))
    }

    fn leftover(&mut self) -> Vec<u8> {
        let cursor = self.cursor;
        self.buffer.split_off(cursor)
    }
}

#[derive(Debug, Default)]
pub struct AttributeReassembler {
    /// Requested attribute ids per uid, oldest write first.
    outstanding: HashMap<Uid, VecDeque<Vec<NotificationAttributeID>>>,
    streaming: Option<PendingAttributeRequest>,
    header: Vec<u8>,
}

impl AttributeReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a request that has been written to the Control Point.
    pub fn expect(&mut self, request: &GetNotificationAttributes) {
        let queue = self.outstanding.entry(request.uid).or_default();
        queue.push_back(request.requested_ids());
        if queue.len() > 1 {
            debug!("{}: {} attribute requests outstanding", request.uid, queue.len());
        }
    }

    /// Withdraws the most recent request for `uid`, e.g. after its write failed.
    pub fn cancel(&mut self, uid: Uid) -> bool {
        let queue = match self.outstanding.get_mut(&uid) {
            Some(queue) => queue,
            None => return false,
        };
        let withdrawn = queue.pop_back().is_some();
        if queue.is_empty() {
            self.outstanding.remove(&uid);
        }
        withdrawn
    }

    /// Drops every buffer; used when the session goes away.
    pub fn reset(&mut self) {
        self.outstanding.clear();
        self.streaming = None;
        self.header.clear();
    }

    /// Whether a response for `uid` is streaming or still expected.
    pub fn is_pending(&self, uid: Uid) -> bool {
        self.outstanding.contains_key(&uid)
            || self.streaming.as_ref().map_or(false, |pending| pending.uid == uid)
    }

    /// Responses still to be completed, the streaming one included.
    pub fn pending_count(&self) -> usize {
        self.outstanding.values().map(VecDeque::len).sum::<usize>()
            + usize::from(self.streaming.is_some())
    }

    pub fn feed(&mut self, data: &[u8]) -> Vec<ReassemblyEvent> {
        let mut events = Vec::new();
        let mut input = data.to_vec();

        loop {
            let mut pending = match self.streaming.take() {
                Some(pending) => pending,
                None => {
                    self.header.append(&mut input);
                    if self.header.is_empty() {
                        break;
                    }
                    match DataSourceHeader::parse(&self.header) {
                        Ok(Decoded::Incomplete) => break,
                        Ok(Decoded::Complete(header)) => {
                            input = self.header.split_off(DATA_SOURCE_HEADER_LEN);
                            self.header.clear();
                            self.start_response(header.uid)
                        }
                        Err(error) => {
                            warn!("Dropping data source message: {}", error);
                            self.header.clear();
                            events.push(ReassemblyEvent::Discarded { uid: None, error });
                            break;
                        }
                    }
                }
            };
            pending.buffer.append(&mut input);

            if let Err(error) = Self::drain(&mut pending, &mut events) {
                warn!("{}: dropping attribute response: {}", pending.uid, error);
                events.push(ReassemblyEvent::Discarded {
                    uid: Some(pending.uid),
                    error,
                });
                break;
            }

            if !pending.is_satisfied() {
                self.streaming = Some(pending);
                break;
            }
            input = pending.leftover();
            events.push(ReassemblyEvent::Completed(pending.uid));
            if input.is_empty() {
                break;
            }
        }

        events
    }

    fn start_response(&mut self, uid: Uid) -> PendingAttributeRequest {
        let requested = match self.outstanding.get_mut(&uid) {
            Some(queue) => {
                let requested = queue.pop_front().unwrap_or_default();
                if queue.is_empty() {
                    self.outstanding.remove(&uid);
                }
                requested
            }
            None => {
                debug!("{}: attribute response without a request on this session", uid);
                Vec::new()
            }
        };
        PendingAttributeRequest::new(uid, requested)
    }

    fn drain(
        pending: &mut PendingAttributeRequest,
        events: &mut Vec<ReassemblyEvent>,
    ) -> Result<(), AncsError> {
        while !pending.is_satisfied() {
            let chunk = match decode_attribute_chunk(&pending.buffer, pending.cursor)? {
                Decoded::Incomplete => break,
                Decoded::Complete(chunk) => chunk,
            };
            pending.cursor += chunk.consumed;
            pending.observed.insert(chunk.attribute_id);
            match NotificationAttributeID::try_from(chunk.attribute_id) {
                Ok(attribute_id) => events.push(ReassemblyEvent::Attribute {
                    uid: pending.uid,
                    attribute_id,
                    value: chunk.value,
                }),
                Err(e) => debug!("{}: skipping attribute: {}", pending.uid, e),
            }
        }
        Ok(())
    }
}
