//! Chat fan-out.
//!
//! The service is deliberately thin: the dispatcher resolves the recipient
//! set (all authenticated sessions for global, party members for party) and
//! the service validates the message and emits one event per recipient.

use crate::session::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatChannelKind {
    Global,
    Party,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub channel: ChatChannelKind,
    pub party_id: u64,
    pub sender_session_id: SessionId,
    pub sender_user_id: String,
    pub text: String,
}

pub type EventSink = Box<dyn Fn(SessionId, &ChatMessage) + Send + Sync>;

#[derive(Default)]
pub struct ChatService {
    event_sink: Option<EventSink>,
}

impl ChatService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_event_sink(&mut self, sink: EventSink) {
        self.event_sink = Some(sink);
    }

    /// Delivers a global message to `recipients`. Empty text or an empty
    /// recipient set fails.
    pub fn send_global(
        &self,
        sender_session_id: SessionId,
        sender_user_id: String,
        text: String,
        recipients: &[SessionId],
    ) -> bool {
        if self.event_sink.is_none() || text.is_empty() || recipients.is_empty() {
            return false;
        }
        let message = ChatMessage {
            channel: ChatChannelKind::Global,
            party_id: 0,
            sender_session_id,
            sender_user_id,
            text,
        };
        self.emit_to_recipients(&message, recipients);
        true
    }

    /// Delivers a party-scoped message to `recipients`.
    pub fn send_party(
        &self,
        sender_session_id: SessionId,
        sender_user_id: String,
        party_id: u64,
        text: String,
        recipients: &[SessionId],
    ) -> bool {
        if self.event_sink.is_none() || text.is_empty() || recipients.is_empty() {
            return false;
        }
        let message = ChatMessage {
            channel: ChatChannelKind::Party,
            party_id,
            sender_session_id,
            sender_user_id,
            text,
        };
        self.emit_to_recipients(&message, recipients);
        true
    }

    fn emit_to_recipients(&self, message: &ChatMessage, recipients: &[SessionId]) {
        let Some(sink) = &self.event_sink else {
            return;
        };
        for &recipient in recipients {
            sink(recipient, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn service_with_sink() -> (ChatService, Arc<Mutex<Vec<(SessionId, String)>>>) {
        let mut service = ChatService::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let captured = events.clone();
        service.set_event_sink(Box::new(move |session_id, message: &ChatMessage| {
            captured
                .lock()
                .unwrap()
                .push((session_id, message.text.clone()));
        }));
        (service, events)
    }

    #[test]
    fn global_message_reaches_every_recipient() {
        let (service, events) = service_with_sink();
        assert!(service.send_global(1, "user1".into(), "hello".into(), &[1, 2, 3]));
        let recorded = events.lock().unwrap().clone();
        assert_eq!(recorded.len(), 3);
        assert!(recorded.iter().all(|(_, text)| text == "hello"));
    }

    #[test]
    fn party_message_carries_party_id() {
        let mut service = ChatService::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = seen.clone();
        service.set_event_sink(Box::new(move |_, message: &ChatMessage| {
            captured
                .lock()
                .unwrap()
                .push((message.channel, message.party_id));
        }));
        assert!(service.send_party(1, "user1".into(), 42, "go".into(), &[1, 2]));
        let recorded = seen.lock().unwrap().clone();
        assert_eq!(recorded, vec![(ChatChannelKind::Party, 42); 2]);
    }

    #[test]
    fn empty_text_is_rejected() {
        let (service, events) = service_with_sink();
        assert!(!service.send_global(1, "user1".into(), String::new(), &[1]));
        assert!(!service.send_party(1, "user1".into(), 1, String::new(), &[1]));
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn no_recipients_is_rejected() {
        let (service, events) = service_with_sink();
        assert!(!service.send_global(1, "user1".into(), "hi".into(), &[]));
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn missing_sink_fails_delivery() {
        let service = ChatService::new();
        assert!(!service.send_global(1, "user1".into(), "hi".into(), &[1]));
    }
}
