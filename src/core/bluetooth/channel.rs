//! Message channel
//! Numbers messages for the log and hides the role asymmetry: a server
//! pushes messages with notify, a client writes the characteristic.

use log::debug;

use crate::core::bluetooth::codec;
use crate::core::bluetooth::commands::RadioCommand;
use crate::core::bluetooth::errors::LinkError;
use crate::core::bluetooth::types::{
    ConnectionState, Direction, MessageRecord, Role, ServiceDescriptor,
};

/// A message accepted for sending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub record: MessageRecord,
    pub command: RadioCommand,
}

/// A decoded inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub record: MessageRecord,
    pub lossy: bool,
}

pub struct MessageChannel {
    descriptor: ServiceDescriptor,
    /// Index the next record gets; the event sink holds the log itself
    next_index: u64,
}

impl MessageChannel {
    pub fn new(descriptor: ServiceDescriptor) -> Self {
        Self {
            descriptor,
            next_index: 0,
        }
    }

    /// Encodes `text` and picks the radio primitive for the current role.
    ///
    /// The record is appended as soon as the message is accepted; a later
    /// radio failure does not remove it.
    pub fn send(&mut self, state: &ConnectionState, text: &str) -> Result<Outbound, LinkError> {
        let ConnectionState::Connected(_, role) = state else {
            return Err(LinkError::SendWhileDisconnected);
        };

        let value = codec::encode(text);
        let command = match role {
            Role::Server => RadioCommand::UpdateAndNotify {
                descriptor: self.descriptor,
                value,
            },
            Role::Client => RadioCommand::WriteCharacteristic {
                descriptor: self.descriptor,
                value,
            },
        };
        let record = self.append(Direction::Sent, text.to_owned());
        Ok(Outbound { record, command })
    }

    /// Decodes an inbound characteristic value and appends it
    pub fn receive(&mut self, value: &[u8]) -> Inbound {
        let frame = codec::decode_frame(value);
        debug!("Received {} bytes: {:?}", value.len(), frame.text);
        let record = self.append(Direction::Received, frame.text);
        Inbound {
            record,
            lossy: frame.lossy,
        }
    }

    fn append(&mut self, direction: Direction, text: String) -> MessageRecord {
        let record = MessageRecord {
            direction,
            text,
            index: self.next_index,
        };
        self.next_index += 1;
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::types::PeerIdentity;

    fn connected(role: Role) -> ConnectionState {
        ConnectionState::Connected(PeerIdentity::new("AA:BB:CC:DD:EE:01", None), role)
    }

    #[test]
    fn client_writes_and_server_notifies() {
        let mut channel = MessageChannel::new(ServiceDescriptor::CHIPPY);

        let out = channel.send(&connected(Role::Client), "ping").unwrap();
        assert_eq!(
            out.command,
            RadioCommand::WriteCharacteristic {
                descriptor: ServiceDescriptor::CHIPPY,
                value: b"ping".to_vec(),
            }
        );

        let out = channel.send(&connected(Role::Server), "pong").unwrap();
        assert_eq!(
            out.command,
            RadioCommand::UpdateAndNotify {
                descriptor: ServiceDescriptor::CHIPPY,
                value: b"pong".to_vec(),
            }
        );
    }

    #[test]
    fn send_outside_connected_consumes_no_index() {
        let mut channel = MessageChannel::new(ServiceDescriptor::CHIPPY);
        for state in [
            ConnectionState::Idle,
            ConnectionState::Advertising,
            ConnectionState::Scanning,
            ConnectionState::Disconnecting,
            ConnectionState::Connecting(PeerIdentity::new("AA", None)),
        ] {
            assert_eq!(
                channel.send(&state, "hello"),
                Err(LinkError::SendWhileDisconnected)
            );
        }
        assert_eq!(channel.receive(b"first").record.index, 0);
    }

    #[test]
    fn log_keeps_arrival_order_across_directions() {
        let mut channel = MessageChannel::new(ServiceDescriptor::CHIPPY);
        let one = channel.send(&connected(Role::Client), "one").unwrap().record;
        let two = channel.receive(b"two").record;
        let lossy = channel.receive(&[0xfe]);

        assert!(lossy.lossy);
        let records = [one, two, lossy.record];
        let texts: Vec<_> = records
            .iter()
            .map(|r| (r.index, r.direction, r.text.as_str()))
            .collect();
        assert_eq!(
            texts,
            vec![
                (0, Direction::Sent, "one"),
                (1, Direction::Received, "two"),
                (2, Direction::Received, "\u{fffd}"),
            ]
        );
    }
}
