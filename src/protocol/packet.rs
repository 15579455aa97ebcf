use bytes::Bytes;

/// Message envelope exchanged over a connection.
///
/// `id` names the logical message or method, `session_id` names the logical
/// session the packet belongs to (may differ from the physical connection id
/// when a gateway multiplexes sessions over one socket). `data` is opaque to
/// the engine. `status` carries a result code (0 = success by convention).
/// `sequence` is only used for request/response correlation and stays 0 for
/// plain fire-and-forget messages.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Packet {
    id: String,
    session_id: String,
    data: Bytes,
    status: i32,
    sequence: u64,
}

impl Packet {
    pub fn new() -> Packet {
        Packet::default()
    }

    pub fn with_id(id: impl Into<String>, data: impl Into<Bytes>) -> Packet {
        Packet {
            id: id.into(),
            data: data.into(),
            ..Packet::default()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn set_session_id(&mut self, session_id: impl Into<String>) {
        self.session_id = session_id.into();
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn set_data(&mut self, data: impl Into<Bytes>) {
        self.data = data.into();
    }

    pub fn status(&self) -> i32 {
        self.status
    }

    pub fn set_status(&mut self, status: i32) {
        self.status = status;
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_with_id() {
        let packet = Packet::with_id("Ping", "{}".as_bytes());
        assert_eq!(packet.id(), "Ping");
        assert_eq!(packet.data().as_ref(), b"{}");
        assert_eq!(packet.status(), 0);
        assert_eq!(packet.sequence(), 0);
        assert!(packet.session_id().is_empty());
    }
}
