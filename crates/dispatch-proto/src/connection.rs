use serde::{Deserialize, Serialize};

use crate::header::Header;

/// Robot presence signal, used as the heartbeat input (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionState {
    Online,
    Offline,
    Connectionbroken,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionMessage {
    #[serde(flatten)]
    pub header: Header,
    #[serde(rename = "connectionState")]
    pub connection_state: ConnectionState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    #[test]
    fn connection_round_trips() {
        let msg = ConnectionMessage {
            header: Header {
                header_id: 0,
                timestamp: Utc::now(),
                version: "1.1.0".into(),
                manufacturer: "acme".into(),
                serial_number: "carter01".into(),
            },
            connection_state: ConnectionState::Online,
        };
        let json = serde_json::to_string(&msg).unwrap();
        let decoded: ConnectionMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, decoded);
    }
}
