//! VDA5050 topic naming: `<prefix>/<interface_version>/<manufacturer>/<serial>/<channel>`.

use std::fmt;

use crate::error::CodecError;

/// The five VDA5050 channels carried as MQTT topic suffixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Order,
    InstantActions,
    State,
    Connection,
    Factsheet,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Order => "order",
            Channel::InstantActions => "instantActions",
            Channel::State => "state",
            Channel::Connection => "connection",
            Channel::Factsheet => "factsheet",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "order" => Some(Channel::Order),
            "instantActions" => Some(Channel::InstantActions),
            "state" => Some(Channel::State),
            "connection" => Some(Channel::Connection),
            "factsheet" => Some(Channel::Factsheet),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully-qualified VDA5050 topic for one robot and channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub prefix: String,
    pub interface_version: String,
    pub manufacturer: String,
    pub serial: String,
    pub channel: Channel,
}

impl Topic {
    pub fn new(
        prefix: impl Into<String>,
        interface_version: impl Into<String>,
        manufacturer: impl Into<String>,
        serial: impl Into<String>,
        channel: Channel,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            interface_version: interface_version.into(),
            manufacturer: manufacturer.into(),
            serial: serial.into(),
            channel,
        }
    }

    /// The subscription filter matching every robot's topic for `channel`,
    /// e.g. `uagv/v1/acme/+/state`.
    pub fn wildcard(
        prefix: impl Into<String>,
        interface_version: impl Into<String>,
        manufacturer: impl Into<String>,
        channel: Channel,
    ) -> String {
        format!(
            "{}/{}/{}/+/{}",
            prefix.into(),
            interface_version.into(),
            manufacturer.into(),
            channel.as_str()
        )
    }

    /// Parses a concrete topic string (no wildcards) back into its parts.
    pub fn parse(prefix: &str, interface_version: &str, manufacturer: &str, s: &str) -> Result<Self, CodecError> {
        let expected_head = format!("{prefix}/{interface_version}/{manufacturer}/");
        let rest = s
            .strip_prefix(&expected_head)
            .ok_or_else(|| CodecError::InvalidTopic(s.to_string()))?;
        let mut parts = rest.splitn(2, '/');
        let serial = parts.next().ok_or_else(|| CodecError::InvalidTopic(s.to_string()))?;
        let channel_str = parts.next().ok_or_else(|| CodecError::InvalidTopic(s.to_string()))?;
        let channel = Channel::parse(channel_str).ok_or_else(|| CodecError::InvalidTopic(s.to_string()))?;
        Ok(Topic::new(prefix, interface_version, manufacturer, serial, channel))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.prefix, self.interface_version, self.manufacturer, self.serial, self.channel
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_parse() {
        let topic = Topic::new("uagv", "v1", "acme", "carter01", Channel::State);
        let rendered = topic.to_string();
        assert_eq!(rendered, "uagv/v1/acme/carter01/state");

        let parsed = Topic::parse("uagv", "v1", "acme", &rendered).unwrap();
        assert_eq!(parsed, topic);
    }

    #[test]
    fn wildcard_uses_plus_for_serial() {
        let w = Topic::wildcard("uagv", "v1", "acme", Channel::Connection);
        assert_eq!(w, "uagv/v1/acme/+/connection");
    }
}
