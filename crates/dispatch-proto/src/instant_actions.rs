use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::header::Header;

/// An InstantActions message (controller -> robot), used for `cancelOrder`
/// and other out-of-band actions that do not belong to an Order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstantActionsMessage {
    #[serde(flatten)]
    pub header: Header,
    pub actions: Vec<Action>,
}

impl InstantActionsMessage {
    pub const CANCEL_ORDER: &'static str = "cancelOrder";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::BlockingType;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    #[test]
    fn cancel_order_round_trips() {
        let msg = InstantActionsMessage {
            header: Header {
                header_id: 4,
                timestamp: Utc::now(),
                version: "1.1.0".into(),
                manufacturer: "acme".into(),
                serial_number: "carter01".into(),
            },
            actions: vec![Action {
                action_id: "cancel-1".into(),
                action_type: InstantActionsMessage::CANCEL_ORDER.into(),
                action_description: None,
                blocking_type: BlockingType::Hard,
                action_parameters: vec![],
            }],
        };
        let json = serde_json::to_string(&msg).unwrap();
        let decoded: InstantActionsMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, decoded);
    }
}
