//! Per-robot bounded outbound queue (spec §4.2): Orders are droppable
//! under backpressure, InstantActions (cancel) never are. Overflow drops
//! the oldest droppable entry to make room; if nothing droppable remains,
//! the new message itself is dropped.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: rumqttc::QoS,
    /// Never dropped under backpressure (InstantActions/cancel).
    pub critical: bool,
}

#[derive(Debug)]
pub struct OutboundQueue {
    capacity: usize,
    messages: VecDeque<QueuedMessage>,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, messages: VecDeque::with_capacity(capacity) }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Pushes `msg`. Returns `true` if a message had to be dropped (either
    /// the oldest droppable entry, or `msg` itself) to honor the capacity.
    pub fn push(&mut self, msg: QueuedMessage) -> bool {
        if self.messages.len() < self.capacity {
            self.messages.push_back(msg);
            return false;
        }

        if let Some(pos) = self.messages.iter().position(|m| !m.critical) {
            self.messages.remove(pos);
            self.messages.push_back(msg);
            true
        } else if !msg.critical {
            // Queue is full of critical messages; the new droppable
            // message is dropped rather than evicting something critical.
            true
        } else {
            // Critical message arriving into an all-critical full queue:
            // make room by dropping the oldest critical entry. This can
            // only happen if the queue capacity is smaller than the
            // number of in-flight cancels, which should not occur in
            // practice (one cancel in flight per robot at a time).
            self.messages.pop_front();
            self.messages.push_back(msg);
            true
        }
    }

    pub fn pop(&mut self) -> Option<QueuedMessage> {
        self.messages.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: u32) -> QueuedMessage {
        QueuedMessage { topic: "t/order".into(), payload: id.to_be_bytes().to_vec(), qos: rumqttc::QoS::AtLeastOnce, critical: false }
    }

    fn cancel(id: u32) -> QueuedMessage {
        QueuedMessage { topic: "t/instantActions".into(), payload: id.to_be_bytes().to_vec(), qos: rumqttc::QoS::AtLeastOnce, critical: true }
    }

    #[test]
    fn overflow_drops_oldest_droppable_order() {
        let mut q = OutboundQueue::new(2);
        assert!(!q.push(order(1)));
        assert!(!q.push(order(2)));
        assert!(q.push(order(3)));
        assert_eq!(q.len(), 2);
        let first = q.pop().unwrap();
        assert_eq!(first.payload, 2u32.to_be_bytes().to_vec());
    }

    #[test]
    fn critical_messages_survive_order_overflow() {
        let mut q = OutboundQueue::new(2);
        assert!(!q.push(cancel(1)));
        assert!(!q.push(order(2)));
        assert!(q.push(order(3)));
        // cancel(1) must still be queued; order(2) was evicted instead.
        assert!(q.pop().unwrap().critical);
    }
}
