use dispatch_proto::{Channel, HeaderStamper, Topic};

#[test]
fn stamped_headers_increase_per_topic_across_channels() {
    let stamper = HeaderStamper::new();
    let order_topic = Topic::new("uagv", "v1", "acme", "carter01", Channel::Order).to_string();
    let actions_topic = Topic::new("uagv", "v1", "acme", "carter01", Channel::InstantActions).to_string();

    let a = stamper.stamp(&order_topic, "acme", "carter01", "1.1.0");
    let b = stamper.stamp(&order_topic, "acme", "carter01", "1.1.0");
    let c = stamper.stamp(&actions_topic, "acme", "carter01", "1.1.0");

    assert!(a.header_id < b.header_id);
    assert_eq!(c.header_id, 0);
}
