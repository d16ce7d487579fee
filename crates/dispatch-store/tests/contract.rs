use std::collections::HashMap;

use dispatch_store::{Filter, Kind, Lifecycle, ObjectEnvelope, ObjectStore};

fn mission(name: &str) -> ObjectEnvelope {
    ObjectEnvelope {
        name: name.to_string(),
        labels: HashMap::new(),
        lifecycle: Lifecycle::Created,
        version: 0,
        spec: serde_json::json!({"robot": "carter01"}),
        status: serde_json::json!({"state": "PENDING"}),
    }
}

/// Exercises the trait the way dispatch-core would, without caring which
/// implementation backs it (spec §9: "must function with any
/// implementation satisfying the contract").
async fn exercise_contract(store: &dyn ObjectStore) {
    assert!(store.get(Kind::Mission, "m1").await.unwrap().is_none());

    let listed = store.list(Kind::Mission, &Filter::new()).await.unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn in_memory_store_satisfies_the_contract() {
    let store = dispatch_store::InMemoryObjectStore::new();
    exercise_contract(store.as_ref()).await;

    store.put(Kind::Mission, mission("m1"));
    let fetched = store.get(Kind::Mission, "m1").await.unwrap().unwrap();
    assert_eq!(fetched.version, 0);
}
