use super::*;

fn create_test_registry() -> Registry {
    let registry = Registry::new_custom(Some("quorum".to_string()), None).unwrap();
    register_custom_metrics(&registry);
    registry
}

#[test]
fn test_custom_registry() {
    let registry = create_test_registry();

    COMMITTED_ENTRIES_METRIC.with_label_values(&["1"]).inc();
    let metrics = &registry.gather();
    assert!(!metrics.is_empty());

    let metric_names: Vec<_> = metrics.iter().map(|m| m.get_name()).collect();
    assert!(
        metric_names.contains(&"quorum_committed_entries"),
        "Missing quorum_committed_entries"
    );
}

#[test]
fn test_counter_increment() {
    CLIENT_REDIRECTS_METRIC.with_label_values(&["123"]).inc();
    CLIENT_REDIRECTS_METRIC.with_label_values(&["123"]).inc();

    let value = CLIENT_REDIRECTS_METRIC.with_label_values(&["123"]).get();
    assert!(value >= 2, "Counter should increment correctly");
}

#[test]
fn test_gather_renders_text_format() {
    LEADERSHIP_TRANSFERS_METRIC.with_label_values(&["7"]).inc();
    let text = gather();
    assert!(text.contains("leadership_transfers"));
    assert!(text.contains("id=\"7\""));
}
