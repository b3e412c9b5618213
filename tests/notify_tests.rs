use chrono::Utc;
use request_manager::notify::{ForwardEvent, ForwardFeed};

fn event(request_id: &str) -> ForwardEvent {
    ForwardEvent {
        request_id: request_id.to_string(),
        document_type: "Form 137".to_string(),
        forwarded_at: Utc::now(),
    }
}

#[test]
fn test_counter_starts_at_current_feed_length() {
    let feed = ForwardFeed::new();
    feed.publish(event("r1"));
    feed.publish(event("r2"));

    let counter = feed.attach();
    assert_eq!(counter.count(), 2);
}

#[test]
fn test_counter_increments_per_publish() {
    let feed = ForwardFeed::new();
    let counter = feed.attach();
    assert_eq!(counter.count(), 0);

    feed.publish(event("r1"));
    assert_eq!(counter.count(), 1);

    feed.publish(event("r2"));
    feed.publish(event("r3"));
    assert_eq!(counter.count(), 3);

    // Never decrements on its own
    assert_eq!(counter.count(), 3);
}

#[test]
fn test_counter_sees_events_between_attach_and_first_read() {
    let feed = ForwardFeed::new();
    feed.publish(event("r1"));

    let counter = feed.attach();
    feed.publish(event("r2"));

    assert_eq!(counter.count(), 2);
}

#[test]
fn test_independent_observers() {
    let feed = ForwardFeed::new();
    feed.publish(event("r1"));

    let early = feed.attach();
    feed.publish(event("r2"));
    let late = feed.attach();

    assert_eq!(early.count(), 2);
    assert_eq!(late.count(), 2);

    feed.publish(event("r3"));
    assert_eq!(early.count(), 3);
    assert_eq!(late.count(), 3);
}

#[test]
fn test_lagged_observer_recovers_skipped_count() {
    let feed = ForwardFeed::new();
    let counter = feed.attach();

    // Push well past the broadcast buffer without reading
    for i in 0..600 {
        feed.publish(event(&format!("r{i}")));
    }

    assert_eq!(counter.count(), 600);
}

#[test]
fn test_detach_ends_observation() {
    let feed = ForwardFeed::new();
    let counter = feed.attach();
    feed.publish(event("r1"));
    assert_eq!(counter.count(), 1);

    counter.detach();

    // The feed itself keeps accepting events with no observers attached
    feed.publish(event("r2"));
    assert_eq!(feed.len(), 2);
}
