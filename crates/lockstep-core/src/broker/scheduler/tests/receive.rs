use super::*;

#[test]
fn receive_parks_until_message_arrives() {
    let (tx, mut scheduler) = test_setup();
    let orders = EntityPath::queue("orders");

    let mut waiting = receive(&tx, &orders);
    run_until_idle(&tx, &mut scheduler);
    // Scheduler stop closes parked receives
    assert!(waiting.try_recv().is_err());

    let mut waiting = receive(&tx, &orders);
    send(&tx, "orders", "m1");
    run_until_idle(&tx, &mut scheduler);

    let locked = waiting.try_recv().unwrap().unwrap();
    assert_eq!(locked.message.id, "m1");
    assert_eq!(locked.message.delivery_count, 1);
    assert!(locked.locked_until > chrono::Utc::now());
    assert_eq!(scheduler.depth(&orders), (0, 1));
}

#[test]
fn waiters_are_served_in_arrival_order() {
    let (tx, mut scheduler) = test_setup();
    let orders = EntityPath::queue("orders");

    let mut first = receive(&tx, &orders);
    let mut second = receive(&tx, &orders);
    send(&tx, "orders", "m1");
    send(&tx, "orders", "m2");
    run_until_idle(&tx, &mut scheduler);

    assert_eq!(first.try_recv().unwrap().unwrap().message.id, "m1");
    assert_eq!(second.try_recv().unwrap().unwrap().message.id, "m2");
}

#[test]
fn abandoned_waiter_does_not_consume_a_delivery() {
    let (tx, mut scheduler) = test_setup();
    let orders = EntityPath::queue("orders");

    let gone = receive(&tx, &orders);
    drop(gone);
    let mut live = receive(&tx, &orders);
    send(&tx, "orders", "m1");
    run_until_idle(&tx, &mut scheduler);

    let locked = live.try_recv().unwrap().unwrap();
    assert_eq!(locked.message.id, "m1");
    assert_eq!(locked.message.delivery_count, 1);
    assert_eq!(scheduler.depth(&orders), (0, 1));
}

#[test]
fn receive_from_unknown_entity_fails() {
    let (tx, mut scheduler) = test_setup();

    let mut reply = receive(&tx, &EntityPath::queue("nope"));
    let mut topic_itself = receive(&tx, &EntityPath::queue("events"));
    run_until_idle(&tx, &mut scheduler);

    assert_eq!(
        reply.try_recv().unwrap().unwrap_err(),
        ReceiveError::EntityNotFound("nope".to_string())
    );
    assert!(matches!(
        topic_itself.try_recv().unwrap(),
        Err(ReceiveError::EntityNotFound(_))
    ));
}
