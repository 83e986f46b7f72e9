mod common;

use common::{msg, Recorder};
use switchboard_core::{Bus, NoopHandler, Result};

#[test]
fn global_gate_nests() -> Result<()> {
    let bus = Bus::new();
    let rec = Recorder::new();
    let sender = bus.create_node(NoopHandler)?;
    let listener = bus.create_node(rec.clone())?;
    listener.listen_to_all(sender.id());

    bus.block_all_messages(true);
    bus.block_all_messages(true);
    bus.block_all_messages(false);
    assert!(bus.are_all_messages_blocked());
    sender.send(&msg());
    assert_eq!(rec.count_for(listener.id()), 0);

    bus.block_all_messages(false);
    assert!(!bus.are_all_messages_blocked());
    sender.send(&msg());
    assert_eq!(rec.count_for(listener.id()), 1);
    Ok(())
}

#[test]
fn blocked_dispatch_counts_blocked_and_nothing_else() -> Result<()> {
    let bus = Bus::new();
    let rec = Recorder::new();
    let sender = bus.create_node(NoopHandler)?;
    let listener = bus.create_node(rec.clone())?;
    listener.listen_to_all(sender.id());

    bus.block_all_messages(true);
    sender.send(&msg());
    sender.forward(&msg());
    sender.forward_to(listener.id(), &msg());
    listener.inject(&msg());

    let stats = bus.stats();
    assert_eq!(stats.blocked, 4);
    assert_eq!((stats.sent, stats.received, stats.filtered), (0, 0, 0));
    assert!(rec.deliveries().is_empty());
    bus.block_all_messages(false);
    Ok(())
}

#[test]
fn node_gate_only_affects_that_node() -> Result<()> {
    let bus = Bus::new();
    let rec = Recorder::new();
    let muted = bus.create_node(NoopHandler)?;
    let talker = bus.create_node(NoopHandler)?;
    let listener = bus.create_node(rec.clone())?;
    listener.listen_to_all(muted.id());
    listener.listen_to_all(talker.id());

    muted.block_messages(true);
    muted.block_messages(true);
    assert!(muted.are_messages_blocked());
    assert!(!talker.are_messages_blocked());

    muted.send(&msg());
    talker.send(&msg());
    assert_eq!(rec.count_for(listener.id()), 1);

    muted.block_messages(false);
    muted.send(&msg());
    assert_eq!(rec.count_for(listener.id()), 1);

    muted.block_messages(false);
    muted.send(&msg());
    assert_eq!(rec.count_for(listener.id()), 2);
    Ok(())
}

#[test]
fn blocked_node_still_receives_from_others() -> Result<()> {
    let bus = Bus::new();
    let rec = Recorder::new();
    let sender = bus.create_node(NoopHandler)?;
    let listener = bus.create_node(rec.clone())?;
    listener.listen_to_all(sender.id());

    listener.block_messages(true);
    sender.send(&msg());
    assert_eq!(rec.count_for(listener.id()), 1);
    Ok(())
}

#[test]
fn gates_leave_graph_and_registry_alone() -> Result<()> {
    let bus = Bus::new();
    let a = bus.create_node(NoopHandler)?;
    let b = bus.create_node(NoopHandler)?;
    a.listen_to_all(b.id());
    a.set_receives_all_broadcasts(true);

    bus.block_all_messages(true);
    b.block_messages(true);
    assert_eq!(b.listeners().len(), 1);
    assert!(a.is_receiving_broadcasts());
    b.block_messages(false);
    bus.block_all_messages(false);
    Ok(())
}

#[test]
fn block_provenance_is_untouched() -> Result<()> {
    let bus = Bus::new();
    let node = bus.create_node(NoopHandler)?;
    node.block_messages(true);
    let original = msg();
    node.inject(&original);
    assert_eq!(original.sender(), None);
    Ok(())
}
