mod common;

use common::{msg, Recorder};
use switchboard_core::{Bus, EdgeMask, NoopHandler, Result};

#[test]
fn repeated_listen_to_keeps_first_mask() -> Result<()> {
    let bus = Bus::new();
    let a = bus.create_node(NoopHandler)?;
    let b = bus.create_node(NoopHandler)?;

    a.listen_to(b.id(), 0b0011, 0xFF);
    a.listen_to(b.id(), 0b1100, 0x0F);

    assert_eq!(a.listening_to(), vec![(b.id(), EdgeMask::new(0b0011, 0xFF))]);
    assert_eq!(b.listeners(), vec![(a.id(), EdgeMask::new(0b0011, 0xFF))]);
    Ok(())
}

#[test]
fn disconnect_removes_both_sides() -> Result<()> {
    let bus = Bus::new();
    let a = bus.create_node(NoopHandler)?;
    let b = bus.create_node(NoopHandler)?;

    a.listen_to_all(b.id());
    assert_eq!(b.listeners().len(), 1);
    assert!(bus.edge(a.id(), b.id()).is_some());

    a.disconnect_from(b.id());
    assert!(a.listening_to().is_empty());
    assert!(b.listeners().is_empty());

    // second disconnect is a no-op
    a.disconnect_from(b.id());
    assert!(b.listeners().is_empty());
    Ok(())
}

#[test]
fn disconnect_from_all_without_edges_is_noop() -> Result<()> {
    let bus = Bus::new();
    let a = bus.create_node(NoopHandler)?;
    a.disconnect_from_all();
    assert!(a.listening_to().is_empty());
    Ok(())
}

#[test]
fn disconnect_from_all_clears_every_reciprocal_entry() -> Result<()> {
    let bus = Bus::new();
    let a = bus.create_node(NoopHandler)?;
    let b = bus.create_node(NoopHandler)?;
    let c = bus.create_node(NoopHandler)?;
    let d = bus.create_node(NoopHandler)?;

    a.listen_to_all(b.id());
    a.listen_to_all(c.id());
    d.listen_to_all(c.id());

    a.disconnect_from_all();
    assert!(a.listening_to().is_empty());
    assert!(b.listeners().is_empty());
    assert_eq!(c.listeners(), vec![(d.id(), EdgeMask::ALL)]);
    Ok(())
}

#[test]
fn stored_message_mask_never_carries_forward_bit() -> Result<()> {
    let bus = Bus::new();
    let a = bus.create_node(NoopHandler)?;
    let b = bus.create_node(NoopHandler)?;
    a.listen_to(b.id(), !0, !0);

    let mask = bus.edge(a.id(), b.id()).expect("edge");
    assert_eq!(mask.message_mask() & switchboard_core::FORWARD_BIT, 0);
    assert_eq!(b.listeners()[0].1, mask);
    Ok(())
}

#[test]
fn destroying_node_detaches_it_from_everyone() -> Result<()> {
    let bus = Bus::new();
    let rec = Recorder::new();
    let a = bus.create_node(rec.clone())?;
    let b = bus.create_node(NoopHandler)?;
    let c = bus.create_node(rec.clone())?;

    a.listen_to_all(b.id());
    c.listen_to_all(a.id());
    a.set_receives_all_broadcasts(true);
    let a_id = a.id();
    drop(a);

    assert!(!bus.contains(a_id));
    assert!(b.listeners().is_empty());
    assert!(c.listening_to().is_empty());
    assert!(!bus.is_receiving_broadcasts(a_id));
    assert_eq!(bus.stats().broadcast_receivers, 0);

    b.send(&msg());
    c.send(&msg());
    assert_eq!(rec.count_for(a_id), 0);
    Ok(())
}

#[test]
fn self_listening_delivers_own_fresh_messages() -> Result<()> {
    let bus = Bus::new();
    let rec = Recorder::new();
    let a = bus.create_node(rec.clone())?;
    a.listen_to_all(a.id());
    assert_eq!(a.listeners(), vec![(a.id(), EdgeMask::ALL)]);

    a.send(&msg());
    let got = rec.received_by(a.id());
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].msg.sender(), Some(a.id()));

    // a message already carrying a as sender is not echoed back
    a.send(&got[0].msg);
    assert_eq!(rec.count_for(a.id()), 1);

    drop(a);
    assert_eq!(bus.node_count(), 0);
    Ok(())
}
