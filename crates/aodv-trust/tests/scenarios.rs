//! Router scenarios driven through the mock context

use std::time::Duration;

use aodv_core::{
    DataPacket, DropReason, Ipv4Address, MockContext, NodeContext, PacketId, RoutingEvent, SendTarget,
    TimerHandle, Timestamp, TrustState,
};
use aodv_trust::{
    AodvConfig, AodvTrustRouter, Hello, RouteError, RouteReply, RouteRequest, RouteState,
    RouterTimer, RoutingError, WireMessage,
};

type Ctx = MockContext<Ipv4Address, RouterTimer<Ipv4Address>>;
type Router = AodvTrustRouter<Ipv4Address>;

fn addr(n: u8) -> Ipv4Address {
    Ipv4Address::new(10, 1, 1, n)
}

fn router(n: u8, trust: bool) -> Router {
    let config = AodvConfig::default()
        .with_trust(trust)
        .with_broadcast_jitter(Duration::ZERO);
    AodvTrustRouter::try_new(addr(n), config).unwrap()
}

fn context(n: u8, neighbors: &[u8]) -> Ctx {
    MockContext::new(addr(n)).with_neighbors(neighbors.iter().map(|m| addr(*m)))
}

fn sent_messages(ctx: &mut Ctx) -> Vec<(SendTarget<Ipv4Address>, WireMessage<Ipv4Address>)> {
    ctx.take_sent()
        .into_iter()
        .map(|f| (f.target, WireMessage::decode(&f.frame).unwrap()))
        .collect()
}

fn reply_frame(originator: u8, destination: u8, dest_seq: u32, hop_count: u8) -> Vec<u8> {
    WireMessage::Reply(RouteReply {
        originator: addr(originator),
        destination: addr(destination),
        dest_seq,
        hop_count,
        lifetime_ms: 6000,
        path_trust: 1.0,
    })
    .encode()
    .unwrap()
}

fn request_frame(originator: u8, destination: u8, broadcast_id: u32, hop_count: u8) -> Vec<u8> {
    WireMessage::Request(RouteRequest {
        originator: addr(originator),
        originator_seq: 1,
        destination: addr(destination),
        dest_seq: None,
        broadcast_id,
        hop_count,
        path_trust: 1.0,
    })
    .encode()
    .unwrap()
}

fn hello_frame(sender: u8, seq: u32) -> Vec<u8> {
    WireMessage::Hello(Hello {
        sender: addr(sender),
        sender_seq: seq,
    })
    .encode()
    .unwrap()
}

fn fire_due(router: &mut Router, ctx: &mut Ctx) {
    for (handle, timer) in ctx.due_timers() {
        router.on_timer(ctx, handle, timer);
    }
}

/// Discover 10.1.1.9 through `via`, which answers at `hops` from the destination
fn establish(router: &mut Router, ctx: &mut Ctx, via: u8, hops: u8) {
    assert!(router.originate(ctx, addr(9)));
    router.on_receive(ctx, addr(via), &reply_frame(1, 9, 5, hops));
    ctx.take_sent();
}

#[test]
fn test_originate_and_reply_installs_route() {
    let mut r = router(1, true);
    let mut ctx = context(1, &[2]);

    let id = r.send_data(&mut ctx, addr(9), vec![0; 32]).unwrap();
    let sent = sent_messages(&mut ctx);
    assert_eq!(sent.len(), 1);
    match &sent[0] {
        (SendTarget::Broadcast, WireMessage::Request(req)) => {
            assert_eq!(req.originator, addr(1));
            assert_eq!(req.destination, addr(9));
            assert_eq!(req.hop_count, 0);
        }
        other => panic!("expected a request broadcast, got {other:?}"),
    }
    assert!(r.pending().contains(&addr(9)));
    assert_eq!(r.routes().get(&addr(9)).unwrap().state, RouteState::InSearch);

    r.on_receive(&mut ctx, addr(2), &reply_frame(1, 9, 5, 2));

    let entry = r.routes().get(&addr(9)).unwrap();
    assert_eq!(entry.state, RouteState::Valid);
    assert_eq!(entry.next_hop, Some(addr(2)));
    assert_eq!(entry.hop_count, 3);
    assert_eq!(entry.dest_seq, 5);
    assert!(r.pending().is_empty());

    // Buffered data left through the new route
    let sent = sent_messages(&mut ctx);
    assert!(matches!(
        sent.last(),
        Some((SendTarget::Unicast(to), WireMessage::Data(p))) if *to == addr(2) && p.id == id
    ));
    let events = ctx.take_events();
    assert!(events.contains(&RoutingEvent::RouteEstablished {
        destination: addr(9),
        next_hop: addr(2),
        hop_count: 3,
    }));
    assert!(events.contains(&RoutingEvent::DataForwarded {
        packet_id: id,
        next_hop: addr(2),
    }));
}

#[test]
fn test_data_to_self_is_refused() {
    let mut r = router(1, true);
    let mut ctx = context(1, &[2]);
    assert!(matches!(
        r.send_data(&mut ctx, addr(1), vec![1]),
        Err(RoutingError::SelfAddressed)
    ));
    assert!(ctx.sent().is_empty());
}

#[test]
fn test_duplicate_request_has_no_effect() {
    let mut r = router(5, true);
    let mut ctx = context(5, &[2, 3]);

    r.on_receive(&mut ctx, addr(2), &request_frame(1, 9, 1, 1));
    let sent = sent_messages(&mut ctx);
    assert_eq!(sent.len(), 1);
    match &sent[0] {
        (SendTarget::Broadcast, WireMessage::Request(req)) => {
            assert_eq!(req.hop_count, 2);
            assert_eq!(req.originator, addr(1));
        }
        other => panic!("expected a re-broadcast, got {other:?}"),
    }
    assert_eq!(r.routes().next_hop(&addr(1), ctx.now()), Some(addr(2)));
    let routes_before = r.routes().len();

    r.on_receive(&mut ctx, addr(3), &request_frame(1, 9, 1, 1));
    assert!(ctx.take_sent().is_empty());
    assert_eq!(r.routes().len(), routes_before);
    assert_eq!(r.routes().next_hop(&addr(1), ctx.now()), Some(addr(2)));
    assert!(r.routes().get(&addr(3)).is_none());
}

#[test]
fn test_destination_answers_request() {
    let mut r = router(9, true);
    let mut ctx = context(9, &[4]);

    r.on_receive(&mut ctx, addr(4), &request_frame(1, 9, 3, 2));
    let sent = sent_messages(&mut ctx);
    assert_eq!(sent.len(), 1);
    match &sent[0] {
        (SendTarget::Unicast(to), WireMessage::Reply(rep)) => {
            assert_eq!(*to, addr(4));
            assert_eq!(rep.originator, addr(1));
            assert_eq!(rep.destination, addr(9));
            assert_eq!(rep.hop_count, 0);
        }
        other => panic!("expected a reply, got {other:?}"),
    }
    assert_eq!(r.routes().get(&addr(1)).unwrap().hop_count, 3);
}

/// Two equally good replies, the second from a neighbor with a better record
fn tie_break_winner(trust: bool) -> Option<Ipv4Address> {
    let mut r = router(1, trust);
    let mut ctx = context(1, &[2, 3]);

    // Neighbor 3 earns a few positive observations first
    for seq in 1..=3 {
        r.on_receive(&mut ctx, addr(3), &hello_frame(3, seq));
    }

    assert!(r.originate(&mut ctx, addr(9)));
    r.on_receive(&mut ctx, addr(2), &reply_frame(1, 9, 5, 2));
    r.on_receive(&mut ctx, addr(3), &reply_frame(1, 9, 5, 2));
    r.routes().next_hop(&addr(9), ctx.now())
}

#[test]
fn test_first_reply_wins_without_trust() {
    assert_eq!(tie_break_winner(false), Some(addr(2)));
}

#[test]
fn test_trusted_neighbor_wins_tie() {
    assert_eq!(tie_break_winner(true), Some(addr(3)));
}

#[test]
fn test_confirmed_forwards_raise_trust() {
    let mut r = router(1, true);
    let mut ctx = context(1, &[2]);
    establish(&mut r, &mut ctx, 2, 2);
    let before = r.trust().assess(&addr(2)).score;

    for _ in 0..10 {
        r.send_data(&mut ctx, addr(9), vec![0; 64]).unwrap();
        let frame = ctx.take_sent().pop().unwrap();
        assert_eq!(frame.target, SendTarget::Unicast(addr(2)));
        // Neighbor 2 is overheard passing the packet on
        r.on_overheard(&mut ctx, addr(2), &frame.frame);
    }

    let after = r.trust().assess(&addr(2));
    assert!((after.score - (before + 0.2)).abs() < 1e-9);
    assert!(after.score > 0.7);
    assert_eq!(after.state, TrustState::Trusted);
    assert!(r.watchdog().is_empty());
    assert_eq!(ctx.armed_timers(), 2, "only the two route expiry timers remain");
}

#[test]
fn test_dropping_neighbor_is_blacklisted() {
    let mut r = router(1, true);
    let mut ctx = context(1, &[2]);
    establish(&mut r, &mut ctx, 2, 2);

    for _ in 0..5 {
        r.send_data(&mut ctx, addr(9), vec![0; 64]).unwrap();
    }
    assert_eq!(r.watchdog().len(), 5);
    ctx.take_sent();

    // Nothing is overheard before the deadlines
    ctx.advance(Duration::from_millis(600));
    fire_due(&mut r, &mut ctx);

    assert_eq!(r.trust().assess(&addr(2)).state, TrustState::Blacklisted);
    assert!(ctx.take_events().iter().any(|e| matches!(
        e,
        RoutingEvent::TrustStateChanged { neighbor, to: TrustState::Blacklisted, .. } if *neighbor == addr(2)
    )));
    assert!(r.routes().next_hop(&addr(9), ctx.now()).is_none());
    assert!(r.watchdog().is_empty());

    // Local repair started a new discovery
    assert!(r.pending().contains(&addr(9)));
    assert!(
        sent_messages(&mut ctx)
            .iter()
            .any(|(_, m)| matches!(m, WireMessage::Request(req) if req.destination == addr(9)))
    );

    // Control traffic from the blacklisted neighbor is ignored
    r.on_receive(&mut ctx, addr(2), &request_frame(7, 8, 1, 0));
    assert!(ctx.take_sent().is_empty());
    assert!(r.routes().get(&addr(7)).is_none());

    r.on_receive(&mut ctx, addr(2), &reply_frame(1, 9, 9, 1));
    assert!(r.routes().next_hop(&addr(9), ctx.now()).is_none());
    assert!(r.pending().contains(&addr(9)));
}

#[test]
fn test_dropping_neighbor_is_kept_without_trust() {
    let mut r = router(1, false);
    let mut ctx = context(1, &[2]);
    establish(&mut r, &mut ctx, 2, 2);

    for _ in 0..5 {
        r.send_data(&mut ctx, addr(9), vec![0; 64]).unwrap();
    }
    ctx.advance(Duration::from_millis(600));
    fire_due(&mut r, &mut ctx);

    // Raw score still drops, but routing does not react
    assert!(r.trust().table().score(&addr(2)) < 0.2);
    assert_eq!(r.trust().assess(&addr(2)).state, TrustState::Trusted);
    assert_eq!(r.routes().next_hop(&addr(9), ctx.now()), Some(addr(2)));
}

#[test]
fn test_link_break_repairs_through_alternate_neighbor() {
    let mut r = router(1, true);
    let mut ctx = context(1, &[2, 3, 4]);
    establish(&mut r, &mut ctx, 2, 2);

    // Neighbor 4 learns the route from our cache and becomes a precursor
    r.on_receive(&mut ctx, addr(4), &request_frame(4, 9, 1, 0));
    let sent = sent_messages(&mut ctx);
    assert!(matches!(
        sent.as_slice(),
        [(SendTarget::Unicast(to), WireMessage::Reply(rep))] if *to == addr(4) && rep.dest_seq == 5
    ));
    assert!(r.routes().get(&addr(9)).unwrap().precursors.contains(&addr(4)));

    ctx.break_link(addr(2));
    let id = r.send_data(&mut ctx, addr(9), vec![0; 64]).unwrap();

    let entry = r.routes().get(&addr(9)).unwrap();
    assert_ne!(entry.state, RouteState::Valid);
    assert_eq!(entry.dest_seq, 6);

    let sent = sent_messages(&mut ctx);
    assert!(sent.iter().any(|(target, m)| matches!(
        (target, m),
        (SendTarget::Unicast(to), WireMessage::Error(err))
            if *to == addr(4) && err.unreachable == vec![(addr(9), 6)]
    )));
    assert!(sent.iter().any(|(target, m)| matches!(
        (target, m),
        (SendTarget::Broadcast, WireMessage::Request(req))
            if req.destination == addr(9) && req.dest_seq == Some(6)
    )));
    assert!(ctx.take_events().contains(&RoutingEvent::RouteInvalidated { destination: addr(9) }));
    assert_eq!(r.pending().get(&addr(9)).unwrap().buffered.len(), 1);

    r.on_receive(&mut ctx, addr(3), &reply_frame(1, 9, 6, 2));
    assert_eq!(r.routes().next_hop(&addr(9), ctx.now()), Some(addr(3)));
    let sent = sent_messages(&mut ctx);
    assert!(matches!(
        sent.last(),
        Some((SendTarget::Unicast(to), WireMessage::Data(p))) if *to == addr(3) && p.id == id
    ));
}

#[test]
fn test_route_error_from_next_hop_invalidates() {
    let mut r = router(1, true);
    let mut ctx = context(1, &[2]);
    establish(&mut r, &mut ctx, 2, 2);

    let frame = WireMessage::Error(RouteError {
        unreachable: vec![(addr(9), 8)],
    })
    .encode()
    .unwrap();
    r.on_receive(&mut ctx, addr(2), &frame);

    let entry = r.routes().get(&addr(9)).unwrap();
    assert_eq!(entry.state, RouteState::InSearch);
    assert_eq!(entry.dest_seq, 8);
    // Route to the neighbor itself is untouched
    assert_eq!(r.routes().next_hop(&addr(2), ctx.now()), Some(addr(2)));
}

#[test]
fn test_retries_exhausted_reports_unreachable() {
    let mut r = router(1, true);
    let mut ctx = context(1, &[2]);

    let id = r.send_data(&mut ctx, addr(9), vec![0; 16]).unwrap();
    for _ in 0..3 {
        ctx.advance(Duration::from_secs(12));
        fire_due(&mut r, &mut ctx);
    }

    let requests = sent_messages(&mut ctx)
        .into_iter()
        .filter(|(_, m)| matches!(m, WireMessage::Request(_)))
        .count();
    assert_eq!(requests, 3);
    assert!(r.pending().is_empty());
    assert_eq!(r.routes().get(&addr(9)).unwrap().state, RouteState::Invalid);

    let events = ctx.take_events();
    assert!(events.contains(&RoutingEvent::DestinationUnreachable { destination: addr(9) }));
    assert!(events.contains(&RoutingEvent::DataDropped {
        packet_id: id,
        reason: DropReason::Unreachable,
    }));
}

#[test]
fn test_malformed_traffic_lowers_trust() {
    let mut r = router(1, true);
    let mut ctx = context(1, &[2]);

    r.on_receive(&mut ctx, addr(2), &[0xff, 0xff, 0xff]);
    let score = r.trust().assess(&addr(2)).score;
    assert!(score < 0.5 && score > 0.3);

    // Hello claiming another sender
    r.on_receive(&mut ctx, addr(2), &hello_frame(3, 1));
    assert!(r.trust().assess(&addr(2)).score < score);
    assert!(r.routes().get(&addr(3)).is_none());
}

#[test]
fn test_silent_neighbor_loses_route() {
    let mut r = router(1, true);
    let mut ctx = context(1, &[2]);
    r.start(&mut ctx);

    r.on_receive(&mut ctx, addr(2), &hello_frame(2, 1));
    assert_eq!(r.routes().next_hop(&addr(2), ctx.now()), Some(addr(2)));

    for _ in 0..6 {
        ctx.advance(Duration::from_secs(1));
        fire_due(&mut r, &mut ctx);
    }

    assert!(r.routes().next_hop(&addr(2), ctx.now()).is_none());
    assert!(ctx.take_events().contains(&RoutingEvent::RouteInvalidated { destination: addr(2) }));
    let hellos = sent_messages(&mut ctx)
        .into_iter()
        .filter(|(t, m)| *t == SendTarget::Broadcast && matches!(m, WireMessage::Hello(_)))
        .count();
    assert!(hellos >= 3);
}

#[test]
fn test_transit_data_without_route_is_reported() {
    let mut r = router(5, true);
    let mut ctx = context(5, &[4]);

    let packet = DataPacket::new(PacketId::new(addr(1), 1), addr(9), 10, vec![0; 8]);
    r.on_receive(&mut ctx, addr(4), &WireMessage::Data(packet).encode().unwrap());

    assert!(ctx.take_events().iter().any(|e| matches!(
        e,
        RoutingEvent::DataDropped { reason: DropReason::NoRoute, .. }
    )));
    let sent = sent_messages(&mut ctx);
    assert!(matches!(
        sent.as_slice(),
        [(SendTarget::Unicast(to), WireMessage::Error(err))] if *to == addr(4) && err.unreachable[0].0 == addr(9)
    ));
}

#[test]
fn test_stale_reply_does_not_revive_route() {
    let mut r = router(1, true);
    let mut ctx = context(1, &[2, 3]);
    establish(&mut r, &mut ctx, 2, 2);

    let frame = WireMessage::Error(RouteError {
        unreachable: vec![(addr(9), 8)],
    })
    .encode()
    .unwrap();
    r.on_receive(&mut ctx, addr(2), &frame);
    assert_eq!(r.routes().get(&addr(9)).unwrap().state, RouteState::InSearch);
    let before = r.trust().assess(&addr(3)).score;

    // Delayed reply carrying the number from before the error
    r.on_receive(&mut ctx, addr(3), &reply_frame(1, 9, 5, 1));
    let entry = r.routes().get(&addr(9)).unwrap();
    assert_eq!(entry.state, RouteState::InSearch);
    assert_eq!(entry.dest_seq, 8);
    assert!(r.pending().contains(&addr(9)));
    assert!(r.trust().assess(&addr(3)).score < before);

    // A reply as fresh as the error completes the repair, even if longer
    r.on_receive(&mut ctx, addr(3), &reply_frame(1, 9, 8, 3));
    let entry = r.routes().get(&addr(9)).unwrap();
    assert_eq!(entry.state, RouteState::Valid);
    assert_eq!(entry.next_hop, Some(addr(3)));
    assert_eq!(entry.dest_seq, 8);
    assert!(r.pending().is_empty());
}

#[test]
fn test_hello_after_link_break_restores_neighbor_route() {
    let mut r = router(1, true);
    let mut ctx = context(1, &[2]);
    r.on_receive(&mut ctx, addr(2), &hello_frame(2, 4));
    assert_eq!(r.routes().get(&addr(2)).unwrap().dest_seq, 4);

    r.on_send_failure(&mut ctx, addr(2), &[]);
    let entry = r.routes().get(&addr(2)).unwrap();
    assert_eq!(entry.state, RouteState::Invalid);
    assert_eq!(entry.dest_seq, 5);

    // The neighbor has not originated anything since, so its number is still 4
    r.on_receive(&mut ctx, addr(2), &hello_frame(2, 4));
    assert_eq!(r.routes().next_hop(&addr(2), ctx.now()), Some(addr(2)));
}

fn expiry_timers(ctx: &Ctx, dest: u8) -> Vec<(TimerHandle, Timestamp)> {
    ctx.timers()
        .filter(|(_, _, t)| matches!(t, RouterTimer::RouteExpiry { destination } if *destination == addr(dest)))
        .map(|(handle, at, _)| (handle, at))
        .collect()
}

#[test]
fn test_lapsed_route_expires() {
    let mut r = router(1, true);
    let mut ctx = context(1, &[2]);
    establish(&mut r, &mut ctx, 2, 2);
    assert_eq!(expiry_timers(&ctx, 9).len(), 1);

    ctx.advance(Duration::from_millis(5999));
    fire_due(&mut r, &mut ctx);
    assert_eq!(r.routes().get(&addr(9)).unwrap().state, RouteState::Valid);

    ctx.advance(Duration::from_millis(1));
    fire_due(&mut r, &mut ctx);
    let entry = r.routes().get(&addr(9)).unwrap();
    assert_eq!(entry.state, RouteState::Invalid);
    // Expiry is not a break: the sequence number stays
    assert_eq!(entry.dest_seq, 5);
    assert!(entry.expiry_timer.is_none());
    assert!(ctx.take_events().contains(&RoutingEvent::RouteInvalidated { destination: addr(9) }));
    assert!(expiry_timers(&ctx, 9).is_empty());
}

#[test]
fn test_refreshed_route_rearms_expiry() {
    let mut r = router(1, true);
    let mut ctx = context(1, &[2]);
    establish(&mut r, &mut ctx, 2, 2);

    // Traffic at 4 s pushes the lifetime to 7 s
    ctx.advance(Duration::from_secs(4));
    r.send_data(&mut ctx, addr(9), vec![0; 16]).unwrap();
    let frame = ctx.take_sent().pop().unwrap();
    r.on_overheard(&mut ctx, addr(2), &frame.frame);

    ctx.advance(Duration::from_secs(2));
    fire_due(&mut r, &mut ctx);
    let entry = r.routes().get(&addr(9)).unwrap();
    assert_eq!(entry.state, RouteState::Valid);
    let timers = expiry_timers(&ctx, 9);
    assert_eq!(timers.len(), 1);
    assert_eq!(timers[0].1, Timestamp::from_secs(7));
    assert_eq!(entry.expiry_timer, Some(timers[0].0));

    ctx.advance(Duration::from_secs(1));
    fire_due(&mut r, &mut ctx);
    assert_eq!(r.routes().get(&addr(9)).unwrap().state, RouteState::Invalid);
}

#[test]
fn test_superseded_expiry_timer_is_ignored() {
    let mut r = router(1, true);
    let mut ctx = context(1, &[2, 3]);
    establish(&mut r, &mut ctx, 2, 2);
    let (first, _) = expiry_timers(&ctx, 9)[0];

    // A fresher reply replaces the route and its timer
    ctx.advance(Duration::from_secs(1));
    r.on_receive(&mut ctx, addr(3), &reply_frame(1, 9, 6, 2));
    assert!(!ctx.is_armed(first));
    let (second, at) = expiry_timers(&ctx, 9)[0];
    assert_eq!(at, Timestamp::from_secs(7));

    // The old callback arrives anyway
    ctx.set_now(Timestamp::from_millis(6500));
    r.on_timer(&mut ctx, first, RouterTimer::RouteExpiry { destination: addr(9) });

    let entry = r.routes().get(&addr(9)).unwrap();
    assert_eq!(entry.state, RouteState::Valid);
    assert_eq!(entry.next_hop, Some(addr(3)));
    assert_eq!(entry.expiry_timer, Some(second));
    assert_eq!(expiry_timers(&ctx, 9), vec![(second, at)]);
    assert!(!ctx.take_events().contains(&RoutingEvent::RouteInvalidated { destination: addr(9) }));
}

#[test]
fn test_decay_readmits_blacklisted_neighbor() {
    let mut r = router(1, true);
    let mut ctx = context(1, &[2]);
    r.start(&mut ctx);
    establish(&mut r, &mut ctx, 2, 2);

    for _ in 0..4 {
        r.send_data(&mut ctx, addr(9), vec![0; 64]).unwrap();
    }
    ctx.advance(Duration::from_millis(600));
    fire_due(&mut r, &mut ctx);
    assert_eq!(r.trust().assess(&addr(2)).state, TrustState::Blacklisted);
    ctx.take_events();

    // Quiet neighbors drift back toward neutral on every sweep
    for _ in 0..15 {
        ctx.advance(Duration::from_secs(1));
        fire_due(&mut r, &mut ctx);
    }

    assert!(r.trust().admits(&addr(2)));
    assert!(ctx.take_events().iter().any(|e| matches!(
        e,
        RoutingEvent::TrustStateChanged {
            neighbor,
            from: TrustState::Blacklisted,
            to: TrustState::Suspect,
            ..
        } if *neighbor == addr(2)
    )));

    r.on_receive(&mut ctx, addr(2), &hello_frame(2, 1));
    assert_eq!(r.routes().next_hop(&addr(2), ctx.now()), Some(addr(2)));
}
