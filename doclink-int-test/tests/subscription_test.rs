use doclink::errors::ErrorKind;
use doclink::query::field;
use doclink::snapshot::DocumentRecord;
use doclink::subscription::SubscriptionState;
use doclink::transport::ListenerHandle;
use doclink::Value;
use doclink_int_test::test_util::{
    cleanup, create_test_context, run_test, user, wait_for_state, wait_until,
};
use std::time::Duration;

#[ctor::ctor]
fn init() {
    colog::init();
}

#[test]
fn test_events_delivered_in_arrival_order() {
    run_test(
        || create_test_context(),
        |ctx| {
            let query = ctx.db().collection("users")?.query().order_by("age")?;
            let subscription = ctx.db().subscribe(&query);
            let mut a = subscription.listen();
            wait_for_state(&subscription, SubscriptionState::Active);
            let handle = subscription.handle().unwrap();

            assert!(ctx.push(handle, vec![user("alice", "Alice", 30)]));
            assert!(ctx.push(handle, vec![user("alice", "Alice", 30), user("bob", "Bob", 40)]));

            let e1 = ctx.next(&mut a).unwrap()?;
            let e2 = ctx.next(&mut a).unwrap()?;
            assert_eq!(e1.len(), 1);
            assert_eq!(e2.len(), 2);
            assert_eq!(e2.documents()[1].get("name"), Value::from("Bob"));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_late_consumer_sees_no_replay() {
    run_test(
        || create_test_context(),
        |ctx| {
            let query = ctx.db().collection("users")?.query();
            let subscription = ctx.db().subscribe(&query);
            let mut a = subscription.listen();
            wait_for_state(&subscription, SubscriptionState::Active);
            let handle = subscription.handle().unwrap();

            ctx.push(handle, vec![user("alice", "Alice", 30)]);
            assert_eq!(ctx.next(&mut a).unwrap()?.len(), 1);

            let mut b = subscription.listen();
            assert_eq!(subscription.consumer_count(), 2);
            ctx.push(handle, vec![user("alice", "Alice", 31), user("bob", "Bob", 40)]);

            assert_eq!(ctx.next(&mut a).unwrap()?.len(), 2);
            let first_for_b = ctx.next(&mut b).unwrap()?;
            assert_eq!(first_for_b.len(), 2);
            assert_eq!(first_for_b.documents()[0].get("age"), Value::from(31));
            assert!(ctx.is_quiet(&mut b, Duration::from_millis(200)));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_single_registration_for_concurrent_attaches() {
    run_test(
        || create_test_context(),
        |ctx| {
            ctx.transport().hold_registrations();
            let query = ctx.db().collection("users")?.query();
            let subscription = ctx.db().subscribe(&query);
            let mut a = subscription.listen();
            let mut b = subscription.listen();
            assert_eq!(subscription.state(), SubscriptionState::Pending);

            wait_until(|| ctx.transport().register_count() == 1);
            ctx.transport().release_registration();
            wait_for_state(&subscription, SubscriptionState::Active);
            assert_eq!(ctx.transport().register_count(), 1);

            let handle = subscription.handle().unwrap();
            ctx.push(handle, vec![user("alice", "Alice", 30)]);
            assert!(ctx.next(&mut a).unwrap().is_ok());
            assert!(ctx.next(&mut b).unwrap().is_ok());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_registration_payload_is_serialized_query() {
    run_test(
        || create_test_context(),
        |ctx| {
            let query = ctx
                .db()
                .collection("users")?
                .query()
                .filter(field("age").gte(18))?
                .order_by_descending("age")?;
            let subscription = ctx.db().subscribe(&query);
            let _stream = subscription.listen();
            wait_for_state(&subscription, SubscriptionState::Active);

            let registrations = ctx.transport().registrations();
            assert_eq!(registrations.len(), 1);
            assert_eq!(registrations[0], query.serialize());
            assert_eq!(registrations[0].to_descriptor()?, query);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_detach_while_pending_unregisters_once_handle_is_known() {
    run_test(
        || create_test_context(),
        |ctx| {
            ctx.transport().hold_registrations();
            let query = ctx.db().collection("users")?.query();
            let subscription = ctx.db().subscribe(&query);
            let a = subscription.listen();
            wait_until(|| ctx.transport().register_count() == 1);

            drop(a);
            assert_eq!(subscription.state(), SubscriptionState::Cancelled);
            assert!(ctx.transport().unregistrations().is_empty());

            ctx.transport().release_registration();
            wait_until(|| ctx.transport().unregistrations() == vec![ListenerHandle::new(1)]);
            wait_for_state(&subscription, SubscriptionState::Closed);

            assert!(!ctx.db().registry().contains(&ListenerHandle::new(1)));
            assert!(!ctx.push(ListenerHandle::new(1), vec![user("alice", "Alice", 30)]));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_registration_failure_is_terminal_for_every_consumer() {
    run_test(
        || create_test_context(),
        |ctx| {
            ctx.transport().fail_registrations(true);
            let query = ctx.db().collection("users")?.query();
            let subscription = ctx.db().subscribe(&query);
            let mut a = subscription.listen();
            let mut b = subscription.listen();

            for stream in [&mut a, &mut b] {
                let err = ctx.next(stream).unwrap().unwrap_err();
                assert_eq!(err.kind(), &ErrorKind::RegistrationFailed);
                assert!(err.message().contains("listen rejected by server"));
                assert!(ctx.next(stream).is_none());
            }
            wait_for_state(&subscription, SubscriptionState::Closed);
            assert_eq!(subscription.handle(), None);
            assert!(ctx.db().registry().is_empty());

            // no automatic retry; a new consumer starts a new registration
            ctx.transport().fail_registrations(false);
            let _c = subscription.listen();
            wait_for_state(&subscription, SubscriptionState::Active);
            assert_eq!(ctx.transport().register_count(), 2);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_last_detach_unregisters_and_keeps_entry_until_done() {
    run_test(
        || create_test_context(),
        |ctx| {
            ctx.transport().hold_unregistrations();
            let query = ctx.db().collection("users")?.query();
            let subscription = ctx.db().subscribe(&query);
            let a = subscription.listen();
            let b = subscription.listen();
            wait_for_state(&subscription, SubscriptionState::Active);
            let handle = subscription.handle().unwrap();

            drop(a);
            assert_eq!(subscription.state(), SubscriptionState::Active);
            b.close();
            assert_eq!(subscription.state(), SubscriptionState::Cancelled);

            wait_until(|| ctx.transport().unregistrations() == vec![handle]);
            assert!(ctx.db().registry().contains(&handle));
            // in-flight events are still routed, there is just nobody listening
            assert!(ctx.push(handle, vec![user("alice", "Alice", 30)]));

            ctx.transport().release_unregistration();
            wait_for_state(&subscription, SubscriptionState::Closed);
            assert!(!ctx.db().registry().contains(&handle));
            assert!(ctx.reported_errors().is_empty());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_unregistration_failure_is_reported_and_still_closes() {
    run_test(
        || create_test_context(),
        |ctx| {
            ctx.transport().fail_unregistrations(true);
            let query = ctx.db().collection("users")?.query();
            let subscription = ctx.db().subscribe(&query);
            let a = subscription.listen();
            wait_for_state(&subscription, SubscriptionState::Active);
            let handle = subscription.handle().unwrap();

            drop(a);
            wait_for_state(&subscription, SubscriptionState::Closed);
            wait_until(|| ctx.reported_errors().len() == 1);

            let reported = ctx.reported_errors();
            assert_eq!(reported[0].kind(), &ErrorKind::UnregistrationFailed);
            assert!(reported[0].message().contains("unknown listener"));
            assert!(!ctx.push(handle, vec![user("alice", "Alice", 30)]));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_attach_while_cancelled_registers_again_after_release() {
    run_test(
        || create_test_context(),
        |ctx| {
            ctx.transport().hold_unregistrations();
            let query = ctx.db().collection("users")?.query();
            let subscription = ctx.db().subscribe(&query);
            let a = subscription.listen();
            wait_for_state(&subscription, SubscriptionState::Active);
            let first = subscription.handle().unwrap();

            drop(a);
            let mut b = subscription.listen();
            assert_eq!(subscription.state(), SubscriptionState::Cancelled);
            assert_eq!(ctx.transport().register_count(), 1);

            ctx.transport().release_unregistration();
            wait_for_state(&subscription, SubscriptionState::Active);
            let second = subscription.handle().unwrap();
            assert_ne!(first, second);
            assert_eq!(ctx.transport().register_count(), 2);

            assert!(!ctx.push(first, vec![user("alice", "Alice", 30)]));
            assert!(ctx.push(second, vec![user("bob", "Bob", 40)]));
            let snapshot = ctx.next(&mut b).unwrap()?;
            assert_eq!(snapshot.documents()[0].id(), "bob");
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_reattach_after_close_restarts_cycle() {
    run_test(
        || create_test_context(),
        |ctx| {
            let query = ctx.db().collection("users")?.query();
            let subscription = ctx.db().subscribe(&query);
            drop(subscription.listen());
            wait_for_state(&subscription, SubscriptionState::Closed);

            let mut stream = subscription.listen();
            wait_for_state(&subscription, SubscriptionState::Active);
            assert_eq!(ctx.transport().register_count(), 2);

            let handle = subscription.handle().unwrap();
            ctx.push(handle, vec![user("carol", "Carol", 22)]);
            assert_eq!(ctx.next(&mut stream).unwrap()?.documents()[0].id(), "carol");
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_subscriptions_are_routed_independently() {
    run_test(
        || create_test_context(),
        |ctx| {
            let adults = ctx.db().collection("users")?.query().filter(field("age").gte(18))?;
            let minors = ctx.db().collection("users")?.query().filter(field("age").lt(18))?;
            let adult_sub = ctx.db().subscribe(&adults);
            let minor_sub = ctx.db().subscribe(&minors);
            let mut adult_stream = adult_sub.listen();
            let mut minor_stream = minor_sub.listen();
            wait_for_state(&adult_sub, SubscriptionState::Active);
            wait_for_state(&minor_sub, SubscriptionState::Active);

            let adult_handle = adult_sub.handle().unwrap();
            let minor_handle = minor_sub.handle().unwrap();
            assert_ne!(adult_handle, minor_handle);

            ctx.push(minor_handle, vec![user("tim", "Tim", 12)]);
            ctx.push(adult_handle, vec![user("alice", "Alice", 30)]);

            assert_eq!(ctx.next(&mut adult_stream).unwrap()?.documents()[0].id(), "alice");
            assert_eq!(ctx.next(&mut minor_stream).unwrap()?.documents()[0].id(), "tim");
            assert!(ctx.is_quiet(&mut adult_stream, Duration::from_millis(200)));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_malformed_event_is_not_terminal() {
    run_test(
        || create_test_context(),
        |ctx| {
            let query = ctx.db().collection("users")?.query();
            let subscription = ctx.db().subscribe(&query);
            let mut stream = subscription.listen();
            wait_for_state(&subscription, SubscriptionState::Active);
            let handle = subscription.handle().unwrap();

            ctx.push(handle, vec![DocumentRecord::new("users/alice/posts", None)]);
            ctx.push(handle, vec![user("alice", "Alice", 30)]);

            let err = ctx.next(&mut stream).unwrap().unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::InvalidPath);
            assert!(ctx.next(&mut stream).unwrap().is_ok());
            assert_eq!(subscription.state(), SubscriptionState::Active);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_disconnect_ends_live_streams() {
    run_test(
        || create_test_context(),
        |ctx| {
            let query = ctx.db().collection("users")?.query();
            let subscription = ctx.db().subscribe(&query);
            let mut stream = subscription.listen();
            wait_for_state(&subscription, SubscriptionState::Active);

            ctx.db().disconnect();
            let err = ctx.next(&mut stream).unwrap().unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::ConnectionClosed);
            assert!(ctx.next(&mut stream).is_none());

            drop(stream);
            wait_for_state(&subscription, SubscriptionState::Closed);

            // registering on a closed connection is refused and released
            let late = ctx.db().subscribe(&query);
            let mut late_stream = late.listen();
            let err = ctx.next(&mut late_stream).unwrap().unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::ConnectionClosed);
            wait_for_state(&late, SubscriptionState::Closed);
            assert_eq!(ctx.transport().unregistrations().len(), 2);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_handle_assigned_after_detach_never_routes() {
    run_test(
        || create_test_context(),
        |ctx| {
            ctx.transport().hold_registrations();
            ctx.transport().hold_unregistrations();
            let query = ctx.db().collection("users")?.query();
            let subscription = ctx.db().subscribe(&query);
            let a = subscription.listen();
            wait_until(|| ctx.transport().register_count() == 1);
            drop(a);

            ctx.transport().release_registration();
            wait_until(|| ctx.transport().unregistrations() == vec![ListenerHandle::new(1)]);

            // the handle is known but its unregistration has not returned yet
            for _ in 0..10 {
                assert_eq!(subscription.state(), SubscriptionState::Cancelled);
                assert!(!ctx.db().registry().contains(&ListenerHandle::new(1)));
                std::thread::sleep(Duration::from_millis(10));
            }
            assert_eq!(subscription.handle(), Some(ListenerHandle::new(1)));
            assert!(!ctx.push(ListenerHandle::new(1), vec![user("alice", "Alice", 30)]));

            ctx.transport().release_unregistration();
            wait_for_state(&subscription, SubscriptionState::Closed);
            assert!(ctx.db().registry().is_empty());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_reused_handle_keeps_newer_subscription_routed() {
    run_test(
        || create_test_context(),
        |ctx| {
            ctx.transport().reuse_handles(true);
            ctx.transport().hold_unregistrations();

            let users = ctx.db().subscribe(&ctx.db().collection("users")?.query());
            let a = users.listen();
            wait_for_state(&users, SubscriptionState::Active);
            let handle = users.handle().unwrap();

            drop(a);
            wait_until(|| ctx.transport().unregistrations() == vec![handle]);
            assert_eq!(users.state(), SubscriptionState::Cancelled);

            let adults = ctx
                .db()
                .collection("users")?
                .query()
                .filter(field("age").gte(18))?;
            let adults = ctx.db().subscribe(&adults);
            let mut b = adults.listen();
            wait_for_state(&adults, SubscriptionState::Active);
            assert_eq!(adults.handle(), Some(handle));

            // the first subscription finishes releasing the same handle
            ctx.transport().release_unregistration();
            wait_for_state(&users, SubscriptionState::Closed);

            assert!(ctx.db().registry().contains(&handle));
            assert!(ctx.push(handle, vec![user("alice", "Alice", 30)]));
            assert_eq!(ctx.next(&mut b).unwrap()?.len(), 1);
            assert_eq!(adults.state(), SubscriptionState::Active);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
