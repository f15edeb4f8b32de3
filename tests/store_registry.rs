mod common;

use std::sync::Arc;

use universal_store::{
    EnvironmentId, LocalChannel, NoCustomEvents, StoreError, StoreOptions, StoreStatus,
};

use common::{AppEvent, Counter, CounterStore, Environment};

#[test]
fn second_create_returns_existing_instance() {
    let channel = LocalChannel::new();
    let server = Environment::local(&channel, EnvironmentId::Server);

    let first = server.leader("env1:counter", 1);
    let second: CounterStore = server
        .registry
        .create_or_reuse(StoreOptions::leader("env1:counter").with_initial_state(Counter::new(50)))
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.get_state(), Some(Counter::new(1)));
    assert_eq!(server.registry.len(), 1);
}

#[test]
fn reuse_keeps_original_role() {
    let channel = LocalChannel::new();
    let server = Environment::local(&channel, EnvironmentId::Server);

    let leader = server.leader("env1:counter", 1);
    let again = server.follower("env1:counter");

    assert!(Arc::ptr_eq(&leader, &again));
    assert!(again.actor().is_leader());
}

#[test]
fn reuse_with_another_state_type_is_a_mismatch() {
    let server = Environment::local(&LocalChannel::new(), EnvironmentId::Server);
    let _counter = server.leader("env1:counter", 1);

    let result = server
        .registry
        .create_or_reuse::<String, NoCustomEvents>(
            StoreOptions::leader("env1:counter").with_initial_state("x".to_string()),
        );

    assert!(matches!(result, Err(StoreError::TypeMismatch { ref id }) if id == "env1:counter"));
}

#[test]
fn invalid_options_are_rejected_before_registration() {
    let server = Environment::unbound(EnvironmentId::Server);

    let empty = server
        .registry
        .create_or_reuse::<Counter, AppEvent>(StoreOptions::leader("  "));
    let seeded_follower = server.registry.create_or_reuse::<Counter, AppEvent>(
        StoreOptions::follower("env1:counter").with_initial_state(Counter::new(1)),
    );

    assert!(matches!(empty, Err(StoreError::Validation { .. })));
    assert!(matches!(seeded_follower, Err(StoreError::Validation { .. })));
    assert!(server.registry.is_empty());
}

#[test]
fn stores_created_before_binding_prepare_on_bind() {
    let channel = LocalChannel::new();
    let server = Environment::unbound(EnvironmentId::Server);
    let a = server.leader("env1:a", 0);
    let b = server.leader("env1:b", 0);
    assert_eq!(a.status(), StoreStatus::Unprepared);
    assert_eq!(b.status(), StoreStatus::Unprepared);

    server.bind_local(&channel);

    assert_eq!(a.status(), StoreStatus::Ready);
    assert_eq!(b.status(), StoreStatus::Ready);
    assert_eq!(a.actor().environment, EnvironmentId::Server);
    assert_eq!(channel.listener_count("STORE:env1:a"), 1);
}

#[test]
fn lookup_by_id() {
    let server = Environment::local(&LocalChannel::new(), EnvironmentId::Server);
    let leader = server.leader("env1:counter", 2);

    let found = server
        .registry
        .get::<Counter, AppEvent>("env1:counter")
        .expect("store is registered");
    assert!(Arc::ptr_eq(&leader, &found));
    assert!(server.registry.get::<String, AppEvent>("env1:counter").is_none());
    assert!(server.registry.get::<Counter, AppEvent>("env1:other").is_none());
}

#[test]
fn dispose_of_unknown_id_returns_false() {
    let server = Environment::unbound(EnvironmentId::Server);
    assert!(!server.registry.dispose("env1:missing"));
}

#[test]
fn disposing_and_recreating_a_leader_keeps_one_live_instance() {
    let channel = LocalChannel::new();
    let server = Environment::local(&channel, EnvironmentId::Server);
    let first = server.leader("env1:counter", 1);

    assert!(server.registry.dispose("env1:counter"));
    let second = server.leader("env1:counter", 2);

    assert_eq!(channel.listener_count("STORE:env1:counter"), 1);
    assert_eq!(first.status(), StoreStatus::Error);
    assert_eq!(second.status(), StoreStatus::Ready);
    assert_eq!(second.get_state(), Some(Counter::new(2)));
}
