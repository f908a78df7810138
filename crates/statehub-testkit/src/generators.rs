//! Proptest generators for property-based testing.

use std::net::{Ipv4Addr, Ipv6Addr};

use proptest::prelude::*;

use statehub_core::{Action, BOOKKEEPING_PREFIX, REPLACE_STATE_TYPE};

/// Generate a user action for [`CounterReducer`](crate::CounterReducer).
pub fn counter_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        Just(Action::new("INCREMENT")),
        Just(Action::new("DECREMENT")),
        (-100i64..=100).prop_map(|n| Action::new("ADD").with_payload(n)),
    ]
}

/// Generate a sequence of counter actions.
pub fn action_sequence(max_len: usize) -> impl Strategy<Value = Vec<Action>> {
    prop::collection::vec(counter_action(), 0..=max_len)
}

/// Generate an action type a Leaf is allowed to forward.
pub fn user_action_kind() -> impl Strategy<Value = String> {
    "[A-Z][A-Z_]{0,23}"
        .prop_filter("reserved action type", |kind| {
            kind != REPLACE_STATE_TYPE && !kind.starts_with(BOOKKEEPING_PREFIX)
        })
}

/// Generate an arbitrary user action with a small string payload.
pub fn user_action() -> impl Strategy<Value = Action> {
    (user_action_kind(), "[a-z0-9]{0,12}")
        .prop_map(|(kind, payload)| Action::new(kind).with_payload(payload))
}

/// Generate an IPv4 origin address.
pub fn ipv4_address() -> impl Strategy<Value = String> {
    any::<[u8; 4]>().prop_map(|octets| Ipv4Addr::from(octets).to_string())
}

/// Generate an IPv6 origin address.
pub fn ipv6_address() -> impl Strategy<Value = String> {
    any::<[u16; 8]>().prop_map(|segments| {
        let [a, b, c, d, e, f, g, h] = segments;
        Ipv6Addr::new(a, b, c, d, e, f, g, h).to_string()
    })
}

/// Generate an origin address of either family.
pub fn origin_address() -> impl Strategy<Value = String> {
    prop_oneof![ipv4_address(), ipv6_address()]
}

/// Generate a login.
pub fn login() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}".prop_map(String::from)
}

/// Generate a non-empty password.
pub fn password() -> impl Strategy<Value = String> {
    "[ -~]{1,32}".prop_map(String::from)
}
