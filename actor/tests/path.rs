// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

// Actor path parsing and relations.

use actor::{is_valid_name, ActorPath, Error};

use std::{collections::HashSet, sync::Arc, thread};

fn path(s: &str) -> ActorPath {
    s.parse().unwrap()
}

#[test]
fn test_display_round_trip() {
    for text in ["shop://", "shop://orders", "shop://orders/eu/item-7"] {
        assert_eq!(path(text).to_string(), text);
    }
}

#[test]
fn test_child_chain_matches_parsed_path() {
    let built = ActorPath::root("shop")
        .and_then(|root| root.child("orders"))
        .and_then(|orders| orders.child("eu"))
        .unwrap();

    assert_eq!(built, path("shop://orders/eu"));
    assert_eq!(built.level(), 2);
    assert_eq!(built.key(), "eu");
    assert_eq!(built.parent().parent(), path("shop://"));
}

#[test]
fn test_relations() {
    let orders = path("shop://orders");
    let eu = path("shop://orders/eu");
    let item = path("shop://orders/eu/item");
    let stock = path("shop://stock");

    assert!(orders.is_parent_of(&eu));
    assert!(!orders.is_parent_of(&item));
    assert!(orders.is_ancestor_of(&item));
    assert!(item.is_descendant_of(&orders));
    assert!(eu.is_child_of(&orders));
    assert!(!stock.is_ancestor_of(&eu));
    assert!(!orders.is_ancestor_of(&orders));
    assert!(orders.is_top_level());
    assert!(!eu.is_top_level());
}

#[test]
fn test_rejected_names() {
    let root = ActorPath::root("shop").unwrap();

    for name in ["", "has space", "a/b", "ünïcode", "tab\t"] {
        assert!(!is_valid_name(name), "{name:?} should be invalid");
        assert!(matches!(root.child(name), Err(Error::InvalidName(_))));
    }
    assert!(is_valid_name("order_42-eu.v2"));
    assert!("shop:/orders".parse::<ActorPath>().is_err());
    assert!("://orders".parse::<ActorPath>().is_err());
}

#[test]
fn test_paths_built_across_threads() {
    let root = Arc::new(ActorPath::root("shop").unwrap());
    let handles: Vec<_> = (0..8)
        .map(|n| {
            let root = root.clone();
            thread::spawn(move || {
                let child = root.child(&format!("worker-{n}")).unwrap();
                child.to_string()
            })
        })
        .collect();

    let names: HashSet<String> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(names.len(), 8);
    assert!(names.iter().all(|name| path(name).is_child_of(&root)));
}
