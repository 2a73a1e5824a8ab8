// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

// Supervision directives applied across an actor tree.

mod common;

use actor::{
    spawn, ActorConfig, Directive, Error, Fault, SupervisionContext,
};
use common::*;

#[tokio::test]
async fn test_resume_keeps_state() {
    let system = system("supervision-resume");
    let tally = counter(&system, "tally", Directive::Resume);

    tally.dispatch(Tally::Add(2)).unwrap();
    tally.dispatch(Tally::Fail).unwrap();
    tally.dispatch(Tally::Add(3)).unwrap();

    assert_eq!(total(&tally).await, Ok(5));
    system.stop();
}

#[tokio::test]
async fn test_reset_restores_initial_state_and_stops_children() {
    let system = system("supervision-reset");
    let parent = counter(&system, "parent", Directive::Reset);
    let kid = child(&parent, "kid", Directive::Stop).await;

    parent.dispatch(Tally::Add(4)).unwrap();
    parent.dispatch(Tally::Fail).unwrap();

    assert_eq!(total(&parent).await, Ok(0));
    assert!(eventually(|| !kid.is_alive()).await);
    assert!(parent.is_alive());
    system.stop();
}

#[tokio::test]
async fn test_stop_cascades_to_descendants() {
    let system = system("supervision-cascade");
    let parent = counter(&system, "parent", Directive::Stop);
    let kid = child(&parent, "kid", Directive::Stop).await;
    let grandkid = child(&kid, "grandkid", Directive::Stop).await;

    parent.stop();

    assert!(eventually(|| !grandkid.is_alive()).await);
    assert!(!kid.is_alive());
    assert!(!parent.is_alive());
    assert!(parent.dispatch(Tally::Add(1)).is_err());
    assert!(system.children().is_empty());
    system.stop();
}

#[tokio::test]
async fn test_default_policy_stops_on_failure() {
    let system = system("supervision-default");
    let tally = spawn(&system, Counter, ActorConfig::named("tally")).unwrap();
    let kid = child(&tally, "kid", Directive::Stop).await;

    tally.dispatch(Tally::Fail).unwrap();

    assert!(eventually(|| !tally.is_alive()).await);
    assert!(!kid.is_alive());
    assert!(!system.is_stopped());
    system.stop();
}

#[tokio::test]
async fn test_escalation_past_top_level_stops_only_the_actor() {
    let system = system("supervision-root");
    let rogue = counter(&system, "rogue", Directive::Escalate);
    let bystander = counter(&system, "bystander", Directive::Stop);

    rogue.dispatch(Tally::Fail).unwrap();

    assert!(eventually(|| !rogue.is_alive()).await);
    assert!(bystander.is_alive());
    assert!(!system.is_stopped());
    assert_eq!(total(&bystander).await, Ok(0));
    system.stop();
}

#[tokio::test]
async fn test_stop_child_from_parent_policy() {
    let system = system("supervision-stop-child");
    let parent = counter(&system, "parent", Directive::StopChild);
    let faulty = child(&parent, "faulty", Directive::Escalate).await;
    let healthy = child(&parent, "healthy", Directive::Escalate).await;

    parent.dispatch(Tally::Add(1)).unwrap();
    faulty.dispatch(Tally::Fail).unwrap();

    assert!(eventually(|| !faulty.is_alive()).await);
    assert!(healthy.is_alive());
    assert_eq!(total(&parent).await, Ok(1));
    system.stop();
}

#[tokio::test]
async fn test_reset_child_from_parent_policy() {
    let system = system("supervision-reset-child");
    let parent = counter(&system, "parent", Directive::ResetChild);
    let faulty = child(&parent, "faulty", Directive::Escalate).await;

    faulty.dispatch(Tally::Add(7)).unwrap();
    assert_eq!(total(&faulty).await, Ok(7));
    faulty.dispatch(Tally::Fail).unwrap();

    assert!(settles(&faulty, 0).await);
    assert!(faulty.is_alive());
    system.stop();
}

#[tokio::test]
async fn test_escalation_through_two_levels() {
    let system = system("supervision-two-levels");
    let top = counter(&system, "top", Directive::StopChild);
    let middle = child(&top, "middle", Directive::Escalate).await;
    let bottom = child(&middle, "bottom", Directive::Escalate).await;

    bottom.dispatch(Tally::Fail).unwrap();

    // `middle` escalates the fault of `bottom` as its own, `top` stops `middle`.
    assert!(eventually(|| !middle.is_alive()).await);
    assert!(!bottom.is_alive());
    assert!(top.is_alive());
    system.stop();
}

#[tokio::test]
async fn test_resume_for_child_fault_leaves_child_suspended() {
    let system = system("supervision-suspended");
    let parent = counter(&system, "parent", Directive::Resume);
    let faulty = child(&parent, "faulty", Directive::Escalate).await;

    faulty.dispatch(Tally::Fail).unwrap();

    let result = faulty
        .query(Tally::Get, std::time::Duration::from_millis(100))
        .await;
    assert!(matches!(result, Err(Error::QueryTimeout(_))));
    assert!(faulty.is_alive());
    assert_eq!(total(&parent).await, Ok(0));
    system.stop();
}

#[tokio::test]
async fn test_stop_all_stops_siblings() {
    let system = system("supervision-stop-all");
    let first = counter(&system, "first", Directive::StopAll);
    let second = counter(&system, "second", Directive::Stop);
    let third = counter(&system, "third", Directive::Stop);

    first.dispatch(Tally::Fail).unwrap();

    assert!(eventually(|| !first.is_alive()).await);
    assert!(eventually(|| !second.is_alive() && !third.is_alive()).await);
    assert!(!system.is_stopped());
    system.stop();
}

#[tokio::test]
async fn test_reset_all_resets_siblings() {
    let system = system("supervision-reset-all");
    let parent = counter(&system, "parent", Directive::Stop);
    let first = child(&parent, "first", Directive::ResetAll).await;
    let second = child(&parent, "second", Directive::Stop).await;

    first.dispatch(Tally::Add(5)).unwrap();
    second.dispatch(Tally::Add(5)).unwrap();
    assert_eq!(total(&first).await, Ok(5));
    assert_eq!(total(&second).await, Ok(5));

    first.dispatch(Tally::Fail).unwrap();

    assert!(settles(&first, 0).await);
    assert!(settles(&second, 0).await);
    assert!(parent.is_alive());
    system.stop();
}

#[tokio::test]
async fn test_stop_all_children_on_own_fault() {
    let system = system("supervision-stop-children");
    let parent = counter(&system, "parent", Directive::StopAllChildren);
    let first = child(&parent, "first", Directive::Stop).await;
    let second = child(&parent, "second", Directive::Stop).await;

    parent.dispatch(Tally::Add(9)).unwrap();
    parent.dispatch(Tally::Fail).unwrap();

    assert_eq!(total(&parent).await, Ok(9));
    assert!(eventually(|| !first.is_alive() && !second.is_alive()).await);
    system.stop();
}

#[tokio::test]
async fn test_reset_all_children_on_own_fault() {
    let system = system("supervision-reset-children");
    let parent = counter(&system, "parent", Directive::ResetAllChildren);
    let kid = child(&parent, "kid", Directive::Stop).await;

    parent.dispatch(Tally::Add(2)).unwrap();
    kid.dispatch(Tally::Add(3)).unwrap();
    assert_eq!(total(&kid).await, Ok(3));

    parent.dispatch(Tally::Fail).unwrap();

    assert!(settles(&kid, 0).await);
    assert_eq!(total(&parent).await, Ok(2));
    system.stop();
}

#[tokio::test]
async fn test_stop_child_without_faulted_child_stops_actor() {
    let system = system("supervision-assertion");
    let confused = counter(&system, "confused", Directive::StopChild);

    confused.dispatch(Tally::Fail).unwrap();

    assert!(eventually(|| !confused.is_alive()).await);
    system.stop();
}

#[tokio::test]
async fn test_closure_policy_sees_the_failed_message() {
    let system = system("supervision-closure");
    let policy = |fault: &Fault, _ctx: &SupervisionContext<Tally>| {
        match fault.message::<Tally>() {
            Some(Tally::Fail) => Directive::Resume,
            _ => Directive::Stop,
        }
    };
    let tally =
        spawn(&system, Counter, ActorConfig::named("tally").on_crash(policy))
            .unwrap();

    tally.dispatch(Tally::Add(1)).unwrap();
    tally.dispatch(Tally::Fail).unwrap();

    assert_eq!(total(&tally).await, Ok(1));
    system.stop();
}
