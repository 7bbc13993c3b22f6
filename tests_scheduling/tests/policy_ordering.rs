//! Policy Ordering Tests
//!
//! Validates ready-set selection under each ranking policy, tie-breaking,
//! and re-keying when attributes change while a thread is ready.

use sched_rt::{PolicyKind, SchedAttrs, Target};
use tests_scheduling::{drain_selection_order, engine, spawn_ready, uniform_attrs};

/// Weighted EDF: equal deadlines, weights 300/200/100 -> keys 3.33, 5, 10
#[test]
fn test_weighted_edf_ordering() {
    let engine = engine(PolicyKind::WeightedEdf, 8);
    let w100 = spawn_ready(&engine, SchedAttrs::new(1000, 100, 10));
    let w300 = spawn_ready(&engine, SchedAttrs::new(1000, 300, 10));
    let w200 = spawn_ready(&engine, SchedAttrs::new(1000, 200, 10));

    let sched = engine.scheduler();
    assert!((sched.key_of(w300).unwrap().as_f64() - 3.33).abs() < 0.01);
    assert_eq!(sched.key_of(w200).unwrap().as_f64(), 5.0);
    assert_eq!(sched.key_of(w100).unwrap().as_f64(), 10.0);

    assert_eq!(drain_selection_order(&engine), vec![w300, w200, w100]);
}

/// WSRT: time_left 100, weights 300/200/100 -> keys 0.33, 0.5, 1.0
#[test]
fn test_wsrt_ordering() {
    let engine = engine(PolicyKind::Wsrt, 8);
    let attrs = |weight| SchedAttrs::new(0, weight, 100);
    let w200 = spawn_ready(&engine, attrs(200));
    let w100 = spawn_ready(&engine, attrs(100));
    let w300 = spawn_ready(&engine, attrs(300));

    assert_eq!(engine.scheduler().key_of(w200).unwrap().as_f64(), 0.5);
    assert_eq!(drain_selection_order(&engine), vec![w300, w200, w100]);
}

#[test]
fn test_rekey_on_weight_change() {
    let engine = engine(PolicyKind::WeightedEdf, 8);
    let a = spawn_ready(&engine, SchedAttrs::new(1000, 1, 10));
    let b = spawn_ready(&engine, SchedAttrs::new(1000, 2, 10));
    assert_eq!(engine.scheduler().select_next(), Some(b));

    engine.scheduler().set_weight(a, 10).unwrap();
    assert_eq!(engine.scheduler().select_next(), Some(a));
    assert_eq!(engine.scheduler().key_of(a).unwrap().as_f64(), 100.0);
}

#[test]
fn test_rekey_on_every_mutator() {
    let engine = engine(PolicyKind::Wsrt, 8);
    let a = spawn_ready(&engine, SchedAttrs::new(0, 1, 50));
    let b = spawn_ready(&engine, SchedAttrs::new(0, 1, 40));
    let sched = engine.scheduler();
    assert_eq!(sched.select_next(), Some(b));

    sched.set_time_left(a, 10).unwrap();
    assert_eq!(sched.select_next(), Some(a));

    sched.set_exec_time(b, 5).unwrap();
    sched.set_deadline(b, 10).unwrap();
    assert_eq!(sched.get_time_left(b), Ok(5));
    assert_eq!(sched.select_next(), Some(b));

    sched.charge(a, 8).unwrap();
    assert_eq!(sched.select_next(), Some(a));
}

#[test]
fn test_zero_weight_normalised() {
    let engine = engine(PolicyKind::WeightedEdf, 4);
    let id = engine.spawn(SchedAttrs::new(100, 0, 10)).unwrap();
    assert_eq!(engine.scheduler().get_weight(id), Ok(1));

    engine.scheduler().set_weight(id, 7).unwrap();
    engine.scheduler().set_weight(id, 0).unwrap();
    assert_eq!(engine.scheduler().get_weight(id), Ok(1));
}

/// Equal keys go to whoever became ready first, under every policy
#[test]
fn test_tie_break_fifo_all_policies() {
    for policy in PolicyKind::ALL {
        for _ in 0..5 {
            let engine = engine(policy, 8);
            let ids: Vec<_> = (0..6).map(|_| engine.spawn(uniform_attrs()).unwrap()).collect();
            // Ready in reverse spawn order so slot order and ready order differ.
            for (now, id) in ids.iter().rev().enumerate() {
                engine.make_ready(*id, now as u64).unwrap();
            }
            let expected: Vec<_> = ids.iter().rev().copied().collect();
            assert_eq!(drain_selection_order(&engine), expected, "policy {}", policy);
        }
    }
}

#[test]
fn test_select_next_is_peek() {
    let engine = engine(PolicyKind::Edf, 4);
    let a = spawn_ready(&engine, SchedAttrs::new(50, 1, 1));
    let sched = engine.scheduler();
    assert_eq!(sched.select_next(), Some(a));
    assert_eq!(sched.select_next(), Some(a));
    assert_eq!(sched.lock().ready_len(), 1);
}

#[test]
fn test_rms_ranks_by_exec_time() {
    let engine = engine(PolicyKind::Rms, 4);
    let long = spawn_ready(&engine, SchedAttrs::new(10, 1, 40));
    let short = spawn_ready(&engine, SchedAttrs::new(1000, 1, 5));
    assert_eq!(drain_selection_order(&engine), vec![short, long]);
}

#[test]
fn test_llf_prefers_least_laxity() {
    let engine = engine(PolicyKind::Llf, 4);
    let relaxed = spawn_ready(&engine, SchedAttrs::new(300, 1, 200));
    let urgent = spawn_ready(&engine, SchedAttrs::new(100, 1, 95));
    let normal = spawn_ready(&engine, SchedAttrs::new(200, 1, 150));

    let sched = engine.scheduler();
    assert_eq!(sched.lock().laxity(urgent.into(), 0), Ok(5));
    assert_eq!(sched.lock().laxity(urgent.into(), 20), Ok(-15));
    assert_eq!(drain_selection_order(&engine), vec![urgent, normal, relaxed]);
}

#[test]
fn test_pfs_favours_less_virtual_runtime() {
    let engine = engine(PolicyKind::Pfs, 4);
    let heavy = spawn_ready(&engine, SchedAttrs::new(0, 4, 100));
    let light = spawn_ready(&engine, SchedAttrs::new(0, 1, 100));
    let sched = engine.scheduler();

    // Equal virtual runtime: earlier-ready wins.
    assert_eq!(sched.select_next(), Some(heavy));

    sched.charge(heavy, 40).unwrap();
    sched.charge(light, 20).unwrap();
    // heavy: 40/4 = 10, light: 20/1 = 20
    assert_eq!(sched.select_next(), Some(heavy));

    sched.charge(heavy, 60).unwrap();
    // heavy: 100/4 = 25
    assert_eq!(sched.select_next(), Some(light));
}

#[test]
fn test_equal_keys_do_not_preempt() {
    let engine = engine(PolicyKind::Edf, 4);
    let running = spawn_ready(&engine, SchedAttrs::new(100, 1, 10));
    engine.dispatch_next(0).unwrap();
    spawn_ready(&engine, SchedAttrs::new(100, 1, 10));

    assert!(!engine.should_preempt());
    assert_eq!(engine.scheduler().current(), Some(running));

    let earlier = spawn_ready(&engine, SchedAttrs::new(99, 1, 10));
    assert!(engine.should_preempt());
    let dispatch = engine.dispatch_next(1).unwrap().unwrap();
    assert_eq!(dispatch.next, earlier);
    assert_eq!(dispatch.previous, Some(running));
}

#[test]
fn test_current_target_sentinel() {
    let engine = engine(PolicyKind::Edf, 4);
    let id = spawn_ready(&engine, SchedAttrs::new(100, 3, 10));
    assert!(engine.scheduler().get_weight(Target::Current).is_err());

    engine.dispatch(id, 0).unwrap();
    engine.scheduler().set_weight(Target::Current, 9).unwrap();
    assert_eq!(engine.scheduler().get_weight(id), Ok(9));
}

#[test]
fn test_deadline_never_moves_backwards() {
    let engine = engine(PolicyKind::Edf, 4);
    let id = engine.spawn(SchedAttrs::new(0, 1, 10)).unwrap();
    assert_eq!(engine.release(id, 100, 0), Ok(100));
    assert_eq!(engine.release(id, 10, 20), Ok(100));
    assert_eq!(engine.release(id, 100, 50), Ok(150));
}
