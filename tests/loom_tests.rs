//! Loom-based exploration of the writer/disposal race.
//!
//! Run with: `cargo test --features loom --test loom_tests --release`
//!
//! The tri-state disposal counter protocol is tested in isolation with a
//! simplified model, keeping the state space small enough for loom's
//! exhaustive interleaving search. The model mirrors `RingWriter::step` /
//! `dispose` exactly: CAS 0 -> 1 to enter a step, CAS 1 -> 0 to leave,
//! fetch_sub(2) to dispose; the final publish goes to whichever side loses
//! its race.

#![cfg(feature = "loom")]

use loom::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};
use loom::sync::Arc;
use loom::thread;

struct DisposeModel {
    counter: AtomicIsize,
    /// `mark_ready` calls on the slot that is current when disposal lands.
    final_publishes: AtomicUsize,
    /// Steps that got past the entry CAS.
    steps_entered: AtomicUsize,
}

impl DisposeModel {
    fn new() -> Self {
        Self {
            counter: AtomicIsize::new(0),
            final_publishes: AtomicUsize::new(0),
            steps_entered: AtomicUsize::new(0),
        }
    }

    /// The step skeleton: entry CAS, (payload work elided), exit CAS.
    fn step(&self) -> bool {
        if self
            .counter
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.steps_entered.fetch_add(1, Ordering::SeqCst);
        if self
            .counter
            .compare_exchange(1, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // disposal landed mid-step: the step owns the final publish
            self.final_publishes.fetch_add(1, Ordering::SeqCst);
        }
        true
    }

    fn dispose(&self) {
        if self.counter.fetch_sub(2, Ordering::AcqRel) == 0 {
            // no step in flight: disposal owns the final publish
            self.final_publishes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// For any interleaving of one dispose with one in-flight step, the final
/// slot is published exactly once.
#[test]
fn loom_dispose_step_race_publishes_once() {
    loom::model(|| {
        let model = Arc::new(DisposeModel::new());

        let stepper = {
            let model = Arc::clone(&model);
            thread::spawn(move || model.step())
        };
        let disposer = {
            let model = Arc::clone(&model);
            thread::spawn(move || model.dispose())
        };

        stepper.join().unwrap();
        disposer.join().unwrap();

        assert_eq!(
            model.final_publishes.load(Ordering::SeqCst),
            1,
            "final publish must happen exactly once"
        );
    });
}

/// Once a disposal completed with no racing step, a subsequent step refuses
/// without entering.
#[test]
fn loom_no_step_after_dispose() {
    loom::model(|| {
        let model = Arc::new(DisposeModel::new());

        let disposer = {
            let model = Arc::clone(&model);
            thread::spawn(move || model.dispose())
        };
        disposer.join().unwrap();

        let entered_before = model.steps_entered.load(Ordering::SeqCst);
        assert!(!model.step(), "post-dispose step must refuse");
        assert_eq!(model.steps_entered.load(Ordering::SeqCst), entered_before);
    });
}

/// Concurrent disposals are idempotent: only the first publishes.
#[test]
fn loom_dispose_idempotent() {
    loom::model(|| {
        let model = Arc::new(DisposeModel::new());

        let a = {
            let model = Arc::clone(&model);
            thread::spawn(move || model.dispose())
        };
        let b = {
            let model = Arc::clone(&model);
            thread::spawn(move || model.dispose())
        };
        a.join().unwrap();
        b.join().unwrap();

        assert_eq!(model.final_publishes.load(Ordering::SeqCst), 1);
    });
}
