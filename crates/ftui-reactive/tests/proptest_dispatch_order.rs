//! Property-based ordering tests for the dispatcher.
//!
//! 1. Tasks run in posting order, including tasks posted by running tasks.
//! 2. A budgeted drain runs a prefix of the queue and leaves the rest in order.
//! 3. Nothing runs until the host drains.

use std::cell::RefCell;
use std::rc::Rc;

use ftui_reactive::{Dispatcher, DispatcherConfig};
use proptest::prelude::*;

/// Post `ids` as tasks that log themselves; each task with a `child` posts
/// one more task when it runs.
fn post_all(dispatcher: &Dispatcher, log: &Rc<RefCell<Vec<u32>>>, ids: &[(u32, Option<u32>)]) {
    for &(id, child) in ids {
        let log = Rc::clone(log);
        let inner = dispatcher.clone();
        dispatcher.post(move || {
            log.borrow_mut().push(id);
            if let Some(child) = child {
                let log = Rc::clone(&log);
                inner.post(move || log.borrow_mut().push(child));
            }
        });
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]
    #[test]
    fn tasks_run_in_posting_order(
        ids in prop::collection::vec((0u32..1000, prop::option::of(1000u32..2000)), 0..40),
    ) {
        let dispatcher = Dispatcher::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        post_all(&dispatcher, &log, &ids);
        prop_assert!(log.borrow().is_empty());

        dispatcher.drain();

        let mut expected: Vec<u32> = ids.iter().map(|(id, _)| *id).collect();
        expected.extend(ids.iter().filter_map(|(_, child)| *child));
        prop_assert_eq!(&*log.borrow(), &expected);
        prop_assert!(dispatcher.is_idle());
    }

    #[test]
    fn budgeted_drain_runs_a_prefix(
        count in 0usize..40,
        budget in 1usize..10,
    ) {
        let dispatcher =
            Dispatcher::with_config(DispatcherConfig::default().with_max_tasks_per_drain(budget));
        let log = Rc::new(RefCell::new(Vec::new()));
        let ids: Vec<(u32, Option<u32>)> = (0..count as u32).map(|i| (i, None)).collect();
        post_all(&dispatcher, &log, &ids);

        let ran = dispatcher.drain();

        prop_assert_eq!(ran, count.min(budget));
        prop_assert_eq!(dispatcher.pending(), count - ran);
        let expected: Vec<u32> = (0..ran as u32).collect();
        prop_assert_eq!(&*log.borrow(), &expected);

        while dispatcher.drain() > 0 {}
        let all: Vec<u32> = (0..count as u32).collect();
        prop_assert_eq!(&*log.borrow(), &all);
    }
}
