#[cfg(test)]
mod tests {
    use deferred::{Deferred, Resolve, Status};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Stand-in for a timer: callbacks run only when the test drives it.
    #[derive(Default, Clone)]
    struct Later {
        queue: Rc<RefCell<VecDeque<Box<dyn FnOnce()>>>>,
    }

    impl Later {
        fn schedule(&self, task: impl FnOnce() + 'static) {
            self.queue.borrow_mut().push_back(Box::new(task));
        }

        fn run(&self) {
            loop {
                let task = self.queue.borrow_mut().pop_front();
                match task {
                    Some(task) => task(),
                    None => break,
                }
            }
        }
    }

    type Log = Rc<RefCell<Vec<String>>>;

    fn push(log: &Log, tag: &'static str) -> impl FnOnce(&String) + 'static {
        let log = log.clone();
        move |v: &String| log.borrow_mut().push(format!("{tag} {v}"))
    }

    #[test]
    fn test_resolve_then_reject_keeps_resolve() {
        let log: Log = Default::default();
        let d = Deferred::<String, String>::new(|resolve, reject| {
            resolve.resolve("resolve data".into());
            reject.reject("reject reason".into());
            Ok(())
        });
        d.observe(push(&log, "success"), push(&log, "failed"));
        assert_eq!(*log.borrow(), vec!["success resolve data"]);
    }

    #[test]
    fn test_scheduled_resolve_fires_after_later_runs() {
        let later = Later::default();
        let timer = later.clone();
        let log: Log = Default::default();
        let d = Deferred::<String, String>::new(move |resolve, _| {
            timer.schedule(move || resolve.resolve("async data".into()));
            Ok(())
        });
        d.observe(push(&log, "success"), push(&log, "failed"));
        assert_eq!(d.status(), Status::Unsettled);
        assert!(log.borrow().is_empty());

        later.run();
        assert_eq!(*log.borrow(), vec!["success async data"]);
    }

    #[test]
    fn test_scheduled_number_resolves_once() {
        let later = Later::default();
        let timer = later.clone();
        let hits = Rc::new(RefCell::new(vec![]));
        let d = Deferred::<i32, ()>::new(move |resolve, _| {
            let again = resolve.clone();
            timer.schedule(move || resolve.resolve(42));
            timer.schedule(move || again.resolve(43));
            Ok(())
        });
        let sink = hits.clone();
        d.observe(move |v| sink.borrow_mut().push(*v), |_| panic!("failed"));
        later.run();
        assert_eq!(*hits.borrow(), vec![42]);
        assert_eq!(d.value().as_deref(), Some(&42));
    }

    #[test]
    fn test_two_observer_pairs_on_failure() {
        let later = Later::default();
        let timer = later.clone();
        let log: Log = Default::default();
        let d = Deferred::<String, String>::new(move |_, reject| {
            timer.schedule(move || reject.reject("E".into()));
            Ok(())
        });
        d.observe(push(&log, "ok-1"), push(&log, "err-1"));
        d.observe(push(&log, "ok-2"), push(&log, "err-2"));
        later.run();
        assert_eq!(*log.borrow(), vec!["err-1 E", "err-2 E"]);
        assert_eq!(d.status(), Status::Failed);
    }

    #[test]
    fn test_observe_when_settled_is_synchronous() {
        let d = Deferred::<String, String>::new(|resolve, _| {
            resolve.resolve("V".into());
            Ok(())
        });
        let log: Log = Default::default();
        d.observe(push(&log, "ok"), push(&log, "err"));
        // Already recorded by the time observe returns.
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_executor_error_carries_real_reason() {
        #[derive(Debug, PartialEq)]
        struct Boom(&'static str);

        let d = Deferred::<(), Boom>::new(|_, _| Err(Boom("from executor")));
        assert_eq!(d.status(), Status::Failed);
        assert_eq!(d.reason().as_deref(), Some(&Boom("from executor")));

        let seen = Rc::new(RefCell::new(None));
        let sink = seen.clone();
        d.observe(|_| panic!("succeeded"), move |e: &Boom| *sink.borrow_mut() = Some(e.0));
        assert_eq!(*seen.borrow(), Some("from executor"));
    }

    #[test]
    fn test_resolver_kept_past_settlement_is_inert() {
        let kept: Rc<RefCell<Option<Resolve<u8, u8>>>> = Default::default();
        let slot = kept.clone();
        let d = Deferred::<u8, u8>::new(move |resolve, reject| {
            *slot.borrow_mut() = Some(resolve);
            reject.reject(1);
            Ok(())
        });
        kept.borrow().as_ref().unwrap().resolve(2);
        assert_eq!(d.status(), Status::Failed);
        assert_eq!(d.reason().as_deref(), Some(&1));
        assert!(d.value().is_none());
    }
}
