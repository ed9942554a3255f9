//! # Scheduler
//!
//! Groups nodes by `(tree, depth)` and runs one depth at a time. Every node
//! of a dispatched level is prepped and run on a bounded set of worker
//! threads; the call returns only once all of them are done, which is the
//! barrier between a level and the children it spawned.
//!
//! The level registry is the only shared mutable state. Nodes register into
//! it through [`Scheduler::schedule`] while other nodes of the same level are
//! still running, so registration takes the registry lock briefly and
//! nothing else does. Node work happens outside the lock.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use crossbeam::queue::ArrayQueue;

use crate::*;

/// A node shared between its owner and the registry of the level it waits in
pub type Shared<N> = Arc<Mutex<N>>;

/// What the scheduler needs from a node.
pub trait LevelTask: Send + Sized + 'static
{
    fn depth(&self) -> Depth;

    /// Short description used in failure reports
    fn label(&self) -> String;

    /// Materialize the node's data. Always called before `run`.
    fn prep(&mut self) -> Result<()>;

    /// Process the node; children are registered through `scheduler`.
    fn run(&mut self, scheduler: &Scheduler<Self>, tree: TreeId) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LevelState
{
    Collecting,
    Full,
    Running,
    Complete,
    Failed,
}

impl LevelState
{
    fn dispatched(self) -> bool
    {
        matches!(
            self,
            LevelState::Running | LevelState::Complete | LevelState::Failed
        )
    }
}

struct Level<N>
{
    pending: Vec<Shared<N>>,
    registered: usize,
    state: LevelState,
}

impl<N> Level<N>
{
    fn new() -> Self
    {
        Level {
            pending: Vec::new(),
            registered: 0,
            state: LevelState::Collecting,
        }
    }
}

/// Summary of one dispatched level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelReport
{
    pub level: Depth,
    pub trees: usize,
    pub nodes: usize,
    pub elapsed: Duration,
}

pub struct Scheduler<N: LevelTask>
{
    fanout: usize,
    max_depth: Depth,
    workers: usize,
    levels: Mutex<HashMap<(TreeId, Depth), Level<N>>>,
}

impl<N: LevelTask> Scheduler<N>
{
    pub fn new(fanout: usize, max_depth: Depth) -> Self
    {
        Scheduler {
            fanout,
            max_depth,
            workers: 1,
            levels: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_params(params: &Params) -> Self
    {
        Self::new(params.fanout, params.max_depth)
            .with_workers(params.thread_count)
    }

    pub fn with_workers(mut self, workers: usize) -> Self
    {
        self.workers = workers.max(1);
        self
    }

    pub fn fanout(&self) -> usize
    {
        self.fanout
    }

    pub fn max_depth(&self) -> Depth
    {
        self.max_depth
    }

    pub fn workers(&self) -> usize
    {
        self.workers
    }

    /// Registrations that saturate `level` in one tree: `fanout^level`
    pub fn expected(&self, level: Depth) -> usize
    {
        self.fanout
            .checked_pow(level as u32)
            .unwrap_or(usize::MAX)
    }

    /// Add `node` to the pending list of its depth in `tree`.
    ///
    /// Safe to call from several running nodes at once. Fails once the
    /// level has been dispatched or already holds `fanout^level` nodes.
    pub fn schedule(&self, node: Shared<N>, tree: TreeId) -> Result<()>
    {
        let depth = node
            .lock()
            .map_err(|_| ForestError::poisoned("node"))?
            .depth();

        if depth > self.max_depth {
            return Err(ForestError::contract(format!(
                "node at depth {depth} exceeds maximum depth {}",
                self.max_depth
            )));
        }

        let expected = self.expected(depth);
        let mut levels = self.registry()?;
        let level = levels.entry((tree, depth)).or_insert_with(Level::new);

        if level.state.dispatched() {
            return Err(ForestError::contract(format!(
                "level {depth} of tree {tree} is {:?}, no further registrations",
                level.state
            )));
        }
        if level.registered >= expected {
            return Err(ForestError::contract(format!(
                "level {depth} of tree {tree} already holds {expected} node(s)"
            )));
        }

        level.pending.push(node);
        level.registered += 1;
        if level.registered == expected {
            level.state = LevelState::Full;
        }
        Ok(())
    }

    pub fn registered(&self, level: Depth, tree: TreeId) -> usize
    {
        self.with_level(level, tree, |l| l.registered).unwrap_or(0)
    }

    pub fn state(&self, level: Depth, tree: TreeId) -> Option<LevelState>
    {
        self.with_level(level, tree, |l| l.state)
    }

    /// Advisory while nodes of the previous level are still running
    pub fn is_full(&self, level: Depth, tree: TreeId) -> bool
    {
        self.registered(level, tree) == self.expected(level)
    }

    pub fn is_complete(&self, level: Depth, tree: TreeId) -> bool
    {
        self.state(level, tree) == Some(LevelState::Complete)
    }

    /// Trees with registrations at `level` that have not been dispatched
    pub fn pending_trees(&self, level: Depth) -> Result<Vec<TreeId>>
    {
        let levels = self.registry()?;

        let mut trees = levels
            .iter()
            .filter(|((_, depth), l)| {
                *depth == level && !l.state.dispatched() && l.registered > 0
            })
            .map(|((tree, _), _)| *tree)
            .collect::<Vec<_>>();
        trees.sort_unstable();
        Ok(trees)
    }

    /// Prep and run every node registered at `level` of `tree`, blocking
    /// until all of them finish.
    pub fn run_level(&self, level: Depth, tree: TreeId) -> Result<LevelReport>
    {
        self.run(level, &[tree])
    }

    /// Like [`Scheduler::run_level`] for every tree with nodes waiting at
    /// `level`, in a single dispatch.
    pub fn run_forest_level(&self, level: Depth) -> Result<LevelReport>
    {
        let trees = self.pending_trees(level)?;
        if trees.is_empty() {
            return Err(ForestError::contract(format!(
                "no tree has nodes waiting at level {level}"
            )));
        }
        self.run(level, &trees)
    }

    fn run(&self, level: Depth, trees: &[TreeId]) -> Result<LevelReport>
    {
        let start = Instant::now();
        let work = self.claim(level, trees)?;
        let nodes = work.len();

        let expected = self.expected(level).saturating_mul(trees.len());
        if nodes < expected {
            log::debug!(
                "Level {level}: {nodes} of {expected} nodes, the rest are leaves"
            );
        }
        log::debug!(
            "Dispatching level {level}: {nodes} node(s) from {} tree(s) on {} worker(s)",
            trees.len(),
            self.workers.min(nodes)
        );

        let outcome = self.dispatch(level, work);

        let failed = !matches!(outcome, Ok(ref failures) if failures.is_empty());
        self.finish(level, trees, failed)?;

        let failures = outcome?;
        if !failures.is_empty() {
            for failure in failures.iter() {
                log::error!("{failure}");
            }
            return Err(ForestError::LevelFailed { level, failures });
        }

        Ok(LevelReport {
            level,
            trees: trees.len(),
            nodes,
            elapsed: start.elapsed(),
        })
    }

    /// Move the pending nodes out of the registry and mark their levels
    /// running. All or nothing: on error no level changes state.
    fn claim(
        &self,
        level: Depth,
        trees: &[TreeId],
    ) -> Result<Vec<(TreeId, Shared<N>)>>
    {
        let mut levels = self.registry()?;

        for tree in trees {
            match levels.get(&(*tree, level)) {
                None => {
                    return Err(ForestError::contract(format!(
                        "level {level} of tree {tree} has no registrations"
                    )))
                }
                Some(l) if l.state.dispatched() => {
                    return Err(ForestError::contract(format!(
                        "level {level} of tree {tree} is {:?} and cannot run again",
                        l.state
                    )))
                }
                Some(l) if l.pending.is_empty() => {
                    return Err(ForestError::contract(format!(
                        "level {level} of tree {tree} has no registrations"
                    )))
                }
                Some(_) => (),
            }
        }

        let mut work = Vec::new();
        for tree in trees {
            if let Some(l) = levels.get_mut(&(*tree, level)) {
                l.state = LevelState::Running;
                work.extend(l.pending.drain(..).map(|node| (*tree, node)));
            }
        }
        Ok(work)
    }

    fn dispatch(
        &self,
        level: Depth,
        work: Vec<(TreeId, Shared<N>)>,
    ) -> Result<Vec<NodeFailure>>
    {
        let queue = ArrayQueue::new(work.len().max(1));
        for item in work {
            if queue.push(item).is_err() {
                return Err(ForestError::InvalidState(
                    "level work queue overflowed".into(),
                ));
            }
        }

        let workers = self.workers.min(queue.len()).max(1);
        let (sender, receiver) = flume::unbounded::<NodeFailure>();

        let scope = crossbeam::thread::scope(|s| {
            for _ in 0..workers {
                let sender = sender.clone();
                let queue = &queue;
                s.spawn(move |_| {
                    while let Some((tree, node)) = queue.pop() {
                        if let Err(failure) = self.execute(level, tree, &node) {
                            // Receiver outlives the scope
                            let _ = sender.send(failure);
                        }
                    }
                });
            }
        });
        drop(sender);

        if scope.is_err() {
            return Err(ForestError::WorkerPanic { level });
        }

        Ok(receiver.drain().collect())
    }

    fn execute(
        &self,
        level: Depth,
        tree: TreeId,
        node: &Shared<N>,
    ) -> std::result::Result<(), NodeFailure>
    {
        let mut node = node.lock().map_err(|_| NodeFailure {
            tree,
            depth: level,
            label: "<poisoned>".into(),
            error: ForestError::poisoned("node"),
        })?;

        let result = match node.prep() {
            Ok(()) => node.run(self, tree),
            Err(e) => Err(e),
        };

        result.map_err(|error| NodeFailure {
            tree,
            depth: node.depth(),
            label: node.label(),
            error,
        })
    }

    fn finish(&self, level: Depth, trees: &[TreeId], failed: bool) -> Result<()>
    {
        let mut levels = self.registry()?;
        for tree in trees {
            if let Some(l) = levels.get_mut(&(*tree, level)) {
                l.state = if failed {
                    LevelState::Failed
                } else {
                    LevelState::Complete
                };
            }
        }
        Ok(())
    }

    fn registry(&self) -> Result<MutexGuard<'_, HashMap<(TreeId, Depth), Level<N>>>>
    {
        self.levels
            .lock()
            .map_err(|_| ForestError::poisoned("scheduler registry"))
    }

    fn with_level<T>(
        &self,
        level: Depth,
        tree: TreeId,
        f: impl FnOnce(&Level<N>) -> T,
    ) -> Option<T>
    {
        let levels = self.levels.lock().ok()?;
        levels.get(&(tree, level)).map(f)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Minimal task: optionally spawns `fanout` children, optionally fails
    struct Probe
    {
        depth: Depth,
        spawn: bool,
        fail_prep: bool,
        fail_run: bool,
        runs: Arc<AtomicUsize>,
    }

    impl Probe
    {
        fn new(depth: Depth, runs: &Arc<AtomicUsize>) -> Self
        {
            Probe {
                depth,
                spawn: false,
                fail_prep: false,
                fail_run: false,
                runs: Arc::clone(runs),
            }
        }

        fn shared(self) -> Shared<Probe>
        {
            Arc::new(Mutex::new(self))
        }
    }

    impl LevelTask for Probe
    {
        fn depth(&self) -> Depth
        {
            self.depth
        }

        fn label(&self) -> String
        {
            format!("probe@{}", self.depth)
        }

        fn prep(&mut self) -> Result<()>
        {
            if self.fail_prep {
                return Err(ForestError::IoUnavailable("probe store".into()));
            }
            Ok(())
        }

        fn run(&mut self, scheduler: &Scheduler<Self>, tree: TreeId) -> Result<()>
        {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail_run {
                return Err(ForestError::contract("probe refused"));
            }
            if self.spawn && self.depth < scheduler.max_depth() {
                for _ in 0..scheduler.fanout() {
                    let mut child = Probe::new(self.depth + 1, &self.runs);
                    child.spawn = true;
                    scheduler.schedule(child.shared(), tree)?;
                }
            }
            Ok(())
        }
    }

    #[test]
    fn full_at_powers_of_fanout()
    {
        let runs = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::<Probe>::new(2, 3);

        for level in 0..=3_u16 {
            let expected = 1 << level;
            for i in 0..expected {
                assert!(!scheduler.is_full(level, 0), "level {level} at {i}");
                scheduler
                    .schedule(Probe::new(level, &runs).shared(), 0)
                    .unwrap();
            }
            assert!(scheduler.is_full(level, 0));
            assert_eq!(scheduler.registered(level, 0), expected);
            assert_eq!(scheduler.state(level, 0), Some(LevelState::Full));

            // One more is a contract violation
            let err = scheduler
                .schedule(Probe::new(level, &runs).shared(), 0)
                .unwrap_err();
            assert!(matches!(err, ForestError::ContractViolation(_)));
        }

        // Root level counts per tree
        scheduler.schedule(Probe::new(0, &runs).shared(), 1).unwrap();
        assert!(scheduler.is_full(0, 1));
    }

    #[test]
    fn runs_levels_to_completion()
    {
        let runs = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::<Probe>::new(2, 3).with_workers(4);

        let mut root = Probe::new(0, &runs);
        root.spawn = true;
        scheduler.schedule(root.shared(), 0).unwrap();

        for level in 0..=3 {
            assert!(scheduler.is_full(level, 0));
            let report = scheduler.run_level(level, 0).unwrap();
            assert_eq!(report.nodes, 1 << level);
            assert!(scheduler.is_complete(level, 0));
        }

        assert_eq!(runs.load(Ordering::SeqCst), 15);
        assert_eq!(scheduler.registered(4, 0), 0);
    }

    #[test]
    fn levels_run_at_most_once()
    {
        let runs = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::<Probe>::new(2, 3);

        // Empty level
        let err = scheduler.run_level(0, 0).unwrap_err();
        assert!(matches!(err, ForestError::ContractViolation(_)));

        scheduler.schedule(Probe::new(0, &runs).shared(), 0).unwrap();
        scheduler.run_level(0, 0).unwrap();

        let err = scheduler.run_level(0, 0).unwrap_err();
        assert!(matches!(err, ForestError::ContractViolation(_)));

        // No late registrations into a dispatched level
        let err = scheduler
            .schedule(Probe::new(0, &runs).shared(), 0)
            .unwrap_err();
        assert!(matches!(err, ForestError::ContractViolation(_)));

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn too_deep_is_rejected()
    {
        let runs = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::<Probe>::new(2, 1);
        assert!(scheduler
            .schedule(Probe::new(2, &runs).shared(), 0)
            .is_err());
    }

    #[test]
    fn failures_are_aggregated()
    {
        let runs = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::<Probe>::new(4, 2).with_workers(3);

        for i in 0..4 {
            let mut probe = Probe::new(1, &runs);
            probe.fail_prep = i == 1;
            probe.fail_run = i == 3;
            scheduler.schedule(probe.shared(), 7).unwrap();
        }

        let err = scheduler.run_level(1, 7).unwrap_err();
        match err {
            ForestError::LevelFailed { level, failures } => {
                assert_eq!(level, 1);
                assert_eq!(failures.len(), 2);
                assert!(failures.iter().all(|f| f.tree == 7 && f.depth == 1));
                assert!(failures.iter().any(|f| f.error.is_io()));
                assert!(failures
                    .iter()
                    .any(|f| matches!(f.error, ForestError::ContractViolation(_))));
            }
            other => panic!("unexpected {other:?}"),
        }

        // prep failure never reaches run
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.state(1, 7), Some(LevelState::Failed));
        assert!(!scheduler.is_complete(1, 7));
        assert!(scheduler.run_level(1, 7).is_err());
    }

    #[test]
    fn forest_level_dispatches_every_tree()
    {
        let runs = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::<Probe>::new(3, 2).with_workers(4);

        for tree in 0..5 {
            let mut root = Probe::new(0, &runs);
            root.spawn = true;
            scheduler.schedule(root.shared(), tree).unwrap();
        }

        assert_eq!(scheduler.pending_trees(0).unwrap(), vec![0, 1, 2, 3, 4]);
        let report = scheduler.run_forest_level(0).unwrap();
        assert_eq!(report.trees, 5);
        assert_eq!(report.nodes, 5);

        let report = scheduler.run_forest_level(1).unwrap();
        assert_eq!(report.nodes, 15);
        let report = scheduler.run_forest_level(2).unwrap();
        assert_eq!(report.nodes, 45);

        assert!(scheduler.pending_trees(3).unwrap().is_empty());
        assert!(scheduler.run_forest_level(3).is_err());
        assert_eq!(runs.load(Ordering::SeqCst), 65);
    }

    #[test]
    fn concurrent_registration_loses_nothing()
    {
        let runs = Arc::new(AtomicUsize::new(0));
        // 1024 slots at level 10
        let scheduler = Scheduler::<Probe>::new(2, 10);

        crossbeam::thread::scope(|s| {
            for t in 0..8 {
                let scheduler = &scheduler;
                let runs = &runs;
                s.spawn(move |_| {
                    for _ in 0..125 {
                        scheduler
                            .schedule(Probe::new(10, runs).shared(), 0)
                            .unwrap();
                    }
                    t
                });
            }
        })
        .unwrap();

        assert_eq!(scheduler.registered(10, 0), 1000);
        assert!(!scheduler.is_full(10, 0));
    }

    #[test]
    fn poisoned_registry_is_an_error()
    {
        let runs = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::<Probe>::new(2, 2);
        scheduler.schedule(Probe::new(0, &runs).shared(), 0).unwrap();

        let poisoned = crossbeam::thread::scope(|s| {
            s.spawn(|_| {
                let _levels = scheduler.levels.lock().unwrap();
                panic!("registry holder died");
            });
        });
        assert!(poisoned.is_err());

        assert!(matches!(
            scheduler.pending_trees(0),
            Err(ForestError::InvalidState(_))
        ));
        assert!(matches!(
            scheduler.run_forest_level(0),
            Err(ForestError::InvalidState(_))
        ));
        assert!(scheduler
            .schedule(Probe::new(1, &runs).shared(), 0)
            .is_err());
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn worker_panic_is_reported()
    {
        struct Bomb;

        impl LevelTask for Bomb
        {
            fn depth(&self) -> Depth
            {
                0
            }

            fn label(&self) -> String
            {
                "bomb".into()
            }

            fn prep(&mut self) -> Result<()>
            {
                Ok(())
            }

            fn run(&mut self, _: &Scheduler<Self>, _: TreeId) -> Result<()>
            {
                panic!("boom");
            }
        }

        let scheduler = Scheduler::<Bomb>::new(2, 1);
        scheduler.schedule(Arc::new(Mutex::new(Bomb)), 0).unwrap();
        let err = scheduler.run_level(0, 0).unwrap_err();
        assert!(matches!(err, ForestError::WorkerPanic { level: 0 }));
        assert_eq!(scheduler.state(0, 0), Some(LevelState::Failed));
    }
}
