//! # Engine
//!
//! Plants one root per tree under a shared [`Scheduler`] and trains the
//! forest level by level. Every tree's nodes at a level go out in one
//! dispatch and the next level starts only once that dispatch returns.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crate::*;

pub type ForestNode = NodeView<ConfiguredSplit>;

#[derive(Debug, Clone)]
pub struct TrainSummary
{
    pub trees: usize,
    pub levels: Vec<LevelReport>,
    pub elapsed: Duration,
}

impl TrainSummary
{
    /// Nodes run across all trees and levels
    pub fn node_count(&self) -> usize
    {
        self.levels.iter().map(|l| l.nodes).sum()
    }
}

pub struct Engine
{
    params: Params,
    io: SharedSource,
    scheduler: Scheduler<ForestNode>,
    roots: Vec<NodeRef<ConfiguredSplit>>,
    trained: bool,
}

impl Engine
{
    /// Open the dataset named in `params`
    pub fn new(params: Params) -> Result<Self>
    {
        params.validate()?;
        let io = open_source(&params)?;
        Self::with_source(params, io)
    }

    pub fn with_source(params: Params, io: SharedSource) -> Result<Self>
    {
        params.validate()?;

        let shape = (params.sample_count, params.feature_count);
        if io.shape() != shape {
            return Err(ForestError::invalid(format!(
                "source is {:?}, configured for {:?}",
                io.shape(),
                shape
            )));
        }

        params.print();
        let scheduler = Scheduler::from_params(&params);

        Ok(Engine {
            params,
            io,
            scheduler,
            roots: Vec::new(),
            trained: false,
        })
    }

    pub fn params(&self) -> &Params
    {
        &self.params
    }

    pub fn is_trained(&self) -> bool
    {
        self.trained
    }

    /// One root per tree over every sample
    pub fn plant(&mut self) -> Result<()>
    {
        if !self.roots.is_empty() {
            return Err(ForestError::InvalidState("forest already planted".into()));
        }

        for (tree, rule) in forest_roots(&self.params).into_iter().enumerate() {
            let root = NodeView::root(&self.scheduler, rule, 0..self.params.sample_count)
                .with_io(Arc::clone(&self.io))
                .with_parallel_sort_depth(self.params.parallel_sort_depth)
                .into_shared();
            self.scheduler.schedule(Arc::clone(&root), tree as TreeId)?;
            self.roots.push(root);
        }

        log::info!("Planted {} tree(s)", self.roots.len());
        Ok(())
    }

    pub fn train(&mut self) -> Result<TrainSummary>
    {
        self.train_with(|_| ())
    }

    /// Train, calling `on_level` after every completed level. Plants first
    /// if needed. A failed level discards the whole forest.
    pub fn train_with<F>(&mut self, mut on_level: F) -> Result<TrainSummary>
    where
        F: FnMut(&LevelReport),
    {
        if self.trained {
            return Err(ForestError::InvalidState("forest already trained".into()));
        }
        if self.roots.is_empty() {
            self.plant()?;
        }

        let start = Instant::now();
        let mut levels = Vec::new();
        let mut level: Depth = 0;

        loop {
            let step = self.scheduler.pending_trees(level).and_then(|trees| {
                if trees.is_empty() {
                    Ok(None)
                } else {
                    self.scheduler.run_forest_level(level).map(Some)
                }
            });

            let report = match step {
                Ok(Some(report)) => report,
                Ok(None) => break,
                Err(e) => {
                    log::error!("Training stopped at level {level}: {e}");
                    self.roots.clear();
                    return Err(e);
                }
            };

            log::info!(
                "Level {} complete: {} node(s) in {:?}",
                report.level,
                report.nodes,
                report.elapsed
            );
            on_level(&report);
            levels.push(report);

            level = match level.checked_add(1) {
                Some(next) => next,
                None => break,
            };
        }

        self.trained = true;
        let summary = TrainSummary {
            trees: self.roots.len(),
            levels,
            elapsed: start.elapsed(),
        };
        log::info!(
            "Trained {} tree(s), {} node(s) in {:?}",
            summary.trees,
            summary.node_count(),
            summary.elapsed
        );
        Ok(summary)
    }

    pub fn forest(&self) -> Vec<ForestTree<ConfiguredSplit>>
    {
        self.roots
            .iter()
            .enumerate()
            .map(|(id, root)| ForestTree::new(id as TreeId, Arc::clone(root)))
            .collect()
    }

    pub fn tree(&self, id: TreeId) -> Option<ForestTree<ConfiguredSplit>>
    {
        self.roots
            .get(id as usize)
            .map(|root| ForestTree::new(id, Arc::clone(root)))
    }

    /// Leaf bucket of `point` in every tree
    pub fn query(&self, point: &[f64]) -> Result<Vec<Vec<SampleId>>>
    {
        if !self.trained {
            return Err(ForestError::InvalidState("query before training".into()));
        }
        if point.len() != self.params.feature_count {
            return Err(ForestError::invalid(format!(
                "point has {} values, expected {}",
                point.len(),
                self.params.feature_count
            )));
        }

        self.forest().iter().map(|t| t.query(point)).collect()
    }
}
