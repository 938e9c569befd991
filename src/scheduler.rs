use crate::grid::*;
use crate::pathcache::*;
use crate::pathfinder::*;
use crate::pathrequest::*;
use crate::pathresult::*;
use crate::pool::*;
use crate::reservationtable::*;
use log::debug;
use serde::*;
use std::collections::VecDeque;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulingPolicy {
    /// Strict submission order.
    #[default]
    Fifo,
    /// Highest `PathPriority` first, submission order within a priority.
    Priority,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerOptions {
    pub max_per_tick: usize,
    pub policy: SchedulingPolicy,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        SchedulerOptions {
            max_per_tick: 16,
            policy: SchedulingPolicy::Fifo,
        }
    }
}

/// Queues path requests and resolves a bounded number of them per tick.
/// Requests beyond the budget wait for later ticks; nothing is dropped.
pub struct RequestScheduler {
    options: SchedulerOptions,
    queue: VecDeque<PathRequest>,
    pool: Pool<PathRequest>,
    next_id: u64,
    processed: u64,
}

impl Default for RequestScheduler {
    fn default() -> Self {
        RequestScheduler::new(SchedulerOptions::default())
    }
}

impl RequestScheduler {
    pub fn new(options: SchedulerOptions) -> RequestScheduler {
        RequestScheduler {
            options,
            queue: VecDeque::new(),
            pool: Pool::default(),
            next_id: 0,
            processed: 0,
        }
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Total requests completed so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn pool(&self) -> &Pool<PathRequest> {
        &self.pool
    }

    pub fn is_queued(&self, id: RequestId) -> bool {
        self.queue.iter().any(|r| r.id == id)
    }

    /// Enqueues a request and returns a builder over it for further options.
    pub fn submit(&mut self, query: PathQuery) -> PathRequestBuilder<'_> {
        let mut request = self.pool.acquire();

        self.next_id += 1;
        request.id = RequestId(self.next_id);
        request.query = Some(query);

        self.queue.push_back(request);
        let index = self.queue.len() - 1;

        PathRequestBuilder::from(&mut self.queue[index])
    }

    /// Removes a queued request. Its callback is dropped without being called.
    pub fn cancel(&mut self, id: RequestId) -> bool {
        let Some(index) = self.queue.iter().position(|r| r.id == id) else {
            return false;
        };

        if let Some(request) = self.queue.remove(index) {
            debug!("cancelled {}", id);
            self.pool.release(request);
        }

        true
    }

    fn next_index(&self) -> Option<usize> {
        match self.options.policy {
            SchedulingPolicy::Fifo => (!self.queue.is_empty()).then_some(0),
            SchedulingPolicy::Priority => self
                .queue
                .iter()
                .enumerate()
                .max_by(|(ia, a), (ib, b)| a.priority.cmp(&b.priority).then(ib.cmp(ia)))
                .map(|(index, _)| index),
        }
    }

    /// Takes this tick's share of the queue. A request that waited past its
    /// start time departs at `now` instead.
    fn dequeue_batch(&mut self, now: Option<u64>) -> Vec<PathRequest> {
        let budget = self.options.max_per_tick.min(self.queue.len());
        let mut batch = Vec::with_capacity(budget);

        while batch.len() < budget {
            let Some(mut request) = self.next_index().and_then(|index| self.queue.remove(index)) else {
                break;
            };

            if let (Some(now), Some(query)) = (now, request.query.as_mut()) {
                query.start_time = query.start_time.max(now);
            }

            batch.push(request);
        }

        batch
    }

    fn complete(&mut self, mut request: PathRequest, outcome: PathOutcome, cache_hit: bool) {
        let result = PathResult {
            request: request.id,
            requester: request.requester().unwrap_or_default(),
            outcome,
            cache_hit,
            start_time: request.query.as_ref().map_or(0, |q| q.start_time),
        };

        let callback = request.callback.take();
        self.pool.release(request);
        self.processed += 1;

        if let Some(callback) = callback {
            callback(result);
        }
    }

    /// Resolves up to `max_per_tick` requests in dequeue order, invoking each
    /// callback as its request completes. Returns the number processed.
    pub fn process_tick(
        &mut self,
        pathfinder: &mut HierarchicalPathfinder,
        grid: &GridManager,
        cache: &mut PathCache,
        reservations: Option<&ReservationTable>,
    ) -> usize {
        let batch = self.dequeue_batch(reservations.map(|r| r.current_time()));
        let count = batch.len();

        for mut request in batch {
            let Some(query) = request.query.take() else {
                self.pool.release(request);
                continue;
            };

            let resolution = pathfinder.find_path(grid, cache, reservations, &query);
            request.query = Some(query);

            self.complete(request, resolution.outcome, resolution.cache_hit);
        }

        if count > 0 {
            debug!("processed {} path requests, {} pending", count, self.queue.len());
        }

        count
    }

    /// Like `process_tick`, but the searches of cache misses run on the rayon
    /// thread pool. Cache writes and callbacks stay on the calling thread and
    /// follow dequeue order.
    #[cfg(feature = "parallel")]
    pub fn process_tick_parallel(
        &mut self,
        pathfinder: &mut HierarchicalPathfinder,
        grid: &GridManager,
        cache: &mut PathCache,
        reservations: Option<&ReservationTable>,
    ) -> usize {
        use crate::localsearch::LocalSearch;
        use rayon::prelude::*;

        let batch = self.dequeue_batch(reservations.map(|r| r.current_time()));
        let count = batch.len();

        let hits: Vec<Option<std::sync::Arc<Path>>> = batch
            .iter()
            .map(|request| {
                request
                    .query
                    .as_ref()
                    .and_then(|query| pathfinder.lookup(grid, cache, reservations, query))
            })
            .collect();

        let options = *pathfinder.options();
        let effective = options.effective_reservations(reservations);

        let misses: Vec<(usize, &PathQuery)> = batch
            .iter()
            .zip(hits.iter())
            .enumerate()
            .filter_map(|(index, (request, hit))| match (hit, request.query.as_ref()) {
                (None, Some(query)) => Some((index, query)),
                _ => None,
            })
            .collect();

        let planned: Vec<(usize, Result<Path, PathFailure>)> = misses
            .par_iter()
            .map_init(LocalSearch::new, |search, (index, query)| {
                (*index, plan_path(search, grid, effective, query, &options))
            })
            .collect();

        let mut outcomes: Vec<Option<(PathOutcome, bool)>> = hits
            .into_iter()
            .map(|hit| hit.map(|path| (PathOutcome::Found(path), true)))
            .collect();

        for (index, result) in planned {
            if let Some(query) = batch[index].query.as_ref() {
                outcomes[index] = Some((pathfinder.record(cache, reservations, query, result), false));
            }
        }

        for (request, outcome) in batch.into_iter().zip(outcomes) {
            match outcome {
                Some((outcome, cache_hit)) => self.complete(request, outcome, cache_hit),
                None => self.pool.release(request),
            }
        }

        if count > 0 {
            debug!("processed {} path requests in parallel, {} pending", count, self.queue.len());
        }

        count
    }
}
