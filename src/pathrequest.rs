use crate::costprovider::*;
use crate::location::*;
use crate::pathresult::*;
use crate::pool::*;
use crate::traits::*;
use serde::*;
use std::fmt;
use std::sync::Arc;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request#{}", self.0)
    }
}

/// Priority level for path requests. Only consulted by the scheduler when it
/// runs with `SchedulingPolicy::Priority`.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PathPriority {
    /// Background planning, served last.
    Low,
    /// Default priority for most agents.
    #[default]
    Normal,
    High,
    /// Served before anything else queued.
    Critical,
}

/// Completion hook invoked exactly once with the result of a request.
pub type PathCallback = Box<dyn FnOnce(PathResult)>;

/// The inputs of one pathfinding run.
#[derive(Clone)]
pub struct PathQuery {
    pub agent: AgentProfile,
    pub start: GridPosition,
    pub goal: GridPosition,
    pub provider: Arc<dyn CostProvider>,
    /// Reservation step at which the agent stands on `start`.
    pub start_time: u64,
}

impl PathQuery {
    pub fn new(agent: AgentProfile, start: GridPosition, goal: GridPosition, provider: Arc<dyn CostProvider>) -> PathQuery {
        PathQuery {
            agent,
            start,
            goal,
            provider,
            start_time: 0,
        }
    }
}

impl fmt::Debug for PathQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathQuery")
            .field("agent", &self.agent)
            .field("start", &self.start)
            .field("goal", &self.goal)
            .field("provider", &self.provider.identity())
            .field("start_time", &self.start_time)
            .finish()
    }
}

/// A queued request. Instances are recycled through the scheduler's pool, so
/// a request is only meaningful between submission and completion.
#[derive(Default)]
pub struct PathRequest {
    pub(crate) id: RequestId,
    pub(crate) query: Option<PathQuery>,
    pub(crate) priority: PathPriority,
    pub(crate) callback: Option<PathCallback>,
}

impl Poolable for PathRequest {
    fn reset(&mut self) {
        self.id = RequestId::default();
        self.query = None;
        self.priority = PathPriority::default();
        self.callback = None;
    }
}

impl PathRequest {
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn query(&self) -> Option<&PathQuery> {
        self.query.as_ref()
    }

    pub fn priority(&self) -> PathPriority {
        self.priority
    }

    pub fn requester(&self) -> Option<AgentId> {
        self.query.as_ref().map(|q| q.agent.id)
    }
}

pub struct PathRequestBuilder<'a> {
    request: &'a mut PathRequest,
}

impl<'a> From<&'a mut PathRequest> for PathRequestBuilder<'a> {
    fn from(request: &'a mut PathRequest) -> PathRequestBuilder<'a> {
        PathRequestBuilder { request }
    }
}

impl<'a> PathRequestBuilder<'a> {
    pub fn id(&self) -> RequestId {
        self.request.id
    }

    pub fn priority(&mut self, priority: PathPriority) -> &mut Self {
        self.request.priority = priority;

        self
    }

    /// Step of the reservation window the agent departs at. Only matters for
    /// cooperative planning.
    pub fn start_time(&mut self, start_time: u64) -> &mut Self {
        if let Some(query) = self.request.query.as_mut() {
            query.start_time = start_time;
        }

        self
    }

    pub fn capabilities(&mut self, capabilities: Capabilities) -> &mut Self {
        if let Some(query) = self.request.query.as_mut() {
            query.agent.capabilities = capabilities;
        }

        self
    }

    pub fn provider(&mut self, provider: Arc<dyn CostProvider>) -> &mut Self {
        if let Some(query) = self.request.query.as_mut() {
            query.provider = provider;
        }

        self
    }

    pub fn on_complete<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnOnce(PathResult) + 'static,
    {
        self.request.callback = Some(Box::new(callback));

        self
    }
}
