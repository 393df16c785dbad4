//! Greedy cost-based assignment of tasks to ranks and lanes.

use std::fmt;
use std::str::FromStr;

use derive_builder::Builder;
use itertools::Itertools;
use log;
use serde::{Deserialize, Serialize};

use crate::error::XcTaskError;
use crate::task::TaskSet;

#[cfg(test)]
#[path = "balance_tests.rs"]
mod balance_tests;

// ================
// Enum definitions
// ================

/// An enumerated type for the estimated cost of processing a task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CostModel {
    /// Cost proportional to $`n_{\mathrm{pts}} n_{\mathrm{be}}`$, dominated by collocation.
    #[default]
    PointsTimesFunctions,

    /// Cost proportional to $`n_{\mathrm{be}} (n_{\mathrm{pts}} + n_{\mathrm{be}})`$, adding the
    /// contraction with the compact density to collocation.
    CollocationAndContraction,
}

impl CostModel {
    /// The estimated cost of a task with `npts` padded points and `nbe` significant functions.
    /// Monotonic in both arguments.
    pub fn cost(&self, npts: usize, nbe: usize) -> u64 {
        let (npts, nbe) = (npts as u64, nbe as u64);
        match self {
            CostModel::PointsTimesFunctions => npts * nbe,
            CostModel::CollocationAndContraction => nbe * (npts + nbe),
        }
    }
}

impl fmt::Display for CostModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CostModel::PointsTimesFunctions => write!(f, "npts × nbe"),
            CostModel::CollocationAndContraction => write!(f, "nbe × (npts + nbe)"),
        }
    }
}

/// An enumerated type for the execution spaces tasks can be processed in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionSpace {
    /// General-purpose cores. Lanes are worker threads.
    #[default]
    Host,

    /// An accelerator. Lanes are device streams.
    Device,
}

impl fmt::Display for ExecutionSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionSpace::Host => write!(f, "Host"),
            ExecutionSpace::Device => write!(f, "Device"),
        }
    }
}

/// An enumerated type for load-balancing strategies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceStrategy {
    /// Greedy longest-processing-time-first assignment by estimated cost.
    #[default]
    Default,
}

impl FromStr for BalanceStrategy {
    type Err = XcTaskError;

    /// Parses a strategy name, case-insensitively. `Replicated` is accepted as an alias of
    /// `Default`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" | "replicated" => Ok(BalanceStrategy::Default),
            _ => Err(XcTaskError::Configuration(format!(
                "unknown load-balancing strategy `{s}`"
            ))),
        }
    }
}

impl fmt::Display for BalanceStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BalanceStrategy::Default => write!(f, "Default"),
        }
    }
}

// ==================
// Struct definitions
// ==================

// -------------
// BalanceParams
// -------------

/// A structure containing control parameters for load balancing.
#[derive(Clone, Builder, Debug, PartialEq, Serialize, Deserialize)]
pub struct BalanceParams {
    /// The number of ranks.
    #[builder(default = "1")]
    pub n_ranks: usize,

    /// The number of lanes within every rank.
    #[builder(default = "1")]
    pub n_lanes: usize,

    /// The cost model used to estimate task costs.
    #[builder(default)]
    pub cost_model: CostModel,
}

impl BalanceParams {
    /// Returns a builder to construct a [`BalanceParams`] structure.
    pub fn builder() -> BalanceParamsBuilder {
        BalanceParamsBuilder::default()
    }

    /// Verifies that there is at least one rank and one lane.
    pub fn validate(&self) -> Result<(), XcTaskError> {
        if self.n_ranks == 0 {
            return Err(XcTaskError::Configuration(
                "the number of ranks must be at least 1".to_string(),
            ));
        }
        if self.n_lanes == 0 {
            return Err(XcTaskError::Configuration(
                "the number of lanes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BalanceParams {
    fn default() -> Self {
        BalanceParams::builder()
            .build()
            .expect("Unable to construct a default `BalanceParams`.")
    }
}

impl fmt::Display for BalanceParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Ranks: {}", self.n_ranks)?;
        writeln!(f, "Lanes per rank: {}", self.n_lanes)?;
        writeln!(f, "Cost model: {}", self.cost_model)?;
        Ok(())
    }
}

// -----------
// LoadBalance
// -----------

/// The owner of a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignment {
    /// The rank owning the task.
    pub rank: usize,

    /// The lane within the rank processing the task.
    pub lane: usize,
}

/// The assignment of every task of a task set to a rank and lane.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalance {
    /// The owner of each task, in task order.
    pub assignments: Vec<Assignment>,

    /// The accumulated estimated cost on each rank.
    pub rank_loads: Vec<u64>,

    /// The accumulated estimated cost on each lane of each rank.
    pub lane_loads: Vec<Vec<u64>>,
}

impl LoadBalance {
    /// The number of ranks.
    pub fn n_ranks(&self) -> usize {
        self.rank_loads.len()
    }

    /// The number of lanes within every rank.
    pub fn n_lanes(&self) -> usize {
        self.lane_loads.first().map(|loads| loads.len()).unwrap_or(0)
    }

    /// The indices of the tasks owned by a rank, in task order.
    pub fn local_task_indices(&self, rank: usize) -> Vec<usize> {
        self.assignments
            .iter()
            .enumerate()
            .filter(|(_, assignment)| assignment.rank == rank)
            .map(|(itask, _)| itask)
            .collect_vec()
    }

    /// The indices of the tasks processed by a lane of a rank, in task order.
    pub fn lane_task_indices(&self, rank: usize, lane: usize) -> Vec<usize> {
        self.assignments
            .iter()
            .enumerate()
            .filter(|(_, assignment)| **assignment == Assignment { rank, lane })
            .map(|(itask, _)| itask)
            .collect_vec()
    }

    /// The largest rank load.
    pub fn makespan(&self) -> u64 {
        self.rank_loads.iter().copied().max().unwrap_or(0)
    }

    /// The ratio of the largest to the mean rank load, or one if there is no load.
    pub fn imbalance(&self) -> f64 {
        let total = self.rank_loads.iter().sum::<u64>();
        if total == 0 {
            1.0
        } else {
            self.makespan() as f64 * self.n_ranks() as f64 / total as f64
        }
    }
}

impl fmt::Display for LoadBalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>6} {:>8} {:>14}  Lane loads", "Rank", "Tasks", "Load")?;
        for (rank, (load, lane_loads)) in self
            .rank_loads
            .iter()
            .zip(self.lane_loads.iter())
            .enumerate()
        {
            writeln!(
                f,
                "{rank:>6} {:>8} {load:>14}  {}",
                self.local_task_indices(rank).len(),
                lane_loads.iter().join(", ")
            )?;
        }
        writeln!(f, "Imbalance (max/mean): {:.4}", self.imbalance())?;
        Ok(())
    }
}

// ------------
// LoadBalancer
// ------------

/// The greedy load balancer. The algorithm is shared by every execution space; only the lane
/// count and cost model vary.
#[derive(Clone, Debug)]
pub struct LoadBalancer {
    /// The balancing parameters.
    params: BalanceParams,
}

impl LoadBalancer {
    /// Creates a load balancer, failing if the parameters are invalid.
    pub fn new(params: &BalanceParams) -> Result<Self, XcTaskError> {
        params.validate()?;
        Ok(Self {
            params: params.clone(),
        })
    }

    /// The balancing parameters.
    pub fn params(&self) -> &BalanceParams {
        &self.params
    }

    /// Assigns every task of a task set to a rank and lane.
    ///
    /// # Errors
    ///
    /// Errors if the task set is empty or does not cover its grid exactly once.
    pub fn balance(&self, task_set: &TaskSet) -> Result<LoadBalance, XcTaskError> {
        if task_set.tasks.is_empty() {
            return Err(XcTaskError::BalanceInput("empty task set".to_string()));
        }
        task_set.validate_coverage()?;
        let costs = task_set
            .tasks
            .iter()
            .map(|task| self.params.cost_model.cost(task.npts, task.nbe()))
            .collect_vec();
        let balance = greedy_assign(&costs, self.params.n_ranks, self.params.n_lanes);
        log::debug!(
            "Balanced {} tasks over {} rank(s) × {} lane(s); imbalance {:.4}.",
            costs.len(),
            self.params.n_ranks,
            self.params.n_lanes,
            balance.imbalance()
        );
        Ok(balance)
    }
}

// =========
// Functions
// =========

/// Greedy longest-processing-time-first assignment.
///
/// Tasks are visited by descending cost, ties in task order. Each task goes to the least-loaded
/// rank (ties to the lowest rank), and within it to the least-loaded lane (ties to the lowest
/// lane).
///
/// # Panics
///
/// Panics if `n_ranks` or `n_lanes` is zero.
pub fn greedy_assign(costs: &[u64], n_ranks: usize, n_lanes: usize) -> LoadBalance {
    assert!(n_ranks > 0 && n_lanes > 0, "No ranks or lanes to assign to.");
    let order = (0..costs.len())
        .sorted_by(|&i, &j| costs[j].cmp(&costs[i]))
        .collect_vec();
    let mut rank_loads = vec![0u64; n_ranks];
    let mut lane_loads = vec![vec![0u64; n_lanes]; n_ranks];
    let mut assignments = vec![Assignment { rank: 0, lane: 0 }; costs.len()];
    for itask in order {
        let rank = argmin_first(&rank_loads);
        let lane = argmin_first(&lane_loads[rank]);
        rank_loads[rank] += costs[itask];
        lane_loads[rank][lane] += costs[itask];
        assignments[itask] = Assignment { rank, lane };
    }
    LoadBalance {
        assignments,
        rank_loads,
        lane_loads,
    }
}

/// The index of the first smallest load.
fn argmin_first(loads: &[u64]) -> usize {
    loads
        .iter()
        .enumerate()
        .min_by_key(|(i, load)| (**load, *i))
        .map(|(i, _)| i)
        .unwrap_or(0)
}
