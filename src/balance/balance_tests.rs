use itertools::Itertools;
use proptest::prelude::*;

use crate::auxiliary::template_molecules::gen_water;
use crate::balance::{
    greedy_assign, Assignment, BalanceParams, BalanceStrategy, CostModel, LoadBalancer,
};
use crate::basis::shell::BasisSet;
use crate::error::XcTaskError;
use crate::grid::{AtomicGridSize, MolecularGrid};
use crate::task::partition::{partition, PartitionParams};
use crate::task::{PointRange, TaskSet};

fn water_task_set() -> TaskSet {
    let mol = gen_water();
    let basis = BasisSet::from_library(&mol, "sto-3g", false, 1e-10).unwrap();
    let grid = MolecularGrid::new(
        &mol,
        &AtomicGridSize::Explicit {
            n_radial: 16,
            n_theta: 6,
            n_phi: 10,
        },
    )
    .unwrap();
    let params = PartitionParams::builder()
        .pv(4)
        .max_batch_size(40)
        .build()
        .unwrap();
    partition(&grid, &mol.nearest_neighbour_distances(), &basis, &params).unwrap()
}

#[test]
fn test_balance_cost_models() {
    assert_eq!(CostModel::default(), CostModel::PointsTimesFunctions);
    assert_eq!(CostModel::PointsTimesFunctions.cost(32, 10), 320);
    assert_eq!(CostModel::CollocationAndContraction.cost(32, 10), 420);
    assert_eq!(CostModel::PointsTimesFunctions.cost(32, 0), 0);
}

#[test]
fn test_balance_strategy_names() {
    assert_eq!(
        "Default".parse::<BalanceStrategy>().unwrap(),
        BalanceStrategy::Default
    );
    assert_eq!(
        "dEfAuLt".parse::<BalanceStrategy>().unwrap(),
        BalanceStrategy::Default
    );
    assert_eq!(
        "REPLICATED".parse::<BalanceStrategy>().unwrap(),
        BalanceStrategy::Default
    );
    assert!(matches!(
        "round-robin".parse::<BalanceStrategy>(),
        Err(XcTaskError::Configuration(_))
    ));
}

#[test]
fn test_balance_greedy_example() {
    let balance = greedy_assign(&[5, 3, 5, 2, 8], 2, 1);
    let ranks = balance
        .assignments
        .iter()
        .map(|a| a.rank)
        .collect_vec();
    assert_eq!(ranks, vec![1, 0, 1, 1, 0]);
    assert_eq!(balance.rank_loads, vec![11, 12]);
    assert_eq!(balance.makespan(), 12);
    assert_eq!(balance.local_task_indices(0), vec![1, 4]);
    assert_eq!(balance.local_task_indices(1), vec![0, 2, 3]);
}

#[test]
fn test_balance_ties_follow_task_order() {
    // Equal costs are visited in task order and ranks and lanes are filled lowest first.
    let balance = greedy_assign(&[7; 6], 2, 2);
    assert_eq!(
        balance.assignments,
        vec![
            Assignment { rank: 0, lane: 0 },
            Assignment { rank: 1, lane: 0 },
            Assignment { rank: 0, lane: 1 },
            Assignment { rank: 1, lane: 1 },
            Assignment { rank: 0, lane: 0 },
            Assignment { rank: 1, lane: 0 },
        ]
    );
    assert_eq!(balance.lane_loads, vec![vec![14, 7], vec![14, 7]]);
    assert_eq!(balance.lane_task_indices(0, 0), vec![0, 4]);
    assert_eq!(balance.lane_task_indices(1, 1), vec![3]);

    // Zero-cost tasks come last, in task order, and land on the lowest of equally loaded ranks.
    let with_zeros = greedy_assign(&[0, 3, 0, 3], 2, 1);
    let ranks = with_zeros
        .assignments
        .iter()
        .map(|a| a.rank)
        .collect_vec();
    assert_eq!(ranks, vec![0, 0, 0, 1]);
}

#[test]
fn test_balance_params_validation() {
    let params = BalanceParams::default();
    assert_eq!(params.n_ranks, 1);
    assert_eq!(params.n_lanes, 1);
    LoadBalancer::new(&params).unwrap();

    let no_ranks = BalanceParams::builder().n_ranks(0).build().unwrap();
    assert!(matches!(
        LoadBalancer::new(&no_ranks),
        Err(XcTaskError::Configuration(_))
    ));
    let no_lanes = BalanceParams::builder().n_lanes(0).build().unwrap();
    assert!(matches!(
        LoadBalancer::new(&no_lanes),
        Err(XcTaskError::Configuration(_))
    ));
}

#[test]
fn test_balance_task_set() {
    let task_set = water_task_set();
    let params = BalanceParams::builder()
        .n_ranks(3)
        .n_lanes(2)
        .build()
        .unwrap();
    let balancer = LoadBalancer::new(&params).unwrap();
    let balance = balancer.balance(&task_set).unwrap();
    assert_eq!(balance.assignments.len(), task_set.n_tasks());
    assert_eq!(balance.n_ranks(), 3);
    assert_eq!(balance.n_lanes(), 2);

    // Every task is owned exactly once, and rank-local lists are in task order.
    let mut owned = (0..3)
        .flat_map(|rank| balance.local_task_indices(rank))
        .collect_vec();
    owned.sort_unstable();
    assert_eq!(owned, (0..task_set.n_tasks()).collect_vec());
    for rank in 0..3 {
        let local = balance.local_task_indices(rank);
        assert!(local.windows(2).all(|w| w[0] < w[1]));
        let from_lanes = (0..2)
            .flat_map(|lane| balance.lane_task_indices(rank, lane))
            .sorted()
            .collect_vec();
        assert_eq!(local, from_lanes);
    }

    // Byte-stable for identical input.
    assert_eq!(balance, balancer.balance(&task_set).unwrap());
}

#[test]
fn test_balance_input_errors() {
    let balancer = LoadBalancer::new(&BalanceParams::default()).unwrap();
    let mut task_set = water_task_set();

    let empty = TaskSet {
        pv: 4,
        tasks: vec![],
        pruned: vec![],
        permutation: vec![],
    };
    assert!(matches!(
        balancer.balance(&empty),
        Err(XcTaskError::BalanceInput(_))
    ));

    // Dropping a task leaves a hole in the grid.
    let dropped = task_set.tasks.remove(1);
    assert!(matches!(
        balancer.balance(&task_set),
        Err(XcTaskError::BalanceInput(_))
    ));

    // Declaring the hole as pruned restores coverage.
    task_set.pruned.push(PointRange {
        offset: dropped.range.offset,
        len: dropped.range.len,
    });
    balancer.balance(&task_set).unwrap();

    // Claiming the same points twice is rejected.
    task_set.tasks.push(dropped);
    assert!(balancer.balance(&task_set).is_err());
}

proptest! {
    #[test]
    fn test_balance_greedy_properties(
        costs in prop::collection::vec(0u64..10_000, 1..200),
        n_ranks in 1usize..9,
        n_lanes in 1usize..5,
    ) {
        let balance = greedy_assign(&costs, n_ranks, n_lanes);
        let total = costs.iter().sum::<u64>();
        let max_cost = costs.iter().copied().max().unwrap_or(0);

        prop_assert_eq!(balance.assignments.len(), costs.len());
        prop_assert!(balance
            .assignments
            .iter()
            .all(|a| a.rank < n_ranks && a.lane < n_lanes));
        prop_assert_eq!(balance.rank_loads.iter().sum::<u64>(), total);
        for rank in 0..n_ranks {
            prop_assert_eq!(balance.lane_loads[rank].iter().sum::<u64>(), balance.rank_loads[rank]);
            let owned = balance
                .local_task_indices(rank)
                .iter()
                .map(|&i| costs[i])
                .sum::<u64>();
            prop_assert_eq!(owned, balance.rank_loads[rank]);
        }

        // List-scheduling bound.
        prop_assert!(balance.makespan() * n_ranks as u64 <= total + n_ranks as u64 * max_cost);

        prop_assert_eq!(&balance, &greedy_assign(&costs, n_ranks, n_lanes));
    }
}
