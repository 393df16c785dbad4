use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::auxiliary::template_molecules::gen_water;
use crate::backend::{make_backend, Backend, DeviceBackend, HostBackend};
use crate::balance::{BalanceStrategy, CostModel, ExecutionSpace};
use crate::basis::shell::BasisSet;
use crate::error::XcTaskError;
use crate::grid::{AtomicGridSize, MolecularGrid};
use crate::task::partition::PartitionParams;

fn water_setup() -> (BasisSet, MolecularGrid, Vec<f64>) {
    let mol = gen_water();
    let basis = BasisSet::from_library(&mol, "sto-3g", false, 1e-10).unwrap();
    let grid = MolecularGrid::new(
        &mol,
        &AtomicGridSize::Explicit {
            n_radial: 18,
            n_theta: 6,
            n_phi: 12,
        },
    )
    .unwrap();
    (basis, grid, mol.nearest_neighbour_distances())
}

#[test]
fn test_backend_selection() {
    let host = make_backend(ExecutionSpace::Host, "Default", 4).unwrap();
    assert_eq!(host.execution_space(), ExecutionSpace::Host);
    assert_eq!(host.n_lanes(), 4);
    assert_eq!(host.strategy(), BalanceStrategy::Default);

    let device = make_backend(ExecutionSpace::Device, "replicated", 2).unwrap();
    assert_eq!(device.execution_space(), ExecutionSpace::Device);
    assert_eq!(device.n_lanes(), 2);

    assert!(matches!(
        make_backend(ExecutionSpace::Host, "Default", 0),
        Err(XcTaskError::Configuration(_))
    ));
    assert!(matches!(
        make_backend(ExecutionSpace::Device, "Default", 0),
        Err(XcTaskError::Configuration(_))
    ));
    assert!(matches!(
        make_backend(ExecutionSpace::Host, "Static", 1),
        Err(XcTaskError::Configuration(_))
    ));
}

#[test]
fn test_backend_load_balancer() {
    let host = HostBackend::new(BalanceStrategy::Default, 3).unwrap();
    let balancer = host.load_balancer(2, None).unwrap();
    assert_eq!(balancer.params().n_ranks, 2);
    assert_eq!(balancer.params().n_lanes, 3);
    assert_eq!(
        balancer.params().cost_model,
        CostModel::PointsTimesFunctions
    );

    let device = DeviceBackend::new(BalanceStrategy::Default, 2).unwrap();
    assert_eq!(
        device.load_balancer(1, None).unwrap().params().cost_model,
        CostModel::CollocationAndContraction
    );
    assert_eq!(
        device
            .load_balancer(1, Some(CostModel::PointsTimesFunctions))
            .unwrap()
            .params()
            .cost_model,
        CostModel::PointsTimesFunctions
    );
    assert!(device.load_balancer(0, None).is_err());
}

#[test]
fn test_backend_partition_agreement() {
    let (basis, grid, dist_nearest) = water_setup();
    let host = HostBackend::new(BalanceStrategy::Default, 1).unwrap();
    let device = DeviceBackend::new(BalanceStrategy::Default, 4).unwrap();
    for pv in [1, 16] {
        let params = PartitionParams::builder()
            .pv(pv)
            .max_batch_size(50)
            .build()
            .unwrap();
        let host_set = host.partition(&grid, &dist_nearest, &basis, &params).unwrap();
        let device_set = device
            .partition(&grid, &dist_nearest, &basis, &params)
            .unwrap();
        assert_eq!(host_set, device_set);
    }

    let bad = PartitionParams::builder().pv(0).build().unwrap();
    assert!(device.partition(&grid, &dist_nearest, &basis, &bad).is_err());
    assert!(device
        .partition(&grid, &dist_nearest[..1], &basis, &PartitionParams::default())
        .is_err());
}

#[test]
fn test_backend_packing_agreement() {
    let (basis, grid, dist_nearest) = water_setup();
    let host = HostBackend::new(BalanceStrategy::Default, 1).unwrap();
    let device = DeviceBackend::new(BalanceStrategy::Default, 1).unwrap();
    let params = PartitionParams::builder()
        .max_batch_size(30)
        .build()
        .unwrap();
    let task_set = host.partition(&grid, &dist_nearest, &basis, &params).unwrap();
    let nbf = basis.n_funcs();
    let mut rng = StdRng::seed_from_u64(2023);
    let global = Array2::from_shape_fn((nbf, nbf), |_| rng.gen_range(-1.0..1.0));
    // A non-contiguous view exercises the staging path.
    let global_t = global.t().to_owned();

    let mut host_acc = Array2::<f64>::zeros((nbf, nbf));
    let mut device_acc = Array2::<f64>::zeros((nbf, nbf));
    let mut device_acc_t = Array2::<f64>::zeros((nbf, nbf));
    for task in task_set.tasks.iter() {
        let host_block = host.gather(task, &global.view()).unwrap();
        let device_block = device.gather(task, &global.view()).unwrap();
        assert_eq!(host_block, device_block);
        assert_eq!(
            device.gather(task, &global_t.t()).unwrap(),
            host_block
        );

        host.scatter_add(task, &host_block.view(), &mut host_acc.view_mut())
            .unwrap();
        device
            .scatter_add(task, &device_block.view(), &mut device_acc.view_mut())
            .unwrap();
        device
            .scatter_add(task, &device_block.view(), &mut device_acc_t.view_mut().reversed_axes())
            .unwrap();
    }
    assert_eq!(host_acc, device_acc);
    assert_eq!(device_acc_t.t(), host_acc);

    // Out-of-range cuts are rejected by both.
    let small = Array2::<f64>::zeros((nbf - 1, nbf - 1));
    let task = task_set
        .tasks
        .iter()
        .find(|task| task.cuts.iter().any(|cut| cut.global_end() == nbf))
        .unwrap();
    assert!(matches!(
        host.gather(task, &small.view()),
        Err(XcTaskError::PackingBounds { .. })
    ));
    assert!(matches!(
        device.gather(task, &small.view()),
        Err(XcTaskError::PackingBounds { .. })
    ));
}
