use std::env;
use std::path::PathBuf;

use itertools::Itertools;
use serial_test::serial;

use xctask::auxiliary::molecule::Molecule;
use xctask::balance::ExecutionSpace;
use xctask::basis::shell::BasisSet;
use xctask::drivers::grid_partitioning::{
    GridPartitioningDriver, GridPartitioningParams, GridPartitioningResult,
};
use xctask::drivers::XcTaskDriver;
use xctask::grid::AtomicGridSize;
use xctask::io::{read_xctask_binary, write_xctask_binary, XcTaskFileType};
use xctask::task::partition::PartitionParams;
use xctask::task::Task;

const ROOT: &str = env!("CARGO_MANIFEST_DIR");

/// Set to regenerate the stored references under `tests/reference`.
const GEN_REFERENCE_VAR: &str = "XCTASK_GEN_REFERENCE";

const MATCH_THRESHOLD: f64 = 1e-12;

fn benzene() -> (Molecule, BasisSet) {
    let mol = Molecule::from_xyz(format!("{ROOT}/tests/xyz/benzene.xyz"), false).unwrap();
    let basis = BasisSet::from_library(&mol, "cc-pVDZ", false, f64::EPSILON).unwrap();
    (mol, basis)
}

fn partition_benzene(
    mol: &Molecule,
    basis: &BasisSet,
    n_ranks: usize,
    execution_space: ExecutionSpace,
) -> GridPartitioningResult {
    let params = GridPartitioningParams::builder()
        .grid_size(AtomicGridSize::UltraFine)
        .partition(PartitionParams::builder().pv(32).build().unwrap())
        .n_ranks(n_ranks)
        .execution_space(execution_space)
        .build()
        .unwrap();
    let mut driver = GridPartitioningDriver::builder()
        .parameters(&params)
        .molecule(mol)
        .basis(basis)
        .build()
        .unwrap();
    driver.run().unwrap();
    driver.result().unwrap().clone()
}

/// The stripped local tasks of every rank, in rank order.
fn local_tasks_by_rank(result: &GridPartitioningResult) -> Vec<Vec<Task>> {
    (0..result.balance.n_ranks())
        .map(|rank| {
            result
                .local_tasks(rank)
                .into_iter()
                .map(|task| task.stripped())
                .collect_vec()
        })
        .collect_vec()
}

fn reference_name(n_ranks: usize) -> PathBuf {
    PathBuf::from(format!(
        "{ROOT}/tests/reference/benzene_ccpvdz_ultrafine_pv32_r{n_ranks}"
    ))
}

/// Loads the stored reference for a rank count. With [`GEN_REFERENCE_VAR`] set, the reference is
/// first regenerated from a fresh run and written to `tests/reference`. A missing reference is a
/// failure.
fn load_reference(mol: &Molecule, basis: &BasisSet, n_ranks: usize) -> Vec<Vec<Task>> {
    let stored = reference_name(n_ranks);
    let path = XcTaskFileType::Tsk.path_for(&stored);
    if env::var_os(GEN_REFERENCE_VAR).is_some() {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).unwrap();
        }
        let fresh = partition_benzene(mol, basis, n_ranks, ExecutionSpace::Host);
        write_xctask_binary(&stored, XcTaskFileType::Tsk, &local_tasks_by_rank(&fresh)).unwrap();
    }
    assert!(
        path.exists(),
        "Reference {} is missing; run the tests once with {GEN_REFERENCE_VAR}=1 and commit it.",
        path.display()
    );
    read_xctask_binary(&stored, XcTaskFileType::Tsk).unwrap()
}

fn check_against_reference(n_ranks: usize) {
    let _ = env_logger::builder().is_test(true).try_init();
    let (mol, basis) = benzene();
    let reference = load_reference(&mol, &basis, n_ranks);
    let result = partition_benzene(&mol, &basis, n_ranks, ExecutionSpace::Host);

    result.task_set.validate_coverage().unwrap();
    result.task_set.check_padding().unwrap();
    assert_eq!(result.task_set.n_points(), 12 * 99 * 17 * 34);
    assert!(result.task_set.tasks.iter().all(|task| task.npts % 32 == 0));
    assert_eq!(result.balance.n_ranks(), n_ranks);

    assert_eq!(reference.len(), n_ranks);
    for (rank, reference_tasks) in reference.iter().enumerate() {
        let local_tasks = result.local_tasks(rank);
        assert_eq!(
            local_tasks.len(),
            reference_tasks.len(),
            "Task count mismatch on rank {rank}."
        );
        for (itask, (task, reference_task)) in
            local_tasks.iter().zip(reference_tasks.iter()).enumerate()
        {
            task.matches_reference(reference_task, MATCH_THRESHOLD)
                .unwrap_or_else(|err| panic!("Rank {rank}, local task {itask}: {err}"));
        }
    }
}

#[test]
#[serial]
fn test_integration_benzene_reference_one_rank() {
    check_against_reference(1);
}

#[test]
#[serial]
fn test_integration_benzene_reference_four_ranks() {
    check_against_reference(4);
}

#[test]
#[serial]
fn test_integration_benzene_host_device_agreement() {
    let (mol, basis) = benzene();
    let host = partition_benzene(&mol, &basis, 4, ExecutionSpace::Host);
    let device = partition_benzene(&mol, &basis, 4, ExecutionSpace::Device);
    assert_eq!(host.task_set, device.task_set);

    // The task set does not depend on how many ranks share it.
    let single = partition_benzene(&mol, &basis, 1, ExecutionSpace::Host);
    assert_eq!(single.task_set, host.task_set);
    let mut owned = (0..4)
        .flat_map(|rank| host.balance.local_task_indices(rank))
        .collect_vec();
    owned.sort_unstable();
    assert_eq!(owned, (0..host.task_set.n_tasks()).collect_vec());
}
