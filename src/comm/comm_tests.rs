use std::thread;

use crate::comm::{AbortOnPanic, Communicator, LocalWorld, SerialCommunicator};
use crate::error::XcTaskError;

#[test]
fn test_comm_serial() {
    let comm = SerialCommunicator;
    assert_eq!(comm.rank(), 0);
    assert_eq!(comm.size(), 1);
    let mut buffer = vec![1.5, -2.0];
    comm.all_reduce_sum(&mut buffer).unwrap();
    comm.barrier().unwrap();
    comm.abort();
    assert_eq!(buffer, vec![1.5, -2.0]);
}

#[test]
fn test_comm_local_world_all_reduce() {
    let comms = LocalWorld::create(4).unwrap();
    let results = thread::scope(|s| {
        let handles = comms
            .iter()
            .map(|comm| {
                s.spawn(move || {
                    let rank = comm.rank() as f64;
                    let mut buffer = vec![rank, 0.1 * rank, 1.0];
                    comm.all_reduce_sum(&mut buffer).unwrap();
                    // A second round reuses the slots.
                    let mut again = vec![rank + 1.0];
                    comm.all_reduce_sum(&mut again).unwrap();
                    comm.barrier().unwrap();
                    (buffer, again)
                })
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>()
    });
    for (buffer, again) in results.iter() {
        assert_eq!(buffer, &results[0].0);
        assert_eq!(again, &vec![10.0]);
    }
    approx::assert_relative_eq!(results[0].0[0], 6.0);
    approx::assert_relative_eq!(results[0].0[1], 0.6, max_relative = 1e-14);
    approx::assert_relative_eq!(results[0].0[2], 4.0);
}

#[test]
fn test_comm_local_world_errors() {
    assert!(matches!(
        LocalWorld::create(0),
        Err(XcTaskError::Configuration(_))
    ));

    let comms = LocalWorld::create(2).unwrap();
    assert_eq!(comms[1].size(), 2);
    let outcomes = thread::scope(|s| {
        let handles = comms
            .iter()
            .map(|comm| {
                s.spawn(move || {
                    let mut buffer = vec![0.0; comm.rank() + 1];
                    comm.all_reduce_sum(&mut buffer).is_err()
                })
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>()
    });
    assert_eq!(outcomes, vec![true, true]);
}

#[test]
fn test_comm_local_world_abort_releases_waiting_ranks() {
    let comms = LocalWorld::create(3).unwrap();
    let outcomes = thread::scope(|s| {
        let handles = comms
            .iter()
            .map(|comm| {
                s.spawn(move || {
                    if comm.rank() == 1 {
                        comm.abort();
                        return (false, false);
                    }
                    let mut buffer = vec![1.0];
                    let reduced = comm.all_reduce_sum(&mut buffer);
                    (
                        matches!(reduced, Err(XcTaskError::Configuration(_))),
                        comm.barrier().is_err(),
                    )
                })
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>()
    });
    assert_eq!(outcomes, vec![(true, true), (false, false), (true, true)]);
}

#[test]
fn test_comm_local_world_abort_on_panic() {
    let comms = LocalWorld::create(2).unwrap();
    let outcomes = thread::scope(|s| {
        let handles = comms
            .iter()
            .map(|comm| {
                s.spawn(move || {
                    let _guard = AbortOnPanic(comm);
                    if comm.rank() == 0 {
                        panic!("rank 0 fails before the reduction");
                    }
                    let mut buffer = vec![2.0, 3.0];
                    comm.all_reduce_sum(&mut buffer).is_err()
                })
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| handle.join().ok())
            .collect::<Vec<_>>()
    });
    assert_eq!(outcomes, vec![None, Some(true)]);
}
