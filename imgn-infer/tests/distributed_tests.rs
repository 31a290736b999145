//! Distributed evaluation tests on in-process worker groups
//!
//! Every test drives real collectives over a `ThreadGroup`; the single-process
//! reference computations use the same master seed and explicit evaluation tags.

mod helpers;

use helpers::{context, context_with, demo_components, demo_components_with, FailingSimulator};
use imgn_common::{Error, SamplingControls, Simulations};
use imgn_infer::comm::{Communicator, SoloCommunicator, ThreadGroup};
use imgn_infer::pipeline::{EvaluationTag, RESULTS_FILE};
use imgn_infer::simulator::TestSimulator;
use imgn_infer::Pipeline;
use std::time::Duration;
use tempfile::TempDir;

const WORKERS: usize = 3;
const ENSEMBLE: usize = 2;
const SEED: u64 = 31337;
const TIMEOUT: Duration = Duration::from_secs(30);

fn candidate(rank: usize) -> Vec<f64> {
    vec![1.0 + rank as f64, 0.5 * rank as f64]
}

// ============================================================================
// Pool exchange
// ============================================================================

/// **Given:** W = 3 workers, each proposing a different point, E = 2 realizations
/// **When:** One pool round is evaluated
/// **Then:** The value each rank receives equals a single-process evaluation of
/// its own point over the pooled W·E ensemble
#[test]
fn test_pool_exchange_matches_single_process_reference() {
    let dir = TempDir::new().unwrap();

    let group_values: Vec<f64> = ThreadGroup::new(WORKERS, TIMEOUT)
        .unwrap()
        .run(|comm| {
            let rank = comm.rank();
            let mut pipeline = Pipeline::new(
                context(&dir.path().join(format!("group-{}", rank)), rank, SEED, ENSEMBLE),
                Box::new(comm),
                demo_components(0.2),
            )?;
            pipeline.evaluate_point(&candidate(rank))
        })
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let mut reference = Pipeline::new(
        context(&dir.path().join("reference"), 0, SEED, ENSEMBLE),
        Box::new(SoloCommunicator::new()),
        demo_components(0.2),
    )
    .unwrap();
    let key = helpers::key();

    for (slot, &value) in group_values.iter().enumerate() {
        let mut pooled = Simulations::new();
        for rank in 0..WORKERS {
            let tag = EvaluationTag {
                round: 0,
                slot,
                rank,
            };
            let local = reference.simulate_point(&candidate(slot), tag).unwrap();
            for realization in local.realizations(&key).unwrap() {
                pooled.push(key.clone(), realization.clone()).unwrap();
            }
        }

        let report = reference.likelihood().evaluate_detailed(&pooled).unwrap();
        assert_eq!(report.keys[0].ensemble_size, WORKERS * ENSEMBLE);
        assert!(!report.keys[0].fallback);
        assert_eq!(
            value.to_bits(),
            report.value.to_bits(),
            "slot {}: group {} vs reference {}",
            slot,
            value,
            report.value
        );
    }
}

/// **Then:** Pooling changes the covariance statistics relative to one rank's ensemble
#[test]
fn test_pooled_ensemble_differs_from_local() {
    let dir = TempDir::new().unwrap();
    let mut reference = Pipeline::new(
        context(dir.path(), 0, SEED, ENSEMBLE),
        Box::new(SoloCommunicator::new()),
        demo_components(0.2),
    )
    .unwrap();
    let key = helpers::key();
    let point = candidate(1);

    let mut pooled = Simulations::new();
    for rank in 0..WORKERS {
        let tag = EvaluationTag {
            round: 0,
            slot: 1,
            rank,
        };
        let local = reference.simulate_point(&point, tag).unwrap();
        for realization in local.realizations(&key).unwrap() {
            pooled.push(key.clone(), realization.clone()).unwrap();
        }
    }
    let local = reference
        .simulate_point(&point, EvaluationTag { round: 0, slot: 1, rank: 0 })
        .unwrap();

    let pooled_report = reference.likelihood().evaluate_detailed(&pooled).unwrap();
    let local_report = reference.likelihood().evaluate_detailed(&local).unwrap();
    assert_eq!(local_report.keys[0].ensemble_size, ENSEMBLE);
    assert_ne!(
        pooled_report.keys[0].covariance_trace,
        local_report.keys[0].covariance_trace
    );
}

/// **Then:** Repeating the group evaluation with the same seed gives identical values
#[test]
fn test_group_rounds_reproducible() {
    let run = || -> Vec<u64> {
        let dir = TempDir::new().unwrap();
        ThreadGroup::new(2, TIMEOUT)
            .unwrap()
            .run(|comm| {
                let rank = comm.rank();
                let mut pipeline = Pipeline::new(
                    context(&dir.path().join(format!("r{}", rank)), rank, SEED, ENSEMBLE),
                    Box::new(comm),
                    demo_components(0.2),
                )?;
                let first = pipeline.evaluate_point(&candidate(rank))?;
                let second = pipeline.evaluate_point(&candidate(rank))?;
                Ok(vec![first.to_bits(), second.to_bits()])
            })
            .into_iter()
            .flat_map(|r| r.unwrap())
            .collect()
    };

    let a = run();
    let b = run();
    assert_eq!(a, b);
    // Later rounds draw fresh realizations
    assert_ne!(a[0], a[1]);
}

// ============================================================================
// Failure handling and agreement
// ============================================================================

/// **Given:** The simulator fails on rank 1 only
/// **Then:** The round fails with a Collective error on every rank
#[test]
fn test_failure_on_one_rank_fails_round_everywhere() {
    let dir = TempDir::new().unwrap();
    let results = ThreadGroup::new(WORKERS, TIMEOUT).unwrap().run(|comm| {
        let rank = comm.rank();
        let components = if rank == 1 {
            demo_components_with(0.2, Box::new(FailingSimulator))
        } else {
            demo_components_with(0.2, Box::new(TestSimulator::new()))
        };
        let mut pipeline = Pipeline::new(
            context(&dir.path().join(format!("r{}", rank)), rank, SEED, ENSEMBLE),
            Box::new(comm),
            components,
        )?;
        pipeline.evaluate_point(&candidate(rank))
    });

    for (rank, result) in results.into_iter().enumerate() {
        match result {
            Err(Error::Collective(msg)) => assert!(msg.contains("[1]"), "rank {}: {}", rank, msg),
            other => panic!("rank {}: expected Collective error, got {:?}", rank, other),
        }
    }
}

/// **Given:** Ranks configured with different master seeds
/// **Then:** Every rank adopts rank 0's seed
#[test]
fn test_master_seed_agreed_from_rank_zero() {
    let dir = TempDir::new().unwrap();
    let seeds: Vec<u64> = ThreadGroup::new(WORKERS, TIMEOUT)
        .unwrap()
        .run(|comm| {
            let rank = comm.rank();
            let pipeline = Pipeline::new(
                context(&dir.path().join(format!("r{}", rank)), rank, 100 + rank as u64, 1),
                Box::new(comm),
                demo_components(0.2),
            )?;
            Ok(pipeline.master_seed())
        })
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(seeds, vec![100; WORKERS]);
}

/// **Given:** A short sampler run on two workers
/// **Then:** Both ranks finish in lockstep and only rank 0 writes the report
#[test]
fn test_two_worker_run_completes() {
    let dir = TempDir::new().unwrap();
    let sampling = SamplingControls {
        n_live_points: Some(10),
        max_iterations: Some(15),
        walk_steps: Some(3),
        ..SamplingControls::default()
    };

    let results = ThreadGroup::new(2, TIMEOUT).unwrap().run(|comm| {
        let rank = comm.rank();
        let mut pipeline = Pipeline::new(
            context_with(dir.path(), rank, SEED, 1, sampling.clone()),
            Box::new(comm),
            demo_components(0.2),
        )?;
        let results = pipeline.run()?;
        Ok((results, pipeline.rounds()))
    });

    let outcomes: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(outcomes[0].1, outcomes[1].1);
    assert_eq!(outcomes[0].1 as usize, 10 + 15 * 3);
    for (results, _) in &outcomes {
        assert_eq!(results.workers, 2);
        assert_eq!(results.iterations, 15);
    }
    assert!(dir.path().join("out").join(RESULTS_FILE).exists());
}
