//! Pool-exchange evaluation rounds
//!
//! **Round protocol:**
//! 1. All-gather every rank's candidate point into a pool indexed by rank
//! 2. Every rank evaluates every pool slot (deterministic, no shared state)
//! 3. Status barrier: every rank reports success; any failure fails the round on
//!    all ranks with the failing ranks named
//! 4. Scatter from rank 0: rank `r` receives the result for slot `r`
//!
//! Slot evaluations run for every slot even after a local failure, so collectives
//! issued inside the evaluation callback stay aligned across ranks.

use super::Communicator;
use imgn_common::{Error, Result};
use tracing::{debug, warn};

/// Runs collective rounds over a borrowed communicator
pub struct PoolCoordinator<'a> {
    comm: &'a dyn Communicator,
}

impl<'a> PoolCoordinator<'a> {
    pub fn new(comm: &'a dyn Communicator) -> Self {
        Self { comm }
    }

    /// One gather / evaluate / scatter round
    ///
    /// `evaluate(slot, point)` is called for every pool slot in rank order. A
    /// non-finite result counts as a failed evaluation.
    pub fn evaluate_round<F>(&self, point: &[f64], mut evaluate: F) -> Result<f64>
    where
        F: FnMut(usize, &[f64]) -> Result<f64>,
    {
        let rank = self.comm.rank();
        let size = self.comm.size();

        let pool = self.comm.all_gather(point.to_vec())?;
        if let Some((slot, p)) = pool.iter().enumerate().find(|(_, p)| p.len() != point.len()) {
            return Err(Error::Collective(format!(
                "rank {} proposed a {}-dimensional point, rank {} a {}-dimensional one",
                slot,
                p.len(),
                rank,
                point.len()
            )));
        }

        let mut results = Vec::with_capacity(size);
        let mut local_failure: Option<Error> = None;
        for (slot, candidate) in pool.iter().enumerate() {
            match evaluate(slot, candidate) {
                Ok(value) if value.is_finite() => results.push(value),
                Ok(value) => {
                    results.push(f64::NAN);
                    local_failure.get_or_insert_with(|| {
                        Error::NonFinite(format!("log-likelihood {} for pool slot {}", value, slot))
                    });
                }
                Err(e) => {
                    results.push(f64::NAN);
                    local_failure.get_or_insert(e);
                }
            }
        }

        let ok = if local_failure.is_none() { 1.0 } else { 0.0 };
        let status = self.comm.all_gather(vec![ok])?;
        let failed: Vec<usize> = status
            .iter()
            .enumerate()
            .filter(|(_, s)| s.first().copied() != Some(1.0))
            .map(|(r, _)| r)
            .collect();
        if !failed.is_empty() {
            let detail = match &local_failure {
                Some(e) => format!("; rank {}: {}", rank, e),
                None => String::new(),
            };
            return Err(Error::Collective(format!(
                "evaluation round failed on ranks {:?}{}",
                failed, detail
            )));
        }

        let chunks = (rank == 0).then(|| results.iter().map(|v| vec![*v]).collect());
        let own = self.comm.scatter(0, chunks)?;
        let value = own.first().copied().ok_or_else(|| {
            Error::Collective(format!("rank {} received an empty result", rank))
        })?;

        if value.to_bits() != results[rank].to_bits() {
            warn!(
                "rank {}: scattered result {} differs from local evaluation {}",
                rank, value, results[rank]
            );
        }
        debug!("rank {}: round over {} slots -> {}", rank, size, value);
        Ok(value)
    }

    /// True on every rank only when `flag` is true on every rank
    pub fn agree_all(&self, flag: bool) -> Result<bool> {
        let votes = self.comm.all_gather(vec![if flag { 1.0 } else { 0.0 }])?;
        Ok(votes.iter().all(|v| v.first().copied() == Some(1.0)))
    }

    /// Rank 0's seed, delivered to every rank
    ///
    /// Sent as two 32-bit halves so the value survives the `f64` payload exactly.
    pub fn broadcast_seed(&self, seed: u64) -> Result<u64> {
        let data = (self.comm.rank() == 0).then(|| {
            vec![(seed >> 32) as f64, (seed & 0xFFFF_FFFF) as f64]
        });
        let halves = self.comm.broadcast(0, data)?;
        match halves.as_slice() {
            [hi, lo] => Ok(((*hi as u64) << 32) | (*lo as u64)),
            _ => Err(Error::Collective(format!(
                "seed broadcast carried {} values, expected 2",
                halves.len()
            ))),
        }
    }
}
