//! Ensemble pooling across ranks
//!
//! Inside one pool-slot evaluation every rank simulates its own ensemble, then the
//! ensembles are all-gathered so the likelihood sees `W·E` realizations, ordered
//! by rank and then by realization index.
//!
//! **Payload:** `[status, key₀ realizations…, key₁ realizations…]` with status `1`
//! for success. A failed rank sends `[0]`; it still takes part in the gather so the
//! other ranks never wait on it.

use crate::comm::Communicator;
use imgn_common::{Error, Measurements, ObservableKey, Result, Simulations};

const OK: f64 = 1.0;
const FAILED: f64 = 0.0;

/// All-gather local ensembles into the pooled ensemble (exactly one collective)
pub fn pool_ensembles(
    comm: &dyn Communicator,
    keys: &[ObservableKey],
    measurements: &Measurements,
    ensemble_size: usize,
    local: Result<Simulations>,
) -> Result<Simulations> {
    let (payload, local_error) = match &local {
        Ok(simulations) => {
            let mut payload = vec![OK];
            for key in keys {
                payload.extend(simulations.flatten(key));
            }
            (payload, None)
        }
        Err(e) => (vec![FAILED], Some(e.to_string())),
    };

    let gathered = comm.all_gather(payload)?;

    let failed: Vec<usize> = gathered
        .iter()
        .enumerate()
        .filter(|(_, p)| p.first().copied() != Some(OK))
        .map(|(r, _)| r)
        .collect();
    if !failed.is_empty() {
        let detail = local_error
            .map(|e| format!("; rank {}: {}", comm.rank(), e))
            .unwrap_or_default();
        return Err(Error::Collective(format!(
            "ensemble simulation failed on ranks {:?}{}",
            failed, detail
        )));
    }

    let widths: Vec<usize> = keys
        .iter()
        .map(|key| {
            measurements
                .get(key)
                .map(|m| m.len())
                .ok_or_else(|| Error::UnknownObservable(key.clone()))
        })
        .collect::<Result<_>>()?;
    let expected_len = 1 + ensemble_size * widths.iter().sum::<usize>();

    let mut pooled = Simulations::new();
    for (rank, payload) in gathered.iter().enumerate() {
        if payload.len() != expected_len {
            return Err(Error::Collective(format!(
                "rank {} sent {} ensemble values, expected {}",
                rank,
                payload.len(),
                expected_len
            )));
        }

        let mut offset = 1;
        for (key, &width) in keys.iter().zip(&widths) {
            let count = ensemble_size * width;
            pooled.push_flat(key, &payload[offset..offset + count], width)?;
            offset += count;
        }
    }
    Ok(pooled)
}
