//! # Distributed Evaluation
//!
//! Ranks cooperate only through collective operations on a [`Communicator`]:
//! all-gather, broadcast and scatter of `f64` payloads. Every rank must issue the
//! same collectives in the same order; a rank that leaves early turns into a
//! `Collective` error on its peers, never a hang.
//!
//! - [`SoloCommunicator`]: single process, collectives are identities
//! - [`ThreadGroup`]: in-process ranks on OS threads linked by channels
//! - [`PoolCoordinator`]: gather / redundant-evaluate / scatter rounds built on top

pub mod coordinator;
pub mod thread_group;

pub use coordinator::PoolCoordinator;
pub use thread_group::{ThreadCommunicator, ThreadGroup};

use imgn_common::{Error, Result};

/// Collective message passing between the ranks of one run
pub trait Communicator: Send {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Every rank contributes `data`; every rank receives all contributions in rank order
    fn all_gather(&self, data: Vec<f64>) -> Result<Vec<Vec<f64>>>;

    /// `root` supplies `data`; every rank receives it
    fn broadcast(&self, root: usize, data: Option<Vec<f64>>) -> Result<Vec<f64>>;

    /// `root` supplies one chunk per rank; rank `r` receives chunk `r`
    fn scatter(&self, root: usize, chunks: Option<Vec<Vec<f64>>>) -> Result<Vec<f64>>;
}

/// Communicator for a run with a single rank
#[derive(Debug, Clone, Copy, Default)]
pub struct SoloCommunicator;

impl SoloCommunicator {
    pub fn new() -> Self {
        Self
    }
}

impl Communicator for SoloCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_gather(&self, data: Vec<f64>) -> Result<Vec<Vec<f64>>> {
        Ok(vec![data])
    }

    fn broadcast(&self, root: usize, data: Option<Vec<f64>>) -> Result<Vec<f64>> {
        check_root(root, 1)?;
        data.ok_or_else(|| Error::Collective("broadcast root supplied no data".to_string()))
    }

    fn scatter(&self, root: usize, chunks: Option<Vec<Vec<f64>>>) -> Result<Vec<f64>> {
        check_root(root, 1)?;
        let chunks =
            chunks.ok_or_else(|| Error::Collective("scatter root supplied no data".to_string()))?;
        check_chunks(&chunks, 1)?;
        Ok(chunks.into_iter().next().unwrap_or_default())
    }
}

pub(crate) fn check_root(root: usize, size: usize) -> Result<()> {
    if root >= size {
        return Err(Error::Collective(format!(
            "root rank {} outside group of size {}",
            root, size
        )));
    }
    Ok(())
}

pub(crate) fn check_chunks(chunks: &[Vec<f64>], size: usize) -> Result<()> {
    if chunks.len() != size {
        return Err(Error::Collective(format!(
            "scatter needs {} chunks, root supplied {}",
            size,
            chunks.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solo_collectives() {
        let comm = SoloCommunicator::new();
        assert_eq!(comm.all_gather(vec![1.0, 2.0]).unwrap(), vec![vec![1.0, 2.0]]);
        assert_eq!(comm.broadcast(0, Some(vec![3.0])).unwrap(), vec![3.0]);
        assert_eq!(comm.scatter(0, Some(vec![vec![4.0]])).unwrap(), vec![4.0]);
    }

    #[test]
    fn test_solo_rejects_bad_root() {
        let comm = SoloCommunicator::new();
        assert!(matches!(comm.broadcast(1, Some(vec![])), Err(Error::Collective(_))));
        assert!(comm.scatter(0, Some(vec![vec![], vec![]])).is_err());
    }
}
