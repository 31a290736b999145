//! In-process rank group
//!
//! **Purpose:** Run `size` ranks on OS threads of one process with the same
//! collective semantics as a multi-process group. Used by the command-line driver
//! and by tests of the distributed code paths.
//!
//! **Wiring:** One unbounded channel per ordered rank pair `(src, dst)`. Each pair
//! is FIFO and all ranks issue collectives in the same order, so the next message
//! on a pair always belongs to the collective being executed. Sends never block;
//! receives wait at most the configured timeout.

use super::{check_chunks, check_root, Communicator};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use imgn_common::{Error, Result};
use std::thread;
use std::time::Duration;
use tracing::{debug, error};

/// One rank's endpoint in a [`ThreadGroup`]
#[derive(Debug)]
pub struct ThreadCommunicator {
    rank: usize,
    size: usize,
    /// `senders[dst]` delivers to rank `dst`
    senders: Vec<Sender<Vec<f64>>>,
    /// `receivers[src]` yields messages from rank `src`
    receivers: Vec<Receiver<Vec<f64>>>,
    timeout: Duration,
}

impl ThreadCommunicator {
    fn send(&self, dst: usize, data: Vec<f64>) -> Result<()> {
        self.senders[dst].send(data).map_err(|_| {
            Error::Collective(format!("rank {} cannot reach rank {}: disconnected", self.rank, dst))
        })
    }

    fn recv(&self, src: usize) -> Result<Vec<f64>> {
        self.receivers[src]
            .recv_timeout(self.timeout)
            .map_err(|e| match e {
                RecvTimeoutError::Timeout => Error::Collective(format!(
                    "rank {} timed out after {:?} waiting for rank {}",
                    self.rank, self.timeout, src
                )),
                RecvTimeoutError::Disconnected => Error::Collective(format!(
                    "rank {} lost rank {}: peer left the group",
                    self.rank, src
                )),
            })
    }
}

impl Communicator for ThreadCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_gather(&self, data: Vec<f64>) -> Result<Vec<Vec<f64>>> {
        for dst in (0..self.size).filter(|&d| d != self.rank) {
            self.send(dst, data.clone())?;
        }

        let mut gathered = Vec::with_capacity(self.size);
        for src in 0..self.size {
            if src == self.rank {
                gathered.push(data.clone());
            } else {
                gathered.push(self.recv(src)?);
            }
        }
        Ok(gathered)
    }

    fn broadcast(&self, root: usize, data: Option<Vec<f64>>) -> Result<Vec<f64>> {
        check_root(root, self.size)?;
        if self.rank != root {
            return self.recv(root);
        }

        let data =
            data.ok_or_else(|| Error::Collective("broadcast root supplied no data".to_string()))?;
        for dst in (0..self.size).filter(|&d| d != root) {
            self.send(dst, data.clone())?;
        }
        Ok(data)
    }

    fn scatter(&self, root: usize, chunks: Option<Vec<Vec<f64>>>) -> Result<Vec<f64>> {
        check_root(root, self.size)?;
        if self.rank != root {
            return self.recv(root);
        }

        let chunks =
            chunks.ok_or_else(|| Error::Collective("scatter root supplied no data".to_string()))?;
        check_chunks(&chunks, self.size)?;

        let mut own = Vec::new();
        for (dst, chunk) in chunks.into_iter().enumerate() {
            if dst == root {
                own = chunk;
            } else {
                self.send(dst, chunk)?;
            }
        }
        Ok(own)
    }
}

/// A group of in-process ranks
#[derive(Debug)]
pub struct ThreadGroup {
    communicators: Vec<ThreadCommunicator>,
}

impl ThreadGroup {
    /// Wire up `size` ranks; receives give up after `timeout`
    pub fn new(size: usize, timeout: Duration) -> Result<Self> {
        if size == 0 {
            return Err(Error::Config("thread group needs at least one rank".to_string()));
        }

        // channels[src][dst]
        let mut senders: Vec<Vec<Sender<Vec<f64>>>> = Vec::with_capacity(size);
        let mut receivers: Vec<Vec<Option<Receiver<Vec<f64>>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
        for src in 0..size {
            let mut row = Vec::with_capacity(size);
            for dst in 0..size {
                let (tx, rx) = unbounded();
                row.push(tx);
                receivers[dst][src] = Some(rx);
            }
            senders.push(row);
        }

        let communicators = senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (senders, receivers))| ThreadCommunicator {
                rank,
                size,
                senders,
                receivers: receivers.into_iter().flatten().collect(),
                timeout,
            })
            .collect();

        Ok(Self { communicators })
    }

    pub fn size(&self) -> usize {
        self.communicators.len()
    }

    /// Hand the endpoints out for manual thread management
    pub fn into_communicators(self) -> Vec<ThreadCommunicator> {
        self.communicators
    }

    /// Run `task` once per rank on its own thread and collect results in rank order
    ///
    /// A rank that panics is reported as a `Collective` error for that rank; its
    /// peers see it leave the group.
    pub fn run<T, F>(self, task: F) -> Vec<Result<T>>
    where
        T: Send,
        F: Fn(ThreadCommunicator) -> Result<T> + Sync,
    {
        let task = &task;
        thread::scope(|scope| {
            let handles: Vec<_> = self
                .communicators
                .into_iter()
                .map(|comm| {
                    let rank = comm.rank;
                    let handle = thread::Builder::new()
                        .name(format!("imgn-rank-{}", rank))
                        .spawn_scoped(scope, move || task(comm));
                    (rank, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(rank, handle)| match handle {
                    Ok(handle) => match handle.join() {
                        Ok(result) => {
                            if let Err(e) = &result {
                                debug!("rank {} finished with error: {}", rank, e);
                            }
                            result
                        }
                        Err(_) => {
                            error!("rank {} panicked", rank);
                            Err(Error::Collective(format!("rank {} panicked", rank)))
                        }
                    },
                    Err(e) => Err(Error::Collective(format!(
                        "failed to spawn rank {}: {}",
                        rank, e
                    ))),
                })
                .collect()
        })
    }
}
