//! Transaction object tracking read/write sets and a commit state machine.
//!
//! The engine's actual isolation enforcement is limited to read-committed
//! through its write lock; the higher levels are carried on the object for
//! future multi-version support. Commit and abort are state transitions
//! only and never touch graph data.

use crate::{Error, Result};
use nendb_api::NodeId;
use std::collections::HashSet;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Active,
    Preparing,
    Committed,
    Aborted,
}

#[derive(Debug)]
pub struct Transaction {
    id: u64,
    isolation: IsolationLevel,
    state: TxnState,
    read_set: HashSet<NodeId>,
    write_set: HashSet<NodeId>,
    start_time: Instant,
}

impl Transaction {
    pub fn new(id: u64, isolation: IsolationLevel) -> Self {
        Self {
            id,
            isolation,
            state: TxnState::Active,
            read_set: HashSet::new(),
            write_set: HashSet::new(),
            start_time: Instant::now(),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    #[inline]
    pub fn state(&self) -> TxnState {
        self.state
    }

    #[inline]
    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    pub fn record_read(&mut self, id: NodeId) {
        self.read_set.insert(id);
    }

    pub fn record_write(&mut self, id: NodeId) {
        self.write_set.insert(id);
    }

    pub fn read_set(&self) -> &HashSet<NodeId> {
        &self.read_set
    }

    pub fn write_set(&self) -> &HashSet<NodeId> {
        &self.write_set
    }

    pub fn prepare(&mut self) -> Result<()> {
        match self.state {
            TxnState::Active => {
                self.state = TxnState::Preparing;
                Ok(())
            }
            _ => Err(Error::TxnState("prepare requires an active transaction")),
        }
    }

    pub fn commit(&mut self) -> Result<()> {
        match self.state {
            TxnState::Active | TxnState::Preparing => {
                self.state = TxnState::Committed;
                Ok(())
            }
            _ => Err(Error::TxnState("commit requires an active transaction")),
        }
    }

    pub fn abort(&mut self) -> Result<()> {
        match self.state {
            TxnState::Active | TxnState::Preparing => {
                self.state = TxnState::Aborted;
                Ok(())
            }
            _ => Err(Error::TxnState("abort requires an active transaction")),
        }
    }
}
