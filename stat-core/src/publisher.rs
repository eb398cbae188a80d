//! `Publisher`: the capability set `Processor` dispatches to after a
//! segment has finished computing. Replaces virtual publisher inheritance
//! with a plain trait object set registered on `Processor`.

use crate::errors::Result;
use crate::storage::Storage;

/// Anything that can consume a finished `Storage` snapshot.
pub trait Publisher {
    fn publish(&mut self, storage: &Storage) -> Result<()>;
}
