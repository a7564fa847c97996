/// Persistence layer for the task map
///
/// The scheduler keeps all task state in memory and periodically hands the
/// whole map, serialised as one blob, to a [`PersistenceStore`]:
///
/// - [`FjallStore`] keeps the blob in an embedded Fjall keyspace
/// - [`MemoryStore`] keeps it in process (tests, ephemeral runs)
///
/// The blob format and crash-recovery rules live in [`snapshot`]. Loading a
/// blob never resurrects in-flight work: downloading tasks come back paused
/// and downloading chapters come back pending.
///
/// ## Usage
///
/// ```rust,ignore
/// use novelbox::ledger::{FjallStore, PersistenceStore, snapshot};
///
/// let store = FjallStore::open("data/ledger")?;
/// store.save(&snapshot::encode(tasks.iter())?)?;
/// let tasks = store.load()?.map(|blob| snapshot::decode(&blob)).transpose()?;
/// ```

pub mod error;
pub mod partitions;
pub mod snapshot;
pub mod store;

pub use error::{LedgerError, Result};
pub use store::{FjallStore, MemoryStore, PersistenceStore};
