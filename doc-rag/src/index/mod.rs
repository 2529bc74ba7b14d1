//! Vector index: flat L2 search, persisted generations and the build path.

pub mod builder;
pub mod flat;
pub mod lock;
pub mod store;

pub use builder::{BuildOutput, BuildReport, IndexBuilder};
pub use flat::FlatL2Index;
pub use lock::BuildLock;
pub use store::{IndexSnapshot, MetadataStore, StoreLayout, StoreSummary};
