//! Snapshot ingestion: discovery, worksheet parsing, header normalization and consolidation.

pub mod consolidator;
pub mod discovery;
pub mod normalize;
pub mod sheet_reader;

pub use consolidator::{FileLoadFailure, LoadReport, TableConsolidator};
pub use discovery::{discover_snapshots, latest_snapshot, DateSource, Discovery, SnapshotFile};
