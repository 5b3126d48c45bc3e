pub mod loader;
pub mod types;

pub use loader::{
    list_snapshot_files, load_series, parse_snapshot_filename, LoaderError, SnapshotFile,
    SnapshotStore, REQUIRED_COLUMNS, RESERVED_FILE_NAMES,
};
pub use types::{OptionSide, ParseSideError, SideSelection, Snapshot, SnapshotSeries, StrikeRow};
