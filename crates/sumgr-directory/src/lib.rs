mod directory;
mod grouping;
mod join;
mod lookup;
mod naming;
mod policy;
mod profile_store;
mod search;

pub use directory::{AppDirectory, DirectoryOptions, RefreshMode, RefreshOutcome};
pub use grouping::{build_groups, patch_groups, patch_records};
pub use lookup::RecordLookup;
pub use naming::{OwnerNaming, SharedUidNaming};
pub use policy::{
    CaseFoldCollator, LabelCollator, compare_groups, compare_members, filter_and_sort,
    group_rank, is_visible, record_rank,
};
pub use profile_store::{MemoryProfileStore, ProfileExport, ProfileStore};
pub use search::build_search;

pub use sumgr_contracts::{AppError, AppResult, ResultExt};
