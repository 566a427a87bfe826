pub(crate) mod check;
pub(crate) mod log;
pub(crate) mod meta;
pub(crate) mod migrate;
pub(crate) mod report;
pub(crate) mod shared;
pub(crate) mod stats;
pub(crate) mod sync;
