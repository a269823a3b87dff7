//! Structs which are saved in JSON format in the repository

pub(crate) mod configfile;
pub(crate) mod snapshotfile;
