//! Service Manager: stages service job groups and tracks their liveness
//! (`spec.md` §4.4), grounded on `ServiceManager` in
//! `original_source/src/toil/leader.py`.

mod error;
mod manager;

pub use error::ServiceManagerError;
pub use manager::{spawn, ServiceManagerHandle};
