//!  Storage is organized through [time_store::TimeStore].
//!  The basic idea is:
//!   - There is a single document mapping a domain to its [entities::DomainRecord].
//!   - Every change is a read-modify-write of that document, serialized by the store.
//!   - Records keep all-time seconds plus per local day seconds and visit counts.

pub mod entities;
pub mod memory;
pub mod time_store;
