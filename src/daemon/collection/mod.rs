//! Producers of tracker messages: the [adapter::EventAdapter] turns browser signals into
//! tracker inputs and the [tick::TickDriver] keeps the running session up to date.

pub mod adapter;
pub mod tick;
