//! Unique, monotonic, human-readable document numbers backed by a transactional store.
//!
//! A [`storage::StoreSequenceGenerator`] turns a sequence name such as
//! `"SalesInvoice"` into the next formatted number (`"SAL000001"`), keeping
//! one counter row per name in a [`contracts::SequenceStore`].

pub mod contracts;
pub mod metrics;
pub mod storage;
