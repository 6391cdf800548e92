//! The reconciliation engine: everything between the exchange and the
//! published snapshot.

pub mod ledger;
pub mod market;
pub mod oracle;
pub mod reconciler;
pub mod supervisor;
