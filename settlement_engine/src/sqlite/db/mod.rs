//! Raw SQL access functions, grouped by table. Everything here works on a
//! `&mut SqliteConnection` so that callers decide the transaction boundaries.

pub mod accounts;
pub mod bindings;
pub mod deliveries;
pub mod events;
