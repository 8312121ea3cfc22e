//! Domain action handlers, one module per in-scope concern. `ticket` stands
//! in as the one fully wired example action family the dispatcher routes
//! to; the hundreds of other domain CRUD endpoints follow the same
//! mechanical contract.

pub mod ticket;
