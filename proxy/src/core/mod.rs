pub mod bcast;
pub mod ic;
pub mod metasync;
pub mod notifs;
pub mod routes;
pub mod state;
pub mod txn;
