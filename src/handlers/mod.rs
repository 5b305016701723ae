//! HTTP handlers. Each handler parses the request, calls one service
//! operation and renders the result; business rules live in `services`.

pub mod common;
pub mod items;
pub mod locations;
pub mod suppliers;
pub mod transactions;
