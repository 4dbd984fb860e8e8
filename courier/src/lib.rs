//! Shell around [`courier_delivery`]: configuration, request fan-out and
//! response rendering for the `courier` binary

pub mod config;
pub mod controller;
pub mod response;
