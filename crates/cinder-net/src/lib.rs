//! # cinder-net
//!
//! The network layer of Cinder: a tokio TCP server that owns one
//! [`SaController`](cinder_search::SaController) and serializes every
//! operation on it, plus the stateless client stub worker processes use to
//! request candidates and report rewards.

mod client;
mod server;

pub use client::SearchClient;
pub use server::{SearchServer, ServerConfig};
