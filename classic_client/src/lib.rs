//! `classic_client`
//!
//! Headless client for the classic protocol: identification, CPE
//! negotiation, level download and block/chat traffic.

pub mod client;

pub use client::{ClassicClient, ClientOptions, ClientState};
