#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Networking: peer scoring used by the peer server's connection manager.

pub mod peer_score;
