//! Cardlog - timing tables from smartcard credential benchmark logs
//!
//! This library scans the logs written while a card issues and presents
//! credentials, books every command's duration as protocol work or
//! transfer overhead per (credential count, disclosed attributes), and
//! renders averaged tables ready for a LaTeX write-up.

pub mod aggregate;
pub mod apdu;
pub mod classify;
pub mod cli;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod report;
pub mod scanner;
pub mod variant;
