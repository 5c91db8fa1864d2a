//! Captive-portal voucher payments over M-Pesa STK push.
//!
//! A customer is charged through the Daraja STK push API, the asynchronous
//! callback is reconciled exactly once, and a successful payment becomes a
//! single-use, time-limited network access voucher.

pub mod api;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod services;
