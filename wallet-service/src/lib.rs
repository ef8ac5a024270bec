//! Wallet Service - teacher payment accrual, monthly disbursement and reversal.

pub mod config;
pub mod handlers;
pub mod models;
pub mod payments;
pub mod scheduler;
pub mod services;
pub mod startup;
