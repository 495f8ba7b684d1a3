//! Data-quality backend library
//!
//! Rule engine (catalog, evaluator, predicate compiler), the resilient
//! data-access layer in front of the primary/legacy stores, and the service
//! facade consumed by the HTTP layer and tests.

pub mod api;
pub mod availability;
pub mod config;
pub mod fatca;
pub mod gateway;
pub mod models;
pub mod queries;
pub mod rules;
pub mod service;
pub mod store;
