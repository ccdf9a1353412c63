//! Infrastructure layer: event storage, dispatch, projections and the stock
//! workflows built on them.

pub mod command_dispatcher;
pub mod event_store;
pub mod locks;
pub mod projections;
pub mod read_model;
pub mod reconciliation;
pub mod stock_control;
pub mod streams;
pub mod workers;
