//! Desk client for customer-service agents of a Tanzanite WordPress shop:
//! conversations with visitors, plus order and product lookup.

pub mod api;
pub mod app;
pub mod format;
pub mod logging;
pub mod session;
pub mod storage;
pub mod sync;
pub mod utils;

#[cfg(test)]
mod test_support;

#[cfg(feature = "gui")]
pub mod ui;
