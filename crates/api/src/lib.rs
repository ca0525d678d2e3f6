//! HTTP front end for the purchase-order and supplier services.
//!
//! - `app::routes`: one module per resource (orders, products, suppliers, simulation)
//! - `app::dto`: request bodies and JSON views of the domain records
//! - `app::errors`: mapping of service failures onto HTTP statuses

pub mod app;
