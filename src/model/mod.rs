//! Data models for account synchronization.
//!
//! This module contains the fixed record schema:
//! - [`AccountField`] - the closed, ordered field list
//! - [`Row`] - a raw decoded line keyed by column
//! - [`Record`] - a validated, normalized account
//! - [`AnnualRevenue`] - grouped-decimal normalization

pub mod account;
pub mod revenue;
pub mod row;

pub use account::{AccountField, FIELD_COUNT, FieldValue, FieldWarning, Operation, Record};
pub use revenue::{AnnualRevenue, Decimal};
pub use row::Row;
