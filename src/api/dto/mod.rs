//! Data Transfer Objects for REST request/response serialization.
//!
//! Wei amounts are serialized as JSON strings to prevent precision loss
//! on u128 values.

pub mod appointment_dto;
pub mod common_dto;
pub mod escrow_dto;

pub use appointment_dto::*;
pub use common_dto::*;
pub use escrow_dto::*;
