//! Application layer with the gateway use case, its services and DTOs.

/// Data transfer objects.
pub mod dto;
/// Stateful building blocks used by the gateway.
pub mod services;
/// Use case implementations.
pub mod use_cases;

pub use dto::{ProfileReply, ReplyOutcome};
pub use use_cases::{AvatarGateway, GatewayConfig};
