pub mod avatar_gateway;

pub use avatar_gateway::{AvatarGateway, DEFAULT_MAX_AGE, DEFAULT_REPLY_TIMEOUT, GatewayConfig};
