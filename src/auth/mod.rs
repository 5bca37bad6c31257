mod claims;
mod extractors;
mod jwt;

pub use extractors::Operator;
pub use jwt::JwtKeys;
