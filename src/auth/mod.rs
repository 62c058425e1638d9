// Credential verification and tenant resolution.

pub mod resolver;
pub mod token;

pub use resolver::{ActorContext, TenantResolver};
pub use token::{Claims, TokenError, TokenIssuer};
