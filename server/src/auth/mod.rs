pub mod gate;
pub mod jwt;
pub mod login;

pub use gate::AuthError;
pub use jwt::{Claims, SigningKeys};
pub use login::AccountStore;
