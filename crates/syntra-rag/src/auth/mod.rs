//! Authentication: password hashing, JWT issuing and the request extractor

pub mod extractor;
pub mod password;
pub mod service;
pub mod token;

pub use extractor::CurrentUser;
pub use service::AuthService;
pub use token::TokenService;
