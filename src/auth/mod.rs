pub mod extractors;
pub mod password;
pub mod recovery;
pub mod role;
pub mod secret;
pub mod token;
