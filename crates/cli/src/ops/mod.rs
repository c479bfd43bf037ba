pub mod blob;
pub mod init;
pub mod login;
pub mod sign;
pub mod verify_password;
pub mod version;

pub use blob::Blob;
pub use init::Init;
pub use login::Login;
pub use sign::Sign;
pub use verify_password::VerifyPassword;
pub use version::Version;
