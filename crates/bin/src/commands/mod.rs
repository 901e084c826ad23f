pub mod callback;
pub mod reset_password;
pub mod sign_in;
pub mod sign_out;
pub mod watch;
