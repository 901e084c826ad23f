//! REST adapter tests against a local mock of the auth and REST APIs

mod auth;
mod mock;
mod profile;
