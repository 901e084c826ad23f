//! Constants used throughout the fitsync library.
//!
//! Cache key prefixes, redirect parameter names and the default time bounds
//! live here so the engine, the callback handler and the adapters agree on them.

/// Prefix of every profile entry written to the local key/value store.
pub const PROFILE_CACHE_PREFIX: &str = "fitsync:profile:";

/// Default bound on the callback redirect flow, in milliseconds.
pub const DEFAULT_REDIRECT_TIMEOUT_MS: u64 = 15_000;

/// Default bound on `sign_in_with_password` waiting for profile resolution.
pub const DEFAULT_SIGN_IN_TIMEOUT_MS: u64 = 10_000;

/// Redirect parameter carrying the access token.
pub const PARAM_ACCESS_TOKEN: &str = "access_token";

/// Redirect parameter carrying the refresh token.
pub const PARAM_REFRESH_TOKEN: &str = "refresh_token";

/// Redirect parameter carrying the flow type (`signup`, `recovery`, ...).
pub const PARAM_FLOW_TYPE: &str = "type";

/// Redirect parameter carrying a provider error code.
pub const PARAM_ERROR: &str = "error";

/// Redirect parameter carrying a provider error description.
pub const PARAM_ERROR_DESCRIPTION: &str = "error_description";

/// Parameters stripped from the visible location once a redirect is consumed.
pub const SENSITIVE_PARAMS: &[&str] = &[
    PARAM_ACCESS_TOKEN,
    PARAM_REFRESH_TOKEN,
    PARAM_FLOW_TYPE,
    "expires_in",
    "expires_at",
    "token_type",
    "provider_token",
    "provider_refresh_token",
    "code",
    PARAM_ERROR,
    "error_code",
    PARAM_ERROR_DESCRIPTION,
];

/// Message published when an authenticated subject has no profile row.
pub const INVALID_ACCOUNT_MESSAGE: &str = "Invalid account: no profile exists for this user";
