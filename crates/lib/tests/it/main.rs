/*! Integration tests for fitsync.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * The module structure mirrors the main library structure:
 * - engine: The session engine against the in-memory backends
 * - callback: The redirect callback flow, mostly on paused time
 * - cache: Profile cache persistence across engine remounts
 * - http: The REST adapters against a local mock server
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("fitsync=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod cache;
mod http;
