/*
 * Responsibility
 * - Bearer token authentication against a remote identity provider
 * - keyset: rotating signing key cache; verifier: ordered token checks
 * - discovery: resolve the provider's JWKS endpoint at startup
 */
pub mod discovery;
pub mod keyset;
pub mod principal;
pub mod verifier;

#[cfg(test)]
pub(crate) mod test_keys;

pub use discovery::discover_jwks_uri;
pub use keyset::{HttpKeySource, KeySetCache, KeySetPolicy};
pub use principal::Principal;
pub use verifier::{AuthError, TokenVerifier};
