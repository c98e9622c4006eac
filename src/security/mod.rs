/*!
 * Security Module
 * Native cryptographic key handles
 */

pub mod keys;

// Re-export for convenience
pub use keys::{FacetKind, KeyBackend, KeyFacet, KeyPair, NativeKeyHandles, PrivateKey, PublicKey};
