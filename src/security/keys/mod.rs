/*!
 * Native Keys
 *
 * Key pairs whose two facets share one provider context and key handle.
 * The shared allocation is counted: it is released by whichever facet
 * lets go last, exactly once regardless of order.
 */

mod handles;
mod pair;

pub use handles::{KeyBackend, NativeKeyHandles};
pub use pair::{FacetKind, KeyFacet, KeyPair, PrivateKey, PublicKey};
