/*!
 * Key Pairs
 *
 * A private and a public facet over one native key allocation. The
 * facets are independent owners: either may be closed or dropped first,
 * on any thread. The allocation outlives both.
 */

use super::handles::{FacetCloser, KeyBackend, NativeKeyHandles};
use crate::core::errors::{HandleError, HandleResult};
use crate::core::guard::GuardState;
use crate::core::types::RawHandle;
use crate::monitoring::Category;
use crate::registry::{CleanupSlot, HandleOwner, HandleOwnerRegistry};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const FACETS_PER_PAIR: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacetKind {
    Private,
    Public,
}

impl FacetKind {
    fn resource_type(self) -> &'static str {
        match self {
            FacetKind::Private => "private_key",
            FacetKind::Public => "public_key",
        }
    }
}

impl fmt::Display for FacetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacetKind::Private => write!(f, "Private"),
            FacetKind::Public => write!(f, "Public"),
        }
    }
}

/// One owner of a shared key allocation
pub struct KeyFacet {
    kind: FacetKind,
    algorithm: Arc<str>,
    key_length: u32,
    shared: Arc<NativeKeyHandles>,
    registry: HandleOwnerRegistry,
    closed: AtomicBool,
    slot: CleanupSlot,
}

impl KeyFacet {
    fn new(
        kind: FacetKind,
        algorithm: Arc<str>,
        key_length: u32,
        shared: Arc<NativeKeyHandles>,
        registry: &HandleOwnerRegistry,
    ) -> HandleResult<Self> {
        let registry = registry
            .derive(Arc::new(FacetCloser::new(Arc::clone(&shared))))
            .with_resource_type(kind.resource_type(), Category::Key);

        let facet = Self {
            kind,
            algorithm,
            key_length,
            shared,
            registry,
            closed: AtomicBool::new(false),
            slot: CleanupSlot::new(),
        };
        facet.registry.register(Some(&facet))?;
        Ok(facet)
    }

    #[inline]
    pub fn kind(&self) -> FacetKind {
        self.kind
    }

    #[inline]
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Key size in bits
    #[inline]
    pub fn key_length(&self) -> u32 {
        self.key_length
    }

    #[inline]
    pub fn key_handle(&self) -> RawHandle {
        self.shared.key()
    }

    #[inline]
    pub fn provider_handle(&self) -> RawHandle {
        self.shared.provider()
    }

    pub fn shared(&self) -> &Arc<NativeKeyHandles> {
        &self.shared
    }

    pub fn guard_state(&self) -> Option<GuardState> {
        self.slot.state()
    }

    /// Native keys have no exportable encoding
    pub fn format(&self) -> Option<&str> {
        None
    }

    pub fn encoded(&self) -> Option<Vec<u8>> {
        None
    }

    /// Release this facet's hold on the allocation
    ///
    /// Idempotent. Whichever facet closes last destroys the key and
    /// releases the provider.
    pub fn close(&self) -> HandleResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.registry.close_owner(self).map(|_| ())
    }

    fn describe(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}Key [size={} bits, type={}, container={:#x}]",
            self.algorithm,
            self.kind,
            self.key_length,
            self.kind.resource_type(),
            self.shared.provider()
        )
    }
}

impl HandleOwner for KeyFacet {
    fn raw_handle(&self) -> RawHandle {
        self.shared.key()
    }

    fn cleanup_slot(&self) -> &CleanupSlot {
        &self.slot
    }
}

impl fmt::Debug for KeyFacet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyFacet")
            .field("kind", &self.kind)
            .field("algorithm", &self.algorithm)
            .field("key_length", &self.key_length)
            .field("shared", &self.shared)
            .field("guard", &self.guard_state())
            .finish()
    }
}

macro_rules! key_facet_newtype {
    ($name:ident) => {
        #[derive(Debug)]
        pub struct $name(KeyFacet);

        impl $name {
            pub fn into_facet(self) -> KeyFacet {
                self.0
            }
        }

        impl Deref for $name {
            type Target = KeyFacet;

            fn deref(&self) -> &KeyFacet {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.describe(f)
            }
        }
    };
}

key_facet_newtype!(PrivateKey);
key_facet_newtype!(PublicKey);

/// Private and public facet over one native key
///
/// # Example
///
/// ```ignore
/// let pair = KeyPair::new("RSA", provider, key, 2048, backend, &registry)?;
/// let (private, public) = pair.into_parts();
/// drop(public);
/// private.close()?; // key and provider released here
/// ```
#[derive(Debug)]
pub struct KeyPair {
    private: PrivateKey,
    public: PublicKey,
}

impl KeyPair {
    pub fn new(
        algorithm: impl Into<Arc<str>>,
        provider: impl Into<RawHandle>,
        key: impl Into<RawHandle>,
        key_length: u32,
        backend: Arc<dyn KeyBackend>,
        registry: &HandleOwnerRegistry,
    ) -> HandleResult<Self> {
        let provider = provider.into();
        let key = key.into();
        if !provider.is_valid() {
            return Err(HandleError::InvalidHandle(provider));
        }
        if !key.is_valid() {
            return Err(HandleError::InvalidHandle(key));
        }

        let algorithm = algorithm.into();
        let shared = Arc::new(NativeKeyHandles::new(
            provider,
            key,
            FACETS_PER_PAIR,
            backend,
            registry.options().collector.clone(),
        ));

        let private = KeyFacet::new(
            FacetKind::Private,
            Arc::clone(&algorithm),
            key_length,
            Arc::clone(&shared),
            registry,
        )
        .inspect_err(|_| abandon_holds(&shared, FACETS_PER_PAIR))?;

        let public = KeyFacet::new(
            FacetKind::Public,
            algorithm,
            key_length,
            Arc::clone(&shared),
            registry,
        )
        .inspect_err(|_| {
            // The tracker may be gone, so the private hold goes through the explicit path
            if let Err(e) = private.close() {
                log::error!("Releasing private facet of key {} failed: {}", shared.key(), e);
            }
            abandon_holds(&shared, 1);
        })?;

        Ok(Self {
            private: PrivateKey(private),
            public: PublicKey(public),
        })
    }

    #[inline]
    pub fn private(&self) -> &PrivateKey {
        &self.private
    }

    #[inline]
    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    pub fn shared(&self) -> &Arc<NativeKeyHandles> {
        self.private.shared()
    }

    pub fn into_parts(self) -> (PrivateKey, PublicKey) {
        (self.private, self.public)
    }
}

/// Drop holds no facet will ever own
fn abandon_holds(shared: &NativeKeyHandles, holds: usize) {
    for _ in 0..holds {
        if let Err(e) = shared.release_hold() {
            log::error!("Releasing abandoned key {} failed: {}", shared.key(), e);
        }
    }
}
