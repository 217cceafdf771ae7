/// Type-state markers for the builder pattern
///
/// These types track which required fields have been set in the builder
/// at compile-time, so a channel without a URL or identity cannot be built.

use std::marker::PhantomData;

/// Marker trait for URL state
pub trait UrlState {}

/// URL has not been set
pub struct NoUrl;
impl UrlState for NoUrl {}

/// URL has been set
pub struct HasUrl;
impl UrlState for HasUrl {}

/// Marker trait for identity state
pub trait IdentityState {}

/// Identity has not been set
pub struct NoIdentity;
impl IdentityState for NoIdentity {}

/// Identity has been set
pub struct HasIdentity;
impl IdentityState for HasIdentity {}

/// Phantom marker to prevent direct construction
#[derive(Debug, Clone, Copy)]
pub struct TypeState<U, I> {
    _url: PhantomData<U>,
    _identity: PhantomData<I>,
}

impl<U, I> TypeState<U, I> {
    pub(crate) fn new() -> Self {
        Self {
            _url: PhantomData,
            _identity: PhantomData,
        }
    }
}

impl<U, I> Default for TypeState<U, I> {
    fn default() -> Self {
        Self::new()
    }
}
