/// Type-state markers for the client builder
///
/// These track at compile time whether the required hub address has been
/// set, so `build()` only exists once it has.
use std::marker::PhantomData;

/// Marker trait for address state
pub trait AddressState {}

/// Address has not been set
pub struct NoAddress;
impl AddressState for NoAddress {}

/// Address has been set
pub struct HasAddress;
impl AddressState for HasAddress {}

/// Phantom marker to prevent direct construction
#[derive(Debug, Clone, Copy)]
pub struct TypeState<A> {
    _address: PhantomData<A>,
}

impl<A> TypeState<A> {
    pub(crate) fn new() -> Self {
        Self {
            _address: PhantomData,
        }
    }
}

impl<A> Default for TypeState<A> {
    fn default() -> Self {
        Self::new()
    }
}
