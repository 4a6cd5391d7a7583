//! The `Resource` trait implemented by every stored kind

use crate::meta::{ObjectKey, ObjectMeta, OwnerReference};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A kind that can be persisted in a resource store
pub trait Resource:
    Clone + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Kind name used as the store's type discriminator
    const KIND: &'static str;

    fn metadata(&self) -> &ObjectMeta;

    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    fn key(&self) -> ObjectKey {
        self.metadata().key()
    }

    /// Controller owner reference pointing at this object
    fn owner_reference(&self) -> OwnerReference {
        let meta = self.metadata();
        OwnerReference {
            kind: Self::KIND.to_string(),
            name: meta.name.clone(),
            uid: meta.uid.clone(),
            controller: true,
        }
    }
}

/// Implements [`Resource`] for a struct with a `metadata: ObjectMeta` field
#[macro_export]
macro_rules! impl_resource {
    ($ty:ty, $kind:literal) => {
        impl $crate::resource::Resource for $ty {
            const KIND: &'static str = $kind;

            fn metadata(&self) -> &$crate::meta::ObjectMeta {
                &self.metadata
            }

            fn metadata_mut(&mut self) -> &mut $crate::meta::ObjectMeta {
                &mut self.metadata
            }
        }
    };
}
