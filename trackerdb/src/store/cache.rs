use crate::storable::Storable;
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// A stable reference to a cached object: its id, tagged with its type.
/// Handles stay valid however much the cache grows; they go stale only when
/// the object is deleted.
pub struct Handle<T> {
    id: i64,
    _type: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub(crate) fn new(id: i64) -> Self {
        Handle {
            id,
            _type: PhantomData,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle<{}>({})", crate::storable::type_to_string::<T>(), self.id)
    }
}

/// Live instances of one Storable type, keyed by id
pub(crate) struct Cache<T> {
    objects: BTreeMap<i64, T>,
}

impl<T> Default for Cache<T> {
    fn default() -> Self {
        Cache {
            objects: BTreeMap::new(),
        }
    }
}

impl<T: Storable> Cache<T> {
    pub fn insert(&mut self, object: T) -> Handle<T> {
        let id = object.id();
        self.objects.insert(id, object);
        Handle::new(id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn get(&self, id: i64) -> Option<&T> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: i64) -> Option<&mut T> {
        self.objects.get_mut(&id)
    }

    pub fn remove(&mut self, id: i64) -> Option<T> {
        self.objects.remove(&id)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(i64) -> bool) {
        self.objects.retain(|id, _| keep(*id));
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.objects.values()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }
}

/// One [`Cache`] per Storable type
#[derive(Default)]
pub(crate) struct Caches {
    by_type: HashMap<TypeId, Box<dyn Any>>,
}

impl Caches {
    pub fn get<T: Storable>(&self) -> Option<&Cache<T>> {
        self.by_type
            .get(&TypeId::of::<T>())
            .and_then(|c| c.downcast_ref::<Cache<T>>())
    }

    pub fn get_mut<T: Storable>(&mut self) -> &mut Cache<T> {
        self.by_type
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(Cache::<T>::default()))
            .downcast_mut::<Cache<T>>()
            .expect("caches are keyed by the TypeId of their contents")
    }
}
