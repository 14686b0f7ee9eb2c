// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Object registry.
//!
//! The single piece of state shared by every connection: registered types,
//! live objects indexed by reference id, and the named instances. All
//! bookkeeping happens under one mutex; constructors and object metadata
//! queries run outside it.

use crate::object::{Args, Capabilities, ObjectError, ObjectRef, RemoteObject, TypeDescriptor};
use crate::protocol::{ErrorInfo, ErrorKind, ReferenceHandle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Registry error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown type '{0}'")]
    UnknownType(String),

    #[error("Type '{0}' is already registered")]
    DuplicateType(String),

    #[error("Instance name '{0}' is already bound")]
    DuplicateName(String),

    #[error("Unknown instance name '{0}'")]
    UnknownName(String),

    #[error("Failed to construct '{type_name}': {source}")]
    Construction {
        type_name: String,
        source: ObjectError,
    },

    #[error("Unknown reference {0}")]
    UnknownReference(u64),
}

impl RegistryError {
    /// Wire representation.
    pub fn to_error_info(&self) -> ErrorInfo {
        let message = self.to_string();
        match self {
            Self::UnknownType(_) => ErrorInfo::new(ErrorKind::UnknownType, message),
            Self::DuplicateType(_) => ErrorInfo::new(ErrorKind::DuplicateType, message),
            Self::DuplicateName(_) => ErrorInfo::new(ErrorKind::InvalidRequest, message),
            Self::UnknownName(_) | Self::UnknownReference(_) => {
                ErrorInfo::new(ErrorKind::UnknownReference, message)
            }
            Self::Construction { source, .. } => ErrorInfo {
                kind: ErrorKind::Construction,
                message,
                original_type_name: Some(source.type_tag().to_string()),
            },
        }
    }
}

/// A live object and its bookkeeping.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub reference_id: u64,
    pub object: ObjectRef,
    pub type_name: String,
    pub capabilities: Capabilities,
    /// Outstanding holds. The entry is removed when this reaches zero.
    pub refcount: u32,
    /// Set for named instances.
    pub name: Option<String>,
}

impl RegistryEntry {
    pub fn handle(&self) -> ReferenceHandle {
        ReferenceHandle {
            reference_id: self.reference_id,
            type_name: self.type_name.clone(),
        }
    }
}

#[derive(Debug)]
struct RegistryInner {
    /// Types indexed by name
    types: HashMap<String, Arc<TypeDescriptor>>,

    /// Live objects indexed by reference id
    entries: HashMap<u64, RegistryEntry>,

    /// Object identity -> reference id
    identity_index: HashMap<usize, u64>,

    /// Instance name -> reference id
    names: HashMap<String, u64>,

    next_id: u64,
}

impl RegistryInner {
    fn insert(
        &mut self,
        object: ObjectRef,
        type_name: String,
        capabilities: Capabilities,
    ) -> &mut RegistryEntry {
        let reference_id = self.next_id;
        self.next_id += 1;

        self.identity_index.insert(object.identity(), reference_id);
        self.entries.entry(reference_id).or_insert(RegistryEntry {
            reference_id,
            object,
            type_name,
            capabilities,
            refcount: 1,
            name: None,
        })
    }

    /// Drops `count` holds; returns the remaining count and the removed entry
    /// if it reached zero.
    fn release(
        &mut self,
        reference_id: u64,
        count: u32,
    ) -> Result<(u32, Option<RegistryEntry>), RegistryError> {
        let entry = self
            .entries
            .get_mut(&reference_id)
            .ok_or(RegistryError::UnknownReference(reference_id))?;

        entry.refcount = entry.refcount.saturating_sub(count);
        if entry.refcount > 0 {
            return Ok((entry.refcount, None));
        }

        let removed = self.entries.remove(&reference_id);
        if let Some(entry) = &removed {
            self.identity_index.remove(&entry.object.identity());
            if let Some(name) = &entry.name {
                self.names.remove(name);
            }
        }
        Ok((0, removed))
    }
}

/// Registry of types and live objects.
///
/// Create one per server and share it behind an `Arc`.
#[derive(Debug)]
pub struct ObjectRegistry {
    inner: Mutex<RegistryInner>,
}

impl ObjectRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                types: HashMap::new(),
                entries: HashMap::new(),
                identity_index: HashMap::new(),
                names: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Add a constructible type.
    pub fn register_type(&self, descriptor: TypeDescriptor) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        if inner.types.contains_key(descriptor.name()) {
            return Err(RegistryError::DuplicateType(descriptor.name().to_string()));
        }
        info!("Registered type '{}'", descriptor.name());
        inner
            .types
            .insert(descriptor.name().to_string(), Arc::new(descriptor));
        Ok(())
    }

    pub fn has_type(&self, type_name: &str) -> bool {
        self.inner.lock().types.contains_key(type_name)
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock().types.keys().cloned().collect();
        names.sort();
        names
    }

    /// Construct a registered type and register the instance with one hold.
    pub fn instantiate(&self, type_name: &str, args: Args) -> Result<ReferenceHandle, RegistryError> {
        let descriptor = self
            .inner
            .lock()
            .types
            .get(type_name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownType(type_name.to_string()))?;

        let object = descriptor
            .construct(args)
            .map_err(|source| RegistryError::Construction {
                type_name: type_name.to_string(),
                source,
            })?;

        let mut inner = self.inner.lock();
        let entry = inner.insert(
            ObjectRef::from_boxed(object),
            descriptor.name().to_string(),
            descriptor.capabilities(),
        );
        debug!("Instantiated {} as #{}", entry.type_name, entry.reference_id);
        Ok(entry.handle())
    }

    /// Make an existing object remotely accessible with one hold.
    pub fn register_instance<T: RemoteObject>(&self, object: T) -> ReferenceHandle {
        self.register_or_acquire(&ObjectRef::new(object))
    }

    /// Identity-first registration.
    ///
    /// An object already in the registry gains one hold and keeps its id;
    /// anything else is registered with one hold.
    pub fn register_or_acquire(&self, object: &ObjectRef) -> ReferenceHandle {
        if let Some(handle) = self.acquire_by_identity(object) {
            return handle;
        }

        // Object metadata is read without the registry lock held.
        let (type_name, capabilities) = {
            let obj = object.lock();
            (obj.type_name().to_string(), obj.capabilities())
        };

        let mut inner = self.inner.lock();
        if let Some(&id) = inner.identity_index.get(&object.identity()) {
            if let Some(entry) = inner.entries.get_mut(&id) {
                entry.refcount += 1;
                return entry.handle();
            }
        }
        let entry = inner.insert(object.clone(), type_name, capabilities);
        debug!("Registered {} as #{}", entry.type_name, entry.reference_id);
        entry.handle()
    }

    fn acquire_by_identity(&self, object: &ObjectRef) -> Option<ReferenceHandle> {
        let mut inner = self.inner.lock();
        let id = *inner.identity_index.get(&object.identity())?;
        let entry = inner.entries.get_mut(&id)?;
        entry.refcount += 1;
        Some(entry.handle())
    }

    /// Bind `object` to `name`, pinned by a server-owned hold.
    pub fn register_named(
        &self,
        name: impl Into<String>,
        object: ObjectRef,
    ) -> Result<ReferenceHandle, RegistryError> {
        let name = name.into();
        if self.inner.lock().names.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }

        let handle = self.register_or_acquire(&object);

        let mut inner = self.inner.lock();
        if inner.names.contains_key(&name) {
            let (_, removed) = inner.release(handle.reference_id, 1)?;
            drop(inner);
            drop(removed);
            return Err(RegistryError::DuplicateName(name));
        }
        inner.names.insert(name.clone(), handle.reference_id);
        if let Some(entry) = inner.entries.get_mut(&handle.reference_id) {
            entry.name = Some(name.clone());
        }
        info!("Registered instance '{}' ({} #{})", name, handle.type_name, handle.reference_id);
        Ok(handle)
    }

    /// Drop the name binding and its pin.
    pub fn unregister_named(&self, name: &str) -> Result<(), RegistryError> {
        let removed = {
            let mut inner = self.inner.lock();
            let id = inner
                .names
                .remove(name)
                .ok_or_else(|| RegistryError::UnknownName(name.to_string()))?;
            if let Some(entry) = inner.entries.get_mut(&id) {
                entry.name = None;
            }
            inner.release(id, 1)?.1
        };
        info!("Unregistered instance '{}'", name);
        drop(removed);
        Ok(())
    }

    /// Object bound to `name`, without taking a hold.
    pub fn lookup_name(&self, name: &str) -> Result<ObjectRef, RegistryError> {
        let inner = self.inner.lock();
        inner
            .names
            .get(name)
            .and_then(|id| inner.entries.get(id))
            .map(|entry| entry.object.clone())
            .ok_or_else(|| RegistryError::UnknownName(name.to_string()))
    }

    /// Take one hold on the instance bound to `name`.
    pub fn acquire_named(&self, name: &str) -> Result<ReferenceHandle, RegistryError> {
        let mut inner = self.inner.lock();
        let id = *inner
            .names
            .get(name)
            .ok_or_else(|| RegistryError::UnknownName(name.to_string()))?;
        let entry = inner
            .entries
            .get_mut(&id)
            .ok_or(RegistryError::UnknownReference(id))?;
        entry.refcount += 1;
        Ok(entry.handle())
    }

    /// The live object for `reference_id`.
    pub fn lookup(&self, reference_id: u64) -> Result<ObjectRef, RegistryError> {
        self.entry(reference_id).map(|entry| entry.object)
    }

    /// Snapshot of the entry for `reference_id`.
    pub fn entry(&self, reference_id: u64) -> Result<RegistryEntry, RegistryError> {
        self.inner
            .lock()
            .entries
            .get(&reference_id)
            .cloned()
            .ok_or(RegistryError::UnknownReference(reference_id))
    }

    /// Add one hold; returns the new count.
    pub fn acquire(&self, reference_id: u64) -> Result<u32, RegistryError> {
        let mut inner = self.inner.lock();
        let entry = inner
            .entries
            .get_mut(&reference_id)
            .ok_or(RegistryError::UnknownReference(reference_id))?;
        entry.refcount += 1;
        Ok(entry.refcount)
    }

    /// Drop one hold; returns the remaining count.
    pub fn release(&self, reference_id: u64) -> Result<u32, RegistryError> {
        self.release_many(reference_id, 1)
    }

    /// Drop `count` holds at once; returns the remaining count.
    ///
    /// Reaching zero removes the entry. The object itself is dropped after
    /// the registry lock is released.
    pub fn release_many(&self, reference_id: u64, count: u32) -> Result<u32, RegistryError> {
        let (remaining, removed) = self.inner.lock().release(reference_id, count)?;
        if let Some(entry) = removed {
            debug!("Reclaimed {} #{}", entry.type_name, entry.reference_id);
        }
        Ok(remaining)
    }

    /// Current hold count, if the entry exists.
    pub fn refcount(&self, reference_id: u64) -> Option<u32> {
        self.inner
            .lock()
            .entries
            .get(&reference_id)
            .map(|entry| entry.refcount)
    }

    pub fn contains(&self, reference_id: u64) -> bool {
        self.inner.lock().entries.contains_key(&reference_id)
    }

    /// Number of live objects.
    pub fn entry_count(&self) -> usize {
        self.inner.lock().entries.len()
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{ObjectResult, RemoteType};
    use crate::value::Value;

    struct Cell {
        value: i64,
    }

    impl RemoteObject for Cell {
        fn type_name(&self) -> &str {
            "Cell"
        }

        fn get_attr(&self, name: &str) -> ObjectResult<crate::object::LocalValue> {
            match name {
                "value" => Ok(Value::Int(self.value)),
                other => Err(ObjectError::NoSuchMember(other.to_string())),
            }
        }
    }

    impl RemoteType for Cell {
        const TYPE_NAME: &'static str = "Cell";
        const CAPABILITIES: Capabilities = Capabilities::CALL;

        fn construct(args: Args) -> ObjectResult<Self> {
            args.expect_at_most("Cell", 1)?;
            let value = match args.positional.first() {
                Some(_) => args.int("Cell", 0)?,
                None => 0,
            };
            Ok(Self { value })
        }
    }

    fn registry() -> ObjectRegistry {
        let reg = ObjectRegistry::new();
        reg.register_type(TypeDescriptor::of::<Cell>()).unwrap();
        reg
    }

    #[test]
    fn test_registry_new() {
        let reg = ObjectRegistry::new();
        assert_eq!(reg.entry_count(), 0);
        assert!(reg.type_names().is_empty());
    }

    #[test]
    fn test_duplicate_type() {
        let reg = registry();
        let err = reg.register_type(TypeDescriptor::of::<Cell>()).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateType("Cell".into()));
        assert_eq!(err.to_error_info().kind, ErrorKind::DuplicateType);
    }

    #[test]
    fn test_instantiate() {
        let reg = registry();
        let handle = reg.instantiate("Cell", Args::default()).unwrap();

        assert_eq!(handle.reference_id, 1);
        assert_eq!(handle.type_name, "Cell");
        assert_eq!(reg.refcount(1), Some(1));
        assert_eq!(reg.entry(1).unwrap().capabilities, Capabilities::CALL);

        let obj = reg.lookup(1).unwrap();
        assert_eq!(obj.lock().get_attr("value").unwrap(), Value::Int(0));
    }

    #[test]
    fn test_instantiate_unknown_type() {
        let reg = registry();
        let err = reg.instantiate("Nope", Args::default()).unwrap_err();
        assert_eq!(err.to_error_info().kind, ErrorKind::UnknownType);
    }

    #[test]
    fn test_instantiate_construction_error() {
        let reg = registry();
        let err = reg
            .instantiate("Cell", Args::positional(vec![Value::Int(1), Value::Int(2)]))
            .unwrap_err();

        let info = err.to_error_info();
        assert_eq!(info.kind, ErrorKind::Construction);
        assert_eq!(info.original_type_name.as_deref(), Some("ArityMismatch"));
        assert_eq!(reg.entry_count(), 0);
    }

    #[test]
    fn test_release_to_zero_removes_entry() {
        let reg = registry();
        let id = reg.instantiate("Cell", Args::default()).unwrap().reference_id;

        assert_eq!(reg.acquire(id).unwrap(), 2);
        assert_eq!(reg.release(id).unwrap(), 1);
        assert_eq!(reg.release(id).unwrap(), 0);

        assert!(!reg.contains(id));
        assert_eq!(reg.lookup(id).unwrap_err(), RegistryError::UnknownReference(id));
        // Duplicate release is reported, not fatal.
        assert_eq!(reg.release(id).unwrap_err(), RegistryError::UnknownReference(id));
    }

    #[test]
    fn test_ids_never_reused() {
        let reg = registry();
        let a = reg.instantiate("Cell", Args::default()).unwrap().reference_id;
        reg.release(a).unwrap();
        let b = reg.instantiate("Cell", Args::default()).unwrap().reference_id;
        assert!(b > a);
    }

    #[test]
    fn test_register_or_acquire_reuses_identity() {
        let reg = registry();
        let obj = ObjectRef::new(Cell { value: 5 });

        let first = reg.register_or_acquire(&obj);
        let second = reg.register_or_acquire(&obj.clone());
        let other = reg.register_or_acquire(&ObjectRef::new(Cell { value: 5 }));

        assert_eq!(first.reference_id, second.reference_id);
        assert_ne!(first.reference_id, other.reference_id);
        assert_eq!(reg.refcount(first.reference_id), Some(2));
        assert_eq!(reg.entry(first.reference_id).unwrap().capabilities, Capabilities::ALL);
    }

    #[test]
    fn test_release_many() {
        let reg = registry();
        let obj = ObjectRef::new(Cell { value: 0 });
        let id = reg.register_or_acquire(&obj).reference_id;
        reg.register_or_acquire(&obj);
        reg.register_or_acquire(&obj);

        assert_eq!(reg.release_many(id, 2).unwrap(), 1);
        assert_eq!(reg.release_many(id, 5).unwrap(), 0);
        assert_eq!(reg.entry_count(), 0);

        // Identity index is cleared with the entry.
        let again = reg.register_or_acquire(&obj);
        assert_ne!(again.reference_id, id);
    }

    #[test]
    fn test_named_instances() {
        let reg = registry();
        let handle = reg
            .register_named("counter", ObjectRef::new(Cell { value: 3 }))
            .unwrap();

        let err = reg
            .register_named("counter", ObjectRef::new(Cell { value: 0 }))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateName("counter".into()));
        assert_eq!(reg.entry_count(), 1);

        let acquired = reg.acquire_named("counter").unwrap();
        assert_eq!(acquired.reference_id, handle.reference_id);
        assert_eq!(reg.refcount(handle.reference_id), Some(2));

        // Client-side holds come and go; the pin keeps the instance alive.
        reg.release(handle.reference_id).unwrap();
        assert!(reg.lookup_name("counter").is_ok());

        reg.unregister_named("counter").unwrap();
        assert!(reg.lookup_name("counter").is_err());
        assert_eq!(reg.entry_count(), 0);
    }

    #[test]
    fn test_type_names_sorted() {
        let reg = registry();
        reg.register_type(TypeDescriptor::new("Alpha", Capabilities::NONE, |_| {
            Ok(Box::new(Cell { value: 0 }) as Box<dyn RemoteObject>)
        }))
        .unwrap();

        assert_eq!(reg.type_names(), vec!["Alpha".to_string(), "Cell".to_string()]);
        assert!(reg.has_type("Alpha"));
        assert!(!reg.has_type("Beta"));
    }

    #[test]
    fn test_concurrent_acquire_release() {
        let reg = Arc::new(registry());
        let id = reg.instantiate("Cell", Args::default()).unwrap().reference_id;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        reg.acquire(id).unwrap();
                        reg.release(id).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(reg.refcount(id), Some(1));
    }
}
