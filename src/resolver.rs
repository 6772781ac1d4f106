//! Inheritance-aware member renaming.
//!
//! A member reference names the class it is looked up on, which is often a
//! subclass of the class that declares it. The resolver therefore builds, per
//! owner, the union of the rename rows of every supertype with the owner's
//! own row on top, loading supertypes on demand through a [`ClassProvider`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, trace};
use serde::Serialize;

use crate::error::Result;
use crate::mapper::{Mapper, MemberRow};
use crate::provider::ClassProvider;

/// Per-run memo of resolved owners. Owners present in `methods`/`fields`
/// have a table (possibly empty); owners in the `unresolved_*` sets could
/// not be loaded and are never fetched again.
#[derive(Debug, Clone, Default)]
pub struct HierarchyCache {
    pub methods: HashMap<String, MemberRow>,
    pub fields: HashMap<String, MemberRow>,
    pub unresolved_methods: HashSet<String>,
    pub unresolved_fields: HashSet<String>,
}

impl HierarchyCache {
    fn is_known(&self, owner: &str) -> bool {
        self.methods.contains_key(owner)
            || self.fields.contains_key(owner)
            || self.unresolved_methods.contains(owner)
            || self.unresolved_fields.contains(owner)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    /// Provider requests, at most one per distinct owner.
    pub fetches: usize,
    pub resolved_owners: usize,
    pub unresolved_owners: usize,
}

pub struct MemberResolver<P> {
    mapper: Arc<Mapper>,
    provider: P,
    cache: HierarchyCache,
    loading: HashSet<String>,
    fetches: usize,
}

impl<P: ClassProvider> MemberResolver<P> {
    pub fn new(mapper: Arc<Mapper>, provider: P, cache: HierarchyCache) -> Self {
        Self {
            mapper,
            provider,
            cache,
            loading: HashSet::new(),
            fetches: 0,
        }
    }

    pub fn mapper(&self) -> &Arc<Mapper> {
        &self.mapper
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn into_cache(self) -> HierarchyCache {
        self.cache
    }

    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            fetches: self.fetches,
            resolved_owners: self.cache.methods.len(),
            unresolved_owners: self.cache.unresolved_methods.len(),
        }
    }

    /// Records the hierarchy of a class whose header is already at hand, so
    /// it is never fetched. An existing table for `name` is rebuilt.
    pub fn register_class(
        &mut self,
        name: &str,
        super_name: Option<&str>,
        interfaces: &[String],
    ) -> Result<()> {
        self.cache.unresolved_methods.remove(name);
        self.cache.unresolved_fields.remove(name);
        let parents: Vec<String> = super_name
            .map(str::to_string)
            .into_iter()
            .chain(interfaces.iter().cloned())
            .collect();
        self.build_tables(name, &parents)
    }

    /// New name of a method, or `None` when it keeps its name.
    pub fn lookup_method(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<Option<String>> {
        if owner.starts_with('[') {
            return Ok(None);
        }
        self.ensure_loaded(owner)?;
        let key = format!("{name}{descriptor}");
        Ok(self
            .cache
            .methods
            .get(owner)
            .and_then(|row| row.get(&key))
            .cloned())
    }

    /// New name of a field, or `None` when it keeps its name.
    pub fn lookup_field(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<Option<String>> {
        if owner.starts_with('[') {
            return Ok(None);
        }
        self.ensure_loaded(owner)?;
        let key = format!("{name}:{descriptor}");
        Ok(self
            .cache
            .fields
            .get(owner)
            .and_then(|row| row.get(&key))
            .cloned())
    }

    pub fn resolve_method_name(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<String> {
        Ok(self
            .lookup_method(owner, name, descriptor)?
            .unwrap_or_else(|| name.to_string()))
    }

    pub fn resolve_field_name(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<String> {
        Ok(self
            .lookup_field(owner, name, descriptor)?
            .unwrap_or_else(|| name.to_string()))
    }

    fn ensure_loaded(&mut self, owner: &str) -> Result<()> {
        if self.cache.is_known(owner) || self.loading.contains(owner) {
            return Ok(());
        }

        self.fetches += 1;
        let Some(class) = self.provider.get_class(owner)? else {
            debug!("hierarchy: {owner} not found, keeping member names");
            self.cache.unresolved_methods.insert(owner.to_string());
            self.cache.unresolved_fields.insert(owner.to_string());
            return Ok(());
        };

        let parents: Vec<String> = class
            .super_name()?
            .into_iter()
            .chain(class.interfaces()?)
            .collect();
        self.build_tables(owner, &parents)
    }

    fn build_tables(&mut self, owner: &str, parents: &[String]) -> Result<()> {
        self.loading.insert(owner.to_string());
        let mut methods = MemberRow::new();
        let mut fields = MemberRow::new();
        for parent in parents {
            if let Err(e) = self.ensure_loaded(parent) {
                self.loading.remove(owner);
                return Err(e);
            }
            if let Some(row) = self.cache.methods.get(parent) {
                methods.extend(row.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            if let Some(row) = self.cache.fields.get(parent) {
                fields.extend(row.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        self.loading.remove(owner);

        if let Some(row) = self.mapper.methods(owner) {
            methods.extend(row.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        if let Some(row) = self.mapper.fields(owner) {
            fields.extend(row.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        trace!(
            "hierarchy: {owner} -> {} methods, {} fields",
            methods.len(),
            fields.len()
        );
        self.cache.methods.insert(owner.to_string(), methods);
        self.cache.fields.insert(owner.to_string(), fields);
        Ok(())
    }
}
