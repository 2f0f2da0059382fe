//! Reference enumeration, namespace handling, symref resolution and tag
//! peeling.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use gix::ObjectId;
use gix::bstr::ByteSlice;
use gix::refs::TargetRef;

use crate::errors::ServeError;

/// Symref chains longer than this are treated as broken.
const MAX_SYMREF_DEPTH: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefEntry {
    /// Full name, namespace prefix included.
    pub name: String,
    pub oid: ObjectId,
    pub symbolic: bool,
}

pub type RefVisitor<'v> = dyn FnMut(RefEntry) -> Result<(), ServeError> + 'v;

pub trait RefStore {
    /// `refs/namespaces/<ns>/` per namespace component, or empty.
    fn namespace_prefix(&self) -> &str;

    /// Visits the namespaced `HEAD` if it resolves to an object.
    fn head(&self, visit: &mut RefVisitor<'_>) -> Result<(), ServeError>;

    /// Visits every namespaced reference under `refs/` in store order.
    fn for_each_ref(&self, visit: &mut RefVisitor<'_>) -> Result<(), ServeError>;

    /// Name of the reference at the end of `name`'s symref chain.
    fn resolve_symref(&self, name: &str) -> Result<Option<String>, ServeError>;

    /// Object an annotated tag ultimately points at, when `name` refers to a
    /// tag object.
    fn peel_tag(&self, name: &str) -> Result<Option<ObjectId>, ServeError>;

    fn strip_namespace<'n>(&self, name: &'n str) -> &'n str {
        name.strip_prefix(self.namespace_prefix()).unwrap_or(name)
    }
}

/// Expands `a/b` into `refs/namespaces/a/refs/namespaces/b/`.
pub fn namespace_prefix(namespace: &str) -> String {
    namespace
        .split('/')
        .filter(|component| !component.is_empty())
        .map(|component| format!("refs/namespaces/{component}/"))
        .collect()
}

fn in_namespace(prefix: &str, name: &str) -> bool {
    name.strip_prefix(prefix).is_some_and(|rest| rest.starts_with("refs/"))
}

struct Followed {
    name: String,
    id: ObjectId,
}

/// Reference store backed by an on-disk repository.
pub struct GixRefStore {
    repo: gix::Repository,
    prefix: String,
}

impl GixRefStore {
    pub fn open(path: impl AsRef<Path>, namespace: Option<&str>) -> Result<Self, ServeError> {
        let path = path.as_ref();
        let repo = gix::open(path)
            .map_err(|e| ServeError::Store(format!("cannot open {}: {e}", path.display())))?;
        Ok(Self::from_repository(repo, namespace))
    }

    pub fn from_repository(repo: gix::Repository, namespace: Option<&str>) -> Self {
        GixRefStore { repo, prefix: namespace.map(namespace_prefix).unwrap_or_default() }
    }

    fn follow(&self, name: &str) -> Result<Option<Followed>, ServeError> {
        let mut current = name.to_owned();
        for _ in 0..=MAX_SYMREF_DEPTH {
            let Some(reference) = self.repo.try_find_reference(current.as_str()).map_err(ServeError::store)? else {
                return Ok(None);
            };
            let next = match reference.target() {
                TargetRef::Object(id) => {
                    return Ok(Some(Followed { name: current, id: id.to_owned() }));
                }
                TargetRef::Symbolic(target) => {
                    target.as_bstr().to_str().map_err(ServeError::store)?.to_owned()
                }
            };
            current = next;
        }
        Ok(None)
    }
}

impl RefStore for GixRefStore {
    fn namespace_prefix(&self) -> &str {
        &self.prefix
    }

    fn head(&self, visit: &mut RefVisitor<'_>) -> Result<(), ServeError> {
        let name = format!("{}HEAD", self.prefix);
        let Some(head) = self.repo.try_find_reference(name.as_str()).map_err(ServeError::store)? else {
            return Ok(());
        };
        let symbolic = matches!(head.target(), TargetRef::Symbolic(_));
        // An unborn HEAD has nothing to report.
        let Some(followed) = self.follow(&name)? else {
            return Ok(());
        };
        visit(RefEntry { name, oid: followed.id, symbolic })
    }

    fn for_each_ref(&self, visit: &mut RefVisitor<'_>) -> Result<(), ServeError> {
        let platform = self.repo.references().map_err(ServeError::store)?;
        for reference in platform.all().map_err(ServeError::store)? {
            let reference = match reference {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("skipping unreadable reference: {e}");
                    continue;
                }
            };
            let Ok(name) = reference.name().as_bstr().to_str() else {
                tracing::warn!(name = %reference.name().as_bstr(), "skipping non UTF-8 reference name");
                continue;
            };
            if !in_namespace(&self.prefix, name) {
                continue;
            }
            let (oid, symbolic) = match reference.target() {
                TargetRef::Object(id) => (id.to_owned(), false),
                TargetRef::Symbolic(_) => match self.follow(name)? {
                    Some(followed) => (followed.id, true),
                    None => {
                        tracing::warn!(name, "ignoring broken symref");
                        continue;
                    }
                },
            };
            visit(RefEntry { name: name.to_owned(), oid, symbolic })?;
        }
        Ok(())
    }

    fn resolve_symref(&self, name: &str) -> Result<Option<String>, ServeError> {
        Ok(self.follow(name)?.map(|followed| followed.name))
    }

    fn peel_tag(&self, name: &str) -> Result<Option<ObjectId>, ServeError> {
        let Some(followed) = self.follow(name)? else {
            return Ok(None);
        };
        let object = self.repo.find_object(followed.id).map_err(ServeError::store)?;
        if object.kind != gix::objs::Kind::Tag {
            return Ok(None);
        }
        let peeled = object.peel_tags_to_end().map_err(ServeError::store)?;
        Ok(Some(peeled.id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum MemoryTarget {
    Object(ObjectId),
    Symbolic(String),
}

/// In-memory store with the same ordering and namespace rules as an on-disk
/// repository. References iterate in byte order of their full names.
#[derive(Debug, Clone, Default)]
pub struct MemoryRefStore {
    prefix: String,
    refs: BTreeMap<String, MemoryTarget>,
    tags: HashMap<ObjectId, ObjectId>,
}

impl MemoryRefStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(namespace: &str) -> Self {
        MemoryRefStore { prefix: namespace_prefix(namespace), ..Self::default() }
    }

    pub fn insert_ref(&mut self, name: impl Into<String>, oid: ObjectId) -> &mut Self {
        self.refs.insert(name.into(), MemoryTarget::Object(oid));
        self
    }

    pub fn insert_symref(&mut self, name: impl Into<String>, target: impl Into<String>) -> &mut Self {
        self.refs.insert(name.into(), MemoryTarget::Symbolic(target.into()));
        self
    }

    /// Records `tag` as an annotated tag object pointing at `target`.
    pub fn insert_tag(&mut self, tag: ObjectId, target: ObjectId) -> &mut Self {
        self.tags.insert(tag, target);
        self
    }

    fn follow(&self, name: &str) -> Option<Followed> {
        let mut current = name;
        for _ in 0..=MAX_SYMREF_DEPTH {
            match self.refs.get(current)? {
                MemoryTarget::Object(id) => {
                    return Some(Followed { name: current.to_owned(), id: *id });
                }
                MemoryTarget::Symbolic(target) => current = target.as_str(),
            }
        }
        None
    }

    fn entry(&self, name: &str, target: &MemoryTarget) -> Option<RefEntry> {
        let followed = self.follow(name)?;
        Some(RefEntry {
            name: name.to_owned(),
            oid: followed.id,
            symbolic: matches!(target, MemoryTarget::Symbolic(_)),
        })
    }
}

impl RefStore for MemoryRefStore {
    fn namespace_prefix(&self) -> &str {
        &self.prefix
    }

    fn head(&self, visit: &mut RefVisitor<'_>) -> Result<(), ServeError> {
        let name = format!("{}HEAD", self.prefix);
        match self.refs.get(&name).and_then(|target| self.entry(&name, target)) {
            Some(entry) => visit(entry),
            None => Ok(()),
        }
    }

    fn for_each_ref(&self, visit: &mut RefVisitor<'_>) -> Result<(), ServeError> {
        for (name, target) in &self.refs {
            if !in_namespace(&self.prefix, name) {
                continue;
            }
            if let Some(entry) = self.entry(name, target) {
                visit(entry)?;
            }
        }
        Ok(())
    }

    fn resolve_symref(&self, name: &str) -> Result<Option<String>, ServeError> {
        Ok(self.follow(name).map(|followed| followed.name))
    }

    fn peel_tag(&self, name: &str) -> Result<Option<ObjectId>, ServeError> {
        let Some(followed) = self.follow(name) else {
            return Ok(None);
        };
        let Some(mut peeled) = self.tags.get(&followed.id).copied() else {
            return Ok(None);
        };
        // Tags of tags peel all the way down. A chain longer than the tag
        // table has to revisit a tag.
        for _ in 0..self.tags.len() {
            match self.tags.get(&peeled) {
                Some(next) => peeled = *next,
                None => return Ok(Some(peeled)),
            }
        }
        Err(ServeError::Invariant(format!("tag chain of '{name}' never reaches a non-tag object")))
    }
}
