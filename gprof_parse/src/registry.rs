//! Function identity interning.
//!
//! gprof numbers functions with a per-report index (`[12]`) that changes from
//! one report to the next, so it cannot be used to line functions up across a
//! sequence of reports. The [`FunctionRegistry`] hands out its own identities
//! instead, keyed by the normalized function name, and is shared by every
//! [`CallGraph`](crate::CallGraph) built in one run.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Stable identity of a function within one run.
pub type FunctionId = u32;

/// Maximum length of a display copy of a function name.
pub const MAX_NAME_LEN: usize = 30;

/// Characters that dot and the identity map cannot take verbatim.
const UNSAFE_CHARS: [char; 9] = [' ', '<', '>', '&', '*', ',', ':', '(', ')'];

/// Normalize a raw function name by replacing export-unsafe characters with `_`.
///
/// C++ names such as `std::vector<int>::push_back(int const&)` collapse to a
/// single token that dot and the identity map can carry.
pub fn clean_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if UNSAFE_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// Truncated copy of a name for display. The full name is kept for identity.
pub fn display_name(name: &str) -> &str {
    match name.char_indices().nth(MAX_NAME_LEN) {
        Some((idx, _)) => &name[..idx],
        None => name,
    }
}

/// Anything that can resolve a raw function name to a stable identity.
///
/// Implemented by [`FunctionRegistry`] for the usual single-threaded run and by
/// [`SharedRegistry`] when reports are parsed on several threads.
pub trait Identities {
    fn identity_for(&mut self, raw_name: &str) -> FunctionId;
}

/// Interner from normalized function name to [`FunctionId`].
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    ids: HashMap<String, FunctionId>,
    names: Vec<String>,
    base: FunctionId,
}

impl FunctionRegistry {
    /// Create an empty registry whose first identity is 0.
    pub fn new() -> Self {
        Self::with_base(0)
    }

    /// Create an empty registry whose first identity is `base`.
    ///
    /// libSVM feature indices traditionally start at 1.
    pub fn with_base(base: FunctionId) -> Self {
        Self {
            ids: HashMap::new(),
            names: Vec::new(),
            base,
        }
    }

    /// Look up a name without assigning a new identity.
    pub fn get(&self, raw_name: &str) -> Option<FunctionId> {
        self.ids.get(&clean_name(raw_name)).copied()
    }

    /// Full normalized name recorded for an identity.
    pub fn name_of(&self, id: FunctionId) -> Option<&str> {
        let idx = id.checked_sub(self.base)? as usize;
        self.names.get(idx).map(String::as_str)
    }

    pub fn base(&self) -> FunctionId {
        self.base
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// All known identities with their full names, in ascending identity order.
    pub fn iter(&self) -> impl Iterator<Item = (FunctionId, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(idx, name)| (self.base + idx as FunctionId, name.as_str()))
    }
}

impl Identities for FunctionRegistry {
    fn identity_for(&mut self, raw_name: &str) -> FunctionId {
        let name = clean_name(raw_name);
        if let Some(&id) = self.ids.get(&name) {
            return id;
        }
        let id = self.base + self.names.len() as FunctionId;
        self.names.push(name.clone());
        self.ids.insert(name, id);
        id
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable handle to a registry guarded by a mutex.
///
/// Insert-if-absent happens under the lock, so two threads can never assign
/// different identities to the same name.
#[derive(Debug, Clone, Default)]
pub struct SharedRegistry {
    inner: Arc<Mutex<FunctionRegistry>>,
}

impl SharedRegistry {
    pub fn new(registry: FunctionRegistry) -> Self {
        Self {
            inner: Arc::new(Mutex::new(registry)),
        }
    }

    /// Copy of the registry as it stands now.
    pub fn snapshot(&self) -> FunctionRegistry {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Identities for SharedRegistry {
    fn identity_for(&mut self, raw_name: &str) -> FunctionId {
        // A panic elsewhere cannot leave the map half-updated, so a poisoned
        // lock is still safe to use.
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .identity_for(raw_name)
    }
}
