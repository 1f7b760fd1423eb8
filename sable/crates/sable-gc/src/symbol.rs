//! Symbol Table - the collector's view of global names
//!
//! Naming policy belongs to the reader and evaluator; the heap only needs
//! the table as its main root set. Each name maps to a symbol handle, an
//! external object whose payload holds a binding stack:
//!
//! ```text
//! "x" ──▶ symbol #4.0 ──▶ [ base, let-frame, let-frame ]
//!                              ▲                  ▲
//!                        global value        innermost value
//! ```
//!
//! A collection first unwinds every stack to its base binding, then traces
//! from the symbol handles, and finally purges names nothing else uses.

use crate::error::{Result, SgcError};
use crate::heap::Heap;
use crate::object::{Class, ClassKind, Handle};
use indexmap::IndexMap;

/// Payload of a symbol handle
#[derive(Debug, Clone)]
pub struct SymbolData {
    name: String,
    /// Never empty; index 0 is the base binding
    bindings: Vec<Option<Handle>>,
    no_purge: bool,
}

impl SymbolData {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            bindings: vec![None],
            no_purge: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Innermost binding
    pub fn value(&self) -> Option<Handle> {
        self.bindings.last().copied().flatten()
    }

    pub fn depth(&self) -> usize {
        self.bindings.len()
    }

    pub fn no_purge(&self) -> bool {
        self.no_purge
    }
}

/// Class of symbol handles
#[derive(Debug, Default)]
pub struct SymbolClass;

impl Class for SymbolClass {
    fn name(&self) -> &str {
        "symbol"
    }

    fn kind(&self) -> ClassKind {
        ClassKind::External
    }

    fn trace(&self, heap: &Heap, handle: Handle, visit: &mut dyn FnMut(Handle)) {
        if let Ok(data) = heap.external::<SymbolData>(handle) {
            for binding in data.bindings.iter().flatten() {
                visit(*binding);
            }
        }
    }

    fn display(&self, heap: &Heap, handle: Handle) -> String {
        match heap.external::<SymbolData>(handle) {
            Ok(data) => data.name.clone(),
            Err(_) => "#<zombie>".to_string(),
        }
    }

    fn serialize(&self, heap: &Heap, handle: Handle) -> serde_json::Value {
        match heap.external::<SymbolData>(handle) {
            Ok(data) => serde_json::json!({ "symbol": data.name }),
            Err(_) => serde_json::Value::Null,
        }
    }
}

/// SymbolTable - names to symbol handles, in interning order
#[derive(Debug, Default)]
pub struct SymbolTable {
    names: IndexMap<String, Handle>,
}

impl SymbolTable {
    pub fn get(&self, name: &str) -> Option<Handle> {
        self.names.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Handle)> + '_ {
        self.names.iter().map(|(name, &handle)| (name.as_str(), handle))
    }

    pub(crate) fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.names.values().copied()
    }

    pub(crate) fn insert(&mut self, name: &str, handle: Handle) {
        self.names.insert(name.to_string(), handle);
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<Handle> {
        self.names.shift_remove(name)
    }

    pub(crate) fn clear(&mut self) {
        self.names.clear();
    }
}

impl Heap {
    /// Symbol handle for `name`, creating an unbound one if needed
    #[track_caller]
    pub fn intern(&mut self, name: &str) -> Result<Handle> {
        if let Some(existing) = self.symbols.get(name) {
            if !self.is_zombie(existing) {
                return Ok(existing);
            }
        }

        let class = self.symbol_class.clone();
        let handle = self.make_external(class, SymbolData::new(name))?;
        self.symbols.insert(name, handle);
        Ok(handle)
    }

    /// Intern `name` and set its innermost binding
    #[track_caller]
    pub fn define(&mut self, name: &str, value: Option<Handle>) -> Result<Handle> {
        let symbol = self.intern(name)?;
        self.set_value(symbol, value)?;
        Ok(symbol)
    }

    pub fn lookup(&self, name: &str) -> Option<Handle> {
        self.symbols.get(name)
    }

    pub fn value(&self, symbol: Handle) -> Result<Option<Handle>> {
        Ok(self.external::<SymbolData>(symbol)?.value())
    }

    pub fn set_value(&mut self, symbol: Handle, value: Option<Handle>) -> Result<()> {
        let data = self.external_mut::<SymbolData>(symbol)?;
        if let Some(top) = data.bindings.last_mut() {
            *top = value;
        }
        Ok(())
    }

    /// Clear the innermost binding
    pub fn unbind(&mut self, symbol: Handle) -> Result<()> {
        self.set_value(symbol, None)
    }

    /// Enter a dynamic binding
    pub fn push_binding(&mut self, symbol: Handle, value: Option<Handle>) -> Result<()> {
        self.external_mut::<SymbolData>(symbol)?
            .bindings
            .push(value);
        Ok(())
    }

    /// Leave the innermost dynamic binding, returning its value
    pub fn pop_binding(&mut self, symbol: Handle) -> Result<Option<Handle>> {
        let data = self.external_mut::<SymbolData>(symbol)?;
        if data.bindings.len() <= 1 {
            return Err(SgcError::InvalidArgument(format!(
                "symbol '{}' has no dynamic binding to pop",
                data.name
            )));
        }
        Ok(data.bindings.pop().flatten())
    }

    /// Exempt a symbol from the dead-name purge
    pub fn set_no_purge(&mut self, symbol: Handle, no_purge: bool) -> Result<()> {
        self.external_mut::<SymbolData>(symbol)?.no_purge = no_purge;
        Ok(())
    }

    /// Drop `name` from the table
    ///
    /// The symbol handle stays valid until a collection finds it unreachable.
    pub fn remove_name(&mut self, name: &str) -> Option<Handle> {
        self.symbols.remove(name)
    }

    pub fn symbol_name(&self, symbol: Handle) -> Result<&str> {
        Ok(self.external::<SymbolData>(symbol)?.name())
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Pop every dynamic binding, leaving each symbol at its base binding
    pub(crate) fn unwind_bindings(&mut self) -> usize {
        let mut popped = 0;
        let symbols: Vec<Handle> = self.symbols.handles().collect();
        for symbol in symbols {
            if let Ok(data) = self.external_mut::<SymbolData>(symbol) {
                popped += data.bindings.len() - 1;
                data.bindings.truncate(1);
            }
        }
        popped
    }
}
