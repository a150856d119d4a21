//! Per-function symbol table used by the code generator.
//!
//! A fixed array of hash buckets, each scanned linearly for an exact name
//! match. The table is reset (not reallocated) at the start of every
//! function, so all locals within a function share one flat namespace.

use crate::ty::TypeInfo;

const BUCKET_COUNT: usize = 128;

/// A declared parameter or local: its storage slot and resolved type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
  pub name: String,
  pub slot: u32,
  pub ty: TypeInfo,
}

#[derive(Debug)]
pub struct SymbolTable {
  buckets: Vec<Vec<Symbol>>,
}

// djb2 (http://www.cse.yorku.ca/~oz/hash.html)
fn hash(name: &str) -> u64 {
  let mut h: u64 = 5381;
  for b in name.bytes() {
    h = (h << 5).wrapping_add(h).wrapping_add(u64::from(b));
  }
  h
}

impl SymbolTable {
  pub fn new() -> Self {
    Self {
      buckets: vec![Vec::new(); BUCKET_COUNT],
    }
  }

  fn bucket_index(name: &str) -> usize {
    (hash(name) % BUCKET_COUNT as u64) as usize
  }

  /// Insert a symbol, replacing any entry with the same name in place and
  /// returning the replaced symbol. Callers that treat redefinition as an
  /// error must `lookup` first.
  pub fn insert(&mut self, symbol: Symbol) -> Option<Symbol> {
    let bucket = &mut self.buckets[Self::bucket_index(&symbol.name)];

    for existing in bucket.iter_mut() {
      if existing.name == symbol.name {
        return Some(std::mem::replace(existing, symbol));
      }
    }

    bucket.push(symbol);
    None
  }

  pub fn lookup(&self, name: &str) -> Option<&Symbol> {
    self.buckets[Self::bucket_index(name)]
      .iter()
      .find(|symbol| symbol.name == name)
  }

  /// Empty every bucket without giving back their storage.
  pub fn reset(&mut self) {
    for bucket in &mut self.buckets {
      bucket.clear();
    }
  }
}

impl Default for SymbolTable {
  fn default() -> Self {
    Self::new()
  }
}
