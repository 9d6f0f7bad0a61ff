//! Identifier interning.
//!
//! Every identifier scanned by the lexer resolves to a `Symbol`, a
//! small id that is unique per distinct text within one compilation.
//! The first occurrence of a text wins as the canonical instance; all
//! later occurrences of the same byte content receive the same id, so
//! identifier equality everywhere else in the compiler is an integer
//! comparison.

use std::collections::HashMap;

/// Interned identifier id. Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(pub u32);

/// Append-only string-interning table.
#[derive(Debug, Default)]
pub struct Interner {
    map: HashMap<String, Symbol>,
    texts: Vec<String>,
}

impl Interner {
    pub fn new() -> Interner {
        Interner::default()
    }

    /// Intern `text`, returning the canonical symbol for it.
    pub fn intern(&mut self, text: &str) -> Symbol {
        if let Some(&sym) = self.map.get(text) {
            return sym;
        }
        let sym = Symbol(self.texts.len() as u32);
        self.texts.push(text.to_string());
        self.map.insert(text.to_string(), sym);
        sym
    }

    /// Resolve a symbol back to its text.
    pub fn resolve(&self, sym: Symbol) -> &str {
        &self.texts[sym.0 as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let mut interner = Interner::new();
        let a = interner.intern("count");
        let b = interner.intern("count");
        assert_eq!(a, b);
        assert_eq!(interner.resolve(a), "count");
    }

    #[test]
    fn distinct_texts_never_share_a_symbol() {
        let mut interner = Interner::new();
        let a = interner.intern("x");
        let b = interner.intern("y");
        let c = interner.intern("x_");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn first_occurrence_wins_as_canonical() {
        let mut interner = Interner::new();
        let first = interner.intern("main");
        interner.intern("other");
        let again = interner.intern("main");
        assert_eq!(first, again);
        assert_eq!(first.0, 0);
    }
}
