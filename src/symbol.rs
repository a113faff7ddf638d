use std::fmt;
use std::sync::RwLock;

use once_cell::sync::Lazy;

struct StringInterner {
    strings: lasso::ThreadedRodeo,
}

static INTERNER: Lazy<RwLock<StringInterner>> = Lazy::new(|| {
    RwLock::new(StringInterner {
        strings: lasso::ThreadedRodeo::new(),
    })
});

/// An interned string.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(lasso::Spur);

impl Symbol {
    pub fn intern(sym: impl AsRef<str>) -> Self {
        Self(INTERNER.write().unwrap().strings.get_or_intern(sym))
    }

    pub fn intern_static(sym: &'static str) -> Self {
        Self(INTERNER.write().unwrap().strings.get_or_intern_static(sym))
    }

    pub fn resolve<'a>(&'a self) -> &'a str {
        let interner = INTERNER.write().unwrap();
        let symbol = interner.strings.resolve(&self.0);

        // SAFETY: The lifetime is a bit of a lie: it is really tied to the lifetime of
        // `INTERNER`. But `INTERNER` is never dropped (since it is static), so it is
        // safe to truncate the lifetime to the shorter lifetime of `'a`.
        // See also: https://github.com/rust-lang/rust/blob/e4dd9edb76a34ecbca539967f9662b8c0cc9c7fb/compiler/rustc_span/src/symbol.rs#L1845
        unsafe { std::mem::transmute::<&str, &'a str>(symbol) }
    }

    /// Intern `self` followed by `suffix`, used for naming metavariables
    /// derived from an existing one.
    pub fn with_suffix(&self, suffix: &str) -> Symbol {
        let name = format!("{}{}", self.resolve(), suffix);
        Symbol::intern(name)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        self.resolve()
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resolve())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resolve())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_stable() {
        assert_eq!(Symbol::intern("zero"), Symbol::intern("zero"));
        assert_ne!(Symbol::intern("zero"), Symbol::intern("suc"));
    }

    #[test]
    fn suffixes_build_derived_names() {
        let base = Symbol::intern("f");
        assert_eq!(base.with_suffix("-cod"), Symbol::intern("f-cod"));
    }
}
