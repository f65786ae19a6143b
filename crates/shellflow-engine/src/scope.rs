//! Variable scopes.
//!
//! A [`Scope`] is an insertion-ordered list of name/value pairs. Order
//! matters: the tokenizer substitutes longest names first and breaks ties by
//! position, so updating an existing variable keeps its original slot.

/// An ordered set of workflow variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    vars: Vec<(String, String)>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Positional variables `"1".."N"` plus the aggregate `"@"`.
    ///
    /// `"@"` joins the arguments with spaces, wrapping any argument that
    /// contains a space in double quotes so it re-tokenizes to the same
    /// list. An empty argument list yields an empty scope.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Self {
        let mut scope = Self::new();
        if args.is_empty() {
            return scope;
        }

        let mut quoted = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let arg = arg.as_ref();
            scope.set((i + 1).to_string(), arg);
            if arg.contains(' ') {
                quoted.push(format!("\"{arg}\""));
            } else {
                quoted.push(arg.to_string());
            }
        }
        scope.set("@", quoted.join(" "));
        scope
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Insert or update a variable. Updates keep the variable's position.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.vars.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.vars.push((name, value)),
        }
    }

    /// Upsert every variable of `other` into `self`, in `other`'s order.
    pub fn extend_from(&mut self, other: &Scope) {
        for (name, value) in other.iter() {
            self.set(name, value);
        }
    }

    /// A new scope holding `self` overlaid with `other`.
    pub fn merged(&self, other: &Scope) -> Scope {
        let mut merged = self.clone();
        merged.extend_from(other);
        merged
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
