use super::FunctionDef;
use crate::error::ConfigError;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Result of looking a call up by name and argument count.
#[derive(Debug)]
pub enum Lookup<'a> {
    Found(&'a Arc<FunctionDef>),
    /// The name exists, but no overload takes this many arguments
    WrongArity(&'a Arc<FunctionDef>),
    NotFound,
}

/// Functions by name; each name maps to overloads with disjoint arity
/// ranges.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Vec<Arc<FunctionDef>>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the builtin library.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for def in super::builtins::definitions()
            .into_iter()
            .chain(super::mutation::definitions())
        {
            registry.insert(def);
        }
        registry
    }

    pub fn register(&mut self, def: FunctionDef) -> Result<(), ConfigError> {
        def.validate()?;
        if let Some(existing) = self.functions.get(&def.name) {
            let overlaps = existing
                .iter()
                .any(|f| f.min_arity <= def.max_arity && def.min_arity <= f.max_arity);
            if overlaps {
                return Err(ConfigError::DuplicateFunction {
                    name: def.name,
                    arity: def.min_arity,
                });
            }
        }
        debug!(name = %def.name, min = def.min_arity, max = def.max_arity, "function registered");
        self.insert(def);
        Ok(())
    }

    fn insert(&mut self, def: FunctionDef) {
        self.functions
            .entry(def.name.clone())
            .or_default()
            .push(Arc::new(def));
    }

    pub fn lookup(&self, name: &str, arity: usize) -> Lookup<'_> {
        let Some(overloads) = self.functions.get(name) else {
            return Lookup::NotFound;
        };
        match overloads.iter().find(|f| f.accepts_arity(arity)) {
            Some(def) => Lookup::Found(def),
            None => match overloads.first() {
                Some(def) => Lookup::WrongArity(def),
                None => Lookup::NotFound,
            },
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FormulaValue;
    use formula_types::DType;

    fn def(min: usize, max: usize) -> FunctionDef {
        FunctionDef::sync("F", vec![DType::Number], DType::Number, |_: &[FormulaValue]| {
            FormulaValue::Blank
        })
        .with_arity(min, max)
    }

    #[test]
    fn test_overloads_by_arity() {
        let mut registry = FunctionRegistry::new();
        registry.register(def(1, 1)).unwrap();
        registry.register(def(2, 3)).unwrap();
        assert!(matches!(registry.lookup("F", 3), Lookup::Found(f) if f.max_arity == 3));
        assert!(matches!(registry.lookup("F", 4), Lookup::WrongArity(_)));
        assert!(matches!(registry.lookup("G", 1), Lookup::NotFound));
        assert!(matches!(
            registry.register(def(3, 5)),
            Err(ConfigError::DuplicateFunction { .. })
        ));
    }

    #[test]
    fn test_builtins_are_present() {
        let registry = FunctionRegistry::with_builtins();
        for name in ["If", "Filter", "Collect", "ClearCollect", "Patch", "Remove", "Set"] {
            assert!(registry.contains(name), "{name}");
        }
    }
}
