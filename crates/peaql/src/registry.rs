//! Process-wide registry of typed operator/function overloads and
//! aggregator factories.
//!
//! Lookup filters signatures that match the argument types, sorts by
//! specificity (fewer generic slots wins, extension matches rank below exact
//! matches) and picks the first. Registration order breaks ties, so adding a
//! more general overload never changes dispatch for inputs that already
//! matched a narrower one.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::types::DType;
use crate::value::Value;

/// An eager scalar implementation. Evaluation-time type surprises yield
/// Null, never errors.
pub type ScalarFn = fn(&[Value]) -> Value;

/// One typed overload of a function or operator.
#[derive(Debug)]
pub struct Signature {
    /// Parameter types; a trailing [`DType::Vararg`] repeats for extra
    /// arguments and may bind zero of them.
    pub params: Vec<DType>,
    /// The result type.
    pub ret: DType,
    /// Null-safe signatures see Null arguments; all others short-circuit
    /// any Null argument to Null.
    pub null_safe: bool,
    /// The eager implementation.
    pub eval: ScalarFn,
}

impl Signature {
    /// Fixed (non-vararg) arity and whether a vararg tail exists.
    fn arity(&self) -> (usize, Option<&DType>) {
        match self.params.last() {
            Some(DType::Vararg(elem)) => (self.params.len() - 1, Some(elem)),
            _ => (self.params.len(), None),
        }
    }

    /// Whether this signature matches the argument types.
    #[must_use]
    pub fn matches(&self, args: &[DType]) -> bool {
        let (fixed, vararg) = self.arity();
        if args.len() < fixed || (vararg.is_none() && args.len() != fixed) {
            return false;
        }
        for (param, arg) in self.params.iter().take(fixed).zip(args) {
            if !param.accepts(arg) {
                return false;
            }
        }
        if let Some(elem) = vararg {
            for arg in &args[fixed..] {
                if !elem.accepts(arg) {
                    return false;
                }
            }
        }
        true
    }

    /// Specificity cost against concrete argument types; lower wins.
    #[must_use]
    pub fn cost(&self, args: &[DType]) -> u32 {
        let (fixed, vararg) = self.arity();
        let mut total = 0u32;
        for (param, arg) in self.params.iter().take(fixed).zip(args) {
            total += u32::from(param.cost(arg));
        }
        if let Some(elem) = vararg {
            for arg in &args[fixed..] {
                total += u32::from(elem.cost(arg));
            }
        }
        total
    }
}

/// A named function with its overload set.
pub struct FunctionDef {
    /// Canonical (lowercase) name.
    pub name: &'static str,
    /// Pure functions of their inputs fold at compile time when every
    /// argument is constant.
    pub pure: bool,
    /// Registered overloads, in registration order.
    pub signatures: Vec<Signature>,
}

/// Running aggregate state for one group (or one window frame).
pub trait Accumulator {
    /// Feeds one row's evaluated arguments.
    fn update(&mut self, args: &[Value]);

    /// Produces the aggregate value. Called once, after the last update.
    fn finalize(&mut self) -> Value;

    /// Installed by the window driver before finalize; only window-only
    /// functions care.
    fn set_window(&mut self, ctx: &WindowCtx) {
        let _ = ctx;
    }
}

/// Per-invocation window state handed to window-only accumulators.
#[derive(Clone)]
pub struct WindowCtx {
    /// The current row's index within the sorted partition.
    pub index: usize,
    /// Frame member indices, post-EXCLUDE, ascending.
    pub frame: Vec<usize>,
    /// Evaluated argument vectors for every partition row.
    pub args: Rc<Vec<Vec<Value>>>,
    /// ORDER BY key tuples for every partition row.
    pub order_keys: Rc<Vec<Vec<Value>>>,
    /// Partition size.
    pub size: usize,
}

/// An aggregator factory with its type signature.
pub struct AggregateDef {
    /// Canonical (lowercase) name.
    pub name: &'static str,
    /// Parameter types, as for scalar signatures.
    pub params: Vec<DType>,
    /// Result type as a function of the argument types.
    pub ret: fn(&[DType]) -> DType,
    /// Allocates fresh accumulator state.
    pub factory: fn() -> Box<dyn Accumulator>,
    /// Functions that only make sense under OVER.
    pub window_only: bool,
}

impl AggregateDef {
    /// Whether the aggregate accepts these argument types.
    #[must_use]
    pub fn matches(&self, args: &[DType]) -> bool {
        let probe = Signature {
            params: self.params.clone(),
            ret: DType::Object,
            null_safe: true,
            eval: |_| Value::Null,
        };
        probe.matches(args)
    }
}

/// The registry: functions, aggregates and the cast-name table.
#[derive(Default)]
pub struct Registry {
    functions: HashMap<&'static str, FunctionDef>,
    aggregates: HashMap<&'static str, AggregateDef>,
    casts: HashMap<&'static str, DType>,
}

impl Registry {
    /// Registers a function definition.
    pub fn add_function(&mut self, def: FunctionDef) {
        match self.functions.entry(def.name) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                entry.get_mut().signatures.extend(def.signatures);
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(def);
            }
        }
    }

    /// Registers an aggregate definition.
    pub fn add_aggregate(&mut self, def: AggregateDef) {
        self.aggregates.insert(def.name, def);
    }

    /// Registers a cast name → type mapping.
    pub fn add_cast(&mut self, name: &'static str, dtype: DType) {
        self.casts.insert(name, dtype);
    }

    /// Looks up a function by (case-insensitive) name.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(name.to_ascii_lowercase().as_str())
    }

    /// Looks up an aggregate by (case-insensitive) name.
    #[must_use]
    pub fn aggregate(&self, name: &str) -> Option<&AggregateDef> {
        self.aggregates.get(name.to_ascii_lowercase().as_str())
    }

    /// Resolves a cast/type name to its type tag.
    #[must_use]
    pub fn cast_type(&self, name: &str) -> Option<&DType> {
        self.casts.get(name.to_ascii_lowercase().as_str())
    }

    /// Dispatches `name(args)` to the best-matching overload.
    ///
    /// # Errors
    ///
    /// [`Error::NotSupported`] with a rendered signature when the function
    /// exists but no overload matches, or when the name is unknown.
    pub fn resolve_function(&self, name: &str, args: &[DType]) -> Result<&Signature> {
        let Some(def) = self.function(name) else {
            return Err(Error::NotSupported(render_signature(name, args)));
        };
        def.signatures
            .iter()
            .filter(|sig| sig.matches(args))
            .min_by_key(|sig| sig.cost(args))
            .ok_or_else(|| Error::NotSupported(render_signature(name, args)))
    }
}

/// Renders `name(t1, t2)` for diagnostics.
#[must_use]
pub fn render_signature(name: &str, args: &[DType]) -> String {
    let rendered: Vec<&str> = args.iter().map(DType::name).collect();
    format!("{name}({})", rendered.join(", "))
}

static REGISTRY: LazyLock<Registry> = LazyLock::new(crate::functions::install);

/// The process-wide registry.
#[must_use]
pub fn registry() -> &'static Registry {
    &REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first(_: &[Value]) -> Value {
        Value::Integer(1)
    }

    fn second(_: &[Value]) -> Value {
        Value::Integer(2)
    }

    fn def(signatures: Vec<Signature>) -> FunctionDef {
        FunctionDef {
            name: "probe",
            pure: true,
            signatures,
        }
    }

    #[test]
    fn test_specificity_prefers_exact_over_extension() {
        let mut reg = Registry::default();
        reg.add_function(def(vec![
            Signature {
                params: vec![DType::Real],
                ret: DType::Real,
                null_safe: false,
                eval: first,
            },
            Signature {
                params: vec![DType::Integer],
                ret: DType::Integer,
                null_safe: false,
                eval: second,
            },
        ]));
        let sig = reg.resolve_function("probe", &[DType::Integer]).unwrap();
        assert_eq!(sig.ret, DType::Integer);
        // A Real argument only matches the Real overload.
        let sig = reg.resolve_function("probe", &[DType::Real]).unwrap();
        assert_eq!(sig.ret, DType::Real);
    }

    #[test]
    fn test_adding_general_overload_keeps_narrow_dispatch() {
        let mut reg = Registry::default();
        reg.add_function(def(vec![Signature {
            params: vec![DType::String],
            ret: DType::String,
            null_safe: false,
            eval: first,
        }]));
        let before = reg.resolve_function("probe", &[DType::String]).unwrap().ret.clone();
        reg.add_function(def(vec![Signature {
            params: vec![DType::Object],
            ret: DType::Object,
            null_safe: false,
            eval: second,
        }]));
        let after = reg.resolve_function("probe", &[DType::String]).unwrap().ret.clone();
        assert_eq!(before, after);
    }

    #[test]
    fn test_vararg_matching() {
        let sig = Signature {
            params: vec![DType::String, DType::Vararg(Box::new(DType::Object))],
            ret: DType::String,
            null_safe: false,
            eval: first,
        };
        assert!(sig.matches(&[DType::String]));
        assert!(sig.matches(&[DType::String, DType::Integer, DType::Boolean]));
        assert!(!sig.matches(&[]));
        assert!(!sig.matches(&[DType::Integer]));
    }

    #[test]
    fn test_unknown_signature_renders() {
        let reg = Registry::default();
        let err = reg
            .resolve_function("frobnicate", &[DType::String, DType::Integer])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "not supported: frobnicate(text, integer)"
        );
    }
}
