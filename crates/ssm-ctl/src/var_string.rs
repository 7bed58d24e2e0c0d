//! templated strings and the context that resolves them
//!
//! A [VarString] wraps text that may contain `$(Name)` references. `$$` renders as a literal `$`, so
//! `$$(Name)` is not a reference.
//!
//! Resolution happens in three phases, all driven through one [ResolutionContext]:
//! 1. while documents are parsed every reference name is registered in the context
//! 2. [ResolutionContext::resolve] binds every registered name exactly once, in sorted order
//! 3. [VarString::dump] substitutes the bound values; the result is cached per instance
use crate::crypto::{Encryptor, Unavailable};
use crate::error::{Error, Result};
use crate::input::Input;
use regex::Regex;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::sync::OnceLock;

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\$|\$\((\w+)\)").expect("reference pattern is valid"))
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\w+$").expect("name pattern is valid"))
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Reference(String),
}

/// String with zero or more `$(Name)` references
#[derive(Debug)]
pub struct VarString {
    source: String,
    segments: Vec<Segment>,
    /// indexed by the `decrypt` flag of [VarString::dump]
    cache: [Cached<String>; 2],
}

impl VarString {
    /// Parse `text` and register its references with `context`
    pub fn load(text: &str, context: &mut ResolutionContext) -> Self {
        let segments = parse_segments(text);
        for segment in &segments {
            if let Segment::Reference(name) = segment {
                context.register(name);
            }
        }
        Self::from_segments(text.to_string(), segments)
    }

    /// Wrap `text` without interpreting references
    pub fn literal(text: impl Into<String>) -> Self {
        let text = text.into();
        let segments = if text.is_empty() {
            vec![]
        } else {
            vec![Segment::Literal(text.clone())]
        };
        Self::from_segments(text, segments)
    }

    /// A reference that consists of exactly one variable
    ///
    /// Accepts either `$(Name)` or a bare `Name`, which is wrapped.
    pub fn single_reference(text: &str, context: &mut ResolutionContext) -> Result<Self> {
        if let [Segment::Reference(_)] = parse_segments(text).as_slice() {
            return Ok(Self::load(text, context));
        }

        if name_pattern().is_match(text) {
            return Ok(Self::load(&format!("$({text})"), context));
        }

        Err(Error::schema(format!("{text} is not a valid single reference")))
    }

    fn from_segments(source: String, segments: Vec<Segment>) -> Self {
        let _self = Self {
            source,
            segments,
            cache: Default::default(),
        };

        // without references the value is known right away
        if let Some(value) = _self.literal_value() {
            for cache in &_self.cache {
                cache.set(value.clone());
            }
        }

        _self
    }

    /// The text as written in the document
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Referenced variable names in order of appearance (may repeat)
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Reference(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub fn is_templated(&self) -> bool {
        self.names().next().is_some()
    }

    /// Name of the variable when this is a single reference
    pub fn single_name(&self) -> Option<&str> {
        match self.segments.as_slice() {
            [Segment::Reference(name)] => Some(name),
            _ => None,
        }
    }

    /// Rendered value when there is nothing to resolve
    pub fn literal_value(&self) -> Option<String> {
        if self.is_templated() {
            return None;
        }

        Some(
            self.segments
                .iter()
                .map(|segment| match segment {
                    Segment::Literal(text) | Segment::Reference(text) => text.as_str(),
                })
                .collect(),
        )
    }

    /// Substitute every reference with its bound value
    ///
    /// With `decrypt` SecureString inputs contribute their plaintext, otherwise their ciphertext.
    pub fn dump(&self, context: &ResolutionContext, decrypt: bool) -> Result<String> {
        self.cache[decrypt as usize].get_or_try_resolve(&self.source, || {
            let mut value = String::new();
            for segment in &self.segments {
                match segment {
                    Segment::Literal(text) => value.push_str(text),
                    Segment::Reference(name) => {
                        value.push_str(&context.binding(name)?.value(context, decrypt)?)
                    }
                }
            }
            Ok(value)
        })
    }
}

impl PartialEq for VarString {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl std::fmt::Display for VarString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_segments(text: &str) -> Vec<Segment> {
    let mut segments = vec![];
    let mut literal = String::new();
    let mut last = 0;

    for captures in reference_pattern().captures_iter(text) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        literal.push_str(&text[last..whole.start()]);
        last = whole.end();

        match captures.get(1) {
            Some(name) => {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Reference(name.as_str().to_string()));
            }
            // escaped `$$`
            None => literal.push('$'),
        }
    }

    literal.push_str(&text[last..]);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    segments
}

/// State of a lazily computed value
#[derive(Debug, Clone, Default)]
pub enum Resolution<T> {
    #[default]
    Unresolved,
    Resolving,
    Resolved(T),
}

/// Write-once cell that computes its value on first successful read
#[derive(Debug)]
pub struct Cached<T> {
    state: RefCell<Resolution<T>>,
}

impl<T> Default for Cached<T> {
    fn default() -> Self {
        Self {
            state: RefCell::new(Resolution::Unresolved),
        }
    }
}

impl<T: Clone> Cached<T> {
    pub fn set(&self, value: T) {
        *self.state.borrow_mut() = Resolution::Resolved(value);
    }

    pub fn get(&self) -> Option<T> {
        match &*self.state.borrow() {
            Resolution::Resolved(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Return the cached value or compute it with `resolve`
    ///
    /// A failed computation leaves the cell unresolved. Re-entering a cell that is being computed is an
    /// error.
    pub fn get_or_try_resolve(&self, what: &str, resolve: impl FnOnce() -> Result<T>) -> Result<T> {
        match &*self.state.borrow() {
            Resolution::Resolved(value) => return Ok(value.clone()),
            Resolution::Resolving => {
                return Err(Error::UnresolvedVariable(format!(
                    "{what} (resolution depends on itself)"
                )))
            }
            Resolution::Unresolved => {}
        }

        *self.state.borrow_mut() = Resolution::Resolving;
        match resolve() {
            Ok(value) => {
                self.set(value.clone());
                Ok(value)
            }
            Err(e) => {
                *self.state.borrow_mut() = Resolution::Unresolved;
                Err(e)
            }
        }
    }
}

/// What a variable name is bound to after resolution
pub enum Binding {
    Input(Rc<Input>),
    /// Value computed on demand from the environment (`Region`, `Account`)
    Computed {
        compute: Box<dyn Fn() -> Result<String>>,
        cache: Cached<String>,
    },
}

impl Binding {
    pub fn computed(compute: impl Fn() -> Result<String> + 'static) -> Self {
        Binding::Computed {
            compute: Box::new(compute),
            cache: Default::default(),
        }
    }

    pub fn value(&self, context: &ResolutionContext, decrypt: bool) -> Result<String> {
        match self {
            Binding::Input(input) => input.value(context.crypto(), decrypt),
            Binding::Computed { compute, cache } => cache.get_or_try_resolve("computed", compute),
        }
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Binding::Input(input) => f.debug_tuple("Input").field(input).finish(),
            Binding::Computed { cache, .. } => f
                .debug_struct("Computed")
                .field("cache", &cache.get())
                .finish(),
        }
    }
}

/// Registry of referenced names and their bindings for one command invocation
pub struct ResolutionContext {
    names: BTreeSet<String>,
    bindings: BTreeMap<String, Binding>,
    crypto: Rc<dyn Encryptor>,
}

impl Default for ResolutionContext {
    fn default() -> Self {
        Self::new(Rc::new(Unavailable))
    }
}

impl ResolutionContext {
    pub fn new(crypto: Rc<dyn Encryptor>) -> Self {
        Self {
            names: Default::default(),
            bindings: Default::default(),
            crypto,
        }
    }

    pub fn register(&mut self, name: &str) {
        if self.names.insert(name.to_string()) {
            tracing::trace!(name, "variable registered");
        }
    }

    /// All registered names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Bind every registered name that is not bound yet
    ///
    /// `resolver` is called once per name in sorted order.
    pub fn resolve(&mut self, mut resolver: impl FnMut(&str) -> Result<Binding>) -> Result<()> {
        for name in &self.names {
            if self.bindings.contains_key(name) {
                continue;
            }
            tracing::debug!(%name, "resolving variable");
            let binding = resolver(name)?;
            self.bindings.insert(name.clone(), binding);
        }
        Ok(())
    }

    pub fn binding(&self, name: &str) -> Result<&Binding> {
        self.bindings
            .get(name)
            .ok_or_else(|| Error::UnresolvedVariable(name.to_string()))
    }

    pub fn crypto(&self) -> &dyn Encryptor {
        self.crypto.as_ref()
    }
}

impl std::fmt::Debug for ResolutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionContext")
            .field("names", &self.names)
            .field("bindings", &self.bindings)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    fn names(var: &VarString) -> Vec<&str> {
        var.names().collect()
    }

    #[test]
    fn extracts_references() {
        let mut context = ResolutionContext::default();
        let var = VarString::load("arn:aws:kms:$(Region):$(Account):alias/$(Region)", &mut context);

        assert_eq!(names(&var), vec!["Region", "Account", "Region"]);
        assert_eq!(context.names().collect::<Vec<_>>(), vec!["Account", "Region"]);
    }

    #[test]
    fn plain_text_is_resolved_immediately() {
        let context = ResolutionContext::default();
        let var = VarString::literal("plain");
        assert_eq!(var.dump(&context, true).unwrap(), "plain");

        let mut context = ResolutionContext::default();
        let var = VarString::load("no references", &mut context);
        assert_eq!(var.dump(&context, false).unwrap(), "no references");
        assert_eq!(context.names().count(), 0);
    }

    #[test]
    fn empty_string_is_valid() {
        let mut context = ResolutionContext::default();
        let var = VarString::load("", &mut context);
        assert!(!var.is_templated());
        assert_eq!(var.dump(&context, true).unwrap(), "");
    }

    #[test]
    fn escaped_dollar_is_not_a_reference() {
        let mut context = ResolutionContext::default();
        let var = VarString::load("cost: $$(Price) and $$5", &mut context);

        assert!(!var.is_templated());
        assert_eq!(context.names().count(), 0);
        assert_eq!(var.dump(&context, true).unwrap(), "cost: $(Price) and $5");
    }

    #[test]
    fn registry_is_deduplicated() {
        let mut context = ResolutionContext::default();
        VarString::load("$(Name)", &mut context);
        VarString::load("prefix-$(Name)", &mut context);
        assert_eq!(context.names().collect::<Vec<_>>(), vec!["Name"]);
    }

    #[test]
    fn single_reference() {
        let mut context = ResolutionContext::default();

        let var = VarString::single_reference("$(Secret)", &mut context).unwrap();
        assert_eq!(var.single_name(), Some("Secret"));

        let var = VarString::single_reference("Bare", &mut context).unwrap();
        assert_eq!(var.source(), "$(Bare)");
        assert_eq!(var.single_name(), Some("Bare"));

        assert!(matches!(
            VarString::single_reference("prefix-$(Secret)", &mut context),
            Err(Error::Schema(_))
        ));
        assert!(matches!(
            VarString::single_reference("not a name", &mut context),
            Err(Error::Schema(_))
        ));
    }

    #[test]
    fn unresolved_variable_fails() {
        let mut context = ResolutionContext::default();
        let var = VarString::load("$(Missing)", &mut context);

        assert!(matches!(
            var.dump(&context, true),
            Err(Error::UnresolvedVariable(name)) if name == "Missing"
        ));
    }

    #[test]
    fn resolves_in_sorted_order_once() {
        let mut context = ResolutionContext::default();
        VarString::load("$(b) $(a) $(c)", &mut context);

        let mut order = vec![];
        context
            .resolve(|name| {
                order.push(name.to_string());
                let value = name.to_uppercase();
                Ok(Binding::computed(move || Ok(value.clone())))
            })
            .unwrap();
        // nothing new to bind
        context.resolve(|_| panic!("must not be called")).unwrap();

        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn dump_is_idempotent() {
        let calls = Rc::new(Cell::new(0));
        let mut context = ResolutionContext::default();
        let var = VarString::load("/app/$(Stage)/$(Stage)", &mut context);

        let counter = calls.clone();
        context
            .resolve(move |_| {
                let counter = counter.clone();
                Ok(Binding::computed(move || {
                    counter.set(counter.get() + 1);
                    Ok("prod".to_string())
                }))
            })
            .unwrap();

        assert_eq!(var.dump(&context, true).unwrap(), "/app/prod/prod");
        assert_eq!(var.dump(&context, true).unwrap(), "/app/prod/prod");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn failed_resolution_is_retried() {
        let cell: Cached<String> = Default::default();
        assert!(cell
            .get_or_try_resolve("x", || Err(Error::input("nope")))
            .is_err());
        assert_eq!(
            cell.get_or_try_resolve("x", || Ok("ok".to_string())).unwrap(),
            "ok"
        );
    }
}
