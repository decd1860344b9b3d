//! Scope chain with independent name and type stores.
//!
//! Names are visible through the whole chain and can never be shadowed.
//! Anonymous values are stored per type ("type slots") and are only
//! reachable from the innermost function: sentence frames are transparent,
//! the first other frame is the home frame, and a lookup may take exactly
//! one more hop past it, never into the program root.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::mem;

use pif_types::{StructuralType, Type};
use tracing::{debug, trace};

use crate::error::{EvalError, EvalErrorKind, EvalResult};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// The program frame the driver creates.
    Root,
    /// One invocation of a closure.
    Function,
    /// Collects the values of a single sentence.
    Sentence,
}

/// Pairs auto-filled parameter names with the type slot they occupy.
#[derive(Debug, Clone, Default)]
struct BindingLinks {
    by_name: HashMap<String, Type>,
    by_type: HashMap<Type, String>,
}

impl BindingLinks {
    fn link(&mut self, name: &str, ty: &Type) {
        self.by_name.insert(name.to_string(), ty.clone());
        self.by_type.insert(ty.clone(), name.to_string());
    }

    fn release_name(&mut self, name: &str) -> Option<Type> {
        let ty = self.by_name.remove(name)?;
        self.by_type.remove(&ty);
        Some(ty)
    }

    fn release_type(&mut self, ty: &Type) -> Option<String> {
        let name = self.by_type.remove(ty)?;
        self.by_name.remove(&name);
        Some(name)
    }
}

/// One scope level.
#[derive(Debug, Clone)]
pub struct Frame {
    kind: FrameKind,
    names: HashMap<String, Value>,
    type_slots: BTreeMap<Type, Value>,
    dupe_types: BTreeSet<Type>,
    links: BindingLinks,
}

impl Frame {
    pub fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            names: HashMap::new(),
            type_slots: BTreeMap::new(),
            dupe_types: BTreeSet::new(),
            links: BindingLinks::default(),
        }
    }

    pub fn sentence() -> Self {
        Self::new(FrameKind::Sentence)
    }

    fn function(dupe_types: BTreeSet<Type>) -> Self {
        Self {
            dupe_types,
            ..Self::new(FrameKind::Function)
        }
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn name(&self, name: &str) -> Option<&Value> {
        self.names.get(name)
    }

    pub fn slot(&self, ty: &Type) -> Option<&Value> {
        self.type_slots.get(ty)
    }

    pub fn slot_count(&self) -> usize {
        self.type_slots.len()
    }

    /// Install an anonymous value in this frame.
    ///
    /// An occupied slot may only be replaced while it still holds an
    /// auto-filled parameter; the parameter's name goes with it.
    pub fn push_type(&mut self, v: Value) -> EvalResult<()> {
        let ty = v.type_of();
        if let Some(existing) = self.type_slots.get(&ty) {
            match self.links.release_type(&ty) {
                Some(name) => {
                    debug!(%name, %ty, "auto-filled parameter replaced");
                    self.names.remove(&name);
                }
                None => {
                    return Err(EvalError::shadow(format!(
                        "{v} can't replace {ty}={existing}"
                    )))
                }
            }
        }
        debug!(%ty, value = %v, "push type");
        self.type_slots.insert(ty, v);
        Ok(())
    }

    /// At most one anonymous value may be left over.
    pub fn result(&self) -> EvalResult<Option<Value>> {
        let mut values = self.type_slots.values();
        match (values.next(), values.next()) {
            (None, _) => Ok(None),
            (Some(v), None) => Ok(Some(v.clone())),
            _ => {
                let values = self
                    .type_slots
                    .values()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(EvalErrorKind::AmbiguousResult { values }.into())
            }
        }
    }

    /// Structural types currently holding a value, for `obeys` fallback.
    fn custom_types(&self) -> impl Iterator<Item = (&Type, &StructuralType)> {
        self.type_slots
            .keys()
            .filter_map(|key| key.as_struct().map(|st| (key, st)))
    }

    /// Key of the slot answering a request for `ty`: the exact slot, or the
    /// single structural slot that obeys it.
    fn match_slot(&self, ty: &Type) -> EvalResult<Option<&Type>> {
        if let Some((key, _)) = self.type_slots.get_key_value(ty) {
            return Ok(Some(key));
        }
        let Type::Struct(required) = ty else {
            return Ok(None);
        };
        let mut candidates = self
            .custom_types()
            .filter(|(_, st)| st.obeys(required))
            .map(|(key, _)| key);
        match (candidates.next(), candidates.next()) {
            (None, _) => Ok(None),
            (Some(key), None) => Ok(Some(key)),
            (Some(a), Some(b)) => Err(EvalErrorKind::AmbiguousType {
                ty: ty.clone(),
                reason: format!("both {a} and {b} obey it"),
            }
            .into()),
        }
    }

    /// Remove a slot along with the parameter name linked to it.
    fn take_slot(&mut self, key: &Type) -> Option<Value> {
        let v = self.type_slots.remove(key)?;
        if let Some(name) = self.links.release_type(key) {
            self.names.remove(&name);
        }
        Some(v)
    }

    /// Drop the auto-fill link of `name`, clearing its type slot.
    fn release_name(&mut self, name: &str) {
        if let Some(ty) = self.links.release_name(name) {
            trace!(%name, %ty, "auto-fill released");
            self.type_slots.remove(&ty);
        }
    }

    fn install_param(&mut self, name: &str, ty: &Type, v: Value) {
        self.type_slots.insert(ty.clone(), v);
        self.links.link(name, ty);
    }
}

/// Chain of frames, innermost first.
///
/// Closures keep an owned copy of the context they were defined in, so
/// nothing is ever shared between two live contexts.
#[derive(Debug, Clone)]
pub struct Context {
    current: Frame,
    /// Enclosing frames, outermost first.
    parents: Vec<Frame>,
}

impl Default for Context {
    fn default() -> Self {
        Self::root()
    }
}

impl Context {
    /// A context holding only an empty program frame.
    pub fn root() -> Self {
        Self {
            current: Frame::new(FrameKind::Root),
            parents: Vec::new(),
        }
    }

    pub fn current(&self) -> &Frame {
        &self.current
    }

    /// Number of frames in the chain.
    pub fn depth(&self) -> usize {
        self.parents.len() + 1
    }

    fn chain(&self) -> impl Iterator<Item = &Frame> {
        std::iter::once(&self.current).chain(self.parents.iter().rev())
    }

    /// Frame `depth` levels above the current one.
    pub fn frame(&self, depth: usize) -> Option<&Frame> {
        self.chain().nth(depth)
    }

    fn frame_mut(&mut self, depth: usize) -> Option<&mut Frame> {
        if depth == 0 {
            return Some(&mut self.current);
        }
        let idx = self.parents.len().checked_sub(depth)?;
        self.parents.get_mut(idx)
    }

    /// Make `frame` the current frame.
    pub fn enter(&mut self, frame: Frame) {
        let parent = mem::replace(&mut self.current, frame);
        self.parents.push(parent);
    }

    /// Detach and return the current frame. The outermost frame stays.
    pub fn leave(&mut self) -> Option<Frame> {
        let parent = self.parents.pop()?;
        Some(mem::replace(&mut self.current, parent))
    }

    /// Run `f` with `frame` entered, handing the frame back afterwards.
    pub fn with_frame<T>(&mut self, frame: Frame, f: impl FnOnce(&mut Context) -> T) -> (Frame, T) {
        let kind = frame.kind;
        self.enter(frame);
        let out = f(self);
        let frame = self.leave().unwrap_or_else(|| Frame::new(kind));
        (frame, out)
    }

    // Name store

    /// Innermost binding of `name`, with the number of frames above the
    /// current one that own it.
    pub fn lookup_by_name(&self, name: &str) -> EvalResult<(usize, &Value)> {
        self.chain()
            .enumerate()
            .find_map(|(depth, frame)| frame.names.get(name).map(|v| (depth, v)))
            .ok_or_else(|| {
                EvalErrorKind::NameNotFound {
                    name: name.to_string(),
                }
                .into()
            })
    }

    /// Read a name. If it was an auto-filled parameter, its anonymous slot
    /// is retracted; the name itself stays bound.
    pub fn get_name(&mut self, name: &str) -> EvalResult<Value> {
        let (depth, v) = self.lookup_by_name(name)?;
        let v = v.clone();
        trace!(%name, depth, "get name");
        if let Some(frame) = self.frame_mut(depth) {
            frame.release_name(name);
        }
        Ok(v)
    }

    /// Bind `name` in the current frame. Rebinding a name this frame owns
    /// is allowed; a name visible from an enclosing frame is not.
    pub fn push_name(&mut self, name: &str, v: Value) -> EvalResult<()> {
        if self.current.names.contains_key(name) {
            self.current.release_name(name);
        } else if self.lookup_by_name(name).is_ok() {
            return Err(EvalError::shadow(format!("existing name `{name}`")));
        }
        debug!(%name, value = %v, "push name");
        self.current.names.insert(name.to_string(), v);
        Ok(())
    }

    // Type store

    fn locate_type(&self, ty: &Type) -> EvalResult<(usize, Type)> {
        let mut past_home = false;
        for (depth, frame) in self.chain().enumerate() {
            if past_home && frame.kind == FrameKind::Root {
                break;
            }
            if frame.dupe_types.contains(ty) {
                return Err(EvalErrorKind::AmbiguousType {
                    ty: ty.clone(),
                    reason: "more than one parameter of the function has this type".to_string(),
                }
                .into());
            }
            if let Some(key) = frame.match_slot(ty)? {
                trace!(%ty, depth, "type found");
                return Ok((depth, key.clone()));
            }
            if frame.kind != FrameKind::Sentence {
                if past_home {
                    break;
                }
                past_home = true;
            }
        }
        Err(EvalErrorKind::TypeNotFound { ty: ty.clone() }.into())
    }

    /// The anonymous value answering `ty`, with the depth of its owner.
    pub fn lookup_by_type(&self, ty: &Type) -> EvalResult<(usize, &Value)> {
        let (depth, key) = self.locate_type(ty)?;
        self.frame(depth)
            .and_then(|frame| frame.type_slots.get(&key))
            .map(|v| (depth, v))
            .ok_or_else(|| EvalErrorKind::TypeNotFound { ty: ty.clone() }.into())
    }

    /// Consume the anonymous value answering `ty` from the frame owning it.
    pub fn pop_type(&mut self, ty: &Type) -> EvalResult<Value> {
        let (depth, key) = self.locate_type(ty)?;
        let v = self
            .frame_mut(depth)
            .and_then(|frame| frame.take_slot(&key))
            .ok_or_else(|| EvalError::from(EvalErrorKind::TypeNotFound { ty: ty.clone() }))?;
        debug!(%ty, depth, value = %v, "pop type");
        Ok(v)
    }

    pub fn push_type(&mut self, v: Value) -> EvalResult<()> {
        self.current.push_type(v)
    }

    /// Drop a value of exactly `ty` from the current frame, if there is one.
    pub fn discard_local(&mut self, ty: &Type) -> Option<Value> {
        self.current.take_slot(ty)
    }

    pub fn result(&self) -> EvalResult<Option<Value>> {
        self.current.result()
    }

    // Closures

    /// Owned copy of the whole chain, frozen for a closure.
    pub fn snapshot_for_closure(&self) -> Context {
        self.clone()
    }

    /// Make `name` refer to `v` inside this (copied) chain, overwriting the
    /// owning frame's binding if there is one.
    pub(crate) fn bind_self(&mut self, name: &str, v: Value) {
        let depth = self.lookup_by_name(name).map(|(depth, _)| depth).unwrap_or(0);
        if let Some(frame) = self.frame_mut(depth) {
            frame.names.insert(name.to_string(), v);
        }
    }

    /// Open a function frame over this snapshot and fill `params` from
    /// `caller`.
    ///
    /// Each parameter is taken from a same-named binding in the caller's
    /// current frame when there is one; otherwise it is popped from the
    /// caller by type. Parameters sharing a type with another parameter can
    /// only be supplied by name.
    pub fn bind_call(mut self, caller: &mut Context, params: &[(String, Type)]) -> EvalResult<Context> {
        let dupes = find_dupes(params.iter().map(|(_, ty)| ty));
        self.enter(Frame::function(dupes.clone()));

        for (name, ty) in params {
            let v = match caller.current.names.get(name) {
                Some(v) => {
                    let found = v.type_of();
                    if &found != ty {
                        return Err(EvalError::type_mismatch(format!(
                            "named var `{name}` incompatible with type {ty} (got {found})"
                        )));
                    }
                    v.clone()
                }
                None if dupes.contains(ty) => {
                    return Err(EvalErrorKind::AmbiguousAutoFill {
                        param: name.clone(),
                        ty: ty.clone(),
                    }
                    .into())
                }
                None => caller.pop_type(ty)?,
            };
            self.push_name(name, v.clone())?;
            if !dupes.contains(ty) {
                self.current.install_param(name, ty, v);
            }
        }
        Ok(self)
    }
}

fn find_dupes<'a>(types: impl Iterator<Item = &'a Type>) -> BTreeSet<Type> {
    let mut seen = BTreeSet::new();
    let mut dupes = BTreeSet::new();
    for ty in types {
        if !seen.insert(ty) {
            dupes.insert(ty.clone());
        }
    }
    dupes
}
