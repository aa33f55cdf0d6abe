//! Observable data.
//!
//! A [`Value`] is plain data until [`observe`] walks it: from then on every
//! object property owns a [`Dep`], every container owns an [`Observer`] whose
//! dep is notified on structural changes (new/removed keys, array mutation),
//! and reads made while a watcher evaluates subscribe that watcher.
//!
//! Containers are `Rc` handles, so reading the same nested object twice
//! always yields the same wrapper.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::rc::Rc;

use crate::config;
use crate::dep::{Dep, DepId};
use crate::error::Error;
use crate::watcher::current_target;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(ReactiveArray),
    Object(ReactiveObject),
}

/// Change detection used by setters and watchers: primitives by value (NaN is
/// equal to itself), containers by identity.
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y || (x.is_nan() && y.is_nan()),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => x.ptr_eq(y),
        (Value::Object(x), Value::Object(y)) => x.ptr_eq(y),
        _ => false,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        same_value(self, other)
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_f64().map(|n| n as i64)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ReactiveObject> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ReactiveArray> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// JS-ish truthiness, used by `v-if`-style conditionals in render code.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    pub fn observer(&self) -> Option<Observer> {
        match self {
            Value::Array(a) => a.observer(),
            Value::Object(o) => o.observer(),
            _ => None,
        }
    }

    /// Read a dotted path (`"user.address.city"`, numeric segments index
    /// arrays). Every hop goes through the tracked getters. Missing segments
    /// yield `Null`.
    pub fn get_path(&self, path: &str) -> Value {
        let mut cur = self.clone();
        for seg in path.split('.').filter(|s| !s.is_empty()) {
            cur = match &cur {
                Value::Object(o) => o.get(seg),
                Value::Array(a) => match seg.parse::<usize>() {
                    Ok(i) => a.get(i).unwrap_or_default(),
                    Err(_) => return Value::Null,
                },
                _ => return Value::Null,
            };
        }
        cur
    }

    /// Untracked snapshot.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Array(a) => {
                serde_json::Value::Array(a.0.items.borrow().iter().map(Value::to_json).collect())
            }
            Value::Object(o) => serde_json::Value::Object(
                o.0.props
                    .borrow()
                    .iter()
                    .map(|(k, p)| (k.clone(), p.value.to_json()))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::Array(_) | Value::Object(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Array(a) => fmt::Debug::fmt(a, f),
            Value::Object(o) => fmt::Debug::fmt(o, f),
        }
    }
}

macro_rules! value_from_number {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Value::Number(n as f64)
            }
        })*
    };
}
value_from_number!(i32, i64, u32, u64, usize, f32, f64);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<ReactiveObject> for Value {
    fn from(o: ReactiveObject) -> Self {
        Value::Object(o)
    }
}

impl From<ReactiveArray> for Value {
    fn from(a: ReactiveArray) -> Self {
        Value::Array(a)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or_default()
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(ReactiveArray::from_vec(items))
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => {
                Value::Array(ReactiveArray::from_vec(items.into_iter().map(Value::from).collect()))
            }
            serde_json::Value::Object(map) => {
                let obj = ReactiveObject::new();
                {
                    let mut props = obj.0.props.borrow_mut();
                    for (k, v) in map {
                        props.insert(
                            k,
                            Property {
                                value: Value::from(v),
                                dep: None,
                            },
                        );
                    }
                }
                Value::Object(obj)
            }
        }
    }
}

/// Marker attached to a container once it is observed. Its dep fires on
/// structural changes of the container.
#[derive(Clone, Debug)]
pub struct Observer {
    dep: Dep,
}

impl Observer {
    fn new() -> Self {
        Self { dep: Dep::new() }
    }

    pub fn dep(&self) -> &Dep {
        &self.dep
    }
}

/// Make `value` reactive. Idempotent; primitives and frozen containers yield
/// `None`.
pub fn observe(value: &Value) -> Option<Observer> {
    match value {
        Value::Object(o) => o.ensure_observed(),
        Value::Array(a) => a.ensure_observed(),
        _ => None,
    }
}

/// Observe `value` and hand it back, for building state inline.
pub fn reactive(value: impl Into<Value>) -> Value {
    let value = value.into();
    observe(&value);
    value
}

/// Install `key` on `obj` as a reactive property holding `value`.
pub fn define_reactive(obj: &ReactiveObject, key: impl Into<String>, value: impl Into<Value>) {
    obj.define_reactive(key, value);
}

/// Read every nested property so the current watcher depends on all of them.
pub fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    traverse_inner(value, &mut seen);
}

fn traverse_inner(value: &Value, seen: &mut HashSet<DepId>) {
    match value {
        Value::Array(a) => {
            if a.is_frozen() {
                return;
            }
            if let Some(ob) = a.observer()
                && !seen.insert(ob.dep.id())
            {
                return;
            }
            for item in a.to_vec() {
                traverse_inner(&item, seen);
            }
        }
        Value::Object(o) => {
            if o.is_frozen() {
                return;
            }
            if let Some(ob) = o.observer()
                && !seen.insert(ob.dep.id())
            {
                return;
            }
            for key in o.keys() {
                traverse_inner(&o.get(&key), seen);
            }
        }
        _ => {}
    }
}

/// Child containers read through a property: depend on their own dep too, and
/// for arrays on every nested container, since element swaps are not seen by
/// the property dep.
fn depend_child(value: &Value) {
    if let Some(ob) = value.observer() {
        ob.dep.depend();
        if let Value::Array(a) = value {
            depend_array(a);
        }
    }
}

fn depend_array(arr: &ReactiveArray) {
    let items = arr.0.items.borrow().clone();
    for item in &items {
        if let Some(ob) = item.observer() {
            ob.dep.depend();
        }
        if let Value::Array(inner) = item {
            depend_array(inner);
        }
    }
}

fn frozen_write(key: impl Into<String>) {
    config::warn(Error::FrozenWrite { key: key.into() }.to_string());
}

struct Property {
    value: Value,
    dep: Option<Dep>,
}

struct ObjectInner {
    props: RefCell<BTreeMap<String, Property>>,
    ob: RefCell<Option<Observer>>,
    frozen: Cell<bool>,
}

/// Keyed container. Properties become reactive once the object is observed.
#[derive(Clone)]
pub struct ReactiveObject(Rc<ObjectInner>);

impl ReactiveObject {
    pub fn new() -> Self {
        Self(Rc::new(ObjectInner {
            props: RefCell::new(BTreeMap::new()),
            ob: RefCell::new(None),
            frozen: Cell::new(false),
        }))
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn observer(&self) -> Option<Observer> {
        self.0.ob.borrow().clone()
    }

    pub fn is_observed(&self) -> bool {
        self.0.ob.borrow().is_some()
    }

    /// Non-extensible from here on: `observe` skips it and writes are refused.
    pub fn freeze(&self) {
        self.0.frozen.set(true);
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.get()
    }

    fn ensure_observed(&self) -> Option<Observer> {
        if let Some(ob) = self.observer() {
            return Some(ob);
        }
        if self.is_frozen() {
            return None;
        }
        let ob = Observer::new();
        // Set before walking so self-referencing data terminates.
        *self.0.ob.borrow_mut() = Some(ob.clone());
        let children: Vec<Value> = {
            let mut props = self.0.props.borrow_mut();
            props
                .values_mut()
                .map(|p| {
                    p.dep.get_or_insert_with(Dep::new);
                    p.value.clone()
                })
                .collect()
        };
        for child in &children {
            observe(child);
        }
        Some(ob)
    }

    pub fn define_reactive(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        if self.is_frozen() {
            frozen_write(key);
            return;
        }
        let value = value.into();
        self.0.props.borrow_mut().insert(
            key,
            Property {
                value: value.clone(),
                dep: Some(Dep::new()),
            },
        );
        observe(&value);
    }

    /// Tracked read. A missing key depends on the container so a later
    /// [`set`](Self::set) of that key is seen.
    pub fn get(&self, key: &str) -> Value {
        let found = {
            let props = self.0.props.borrow();
            props.get(key).map(|p| (p.value.clone(), p.dep.clone()))
        };
        match found {
            Some((value, dep)) => {
                if current_target().is_some() {
                    if let Some(dep) = dep {
                        dep.depend();
                        depend_child(&value);
                    }
                }
                value
            }
            None => {
                self.track();
                Value::Null
            }
        }
    }

    /// Untracked read.
    pub fn peek(&self, key: &str) -> Option<Value> {
        self.0.props.borrow().get(key).map(|p| p.value.clone())
    }

    /// Write `key`. Equal values are ignored. A new key on an observed object
    /// becomes reactive and notifies the container's dep.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        if self.is_frozen() {
            frozen_write(key);
            return;
        }
        let value = value.into();
        let existing = {
            let mut props = self.0.props.borrow_mut();
            match props.get_mut(&key) {
                Some(prop) => {
                    if same_value(&prop.value, &value) {
                        return;
                    }
                    prop.value = value.clone();
                    Some(prop.dep.clone())
                }
                None => None,
            }
        };
        match existing {
            Some(Some(dep)) => {
                observe(&value);
                dep.notify();
            }
            Some(None) => {}
            None => match self.observer() {
                Some(ob) => {
                    self.define_reactive(key, value);
                    ob.dep.notify();
                }
                None => {
                    self.0.props.borrow_mut().insert(key, Property { value, dep: None });
                }
            },
        }
    }

    /// Remove `key`, notifying the container when observed.
    pub fn delete(&self, key: &str) -> Option<Value> {
        if self.is_frozen() {
            frozen_write(key);
            return None;
        }
        let removed = self.0.props.borrow_mut().remove(key)?;
        if let Some(ob) = self.observer() {
            ob.dep.notify();
        }
        Some(removed.value)
    }

    pub fn has(&self, key: &str) -> bool {
        self.track();
        self.0.props.borrow().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.track();
        self.0.props.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.track();
        self.0.props.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The dep of one property, if it is reactive.
    pub fn dep_of(&self, key: &str) -> Option<Dep> {
        self.0.props.borrow().get(key).and_then(|p| p.dep.clone())
    }

    fn track(&self) {
        if let Some(ob) = self.observer() {
            ob.dep.depend();
        }
    }
}

impl Default for ReactiveObject {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ReactiveObject {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let obj = ReactiveObject::new();
        {
            let mut props = obj.0.props.borrow_mut();
            for (k, v) in iter {
                props.insert(
                    k.into(),
                    Property {
                        value: v.into(),
                        dep: None,
                    },
                );
            }
        }
        obj
    }
}

impl fmt::Debug for ReactiveObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.props.borrow().iter().map(|(k, p)| (k.clone(), p.value.clone())))
            .finish()
    }
}

struct ArrayInner {
    items: RefCell<Vec<Value>>,
    ob: RefCell<Option<Observer>>,
    frozen: Cell<bool>,
}

/// Indexed container. Mutation goes through the methods below, each of which
/// notifies the array's dep once observed.
#[derive(Clone)]
pub struct ReactiveArray(Rc<ArrayInner>);

impl ReactiveArray {
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Rc::new(ArrayInner {
            items: RefCell::new(items),
            ob: RefCell::new(None),
            frozen: Cell::new(false),
        }))
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn observer(&self) -> Option<Observer> {
        self.0.ob.borrow().clone()
    }

    pub fn freeze(&self) {
        self.0.frozen.set(true);
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.get()
    }

    fn ensure_observed(&self) -> Option<Observer> {
        if let Some(ob) = self.observer() {
            return Some(ob);
        }
        if self.is_frozen() {
            return None;
        }
        let ob = Observer::new();
        *self.0.ob.borrow_mut() = Some(ob.clone());
        let items = self.0.items.borrow().clone();
        for item in &items {
            observe(item);
        }
        Some(ob)
    }

    fn track(&self) {
        if let Some(ob) = self.observer() {
            ob.dep.depend();
        }
    }

    fn changed(&self, inserted: &[Value]) {
        if let Some(ob) = self.observer() {
            for v in inserted {
                observe(v);
            }
            ob.dep.notify();
        }
    }

    fn writable(&self, op: &str) -> bool {
        if self.is_frozen() {
            frozen_write(op);
            return false;
        }
        true
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.track();
        self.0.items.borrow().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.track();
        self.0.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.track();
        self.0.items.borrow().clone()
    }

    pub fn push(&self, value: impl Into<Value>) {
        if !self.writable("push") {
            return;
        }
        let value = value.into();
        self.0.items.borrow_mut().push(value.clone());
        self.changed(&[value]);
    }

    pub fn pop(&self) -> Option<Value> {
        if !self.writable("pop") {
            return None;
        }
        let out = self.0.items.borrow_mut().pop();
        if out.is_some() {
            self.changed(&[]);
        }
        out
    }

    pub fn shift(&self) -> Option<Value> {
        self.remove(0)
    }

    pub fn unshift(&self, value: impl Into<Value>) {
        self.insert(0, value);
    }

    pub fn insert(&self, index: usize, value: impl Into<Value>) {
        self.splice(index, 0, vec![value.into()]);
    }

    pub fn remove(&self, index: usize) -> Option<Value> {
        self.splice(index, 1, Vec::new()).pop()
    }

    /// Index assignment. Writing past the end pads with `Null`.
    pub fn set(&self, index: usize, value: impl Into<Value>) {
        let value = value.into();
        {
            let items = self.0.items.borrow();
            if items.get(index).is_some_and(|old| same_value(old, &value)) {
                return;
            }
        }
        if !self.writable("set") {
            return;
        }
        {
            let mut items = self.0.items.borrow_mut();
            if index >= items.len() {
                items.resize(index, Value::Null);
            }
        }
        self.splice(index, 1, vec![value]);
    }

    /// Remove `delete_count` items at `start` and insert `items` there.
    /// Out-of-range arguments are clamped.
    pub fn splice(&self, start: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
        if !self.writable("splice") {
            return Vec::new();
        }
        let removed: Vec<Value> = {
            let mut cur = self.0.items.borrow_mut();
            let start = start.min(cur.len());
            let end = start.saturating_add(delete_count).min(cur.len());
            cur.splice(start..end, items.iter().cloned()).collect()
        };
        if !removed.is_empty() || !items.is_empty() {
            self.changed(&items);
        }
        removed
    }

    pub fn clear(&self) {
        let len = self.0.items.borrow().len();
        self.splice(0, len, Vec::new());
    }

    pub fn sort_by(&self, mut cmp: impl FnMut(&Value, &Value) -> Ordering) {
        if !self.writable("sort") {
            return;
        }
        self.0.items.borrow_mut().sort_by(|a, b| cmp(a, b));
        self.changed(&[]);
    }

    pub fn reverse(&self) {
        if !self.writable("reverse") {
            return;
        }
        self.0.items.borrow_mut().reverse();
        self.changed(&[]);
    }
}

impl Default for ReactiveArray {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Into<Value>> FromIterator<V> for ReactiveArray {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Debug for ReactiveArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.items.borrow().iter()).finish()
    }
}
