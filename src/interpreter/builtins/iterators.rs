//! `%IteratorPrototype%` and array iterators.

use super::this_object;
use crate::interpreter::Realm;
use crate::interpreter::call::{CallOutcome, NativeCall};
use crate::interpreter::object::{IteratorKind, ObjectData, ObjectKind};
use crate::types::{JsValue, PropertyKey, WellKnownSymbol};

impl Realm {
    pub(crate) fn setup_iterators(&mut self) {
        let iterator_proto = self.intrinsics.iterator_prototype;
        let f = self.native_function("[Symbol.iterator]", 0, return_this, Vec::new());
        self.object_mut(iterator_proto)
            .insert_builtin(WellKnownSymbol::Iterator.key(), JsValue::Object(f));

        let proto = self.intrinsics.array_iterator_prototype;
        let next = self.intrinsics.array_iterator_next;
        self.install_existing(proto, "next", "next", 0, next);
        self.object_mut(proto)
            .insert_builtin(WellKnownSymbol::ToStringTag.key(), JsValue::string("Array Iterator"));
    }

    /// CreateArrayIterator over any array-like `target`.
    pub fn create_array_iterator(&mut self, target: JsValue, kind: IteratorKind) -> JsValue {
        let proto = self.intrinsics.array_iterator_prototype;
        let iterator = self.alloc(ObjectData::new(
            ObjectKind::ArrayIterator {
                target,
                index: 0,
                kind,
                done: false,
            },
            Some(proto),
        ));
        JsValue::Object(iterator)
    }

    /// Steps a built-in array iterator without going through `next`.
    ///
    /// Returns `None` when `iterator` is not an array iterator whose `next`
    /// is still the intrinsic; otherwise `Some(None)` once exhausted.
    pub fn step_builtin_iterator(&mut self, iterator: &JsValue) -> Option<Option<JsValue>> {
        let o = iterator.as_object()?;
        if !matches!(self.object(o).kind, ObjectKind::ArrayIterator { .. }) {
            return None;
        }
        let next = self.get_data(o, &PropertyKey::from("next"));
        if next.as_object() != Some(self.intrinsics.array_iterator_next) {
            return None;
        }
        Some(self.advance_array_iterator(o))
    }

    /// Closing an array iterator without a `return` method is a no-op.
    pub fn close_builtin_iterator(&self, iterator: &JsValue) -> bool {
        let Some(o) = iterator.as_object() else {
            return false;
        };
        matches!(self.object(o).kind, ObjectKind::ArrayIterator { .. })
            && self.get_data(o, &PropertyKey::from("return")).is_undefined()
    }

    fn advance_array_iterator(&mut self, o: crate::types::JsObject) -> Option<JsValue> {
        let ObjectKind::ArrayIterator { target, index, kind, done } = &self.object(o).kind else {
            return None;
        };
        if *done {
            return None;
        }
        let (target, index, kind) = (target.clone(), *index, *kind);
        let length = match self.array_elements(&target) {
            Some(elements) => elements.len(),
            None => match target.as_object().map(|t| self.get_data_str(t, "length")) {
                Some(JsValue::Number(n)) if n.is_finite() && n > 0.0 => n as usize,
                _ => 0,
            },
        };
        let ObjectKind::ArrayIterator { index: slot, done, .. } = &mut self.object_mut(o).kind else {
            return None;
        };
        if index >= length {
            *done = true;
            return None;
        }
        *slot = index + 1;
        let element = || match (self.array_elements(&target), target.as_object()) {
            (Some(elements), _) => elements.get(index).cloned().unwrap_or_default(),
            (None, Some(t)) => self.get_data(t, &PropertyKey::from(index)),
            (None, None) => JsValue::Undefined,
        };
        let position = JsValue::Number(index as f64);
        Some(match kind {
            IteratorKind::Key => position,
            IteratorKind::Value => element(),
            IteratorKind::KeyValue => {
                let value = element();
                JsValue::Object(self.create_array(vec![position, value]))
            }
        })
    }
}

fn return_this(_realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    Ok(CallOutcome::value(call.this.clone()))
}

/// `%ArrayIteratorPrototype%.next`.
pub(crate) fn array_iterator_next(realm: &mut Realm, call: &mut NativeCall) -> Result<CallOutcome, JsValue> {
    let o = this_object(realm, call)?;
    if !matches!(realm.object(o).kind, ObjectKind::ArrayIterator { .. }) {
        return Err(realm.type_error("next method called on incompatible receiver"));
    }
    let result = match realm.advance_array_iterator(o) {
        Some(value) => realm.create_iter_result_object(value, false),
        None => realm.create_iter_result_object(JsValue::Undefined, true),
    };
    Ok(CallOutcome::value(result))
}

#[cfg(test)]
mod tests {
    use crate::config::RealmConfig;
    use crate::interpreter::Realm;
    use crate::interpreter::object::IteratorKind;
    use crate::types::JsValue;

    #[test]
    fn entries_yield_pairs_then_finish() {
        let mut realm = Realm::new(RealmConfig::default());
        let array = realm.create_array(vec![JsValue::string("a")]);
        let iterator = realm.create_array_iterator(JsValue::Object(array), IteratorKind::KeyValue);
        let first = realm.step_builtin_iterator(&iterator).unwrap().unwrap();
        assert_eq!(realm.display(&first), "[0, 'a']");
        assert!(matches!(realm.step_builtin_iterator(&iterator), Some(None)));
        assert!(realm.close_builtin_iterator(&iterator));
    }
}
