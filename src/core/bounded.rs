//! Purpose: Convert any `Serialize` value to a `serde_json::Value` under the encode ceiling.
//! Exports: `to_value` (crate-internal).
//! Role: Serializer adapter between `Json::encode` and `serde_json::value::Serializer`.
//! Invariants: Container depth is checked as each container opens, never after the fact.
//! Invariants: Chained `JsonClass` expansions with no container between them are bounded too.
//! Invariants: NaN and infinities are rejected, not written as `null`.
//! Notes: Each nested value runs through `with_stack`, so deep ceilings do not need a big thread.

use std::cell::Cell;

use serde::ser::{self, Serialize, Serializer};
use serde_json::Value;

use crate::core::error::{Error, ErrorKind};
use crate::core::nesting::with_stack;
use crate::core::node::CLASS_EXPANSION;

#[derive(Clone, Copy, Debug)]
enum Violation {
    TooDeep(usize),
    Expansion(usize),
    NonFinite(f64),
}

struct Budget {
    max_nesting: usize,
    deepest: Cell<usize>,
    violation: Cell<Option<Violation>>,
}

impl Budget {
    fn fail<E: ser::Error>(&self, violation: Violation) -> E {
        self.violation.set(Some(violation));
        match violation {
            Violation::TooDeep(depth) => E::custom(format!("nesting of {depth} is too deep")),
            Violation::Expansion(count) => {
                E::custom(format!("{count} chained domain-object expansions"))
            }
            Violation::NonFinite(value) => E::custom(format!("non-finite float {value}")),
        }
    }
}

/// Serialize `value` into a `Value`, returning it with the deepest level reached.
pub(crate) fn to_value<T: Serialize + ?Sized>(
    value: &T,
    max_nesting: usize,
) -> Result<(Value, usize), Error> {
    let budget = Budget {
        max_nesting,
        deepest: Cell::new(0),
        violation: Cell::new(None),
    };
    let guarded = Guarded {
        inner: serde_json::value::Serializer,
        budget: &budget,
        depth: 0,
        expansions: 0,
    };
    match value.serialize(guarded) {
        Ok(value) => Ok((value, budget.deepest.get())),
        Err(err) => {
            let encode = Error::new(ErrorKind::Encode);
            let encode = match budget.violation.get() {
                Some(Violation::TooDeep(depth)) => encode
                    .with_message(format!(
                        "value nesting of {depth} exceeds max_nesting {max_nesting}"
                    ))
                    .with_depth(depth),
                Some(Violation::Expansion(count)) => encode
                    .with_message(format!(
                        "{count} chained domain-object expansions exceed max_nesting {max_nesting}"
                    ))
                    .with_hint("a `to_node` implementation probably returns itself"),
                Some(Violation::NonFinite(value)) => {
                    encode.with_message(format!("cannot encode non-finite float {value}"))
                }
                None => encode.with_message(err.to_string()),
            };
            Err(encode.with_source(err))
        }
    }
}

struct Guarded<'b, S> {
    inner: S,
    budget: &'b Budget,
    depth: usize,
    expansions: usize,
}

impl<'b, S: Serializer> Guarded<'b, S> {
    fn enter(&self, levels: usize) -> Result<usize, S::Error> {
        let depth = self.depth + levels;
        if depth > self.budget.max_nesting {
            return Err(self.budget.fail(Violation::TooDeep(depth)));
        }
        if depth > self.budget.deepest.get() {
            self.budget.deepest.set(depth);
        }
        Ok(depth)
    }

    fn nested<'a, T: ?Sized>(&self, value: &'a T) -> Nested<'a, 'b, T> {
        Nested {
            value,
            budget: self.budget,
            depth: self.depth,
            expansions: self.expansions,
        }
    }

    fn finite(&self, value: f64) -> Result<(), S::Error> {
        if value.is_finite() {
            Ok(())
        } else {
            Err(self.budget.fail(Violation::NonFinite(value)))
        }
    }
}

struct Nested<'a, 'b, T: ?Sized> {
    value: &'a T,
    budget: &'b Budget,
    depth: usize,
    expansions: usize,
}

impl<T: Serialize + ?Sized> Serialize for Nested<'_, '_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        with_stack(|| {
            self.value.serialize(Guarded {
                inner: serializer,
                budget: self.budget,
                depth: self.depth,
                expansions: self.expansions,
            })
        })
    }
}

struct Compound<'b, C> {
    inner: C,
    budget: &'b Budget,
    depth: usize,
}

impl<'b, C> Compound<'b, C> {
    // Entering a container resets the expansion chain.
    fn nested<'a, T: ?Sized>(&self, value: &'a T) -> Nested<'a, 'b, T> {
        Nested {
            value,
            budget: self.budget,
            depth: self.depth,
            expansions: 0,
        }
    }
}

impl<'b, S: Serializer> Serializer for Guarded<'b, S> {
    type Ok = S::Ok;
    type Error = S::Error;
    type SerializeSeq = Compound<'b, S::SerializeSeq>;
    type SerializeTuple = Compound<'b, S::SerializeTuple>;
    type SerializeTupleStruct = Compound<'b, S::SerializeTupleStruct>;
    type SerializeTupleVariant = Compound<'b, S::SerializeTupleVariant>;
    type SerializeMap = Compound<'b, S::SerializeMap>;
    type SerializeStruct = Compound<'b, S::SerializeStruct>;
    type SerializeStructVariant = Compound<'b, S::SerializeStructVariant>;

    fn serialize_bool(self, v: bool) -> Result<S::Ok, S::Error> {
        self.inner.serialize_bool(v)
    }

    fn serialize_i8(self, v: i8) -> Result<S::Ok, S::Error> {
        self.inner.serialize_i8(v)
    }

    fn serialize_i16(self, v: i16) -> Result<S::Ok, S::Error> {
        self.inner.serialize_i16(v)
    }

    fn serialize_i32(self, v: i32) -> Result<S::Ok, S::Error> {
        self.inner.serialize_i32(v)
    }

    fn serialize_i64(self, v: i64) -> Result<S::Ok, S::Error> {
        self.inner.serialize_i64(v)
    }

    fn serialize_i128(self, v: i128) -> Result<S::Ok, S::Error> {
        self.inner.serialize_i128(v)
    }

    fn serialize_u8(self, v: u8) -> Result<S::Ok, S::Error> {
        self.inner.serialize_u8(v)
    }

    fn serialize_u16(self, v: u16) -> Result<S::Ok, S::Error> {
        self.inner.serialize_u16(v)
    }

    fn serialize_u32(self, v: u32) -> Result<S::Ok, S::Error> {
        self.inner.serialize_u32(v)
    }

    fn serialize_u64(self, v: u64) -> Result<S::Ok, S::Error> {
        self.inner.serialize_u64(v)
    }

    fn serialize_u128(self, v: u128) -> Result<S::Ok, S::Error> {
        self.inner.serialize_u128(v)
    }

    fn serialize_f32(self, v: f32) -> Result<S::Ok, S::Error> {
        self.finite(f64::from(v))?;
        self.inner.serialize_f32(v)
    }

    fn serialize_f64(self, v: f64) -> Result<S::Ok, S::Error> {
        self.finite(v)?;
        self.inner.serialize_f64(v)
    }

    fn serialize_char(self, v: char) -> Result<S::Ok, S::Error> {
        self.inner.serialize_char(v)
    }

    fn serialize_str(self, v: &str) -> Result<S::Ok, S::Error> {
        self.inner.serialize_str(v)
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<S::Ok, S::Error> {
        self.enter(1)?;
        self.inner.serialize_bytes(v)
    }

    fn serialize_none(self) -> Result<S::Ok, S::Error> {
        self.inner.serialize_none()
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<S::Ok, S::Error> {
        let nested = self.nested(value);
        self.inner.serialize_some(&nested)
    }

    fn serialize_unit(self) -> Result<S::Ok, S::Error> {
        self.inner.serialize_unit()
    }

    fn serialize_unit_struct(self, name: &'static str) -> Result<S::Ok, S::Error> {
        self.inner.serialize_unit_struct(name)
    }

    fn serialize_unit_variant(
        self,
        name: &'static str,
        variant_index: u32,
        variant: &'static str,
    ) -> Result<S::Ok, S::Error> {
        self.inner
            .serialize_unit_variant(name, variant_index, variant)
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        value: &T,
    ) -> Result<S::Ok, S::Error> {
        if name != CLASS_EXPANSION {
            let nested = self.nested(value);
            return self.inner.serialize_newtype_struct(name, &nested);
        }
        let expansions = self.expansions + 1;
        if expansions > self.budget.max_nesting {
            return Err(self.budget.fail(Violation::Expansion(expansions)));
        }
        let budget = self.budget;
        let depth = self.depth;
        let inner = self.inner;
        with_stack(|| {
            value.serialize(Guarded {
                inner,
                budget,
                depth,
                expansions,
            })
        })
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<S::Ok, S::Error> {
        let depth = self.enter(1)?;
        let nested = Nested {
            value,
            budget: self.budget,
            depth,
            expansions: 0,
        };
        self.inner
            .serialize_newtype_variant(name, variant_index, variant, &nested)
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq, S::Error> {
        let depth = self.enter(1)?;
        let budget = self.budget;
        Ok(Compound {
            inner: self.inner.serialize_seq(len)?,
            budget,
            depth,
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple, S::Error> {
        let depth = self.enter(1)?;
        let budget = self.budget;
        Ok(Compound {
            inner: self.inner.serialize_tuple(len)?,
            budget,
            depth,
        })
    }

    fn serialize_tuple_struct(
        self,
        name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleStruct, S::Error> {
        let depth = self.enter(1)?;
        let budget = self.budget;
        Ok(Compound {
            inner: self.inner.serialize_tuple_struct(name, len)?,
            budget,
            depth,
        })
    }

    // Variants with a payload encode as `{"Variant": [..]}`: two levels.
    fn serialize_tuple_variant(
        self,
        name: &'static str,
        variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleVariant, S::Error> {
        let depth = self.enter(2)?;
        let budget = self.budget;
        Ok(Compound {
            inner: self
                .inner
                .serialize_tuple_variant(name, variant_index, variant, len)?,
            budget,
            depth,
        })
    }

    fn serialize_map(self, len: Option<usize>) -> Result<Self::SerializeMap, S::Error> {
        let depth = self.enter(1)?;
        let budget = self.budget;
        Ok(Compound {
            inner: self.inner.serialize_map(len)?,
            budget,
            depth,
        })
    }

    fn serialize_struct(
        self,
        name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeStruct, S::Error> {
        let depth = self.enter(1)?;
        let budget = self.budget;
        Ok(Compound {
            inner: self.inner.serialize_struct(name, len)?,
            budget,
            depth,
        })
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeStructVariant, S::Error> {
        let depth = self.enter(2)?;
        let budget = self.budget;
        Ok(Compound {
            inner: self
                .inner
                .serialize_struct_variant(name, variant_index, variant, len)?,
            budget,
            depth,
        })
    }

    fn is_human_readable(&self) -> bool {
        self.inner.is_human_readable()
    }
}

impl<C: ser::SerializeSeq> ser::SerializeSeq for Compound<'_, C> {
    type Ok = C::Ok;
    type Error = C::Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), C::Error> {
        let nested = self.nested(value);
        self.inner.serialize_element(&nested)
    }

    fn end(self) -> Result<C::Ok, C::Error> {
        self.inner.end()
    }
}

impl<C: ser::SerializeTuple> ser::SerializeTuple for Compound<'_, C> {
    type Ok = C::Ok;
    type Error = C::Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), C::Error> {
        let nested = self.nested(value);
        self.inner.serialize_element(&nested)
    }

    fn end(self) -> Result<C::Ok, C::Error> {
        self.inner.end()
    }
}

impl<C: ser::SerializeTupleStruct> ser::SerializeTupleStruct for Compound<'_, C> {
    type Ok = C::Ok;
    type Error = C::Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), C::Error> {
        let nested = self.nested(value);
        self.inner.serialize_field(&nested)
    }

    fn end(self) -> Result<C::Ok, C::Error> {
        self.inner.end()
    }
}

impl<C: ser::SerializeTupleVariant> ser::SerializeTupleVariant for Compound<'_, C> {
    type Ok = C::Ok;
    type Error = C::Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), C::Error> {
        let nested = self.nested(value);
        self.inner.serialize_field(&nested)
    }

    fn end(self) -> Result<C::Ok, C::Error> {
        self.inner.end()
    }
}

impl<C: ser::SerializeMap> ser::SerializeMap for Compound<'_, C> {
    type Ok = C::Ok;
    type Error = C::Error;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), C::Error> {
        self.inner.serialize_key(key)
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), C::Error> {
        let nested = self.nested(value);
        self.inner.serialize_value(&nested)
    }

    fn end(self) -> Result<C::Ok, C::Error> {
        self.inner.end()
    }
}

impl<C: ser::SerializeStruct> ser::SerializeStruct for Compound<'_, C> {
    type Ok = C::Ok;
    type Error = C::Error;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), C::Error> {
        let nested = self.nested(value);
        self.inner.serialize_field(key, &nested)
    }

    fn end(self) -> Result<C::Ok, C::Error> {
        self.inner.end()
    }
}

impl<C: ser::SerializeStructVariant> ser::SerializeStructVariant for Compound<'_, C> {
    type Ok = C::Ok;
    type Error = C::Error;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), C::Error> {
        let nested = self.nested(value);
        self.inner.serialize_field(key, &nested)
    }

    fn end(self) -> Result<C::Ok, C::Error> {
        self.inner.end()
    }
}

#[cfg(test)]
mod tests {
    use super::to_value;
    use crate::core::error::ErrorKind;
    use crate::core::node::{JsonClass, Node};
    use serde::Serialize;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Serialize)]
    enum Shape {
        Point,
        Circle { radius: f64 },
        Pair(u8, u8),
        Wrapped(Vec<u8>),
    }

    #[derive(Debug)]
    struct Mirror;

    impl JsonClass for Mirror {
        fn json_class(&self) -> &str {
            "Demo::Mirror"
        }

        fn to_node(&self) -> Node {
            Node::from(Arc::new(Mirror))
        }
    }

    #[test]
    fn output_matches_serde_json_to_value() {
        let value = json!({"a": [1, 2.5, null, {"b": "c"}], "d": true});
        let (converted, deepest) = to_value(&value, 10).expect("convert");
        assert_eq!(converted, value);
        assert_eq!(deepest, 3);
    }

    #[test]
    fn depth_counts_match_the_text_scan() {
        let value = json!({"a": [1, {"b": 2}], "c": []});
        assert!(to_value(&value, 3).is_ok());
        assert!(to_value(&json!(1), 1).is_ok());

        let err = to_value(&value, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encode);
        assert_eq!(err.depth(), Some(3));
    }

    #[test]
    fn enum_variants_count_their_wrapper_object() {
        let shapes = vec![
            Shape::Point,
            Shape::Circle { radius: 1.0 },
            Shape::Pair(1, 2),
            Shape::Wrapped(vec![3]),
        ];
        let (converted, deepest) = to_value(&shapes, 3).expect("convert");
        assert_eq!(converted, serde_json::to_value(&shapes).expect("reference"));
        assert_eq!(deepest, 3);
        assert_eq!(to_value(&shapes, 2).unwrap_err().depth(), Some(3));
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = to_value(&vec![1.0, value], 10).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Encode);
            assert!(err.message().is_some_and(|m| m.contains("non-finite")));
        }
        assert!(to_value(&Some(f32::NAN), 10).is_err());
    }

    #[test]
    fn self_expanding_class_stops_at_the_ceiling() {
        let err = to_value(&Node::from(Arc::new(Mirror)), 50).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encode);
        assert!(err.hint().is_some());
    }
}
