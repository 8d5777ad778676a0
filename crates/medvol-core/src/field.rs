//! Tri-state field values.
//!
//! A [`Field`] records whether a value was never set, filled in on the caller's
//! behalf (canonical default or inherited from a template volume), or given
//! explicitly. Copy resolution only overrides fields that are not explicit.

use crate::error::{Result, VolumeError};

/// A value that may be unset, defaulted, or explicitly provided.
#[derive(Debug, Clone, PartialEq)]
pub enum Field<T> {
    /// No value.
    Unset,
    /// A value the caller did not provide: a canonical default or one inherited from a template.
    Default(T),
    /// A value the caller provided.
    Explicit(T),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Unset
    }
}

impl<T> Field<T> {
    /// Wrap an optional caller-provided value.
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => Field::Explicit(v),
            None => Field::Unset,
        }
    }

    /// Get the value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            Field::Unset => None,
            Field::Default(v) | Field::Explicit(v) => Some(v),
        }
    }

    /// Consume the field and return its value, if any.
    pub fn into_value(self) -> Option<T> {
        match self {
            Field::Unset => None,
            Field::Default(v) | Field::Explicit(v) => Some(v),
        }
    }

    /// Check whether the field holds no value.
    pub fn is_unset(&self) -> bool {
        matches!(self, Field::Unset)
    }

    /// Check whether the value was provided by the caller.
    pub fn is_explicit(&self) -> bool {
        matches!(self, Field::Explicit(_))
    }

    /// Borrow the value, failing with [`VolumeError::GeometryIncomplete`] when unset.
    pub fn require(&self, name: &'static str) -> Result<&T> {
        self.value().ok_or(VolumeError::GeometryIncomplete(name))
    }

    /// Map the contained value, keeping its state.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Field<U> {
        match self {
            Field::Unset => Field::Unset,
            Field::Default(v) => Field::Default(f(v)),
            Field::Explicit(v) => Field::Explicit(f(v)),
        }
    }

    /// Fill a non-explicit field from a template field.
    ///
    /// Explicit values are kept. Otherwise the template's value, if any, is
    /// taken as a `Default` so it still counts as not caller-provided.
    pub fn or_inherit(self, template: &Field<T>) -> Field<T>
    where
        T: Clone,
    {
        match (self, template.value()) {
            (explicit @ Field::Explicit(_), _) => explicit,
            (_, Some(v)) => Field::Default(v.clone()),
            (current, None) => current,
        }
    }

    /// Fill an unset field with a canonical default.
    pub fn or_default_with<F: FnOnce() -> T>(self, f: F) -> Field<T> {
        match self {
            Field::Unset => Field::Default(f()),
            set => set,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_states() {
        let unset: Field<u8> = Field::default();
        assert!(unset.is_unset());
        assert_eq!(unset.value(), None);

        let explicit = Field::from_option(Some(3u8));
        assert!(explicit.is_explicit());
        assert_eq!(explicit.value(), Some(&3));
    }

    #[test]
    fn test_or_inherit_keeps_explicit() {
        let template = Field::Explicit(1);
        assert_eq!(Field::Explicit(5).or_inherit(&template), Field::Explicit(5));
        assert_eq!(Field::Unset.or_inherit(&template), Field::Default(1));
        assert_eq!(Field::Default(9).or_inherit(&template), Field::Default(1));
        assert_eq!(Field::Default(9).or_inherit(&Field::Unset), Field::Default(9));
    }

    #[test]
    fn test_or_default_with_only_fills_unset() {
        assert_eq!(Field::Unset.or_default_with(|| 0), Field::Default(0));
        assert_eq!(Field::Explicit(4).or_default_with(|| 0), Field::Explicit(4));
    }

    #[test]
    fn test_require() {
        let unset: Field<f64> = Field::Unset;
        let err = unset.require("spacing").unwrap_err();
        assert!(matches!(err, VolumeError::GeometryIncomplete("spacing")));
        assert_eq!(*Field::Default(2.0).require("spacing").unwrap(), 2.0);
    }
}
