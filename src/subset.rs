//! Physical variables and subsets

use crate::{Descriptor, Value};

/// One decoded (or to-be-encoded) value, with the attributes attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Variable {
    pub code: Descriptor,
    pub value: Value,
    /// Attributes, at most one per attribute code
    pub attributes: Vec<Variable>,
    /// Raw associated field (operator 2 04) coded in front of the value.
    /// When encoding under an active associated field, `None` is coded as
    /// all ones.
    pub associated: Option<u64>,
}

impl Variable {
    pub fn new(code: Descriptor, value: Value) -> Self {
        Self {
            code,
            value,
            attributes: Vec::new(),
            associated: None,
        }
    }

    pub fn missing(code: Descriptor) -> Self {
        Self::new(code, Value::Missing)
    }

    pub fn with_attribute(mut self, attribute: Variable) -> Self {
        self.set_attribute(attribute);
        self
    }

    pub fn with_associated(mut self, associated: u64) -> Self {
        self.associated = Some(associated);
        self
    }

    /// Attaches an attribute, replacing any previous one with the same code.
    pub fn set_attribute(&mut self, attribute: Variable) {
        match self
            .attributes
            .iter_mut()
            .find(|a| a.code == attribute.code)
        {
            Some(existing) => *existing = attribute,
            None => self.attributes.push(attribute),
        }
    }

    pub fn attribute(&self, code: Descriptor) -> Option<&Variable> {
        self.attributes.iter().find(|a| a.code == code)
    }
}

/// One physical report: the top-level variables in chain order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Subset {
    pub variables: Vec<Variable>,
    /// Reference values redefined by operator 2 03 YYY, in definition order
    pub new_references: Vec<(Descriptor, i64)>,
}

impl Subset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, var: Variable) {
        self.variables.push(var);
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Variable> {
        self.variables.iter()
    }

    /// First top-level variable with the given code.
    pub fn find(&self, code: Descriptor) -> Option<&Variable> {
        self.variables.iter().find(|v| v.code == code)
    }
}

impl FromIterator<Variable> for Subset {
    fn from_iter<T: IntoIterator<Item = Variable>>(iter: T) -> Self {
        Subset {
            variables: iter.into_iter().collect(),
            new_references: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_are_unique_per_code() {
        let mut v = Variable::new(Descriptor::b(12, 101), Value::Decimal(27315, -2));
        v.set_attribute(Variable::new(Descriptor::b(33, 7), Value::Integer(70)));
        v.set_attribute(Variable::new(Descriptor::b(33, 2), Value::Integer(1)));
        v.set_attribute(Variable::new(Descriptor::b(33, 7), Value::Integer(90)));
        assert_eq!(v.attributes.len(), 2);
        assert_eq!(
            v.attribute(Descriptor::b(33, 7)).unwrap().value,
            Value::Integer(90)
        );
    }

    #[test]
    fn test_subset_find() {
        let subset: Subset = [
            Variable::new(Descriptor::b(1, 1), Value::Integer(16)),
            Variable::new(Descriptor::b(1, 2), Value::Integer(144)),
        ]
        .into_iter()
        .collect();
        assert_eq!(subset.len(), 2);
        assert_eq!(
            subset.find(Descriptor::b(1, 2)).unwrap().value,
            Value::Integer(144)
        );
        assert!(subset.find(Descriptor::b(1, 19)).is_none());
    }
}
