//! Descriptor chains
//!
//! A [`DescriptorChain`] is the mutable list of descriptors that templates
//! are assembled from and that the expander consumes. It is backed by a
//! `Vec`, so "insert a copy before a node" is a splice and positions are
//! plain indices.

use std::fmt::Display;

use crate::{Descriptor, Error};

/// An ordered, owned sequence of descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DescriptorChain {
    nodes: Vec<Descriptor>,
}

impl DescriptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn as_slice(&self) -> &[Descriptor] {
        &self.nodes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Descriptor> {
        self.nodes.iter()
    }

    /// Adds one descriptor at the tail.
    pub fn append(&mut self, code: Descriptor) {
        self.nodes.push(code);
    }

    /// Inserts a copy of `source` immediately before position `at`, or at the
    /// head when `at` is `None`.
    ///
    /// `source` is left untouched and shares nothing with `self` afterwards,
    /// so a canonical fragment can be spliced into any number of templates.
    /// Positions past the end append at the tail.
    pub fn prepend_copy(
        &mut self,
        at: Option<usize>,
        source: &DescriptorChain,
    ) -> Result<(), Error> {
        let at = at.unwrap_or(0).min(self.nodes.len());
        self.nodes.try_reserve(source.len())?;
        self.nodes.splice(at..at, source.nodes.iter().copied());
        Ok(())
    }

    /// Moves every node of `other` onto the tail of this chain.
    pub fn join(&mut self, mut other: DescriptorChain) {
        self.nodes.append(&mut other.nodes);
    }

    /// Detaches the first descriptor.
    pub fn pop(&mut self) -> Option<Descriptor> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(self.nodes.remove(0))
        }
    }

    /// Detaches the first `n` descriptors and returns them as a new chain.
    pub fn pop_front(&mut self, n: usize) -> Result<DescriptorChain, Error> {
        if n > self.nodes.len() {
            return Err(Error::Consistency(format!(
                "cannot pop {n} descriptors from a chain of {}",
                self.nodes.len()
            )));
        }
        let head = self.nodes.drain(..n).collect();
        Ok(DescriptorChain { nodes: head })
    }
}

impl From<&[Descriptor]> for DescriptorChain {
    fn from(value: &[Descriptor]) -> Self {
        DescriptorChain {
            nodes: value.to_vec(),
        }
    }
}

impl From<Vec<Descriptor>> for DescriptorChain {
    fn from(nodes: Vec<Descriptor>) -> Self {
        DescriptorChain { nodes }
    }
}

impl FromIterator<Descriptor> for DescriptorChain {
    fn from_iter<T: IntoIterator<Item = Descriptor>>(iter: T) -> Self {
        DescriptorChain {
            nodes: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for DescriptorChain {
    type Item = Descriptor;
    type IntoIter = std::vec::IntoIter<Descriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

impl<'a> IntoIterator for &'a DescriptorChain {
    type Item = &'a Descriptor;
    type IntoIter = std::slice::Iter<'a, Descriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

impl Display for DescriptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, d) in self.nodes.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{d}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(codes: &[(u8, u8, u8)]) -> DescriptorChain {
        codes.iter().map(|&(f, x, y)| Descriptor::new(f, x, y)).collect()
    }

    #[test]
    fn test_append_and_display() {
        let mut c = DescriptorChain::new();
        c.append(Descriptor::d(1, 11));
        c.append(Descriptor::b(12, 101));
        assert_eq!(c.len(), 2);
        assert_eq!(c.to_string(), "D01011 B12101");
    }

    #[test]
    fn test_prepend_copy_at_head() {
        let source = chain(&[(0, 4, 1), (0, 4, 2)]);
        let mut dest = chain(&[(0, 12, 101)]);
        dest.prepend_copy(None, &source).unwrap();
        assert_eq!(dest, chain(&[(0, 4, 1), (0, 4, 2), (0, 12, 101)]));
    }

    #[test]
    fn test_prepend_copy_before_node() {
        let source = chain(&[(0, 4, 1), (0, 4, 2)]);
        let mut dest = chain(&[(0, 1, 1), (0, 12, 101)]);
        dest.prepend_copy(Some(1), &source).unwrap();
        assert_eq!(
            dest,
            chain(&[(0, 1, 1), (0, 4, 1), (0, 4, 2), (0, 12, 101)])
        );

        let mut empty = DescriptorChain::new();
        empty.prepend_copy(Some(5), &source).unwrap();
        assert_eq!(empty, source);
    }

    #[test]
    fn test_prepend_copy_leaves_source_alone() {
        let source = chain(&[(0, 5, 1), (0, 6, 1)]);
        let mut dest = DescriptorChain::new();
        dest.prepend_copy(None, &source).unwrap();

        dest.append(Descriptor::b(7, 1));
        dest.pop();
        dest.prepend_copy(None, &source).unwrap();

        assert_eq!(source.len(), 2);
        assert_eq!(source, chain(&[(0, 5, 1), (0, 6, 1)]));
        assert_eq!(dest.len(), 4);
    }

    #[test]
    fn test_join_moves_nodes() {
        let mut a = chain(&[(0, 1, 1)]);
        let b = chain(&[(0, 1, 2), (0, 2, 1)]);
        a.join(b);
        assert_eq!(a, chain(&[(0, 1, 1), (0, 1, 2), (0, 2, 1)]));
    }

    #[test]
    fn test_pop_front() {
        let mut c = chain(&[(1, 1, 0), (0, 31, 1), (0, 12, 101), (0, 12, 103)]);
        let head = c.pop_front(2).unwrap();
        assert_eq!(head, chain(&[(1, 1, 0), (0, 31, 1)]));
        assert_eq!(c, chain(&[(0, 12, 101), (0, 12, 103)]));

        assert!(matches!(c.pop_front(3), Err(Error::Consistency(_))));
        assert_eq!(c.len(), 2);
        assert!(c.pop_front(0).unwrap().is_empty());
        assert_eq!(c.pop_front(2).unwrap().len(), 2);
        assert!(c.is_empty());
        assert_eq!(c.pop(), None);
    }
}
