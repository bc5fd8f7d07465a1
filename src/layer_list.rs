// src/layer_list.rs

//! `LayerList`: the ordered, owned collection of a document's layers.
//!
//! Index 0 is the bottom of the stack; paint order is index-ascending.
//! Ownership of a layer transfers into the list on `add`/`insert` and
//! back out on `remove_at`; layers are never shared. Structural
//! mutation is reached through `Document::layers_mut`, whose guard
//! reproduces the changing/changed notification window (sinks detached
//! before mutation, reattached plus full invalidation after).

use anyhow::Result;

use crate::error::DocumentError;
use crate::layer::Layer;

/// Ordered stack of layers, all sized to one document canvas.
#[derive(Debug)]
pub struct LayerList {
    layers: Vec<Layer>,
    canvas: (i32, i32),
}

impl LayerList {
    pub(crate) fn new(width: i32, height: i32) -> Self {
        Self {
            layers: Vec::new(),
            canvas: (width, height),
        }
    }

    /// Number of layers.
    #[inline]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// The canvas size every contained layer must match.
    #[inline]
    pub fn canvas_size(&self) -> (i32, i32) {
        self.canvas
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Layer> {
        self.layers.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Layer> {
        self.layers.iter_mut()
    }

    /// Appends a layer on top of the stack.
    ///
    /// Fails with [`DocumentError::LayerSizeMismatch`] when the layer's
    /// surface does not match the canvas size.
    pub fn add(&mut self, layer: Layer) -> Result<()> {
        self.insert(self.layers.len(), layer)
    }

    /// Inserts a layer at `index` (0 = bottom).
    ///
    /// # Panics
    /// Panics when `index > len` (a caller bug).
    pub fn insert(&mut self, index: usize, layer: Layer) -> Result<()> {
        if layer.size() != self.canvas {
            return Err(DocumentError::LayerSizeMismatch {
                expected: self.canvas,
                actual: layer.size(),
            }
            .into());
        }
        self.layers.insert(index, layer);
        Ok(())
    }

    /// Removes and returns the layer at `index`.
    ///
    /// # Panics
    /// Panics when `index` is out of range (a caller bug).
    pub fn remove_at(&mut self, index: usize) -> Layer {
        assert!(
            index < self.layers.len(),
            "remove_at index {} out of range (len {})",
            index,
            self.layers.len()
        );
        self.layers.remove(index)
    }

    /// Moves the layer at `from` so it ends up at index `to`.
    ///
    /// # Panics
    /// Panics when either index is out of range (a caller bug).
    pub fn move_layer(&mut self, from: usize, to: usize) {
        assert!(
            from < self.layers.len() && to < self.layers.len(),
            "move_layer {} -> {} out of range (len {})",
            from,
            to,
            self.layers.len()
        );
        let layer = self.layers.remove(from);
        self.layers.insert(to, layer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DocumentError;

    #[test]
    fn add_rejects_size_mismatch() {
        let mut list = LayerList::new(8, 8);
        let err = list.add(Layer::background(4, 8)).unwrap_err();
        match err.downcast_ref::<DocumentError>() {
            Some(DocumentError::LayerSizeMismatch { expected, actual }) => {
                assert_eq!(*expected, (8, 8));
                assert_eq!(*actual, (4, 8));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(list.is_empty());
    }

    #[test]
    fn insertion_order_is_paint_order() {
        let mut list = LayerList::new(2, 2);
        for name in ["bottom", "middle", "top"] {
            let mut layer = Layer::background(2, 2);
            layer.set_name(name);
            list.add(layer).unwrap();
        }
        let names: Vec<&str> = list.iter().map(|l| l.name()).collect();
        assert_eq!(names, ["bottom", "middle", "top"]);
    }

    #[test]
    fn move_layer_reorders() {
        let mut list = LayerList::new(2, 2);
        for name in ["a", "b", "c"] {
            let mut layer = Layer::background(2, 2);
            layer.set_name(name);
            list.add(layer).unwrap();
        }
        list.move_layer(0, 2);
        let names: Vec<&str> = list.iter().map(|l| l.name()).collect();
        assert_eq!(names, ["b", "c", "a"]);

        list.move_layer(2, 0);
        let names: Vec<&str> = list.iter().map(|l| l.name()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn remove_at_returns_ownership() {
        let mut list = LayerList::new(2, 2);
        let mut layer = Layer::background(2, 2);
        layer.set_name("only");
        list.add(layer).unwrap();
        let removed = list.remove_at(0);
        assert_eq!(removed.name(), "only");
        assert!(list.is_empty());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn remove_at_bad_index_panics() {
        let mut list = LayerList::new(2, 2);
        list.remove_at(0);
    }
}
